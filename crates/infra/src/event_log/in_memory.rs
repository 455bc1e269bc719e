//! In-memory event log for tests/dev.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{EventLog, EventLogError, NewEvent};

/// A recorded attempt with its append timestamp.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub event: NewEvent,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    entries: Mutex<Vec<RecordedEvent>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded attempts, in append order. Test hook.
    pub fn snapshot(&self) -> Vec<RecordedEvent> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, event: NewEvent) -> Result<(), EventLogError> {
        self.entries.lock().unwrap().push(RecordedEvent {
            event,
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}
