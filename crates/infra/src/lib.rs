//! Infrastructure layer: durable stores, the ingestion state machine, and
//! the drain worker.
//!
//! Every store is a trait boundary with an in-memory implementation
//! (dev/test) and a Postgres implementation (production). Correctness of the
//! pipeline rests on two storage-level guarantees:
//!
//! - the dedup ledger's insert is atomic first-writer-wins (unique
//!   constraint, never select-then-insert), and
//! - the job queue's claim is one atomic conditional update.

pub mod drain;
pub mod event_log;
pub mod ingest;
pub mod job_queue;
pub mod ledger;

pub use drain::{DrainReport, DrainWorker, JobHandler, MAX_DRAIN_BATCH};
pub use event_log::{EventLog, EventLogError, InMemoryEventLog, NewEvent, PostgresEventLog};
pub use ingest::{IngestOutcome, IngestPipeline, IngestRequest, PipelineError};
pub use job_queue::{
    InMemoryJobQueue, JobCounts, JobQueue, NewJob, PostgresJobQueue, QueueError, WebhookJob,
};
pub use ledger::{DedupLedger, InMemoryDedupLedger, LedgerError, PostgresDedupLedger, WebhookDelivery};
