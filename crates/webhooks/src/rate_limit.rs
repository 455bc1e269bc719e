//! Per-key sliding-window rate limiting.
//!
//! State is process-local by design: in a horizontally scaled deployment the
//! limit applies per instance, which is an accepted weaker guarantee because
//! the limiter exists for abuse dampening, not precise quota enforcement.
//! Swapping the in-memory map for a shared counter store would not change
//! the [`RateLimiter::check`] contract.
//!
//! Two key spaces are used in practice: one keyed by network address and one
//! by sender identity. [`AdmissionControl`] combines them as a logical AND —
//! a request must pass both, and a rejection carries the stricter of the two
//! retry hints.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Sentinel key for requests whose network address could not be determined.
/// Groups all such traffic into one bucket, which is intentionally
/// conservative.
pub const UNKNOWN_ADDR_KEY: &str = "unknown";

/// Rate limiter configuration error. Fatal at startup: a zero-width window
/// has no defined semantics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitConfigError {
    #[error("rate limit window must be non-zero")]
    ZeroWindow,
}

/// Configuration for one key space.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests admitted per key within the trailing window.
    /// Zero rejects everything.
    pub limit: u32,
    /// Width of the trailing window.
    pub window: Duration,
    /// Hard cap on distinct keys tracked at once. Bounds memory against
    /// spoofed-key floods; at the cap, requests from unknown new keys are
    /// rejected.
    pub max_tracked_keys: usize,
}

impl RateLimitConfig {
    pub fn new(limit: u32, window: Duration) -> Result<Self, RateLimitConfigError> {
        if window.is_zero() {
            return Err(RateLimitConfigError::ZeroWindow);
        }
        Ok(Self {
            limit,
            window,
            max_tracked_keys: 10_000,
        })
    }

    pub fn with_max_tracked_keys(mut self, max: usize) -> Self {
        self.max_tracked_keys = max;
        self
    }
}

/// Verdict for one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Slots left in the window after this request (0 when rejected).
    pub remaining: u32,
    /// Time until the oldest in-window timestamp expires; the retry-after
    /// hint for rejected requests.
    pub reset: Duration,
}

/// Sliding-window rate limiter over one key space.
///
/// Tracks, per key, the request timestamps strictly newer than
/// `now - window`. A check admits the request iff the pruned count before
/// appending is below the limit; rejected checks do not consume a slot.
pub struct RateLimiter {
    config: RateLimitConfig,
    state: RwLock<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Check and, if admitted, record a request for `key`. One critical
    /// section; concurrent checks for the same key serialize on the lock.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let decision = Self::evaluate(&mut state, &self.config, key, now);
        if decision.allowed {
            Self::commit(&mut state, key, now);
        }
        decision
    }

    /// Decide for `key` without appending. Callers hold the write lock, so a
    /// combined decision across key spaces can veto before anything is
    /// committed.
    fn evaluate(
        state: &mut HashMap<String, Vec<Instant>>,
        config: &RateLimitConfig,
        key: &str,
        now: Instant,
    ) -> RateLimitDecision {
        if !state.contains_key(key) && state.len() >= config.max_tracked_keys {
            Self::sweep_map(state, now, config.window);
            if state.len() >= config.max_tracked_keys {
                tracing::warn!(
                    key,
                    tracked = state.len(),
                    max = config.max_tracked_keys,
                    "rejecting unknown key: tracked-key cap reached"
                );
                return RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset: config.window,
                };
            }
        }

        let cutoff = now.checked_sub(config.window).unwrap_or(now);
        let timestamps = state.entry(key.to_string()).or_default();
        timestamps.retain(|&t| t > cutoff);

        let count = timestamps.len() as u32;
        if count >= config.limit {
            let reset = Self::reset_hint(timestamps, now, config.window);
            tracing::debug!(key, count, limit = config.limit, "rate limit exceeded");
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset,
            };
        }

        RateLimitDecision {
            allowed: true,
            remaining: config.limit - count - 1,
            reset: Self::reset_hint(timestamps, now, config.window),
        }
    }

    /// Append an admitted request. Valid only after an allowed
    /// [`Self::evaluate`] under the same lock.
    fn commit(state: &mut HashMap<String, Vec<Instant>>, key: &str, now: Instant) {
        state.entry(key.to_string()).or_default().push(now);
    }

    /// Drop keys with no in-window timestamps. Invoked on a cadence
    /// independent of the check path (a periodic task in the server).
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::sweep_map(&mut state, now, self.config.window);
    }

    /// Number of keys currently tracked. Monitoring/test hook.
    pub fn tracked_keys(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    fn sweep_map(state: &mut HashMap<String, Vec<Instant>>, now: Instant, window: Duration) {
        let cutoff = now.checked_sub(window).unwrap_or(now);
        state.retain(|_, timestamps| {
            timestamps.retain(|&t| t > cutoff);
            !timestamps.is_empty()
        });
    }

    fn reset_hint(timestamps: &[Instant], now: Instant, window: Duration) -> Duration {
        match timestamps.iter().min() {
            Some(&oldest) => (oldest + window).saturating_duration_since(now),
            None => window,
        }
    }
}

/// AND-combination of the two key spaces.
///
/// A request must pass both the by-address and the by-identity limiter to
/// proceed. Quota is consumed in both spaces only when both admit, so a
/// rejection in either space leaves the other untouched.
pub struct AdmissionControl {
    by_addr: RateLimiter,
    by_identity: RateLimiter,
}

impl AdmissionControl {
    pub fn new(by_addr: RateLimitConfig, by_identity: RateLimitConfig) -> Self {
        Self {
            by_addr: RateLimiter::new(by_addr),
            by_identity: RateLimiter::new(by_identity),
        }
    }

    /// Admit or reject a request identified by its address key and, when
    /// known, its sender identity key. A combined rejection carries the
    /// stricter (larger) retry hint of the two spaces.
    ///
    /// Both spaces stay write-locked for the whole decision, so the combined
    /// check-and-append is atomic: concurrent requests for the same keys
    /// serialize here and can never admit past either limit. Lock order is
    /// fixed (address space first).
    pub fn admit(&self, addr_key: &str, identity_key: Option<&str>) -> RateLimitDecision {
        let now = Instant::now();
        let mut addr_state = self
            .by_addr
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut identity_state = self
            .by_identity
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let addr = RateLimiter::evaluate(&mut addr_state, &self.by_addr.config, addr_key, now);
        let identity = identity_key
            .map(|key| RateLimiter::evaluate(&mut identity_state, &self.by_identity.config, key, now));

        let identity_allowed = identity.map_or(true, |d| d.allowed);
        if addr.allowed && identity_allowed {
            RateLimiter::commit(&mut addr_state, addr_key, now);
            if let Some(key) = identity_key {
                RateLimiter::commit(&mut identity_state, key, now);
            }
            let remaining = identity
                .map_or(addr.remaining, |d| d.remaining.min(addr.remaining));
            return RateLimitDecision {
                allowed: true,
                remaining,
                reset: addr.reset.max(identity.map_or(Duration::ZERO, |d| d.reset)),
            };
        }

        let mut reset = Duration::ZERO;
        if !addr.allowed {
            reset = reset.max(addr.reset);
        }
        if let Some(d) = identity {
            if !d.allowed {
                reset = reset.max(d.reset);
            }
        }
        RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset,
        }
    }

    /// Sweep both key spaces.
    pub fn sweep(&self) {
        self.by_addr.sweep();
        self.by_identity.sweep();
    }
}
