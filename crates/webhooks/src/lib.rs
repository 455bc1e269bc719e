//! `orderflow-webhooks` — request-admission primitives for the inbound
//! webhook channel.
//!
//! Two concerns live here, both free of storage and HTTP framework
//! dependencies: HMAC signature verification over raw body bytes, and
//! per-key sliding-window rate limiting.

pub mod rate_limit;
pub mod signature;

pub use rate_limit::{
    AdmissionControl, RateLimitConfig, RateLimitConfigError, RateLimitDecision, RateLimiter,
    UNKNOWN_ADDR_KEY,
};
pub use signature::{sign, verify, verify_shared_token};
