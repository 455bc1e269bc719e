//! HTTP application wiring (Axum router + service wiring).
//!
//! Layout:
//! - `routes.rs`: HTTP handlers (webhook intake, drain trigger, stats)
//! - `errors.rs`: consistent JSON error responses and outcome mapping

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use orderflow_infra::{
    DrainWorker, InMemoryDedupLedger, InMemoryEventLog, InMemoryJobQueue, IngestPipeline, JobQueue,
};
use orderflow_webhooks::{AdmissionControl, RateLimitConfig, RateLimitConfigError};

use crate::config::AppConfig;

pub mod errors;
pub mod routes;

/// Shared service graph behind the HTTP handlers.
pub struct AppState {
    pub pipeline: IngestPipeline,
    pub drain: DrainWorker,
    pub queue: Arc<dyn JobQueue>,
    pub admission: Arc<AdmissionControl>,
    pub drain_secret: Option<String>,
}

impl AppState {
    /// Wire the pipeline against in-memory stores. Dev and test use; state
    /// does not survive a restart.
    pub fn in_memory(
        config: &AppConfig,
        handler: Arc<dyn orderflow_infra::JobHandler>,
    ) -> Result<Self, RateLimitConfigError> {
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        Self::wire(
            config,
            handler,
            Arc::new(InMemoryDedupLedger::new()),
            Arc::new(InMemoryEventLog::new()),
            queue,
        )
    }

    /// Wire the pipeline against Postgres-backed stores.
    #[cfg(feature = "postgres")]
    pub fn postgres(
        config: &AppConfig,
        handler: Arc<dyn orderflow_infra::JobHandler>,
        pool: sqlx::PgPool,
    ) -> Result<Self, RateLimitConfigError> {
        use orderflow_infra::{PostgresDedupLedger, PostgresEventLog, PostgresJobQueue};

        let queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(pool.clone()));
        Self::wire(
            config,
            handler,
            Arc::new(PostgresDedupLedger::new(pool.clone())),
            Arc::new(PostgresEventLog::new(pool)),
            queue,
        )
    }

    fn wire(
        config: &AppConfig,
        handler: Arc<dyn orderflow_infra::JobHandler>,
        ledger: Arc<dyn orderflow_infra::DedupLedger>,
        event_log: Arc<dyn orderflow_infra::EventLog>,
        queue: Arc<dyn JobQueue>,
    ) -> Result<Self, RateLimitConfigError> {
        let admission = Arc::new(AdmissionControl::new(
            RateLimitConfig::new(config.addr_limit, config.rate_window)?,
            RateLimitConfig::new(config.identity_limit, config.rate_window)?,
        ));

        let pipeline = IngestPipeline::new(
            config.webhook_secret.clone(),
            admission.clone(),
            ledger,
            event_log,
            queue.clone(),
        );
        let drain = DrainWorker::new(queue.clone(), handler, config.stale_after);

        Ok(Self {
            pipeline,
            drain,
            queue,
            admission,
            drain_secret: config.drain_secret.clone(),
        })
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/webhooks/commerce", post(routes::receive_webhook))
        .route("/jobs/drain", post(routes::drain_jobs))
        .route("/jobs/stats", get(routes::job_stats))
        .layer(ServiceBuilder::new().layer(Extension(state)))
}
