use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use orderflow_api::app::{self, AppState};
use orderflow_api::config::AppConfig;
use orderflow_api::handler::OrderSyncHandler;

#[tokio::main]
async fn main() {
    orderflow_observability::init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };
    if config.webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET not set; all deliveries will be rejected");
    }
    if config.drain_secret.is_none() {
        tracing::warn!("DRAIN_SECRET not set; drain and stats endpoints are open");
    }

    let handler = Arc::new(OrderSyncHandler::new());
    let state = match build_state(&config, handler).await {
        Ok(state) => Arc::new(state),
        Err(err) => {
            tracing::error!(error = %err, "failed to wire services");
            std::process::exit(1);
        }
    };

    // Keep the rate limiter's key map from accumulating idle senders.
    let admission = state.admission.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            admission.sweep();
        }
    });

    let router = app::build_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.bind_addr));
    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

#[cfg(feature = "postgres")]
async fn build_state(
    config: &AppConfig,
    handler: Arc<OrderSyncHandler>,
) -> anyhow::Result<AppState> {
    match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await?;
            Ok(AppState::postgres(config, handler, pool)?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores");
            Ok(AppState::in_memory(config, handler)?)
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_state(
    config: &AppConfig,
    handler: Arc<OrderSyncHandler>,
) -> anyhow::Result<AppState> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL set but the postgres feature is disabled; using in-memory stores");
    }
    Ok(AppState::in_memory(config, handler)?)
}
