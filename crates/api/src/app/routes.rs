//! HTTP handlers: webhook intake, drain trigger, queue stats.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Extension, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;

use orderflow_core::WorkerId;
use orderflow_infra::IngestRequest;
use orderflow_webhooks::{UNKNOWN_ADDR_KEY, verify_shared_token};

use super::AppState;
use super::errors::{json_error, outcome_to_response, pipeline_error_to_response};

const DELIVERY_ID_HEADER: &str = "x-webhook-id";
const TOPIC_HEADER: &str = "x-webhook-topic";
const SHOP_DOMAIN_HEADER: &str = "x-shop-domain";
const SIGNATURE_HEADER: &str = "x-webhook-hmac";
const DRAIN_SECRET_HEADER: &str = "x-drain-secret";
const WORKER_ID_HEADER: &str = "x-worker-id";

/// Batch size when the drain caller does not ask for one.
const DEFAULT_DRAIN_BATCH: usize = 10;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Webhook intake. The body must stay raw bytes end to end; any framework
/// JSON extractor here would break signature verification.
pub async fn receive_webhook(
    Extension(state): Extension<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let addr_key = client_key(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    let request = IngestRequest {
        addr_key: &addr_key,
        delivery_id: header_str(&headers, DELIVERY_ID_HEADER),
        topic: header_str(&headers, TOPIC_HEADER),
        shop_domain: header_str(&headers, SHOP_DOMAIN_HEADER),
        signature: header_str(&headers, SIGNATURE_HEADER),
        body: &body,
    };

    match state.pipeline.handle(request).await {
        Ok(outcome) => outcome_to_response(outcome),
        Err(err) => pipeline_error_to_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct DrainParams {
    max: Option<usize>,
}

/// Drain trigger: claim and execute up to `max` jobs now.
pub async fn drain_jobs(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<DrainParams>,
    headers: HeaderMap,
) -> axum::response::Response {
    if let Err(response) = authorize_operator(&state, &headers) {
        return response;
    }

    let worker = WorkerId::from(header_str(&headers, WORKER_ID_HEADER).unwrap_or("drain-1"));
    let max = params.max.unwrap_or(DEFAULT_DRAIN_BATCH);

    match state.drain.drain(&worker, max).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "drain failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "drain failed, retry",
            )
        }
    }
}

/// Queue counts by status, for operators.
pub async fn job_stats(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> axum::response::Response {
    if let Err(response) = authorize_operator(&state, &headers) {
        return response;
    }

    match state.queue.counts().await {
        Ok(counts) => (StatusCode::OK, axum::Json(counts)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "stats query failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "stats unavailable",
            )
        }
    }
}

/// The operator surfaces share one access token. The token is optional:
/// with none configured the surfaces are open, and deployments that want
/// them gated set `DRAIN_SECRET`.
fn authorize_operator(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(), axum::response::Response> {
    let Some(expected) = state.drain_secret.as_deref() else {
        return Ok(());
    };
    if !verify_shared_token(header_str(headers, DRAIN_SECRET_HEADER), expected) {
        return Err(json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            "invalid or missing drain token",
        ));
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Rate-limit key for the caller: the first forwarded address when behind a
/// proxy, else the socket peer, else the shared unknown bucket.
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = header_str(headers, "x-real-ip") {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_ADDR_KEY.to_string(),
    }
}
