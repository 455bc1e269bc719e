//! Consistent JSON error responses and outcome-to-status mapping.

use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde_json::json;

use orderflow_infra::{IngestOutcome, PipelineError};

/// Map a pipeline disposition onto the response the sending platform sees.
///
/// Success statuses suppress redelivery; that covers acceptance but also
/// duplicates and unsupported topics, where a retry would be pointless.
/// Client errors (bad signature, missing fields) are terminal for the same
/// reason. Only transient storage failures return a retryable 500, via
/// [`pipeline_error_to_response`].
pub fn outcome_to_response(outcome: IngestOutcome) -> axum::response::Response {
    match outcome {
        IngestOutcome::Accepted {
            delivery_id,
            order_id,
        } => (
            StatusCode::OK,
            axum::Json(json!({
                "status": "accepted",
                "delivery_id": delivery_id.as_str(),
                "order_id": order_id.map(|o| o.as_i64()),
            })),
        )
            .into_response(),
        IngestOutcome::SkippedDuplicate => {
            (StatusCode::OK, axum::Json(json!({ "status": "duplicate" }))).into_response()
        }
        IngestOutcome::SkippedUnsupportedTopic => {
            (StatusCode::OK, axum::Json(json!({ "status": "ignored" }))).into_response()
        }
        IngestOutcome::Unauthorized => json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_signature",
            "signature verification failed",
        ),
        IngestOutcome::BadRequest(detail) => {
            json_error(StatusCode::BAD_REQUEST, "bad_request", detail)
        }
        IngestOutcome::RateLimited { retry_after } => {
            let mut response = json_error(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "too many requests",
            );
            if let Ok(value) = retry_after_secs(retry_after).to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
        IngestOutcome::Misconfigured => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "misconfigured",
            "webhook secret not configured",
        ),
    }
}

pub fn pipeline_error_to_response(err: PipelineError) -> axum::response::Response {
    tracing::error!(error = %err, "pipeline storage failure");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "storage_error",
        "temporary failure, retry the delivery",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Retry-After is whole seconds; round up so the client never retries early.
fn retry_after_secs(retry_after: std::time::Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retry_after_rounds_up_and_never_hits_zero() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }
}
