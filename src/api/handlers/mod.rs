//! HTTP request handlers.

pub mod health;
pub mod payments;
pub mod refunds;
pub mod webhooks;

use std::future::Future;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use tracing::warn;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::idempotency::{fingerprint, CheckOutcome, StartOutcome};

/// Header activating the idempotency engine.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Maximum accepted key length in bytes.
const MAX_IDEMPOTENCY_KEY_LEN: usize = 256;

/// Extract and bound the idempotency key.
pub fn idempotency_key(headers: &HeaderMap) -> ApiResult<Option<String>> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };

    let key = value.to_str().map_err(|_| ApiError::Validation {
        message: "Idempotency-Key must be visible ASCII".to_string(),
    })?;

    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ApiError::Validation {
            message: format!("Idempotency-Key must be 1..={MAX_IDEMPOTENCY_KEY_LEN} bytes"),
        });
    }

    Ok(Some(key.to_string()))
}

/// Emit a stored response byte-for-byte with its original status code.
fn replay_response(status_code: i32, body: String) -> Response {
    let status =
        StatusCode::from_u16(status_code as u16).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

fn in_flight_conflict() -> ApiError {
    ApiError::IdempotencyConflict {
        message: "a request with this idempotency key is in progress".to_string(),
    }
}

/// Run a side-effecting operation behind the idempotency gate.
///
/// Without a key the operation runs directly. With one, completed records
/// replay verbatim, in-flight records conflict, and this caller only
/// executes after winning the `start_processing` race. The record is
/// removed when the operation fails so the client can retry cleanly.
pub async fn with_idempotency<F, Fut>(
    state: &AppState,
    merchant_id: &str,
    key: Option<String>,
    path: &str,
    method: &str,
    body: &Value,
    run: F,
) -> ApiResult<Response>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<(StatusCode, Value)>>,
{
    let Some(key) = key else {
        let (status, value) = run().await?;
        return Ok((status, Json(value)).into_response());
    };

    let request_fingerprint = fingerprint(body, path, method);

    match state
        .idempotency
        .check(&key, merchant_id, &request_fingerprint)
        .await?
    {
        CheckOutcome::Replay { body, status_code } => {
            return Ok(replay_response(status_code, body));
        }
        CheckOutcome::InFlight => return Err(in_flight_conflict()),
        CheckOutcome::Miss => {}
    }

    match state
        .idempotency
        .start_processing(&key, merchant_id, &request_fingerprint, path, method)
        .await?
    {
        StartOutcome::AlreadyExists(CheckOutcome::Replay { body, status_code }) => {
            Ok(replay_response(status_code, body))
        }
        StartOutcome::AlreadyExists(_) => Err(in_flight_conflict()),
        StartOutcome::Started => match run().await {
            Ok((status, value)) => {
                let body = value.to_string();
                if let Err(e) = state
                    .idempotency
                    .complete(&key, merchant_id, &body, status.as_u16() as i32)
                    .await
                {
                    warn!(error = %e, "Idempotency completion failed");
                }
                Ok(replay_response(status.as_u16() as i32, body))
            }
            Err(e) => {
                // Release the key so the client may retry the aborted request.
                if let Err(remove_err) = state.idempotency.remove(&key, merchant_id).await {
                    warn!(error = %remove_err, "Idempotency removal failed");
                }
                Err(e)
            }
        },
    }
}
