//! Provider webhook intake.
//!
//! Authenticated by provider signature, not by API key. An invalid or
//! missing signature is 401; a payload that fails processing after
//! authentication is acknowledged with `processed: false` so the provider
//! stops redelivering it.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::interfaces::provider::ProviderError;
use crate::services::payments::ReconcileOutcome;

/// Acknowledgement body returned to providers.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<bool>,
}

impl WebhookAck {
    fn processed() -> Self {
        Self {
            received: true,
            processed: None,
        }
    }

    fn unprocessed() -> Self {
        Self {
            received: true,
            processed: Some(false),
        }
    }
}

/// POST /api/v1/webhooks/:provider
pub async fn provider_webhook(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let provider = state
        .payments
        .provider(&provider_name)
        .map_err(ApiError::from)?;

    let signature = headers
        .get(provider.signature_header())
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized {
            reason: "missing webhook signature".to_string(),
        })?;

    let event = match provider.parse_webhook(&body, Some(signature)) {
        Ok(event) => event,
        Err(ProviderError::InvalidSignature) => {
            return Err(ApiError::Unauthorized {
                reason: "invalid webhook signature".to_string(),
            });
        }
        Err(e) => {
            warn!(provider = %provider_name, error = %e, "Unparseable provider webhook");
            return Ok(Json(WebhookAck::unprocessed()));
        }
    };

    match state
        .payments
        .reconcile_provider_event(&provider_name, &event)
        .await
    {
        Ok(ReconcileOutcome::Updated(_)) | Ok(ReconcileOutcome::NoChange) => {
            Ok(Json(WebhookAck::processed()))
        }
        Ok(ReconcileOutcome::UnknownTransaction)
        | Ok(ReconcileOutcome::InvalidTransition { .. }) => Ok(Json(WebhookAck::unprocessed())),
        Err(e) => {
            warn!(provider = %provider_name, error = %e, "Provider webhook processing failed");
            Ok(Json(WebhookAck::unprocessed()))
        }
    }
}
