//! API key authentication.
//!
//! `X-API-Key` is hashed and resolved against stored credentials. Handlers
//! downstream see only the merchant attribution. The last-used timestamp is
//! bumped off the request path.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::error::ApiError;
use super::state::AppState;
use crate::crypto;
use crate::storage;

/// Header carrying the credential.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Merchant attribution injected into authenticated requests.
#[derive(Debug, Clone)]
pub struct MerchantContext {
    pub merchant_id: String,
}

/// Resolve `X-API-Key` to a merchant or reject the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized {
            reason: "missing API key".to_string(),
        })?;

    let key_hash = crypto::hash_api_key(key);
    let api_key = storage::api_keys::find_by_hash(state.db.pool(), &key_hash)
        .await
        .map_err(|e| ApiError::Internal {
            message: e.to_string(),
        })?
        .ok_or_else(|| ApiError::Unauthorized {
            reason: "unknown API key".to_string(),
        })?;

    if !api_key.active {
        return Err(ApiError::Forbidden {
            reason: "API key inactive".to_string(),
        });
    }

    if !api_key.has_permission("payments") {
        return Err(ApiError::Forbidden {
            reason: "API key lacks the payments permission".to_string(),
        });
    }

    // Best-effort: losing a timestamp update never fails a request.
    {
        let db = state.db.clone();
        let key_id = api_key.id;
        tokio::spawn(async move {
            if let Err(e) = storage::api_keys::touch_last_used(db.pool(), key_id).await {
                warn!(error = %e, "Failed to bump API key last-used");
            }
        });
    }

    request.extensions_mut().insert(MerchantContext {
        merchant_id: api_key.merchant_id,
    });

    Ok(next.run(request).await)
}
