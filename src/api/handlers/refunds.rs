//! Refund endpoints.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::{Extension, Json};
use serde_json::Value;
use uuid::Uuid;

use super::{idempotency_key, with_idempotency};
use crate::api::auth::MerchantContext;
use crate::api::dto::{CreateRefundRequest, RefundBody, RefundResponseBody, RefundableBody};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// POST /api/v1/payments/:id/refunds
pub async fn create_refund(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    Path(payment_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    let key = idempotency_key(&headers)?;
    let path = format!("/api/v1/payments/{payment_id}/refunds");

    with_idempotency(
        &state,
        &merchant.merchant_id,
        key,
        &path,
        "POST",
        &body,
        || async {
            let request: CreateRefundRequest =
                serde_json::from_value(body.clone()).map_err(|e| ApiError::Validation {
                    message: format!("invalid request body: {e}"),
                })?;

            let result = state
                .refunds
                .create_refund(
                    &merchant.merchant_id,
                    payment_id,
                    request.amount,
                    request.reason,
                )
                .await?;

            // A provider refusal is a handled outcome on an existing refund
            // row; report it with 200 rather than 201.
            let status = if result.success {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };

            let body = serde_json::to_value(RefundResponseBody {
                refund: RefundBody::from_refund(&result.refund),
                payment_status: result.payment.status.as_str().to_string(),
                success: result.success,
                error: result.error,
            })
            .map_err(|e| ApiError::Internal {
                message: e.to_string(),
            })?;
            Ok((status, body))
        },
    )
    .await
}

/// GET /api/v1/payments/:id/refundable
pub async fn get_refundable(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    Path(payment_id): Path<Uuid>,
) -> ApiResult<Json<RefundableBody>> {
    let summary = state
        .refunds
        .refundable(&merchant.merchant_id, payment_id)
        .await?;

    Ok(Json(RefundableBody::from_summary(&summary)))
}

/// GET /api/v1/refunds/:id
pub async fn get_refund(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RefundBody>> {
    let refund = state.refunds.get_refund(&merchant.merchant_id, id).await?;
    Ok(Json(RefundBody::from_refund(&refund)))
}
