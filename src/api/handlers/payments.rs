//! Payment endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::{Extension, Json};
use serde_json::Value;
use uuid::Uuid;

use super::{idempotency_key, with_idempotency};
use crate::api::auth::MerchantContext;
use crate::api::dto::{
    CreatePaymentRequest, ListQuery, Pagination, PaymentBody, PaymentDetailBody,
    PaymentListResponse, RefundBody, TransactionBody,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::model::PaymentStatus;
use crate::services::payments::CreatePayment;

const PAYMENTS_PATH: &str = "/api/v1/payments";

const MAX_PAGE_SIZE: u64 = 100;

/// POST /api/v1/payments
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    let key = idempotency_key(&headers)?;

    with_idempotency(
        &state,
        &merchant.merchant_id,
        key,
        PAYMENTS_PATH,
        "POST",
        &body,
        || async {
            let request: CreatePaymentRequest =
                serde_json::from_value(body.clone()).map_err(|e| ApiError::Validation {
                    message: format!("invalid request body: {e}"),
                })?;

            let result = state
                .payments
                .create_payment(
                    &merchant.merchant_id,
                    CreatePayment {
                        amount: request.amount,
                        currency: request.currency,
                        provider: request.provider,
                        description: request.description,
                        external_id: request.external_id,
                        metadata: request.metadata,
                        webhook_url: request.webhook_url,
                    },
                )
                .await?;

            // A decline is a handled outcome: the payment exists in
            // `failed`, reported with 200 rather than 201.
            let status = if result.payment.status == PaymentStatus::Failed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };

            let body = serde_json::to_value(PaymentBody::from_charge(&result)).map_err(|e| {
                ApiError::Internal {
                    message: e.to_string(),
                }
            })?;
            Ok((status, body))
        },
    )
    .await
}

/// GET /api/v1/payments
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<PaymentListResponse>> {
    let limit = query.limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let (payments, total) = state
        .payments
        .list_payments(&merchant.merchant_id, limit, offset)
        .await?;

    let data: Vec<PaymentBody> = payments.iter().map(PaymentBody::from_payment).collect();

    Ok(Json(PaymentListResponse {
        pagination: Pagination {
            total,
            limit,
            offset,
            has_more: offset + (data.len() as u64) < total,
        },
        data,
    }))
}

/// GET /api/v1/payments/:id
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PaymentDetailBody>> {
    let (payment, transactions, refunds) =
        state.payments.get_payment(&merchant.merchant_id, id).await?;

    Ok(Json(PaymentDetailBody {
        payment: PaymentBody::from_payment(&payment),
        transactions: transactions
            .iter()
            .map(TransactionBody::from_transaction)
            .collect(),
        refunds: refunds.iter().map(RefundBody::from_refund).collect(),
    }))
}
