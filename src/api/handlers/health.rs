//! Health and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: &'static str,
    pub redis: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub checks: HealthChecks,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    #[serde(flatten)]
    pub health: HealthResponse,
    pub open_breakers: Vec<String>,
}

async fn check_dependencies(state: &AppState) -> (bool, HealthChecks) {
    let database_ok = state.db.health_check().await.is_ok();
    // Any round trip exercises the cache connection.
    let redis_ok = state.cache.get("health:probe").await.is_ok();

    (
        database_ok && redis_ok,
        HealthChecks {
            database: if database_ok { "ok" } else { "unavailable" },
            redis: if redis_ok { "ok" } else { "unavailable" },
        },
    )
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (healthy, checks) = check_dependencies(&state).await;

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" },
            checks,
            timestamp: timestamp(),
        }),
    )
}

/// GET /ready
///
/// Open breakers are reported but do not fail readiness: the service can
/// still serve reads and absorb provider recovery.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let (healthy, checks) = check_dependencies(&state).await;
    let open_breakers = state.breakers.open_breakers();

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            health: HealthResponse {
                status: if healthy { "ready" } else { "unavailable" },
                checks,
                timestamp: timestamp(),
            },
            open_breakers,
        }),
    )
}
