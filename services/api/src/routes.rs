use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;

use credverify::workflows::verification::{
    verification_router, AssignmentRepository, BatchRepository, ResponseRepository,
    VerificationRequestRepository, VerificationState, VerificationTransport,
};

pub(crate) fn with_verification_routes<A, R, V, T, B>(
    state: VerificationState<A, R, V, T, B>,
) -> axum::Router
where
    A: AssignmentRepository + 'static,
    R: ResponseRepository + 'static,
    V: VerificationRequestRepository + 'static,
    T: VerificationTransport + 'static,
    B: BatchRepository + 'static,
{
    verification_router(state)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
