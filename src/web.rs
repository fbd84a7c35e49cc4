use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::acquisition::AnalysisRequest;
use crate::api_errors::AppError;
use crate::composer::AnalysisResponse;
use crate::pipeline::Analyzer;

/// Build the router exposing the analysis endpoint and health checks.
pub fn build_router(analyzer: Arc<Analyzer>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/analyze", post(analyze).options(preflight))
        // health endpoints
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(cors)
        .with_state(analyzer)
}

async fn analyze(
    State(analyzer): State<Arc<Analyzer>>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let Json(req) =
        payload.map_err(|e| AppError::bad_request("Invalid request body.").with_detail(e.body_text()))?;
    let response = analyzer.analyze(&req).await?;
    Ok(Json(response))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readyz(State(analyzer): State<Arc<Analyzer>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ready": analyzer.is_ready() }))
}
