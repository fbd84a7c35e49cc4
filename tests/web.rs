// tests/web.rs
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tos_trust::acquisition::{PageFetcher, PageRenderer};
use tos_trust::config_loader::AnalyzerConfig;
use tos_trust::errors::{EvaluationError, StageError};
use tos_trust::evaluation::CompletionClient;
use tos_trust::web::build_router;
use tos_trust::Analyzer;
use tower::ServiceExt; // for .oneshot()
use url::Url;

struct PageStub(String);

#[async_trait]
impl PageFetcher for PageStub {
    async fn fetch_html(&self, _url: &Url) -> Result<String, StageError> {
        Ok(self.0.clone())
    }
}

struct NoRender;

#[async_trait]
impl PageRenderer for NoRender {
    async fn render_text(&self, _url: &Url) -> Result<String, StageError> {
        Err(StageError::failed("rendered_fetch", "browser unavailable"))
    }
}

struct ModelStub {
    reply: Result<String, EvaluationError>,
    configured: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionClient for ModelStub {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String, EvaluationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

fn app_with(page: &str, reply: Result<String, EvaluationError>, configured: bool) -> Router {
    let model = Arc::new(ModelStub {
        reply,
        configured,
        calls: AtomicUsize::new(0),
    });
    let analyzer = Analyzer::new(
        &AnalyzerConfig::default(),
        Arc::new(PageStub(page.to_string())),
        Arc::new(NoRender),
        model,
    );
    build_router(Arc::new(analyzer))
}

fn analyze_request(body: Value) -> Request<Body> {
    Request::builder()
        .uri("/api/analyze")
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn analyze_text_returns_structured_score() {
    let app = app_with(
        "",
        Ok(r#"{"trustScore": 72, "summary": "Standard terms."}"#.into()),
        true,
    );

    let response = app
        .oneshot(analyze_request(json!({ "text": "You agree to arbitration." })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json_val = json_body(response).await;
    assert_eq!(json_val["score"], 72);
    assert_eq!(json_val["summary"], "Standard terms.");
    assert_eq!(json_val["acquisition"], "provided");
}

#[tokio::test]
async fn analyze_rejects_missing_text_and_url() {
    let app = app_with("", Ok(String::new()), true);

    let response = app.oneshot(analyze_request(json!({}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json_val = json_body(response).await;
    assert_eq!(json_val["error"], "No text or url provided.");
}

#[tokio::test]
async fn analyze_rejects_malformed_json() {
    let app = app_with("", Ok(String::new()), true);

    let req = Request::builder()
        .uri("/api/analyze")
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await.get("error").is_some());
}

#[tokio::test]
async fn missing_api_key_is_server_error() {
    let app = app_with("", Ok(String::new()), false);

    let response = app
        .oneshot(analyze_request(json!({ "text": "Terms." })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json_val = json_body(response).await;
    assert_eq!(
        json_val["error"],
        "Model service API key is not defined on the server."
    );
}

#[tokio::test]
async fn upstream_rejection_passes_status_and_detail() {
    let app = app_with(
        "",
        Err(EvaluationError::rejected(429, "Rate limit reached for requests")),
        true,
    );

    let response = app
        .oneshot(analyze_request(json!({ "text": "Terms." })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json_val = json_body(response).await;
    assert_eq!(json_val["error"], "Model service call failed.");
    assert_eq!(json_val["detail"], "Rate limit reached for requests");
    assert!(json_val["score"].is_null());
}

#[tokio::test]
async fn unreachable_page_is_content_unavailable() {
    let app = app_with("<body>Loading...</body>", Ok("Trust Score: 50%".into()), true);

    let response = app
        .oneshot(analyze_request(json!({ "url": "https://spa-example.com/tos" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json_val = json_body(response).await;
    assert_eq!(json_val["error"], "content unavailable");
    assert!(json_val["detail"]
        .as_str()
        .unwrap()
        .contains("browser unavailable"));
}

#[tokio::test]
async fn indeterminate_reply_is_ok_with_null_score() {
    let app = app_with("", Ok("This document seems reasonable.".into()), true);

    let response = app
        .oneshot(analyze_request(json!({ "text": "Terms." })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json_val = json_body(response).await;
    assert!(json_val["score"].is_null());
    assert_eq!(json_val["summary"], "This document seems reasonable.");
    assert_eq!(
        json_val["indeterminateReason"],
        "no numeric score recognizable in model output"
    );
}

#[tokio::test]
async fn get_on_analyze_is_method_not_allowed() {
    let app = app_with("", Ok(String::new()), true);

    let req = Request::builder()
        .uri("/api/analyze")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let app = app_with("", Ok(String::new()), true);

    let req = Request::builder()
        .uri("/api/analyze")
        .method("OPTIONS")
        .header("Origin", "https://client.example")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn health_and_readiness() {
    let app = app_with("", Ok(String::new()), false);

    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");

    let req = Request::builder().uri("/readyz").body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(json_body(response).await["ready"], false);
}
