//! Evaluation requester: one non-streaming chat-completion call per document.
//!
//! No retries happen here. A failed call surfaces immediately as an
//! `EvaluationError` and the caller decides whether to try again.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::acquisition::AcquiredDocument;
use crate::config_loader::{AnalyzerConfig, InstructionVariant};
use crate::errors::EvaluationError;
use crate::interpreter;

pub const STRUCTURED_INSTRUCTION: &str = r#"
You are a legal trust evaluator AI.

Respond ONLY in the following JSON format:

{
  "trustScore": XX,
  "summary": "Short, plain-English summary of key risks or terms"
}

Your response must include both fields. If you cannot determine a trust score, return "trustScore": null.
"#;

pub const FREE_TEXT_INSTRUCTION: &str = r#"
You are a legal trust evaluator AI.

Read the Terms of Service and judge how trustworthy they are for an ordinary user.
Begin your answer with a line of the form "Trust Score: NN%" where NN is a whole number from 1 to 100,
then give a short, plain-English summary of the key risks or terms.
"#;

const USER_PREFIX: &str = "Analyze and score these Terms of Service:\n\n";

impl InstructionVariant {
    pub fn instruction(&self) -> &'static str {
        match self {
            InstructionVariant::Structured => STRUCTURED_INSTRUCTION,
            InstructionVariant::FreeText => FREE_TEXT_INSTRUCTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationOutcome {
    pub raw_model_text: String,
    /// The structured variant was requested and the reply is a JSON object.
    pub parsed_as_structured: bool,
}

/// A language-model completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Whether a credential is available to call the service at all.
    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, EvaluationError>;
}

pub struct EvaluationRequester {
    client: Arc<dyn CompletionClient>,
}

impl EvaluationRequester {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    pub async fn evaluate(
        &self,
        document: &AcquiredDocument,
        variant: InstructionVariant,
    ) -> Result<EvaluationOutcome, EvaluationError> {
        let user = format!("{USER_PREFIX}{}", document.text);
        let raw_model_text = self.client.complete(variant.instruction(), &user).await?;

        let parsed_as_structured = variant == InstructionVariant::Structured
            && interpreter::parse_json_object(&raw_model_text).is_some();
        info!(
            ?variant,
            chars = raw_model_text.chars().count(),
            parsed_as_structured,
            "model evaluation received"
        );

        Ok(EvaluationOutcome {
            raw_model_text,
            parsed_as_structured,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionPayload {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/v1/chat/completions` client.
pub struct ChatCompletionClient {
    http: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl ChatCompletionClient {
    pub fn new(config: &AnalyzerConfig) -> Result<Self, reqwest::Error> {
        Self::with_timeout(config, config.evaluation_timeout())
    }

    pub fn with_timeout(config: &AnalyzerConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            url: config.completions_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, EvaluationError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": self.temperature,
        });

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request.send().await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;

        if !status.is_success() {
            let message = rejection_message(&bytes);
            error!(status = status.as_u16(), %message, "model service rejected request");
            return Err(EvaluationError::rejected(status.as_u16(), message));
        }

        let payload: CompletionPayload = serde_json::from_slice(&bytes).map_err(|e| {
            EvaluationError::rejected(502, format!("unreadable model service response: {e}"))
        })?;

        Ok(payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default())
    }
}

fn rejection_message(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| "Unknown error from model service".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::AcquisitionMethod;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn config_for(url: String) -> AnalyzerConfig {
        AnalyzerConfig {
            api_key: Some("sk-test".into()),
            completions_url: url,
            ..AnalyzerConfig::default()
        }
    }

    fn document() -> AcquiredDocument {
        AcquiredDocument {
            text: "We may sell your data.".into(),
            length_chars: 22,
            method: AcquisitionMethod::Provided,
            truncated: false,
        }
    }

    #[tokio::test]
    async fn sends_instruction_and_document_and_returns_content() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer sk-test")
                );
                assert_eq!(body["model"], "gpt-4-turbo");
                assert!(body["messages"][0]["content"]
                    .as_str()
                    .unwrap()
                    .contains("legal trust evaluator"));
                assert_eq!(
                    body["messages"][1]["content"],
                    "Analyze and score these Terms of Service:\n\nWe may sell your data."
                );
                Json(json!({
                    "choices": [{"message": {"content": "  {\"trustScore\": 42, \"summary\": \"ok\"}  "}}]
                }))
            }),
        );
        let url = spawn(app).await;
        let client = ChatCompletionClient::new(&config_for(url)).unwrap();
        let requester = EvaluationRequester::new(Arc::new(client));

        let outcome = requester
            .evaluate(&document(), InstructionVariant::Structured)
            .await
            .unwrap();

        assert_eq!(outcome.raw_model_text, r#"{"trustScore": 42, "summary": "ok"}"#);
        assert!(outcome.parsed_as_structured);
    }

    #[tokio::test]
    async fn free_text_variant_is_not_marked_structured() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                Json(json!({"choices": [{"message": {"content": "Trust Score: 40%. Broad sharing."}}]}))
            }),
        );
        let url = spawn(app).await;
        let requester =
            EvaluationRequester::new(Arc::new(ChatCompletionClient::new(&config_for(url)).unwrap()));

        let outcome = requester
            .evaluate(&document(), InstructionVariant::FreeText)
            .await
            .unwrap();

        assert_eq!(outcome.raw_model_text, "Trust Score: 40%. Broad sharing.");
        assert!(!outcome.parsed_as_structured);
    }

    #[tokio::test]
    async fn non_success_status_is_service_rejected() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": {"message": "Incorrect API key provided"}})),
                )
            }),
        );
        let url = spawn(app).await;
        let client = ChatCompletionClient::new(&config_for(url)).unwrap();

        let err = client.complete("sys", "user").await.unwrap_err();
        assert_eq!(
            err,
            EvaluationError::rejected(401, "Incorrect API key provided")
        );
    }

    #[tokio::test]
    async fn rejection_without_error_payload_gets_default_message() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let url = spawn(app).await;
        let client = ChatCompletionClient::new(&config_for(url)).unwrap();

        let err = client.complete("sys", "user").await.unwrap_err();
        assert_eq!(
            err,
            EvaluationError::rejected(500, "Unknown error from model service")
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = config_for(format!("http://{addr}/v1/chat/completions"));
        let client = ChatCompletionClient::new(&config).unwrap();

        let err = client.complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, EvaluationError::Transport { .. }));
    }

    #[tokio::test]
    async fn slow_service_times_out_as_transport_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"choices": []}))
            }),
        );
        let url = spawn(app).await;
        let client =
            ChatCompletionClient::with_timeout(&config_for(url), Duration::from_millis(200)).unwrap();

        let err = client.complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, EvaluationError::Transport { timed_out: true, .. }));
    }

    #[tokio::test]
    async fn missing_content_yields_empty_text() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let url = spawn(app).await;
        let client = ChatCompletionClient::new(&config_for(url)).unwrap();

        assert_eq!(client.complete("sys", "user").await.unwrap(), "");
    }

    #[test]
    fn blank_key_is_not_configured() {
        let config = AnalyzerConfig {
            api_key: Some(" ".into()),
            ..AnalyzerConfig::default()
        };
        assert!(!ChatCompletionClient::new(&config).unwrap().is_configured());
    }
}
