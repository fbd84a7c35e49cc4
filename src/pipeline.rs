//! End-to-end analysis: acquire → evaluate → interpret → compose.
//!
//! Stages run strictly in sequence and nothing is shared between requests
//! apart from the immutable clients held by `Analyzer`.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::acquisition::{AcquisitionStrategist, AnalysisRequest, PageFetcher, PageRenderer};
use crate::browser::{BrowserRenderer, RenderSettings};
use crate::composer::{self, AnalysisResponse, MISSING_KEY_MESSAGE, NO_SOURCE_MESSAGE};
use crate::config_loader::{AnalyzerConfig, InstructionVariant};
use crate::errors::{PipelineError, PipelineResult};
use crate::evaluation::{ChatCompletionClient, CompletionClient, EvaluationRequester};
use crate::interpreter::ScoreInterpreter;
use crate::normalizer::Normalizer;
use crate::static_fetch::HttpPageFetcher;

pub struct Analyzer {
    strategist: AcquisitionStrategist,
    requester: EvaluationRequester,
    interpreter: ScoreInterpreter,
    variant: InstructionVariant,
    acquisition_budget: Duration,
}

impl Analyzer {
    /// Assemble an analyzer from explicit stage implementations.
    pub fn new(
        config: &AnalyzerConfig,
        fetcher: Arc<dyn PageFetcher>,
        renderer: Arc<dyn PageRenderer>,
        completions: Arc<dyn CompletionClient>,
    ) -> Self {
        let normalizer = Normalizer::new(config.max_chars, config.min_chars);
        Self {
            strategist: AcquisitionStrategist::new(fetcher, renderer, normalizer),
            requester: EvaluationRequester::new(completions),
            interpreter: ScoreInterpreter::new(config.rating_policy),
            variant: config.instruction_variant,
            acquisition_budget: config.acquisition_budget(),
        }
    }

    /// Production wiring: reqwest static fetch, Chromium rendering, and an
    /// OpenAI-compatible completion endpoint.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, reqwest::Error> {
        let fetcher = HttpPageFetcher::new(&config.user_agent, config.static_timeout())?
            .with_body_limit(config.max_body_bytes);
        let renderer = BrowserRenderer::new(RenderSettings::from_config(config));
        let completions = ChatCompletionClient::new(config)?;
        Ok(Self::new(
            config,
            Arc::new(fetcher),
            Arc::new(renderer),
            Arc::new(completions),
        ))
    }

    pub fn is_ready(&self) -> bool {
        self.requester.is_configured()
    }

    pub fn with_variant(mut self, variant: InstructionVariant) -> Self {
        self.variant = variant;
        self
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> PipelineResult<AnalysisResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!("analyze", %request_id);
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &AnalysisRequest) -> PipelineResult<AnalysisResponse> {
        request
            .source()
            .map_err(|_| PipelineError::client_input(NO_SOURCE_MESSAGE))?;
        if !self.requester.is_configured() {
            tracing::error!("model service API key is missing");
            return Err(PipelineError::config(MISSING_KEY_MESSAGE));
        }

        let document = self
            .strategist
            .acquire(request, self.acquisition_budget)
            .await?;
        info!(
            method = ?document.method,
            chars = document.length_chars,
            truncated = document.truncated,
            "document acquired"
        );

        let outcome = self.requester.evaluate(&document, self.variant).await?;
        let verdict = self.interpreter.interpret(&outcome);
        info!(score = ?verdict.score, source = ?verdict.source, "analysis complete");

        Ok(composer::compose_success(verdict, document.method))
    }
}
