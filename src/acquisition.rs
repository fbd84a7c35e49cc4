//! Obtains document text for an analysis request.
//!
//! Acquisition is a one-way state machine: supplied text is used directly;
//! otherwise a cheap static fetch is tried first and the headless browser is
//! only launched when that attempt fails or yields too little text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::{AcquisitionError, StageError};
use crate::normalizer::{NormalizedText, Normalizer};

pub const STATIC_STAGE: &str = "static_fetch";
pub const RENDERED_STAGE: &str = "rendered_fetch";

/// Inbound analysis request. `text` wins over `url` when both are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default, rename = "text")]
    pub source_text: Option<String>,
    #[serde(default, rename = "url")]
    pub source_url: Option<String>,
}

/// The source an analysis request effectively resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    Text(&'a str),
    Url(&'a str),
}

impl AnalysisRequest {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            source_text: Some(text.into()),
            source_url: None,
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            source_text: None,
            source_url: Some(url.into()),
        }
    }

    /// Blank strings count as absent.
    pub fn source(&self) -> Result<Source<'_>, AcquisitionError> {
        if let Some(text) = non_blank(&self.source_text) {
            return Ok(Source::Text(text));
        }
        non_blank(&self.source_url)
            .map(|url| Source::Url(url.trim()))
            .ok_or(AcquisitionError::NoSource)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMethod {
    Provided,
    StaticFetch,
    RenderedFetch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredDocument {
    pub text: String,
    pub length_chars: usize,
    pub method: AcquisitionMethod,
    pub truncated: bool,
}

/// Plain HTTP retrieval of a page's HTML.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_html(&self, url: &Url) -> Result<String, StageError>;
}

/// Full browser rendering of a page, returning its visible text.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_text(&self, url: &Url) -> Result<String, StageError>;
}

/// Signal returned by each stage attempt.
#[derive(Debug)]
enum StageOutcome {
    Accepted(AcquiredDocument),
    Escalate(StageError),
}

pub struct AcquisitionStrategist {
    fetcher: Arc<dyn PageFetcher>,
    renderer: Arc<dyn PageRenderer>,
    normalizer: Normalizer,
}

impl AcquisitionStrategist {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        renderer: Arc<dyn PageRenderer>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            normalizer,
        }
    }

    /// Acquire document text within `budget`; the whole acquisition fails
    /// if the budget runs out, whichever stage is in flight.
    pub async fn acquire(
        &self,
        request: &AnalysisRequest,
        budget: Duration,
    ) -> Result<AcquiredDocument, AcquisitionError> {
        match timeout(budget, self.run(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(budget_secs = budget.as_secs(), "acquisition budget exhausted");
                Err(AcquisitionError::TimedOut {
                    secs: budget.as_secs(),
                })
            }
        }
    }

    async fn run(&self, request: &AnalysisRequest) -> Result<AcquiredDocument, AcquisitionError> {
        let raw_url = match request.source()? {
            Source::Text(text) => return Ok(self.provided(text)),
            Source::Url(raw_url) => raw_url,
        };
        let url = parse_source_url(raw_url)?;

        let static_err = match self.attempt_static(&url).await {
            StageOutcome::Accepted(doc) => return Ok(doc),
            StageOutcome::Escalate(err) => err,
        };
        warn!(%url, reason = %static_err, "static fetch unusable, escalating to rendered fetch");

        match self.attempt_rendered(&url).await {
            StageOutcome::Accepted(doc) => Ok(doc),
            StageOutcome::Escalate(rendered_err) => {
                warn!(%url, reason = %rendered_err, "rendered fetch unusable");
                Err(AcquisitionError::Exhausted {
                    static_stage: static_err.to_string(),
                    rendered_stage: rendered_err.to_string(),
                })
            }
        }
    }

    fn provided(&self, text: &str) -> AcquiredDocument {
        let normalized = self.normalizer.normalize_text(text);
        debug!(chars = normalized.chars(), "using provided text");
        document(normalized, AcquisitionMethod::Provided)
    }

    async fn attempt_static(&self, url: &Url) -> StageOutcome {
        let html = match self.fetcher.fetch_html(url).await {
            Ok(html) => html,
            Err(err) => return StageOutcome::Escalate(err),
        };
        let normalized = self.normalizer.normalize_html(&html);
        match self.normalizer.require_sufficient(normalized, STATIC_STAGE) {
            Ok(normalized) => {
                info!(%url, chars = normalized.chars(), "static fetch accepted");
                StageOutcome::Accepted(document(normalized, AcquisitionMethod::StaticFetch))
            }
            Err(err) => StageOutcome::Escalate(err),
        }
    }

    async fn attempt_rendered(&self, url: &Url) -> StageOutcome {
        let text = match self.renderer.render_text(url).await {
            Ok(text) => text,
            Err(err) => return StageOutcome::Escalate(err),
        };
        let normalized = self.normalizer.normalize_text(&text);
        match self.normalizer.require_sufficient(normalized, RENDERED_STAGE) {
            Ok(normalized) => {
                info!(%url, chars = normalized.chars(), "rendered fetch accepted");
                StageOutcome::Accepted(document(normalized, AcquisitionMethod::RenderedFetch))
            }
            Err(err) => StageOutcome::Escalate(err),
        }
    }
}

fn document(normalized: NormalizedText, method: AcquisitionMethod) -> AcquiredDocument {
    AcquiredDocument {
        length_chars: normalized.chars(),
        truncated: normalized.truncated,
        text: normalized.text,
        method,
    }
}

/// Only absolute http(s) URLs are fetchable.
pub fn parse_source_url(raw: &str) -> Result<Url, AcquisitionError> {
    let invalid = |reason: String| AcquisitionError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}
