//! Error taxonomy for the analysis pipeline
//!
//! Each pipeline stage owns a failure enum. `PipelineError` is what the
//! orchestrator hands back to the web and CLI surfaces; it is mapped onto
//! HTTP responses in `api_errors`.

use thiserror::Error;

/// Failure to obtain usable document text from any acquisition stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("No source text or URL was supplied")]
    NoSource,

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No usable content: {static_stage}; {rendered_stage}")]
    Exhausted {
        static_stage: String,
        rendered_stage: String,
    },

    #[error("Acquisition timed out after {secs}s")]
    TimedOut { secs: u64 },
}

/// Outcome of a single stage attempt that did not succeed.
///
/// `Insufficient` and `Failed` both cause escalation from the static stage;
/// they are kept apart so the diagnostic says which one happened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("{stage} failed: {message}")]
    Failed { stage: &'static str, message: String },

    #[error("{stage} yielded insufficient content ({chars} chars, need {min})")]
    Insufficient {
        stage: &'static str,
        chars: usize,
        min: usize,
    },

    #[error("{stage} timed out after {secs}s")]
    TimedOut { stage: &'static str, secs: u64 },
}

/// Failure of the outbound language-model call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("Model service unreachable: {message}")]
    Transport { message: String, timed_out: bool },

    #[error("Model service rejected the request ({status}): {message}")]
    ServiceRejected { status: u16, message: String },
}

/// Top-level error returned by the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Client input error: {message}")]
    ClientInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl StageError {
    pub fn failed(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            StageError::Failed { stage, .. }
            | StageError::Insufficient { stage, .. }
            | StageError::TimedOut { stage, .. } => stage,
        }
    }
}

impl EvaluationError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>, timed_out: bool) -> Self {
        Self::Transport {
            message: message.into(),
            timed_out,
        }
    }

    /// Create a service rejection error
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::ServiceRejected {
            status,
            message: message.into(),
        }
    }
}

impl PipelineError {
    /// Create a client input error
    pub fn client_input(message: impl Into<String>) -> Self {
        Self::ClientInput {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Convert from reqwest errors raised while talking to the model service
impl From<reqwest::Error> for EvaluationError {
    fn from(err: reqwest::Error) -> Self {
        EvaluationError::transport(err.to_string(), err.is_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PipelineError::client_input("No text or url provided.");
        assert!(err.to_string().contains("Client input error"));

        let err = EvaluationError::rejected(429, "rate limited");
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_stage_error_reports_stage() {
        let err = StageError::Insufficient {
            stage: "static_fetch",
            chars: 12,
            min: 100,
        };
        assert_eq!(err.stage(), "static_fetch");
        assert!(err.to_string().contains("12 chars"));
    }

    #[test]
    fn test_pipeline_error_wraps_stage_errors() {
        let err: PipelineError = AcquisitionError::TimedOut { secs: 45 }.into();
        assert!(matches!(err, PipelineError::Acquisition(_)));
        assert_eq!(err.to_string(), "Acquisition timed out after 45s");
    }
}
