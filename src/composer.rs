//! Maps pipeline outcomes onto the caller-visible result.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionMethod;
use crate::api_errors::AppError;
use crate::errors::{AcquisitionError, EvaluationError, PipelineError};
use crate::interpreter::TrustVerdict;

pub const NO_SOURCE_MESSAGE: &str = "No text or url provided.";
pub const MISSING_KEY_MESSAGE: &str = "Model service API key is not defined on the server.";
pub const CONTENT_UNAVAILABLE: &str = "content unavailable";
pub const UPSTREAM_UNAVAILABLE: &str = "upstream unavailable";
pub const UPSTREAM_REJECTED: &str = "Model service call failed.";

/// Successful analysis payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub verdict: TrustVerdict,
    pub acquisition: AcquisitionMethod,
}

pub fn compose_success(verdict: TrustVerdict, acquisition: AcquisitionMethod) -> AnalysisResponse {
    AnalysisResponse {
        verdict,
        acquisition,
    }
}

pub fn compose_failure(err: &PipelineError) -> AppError {
    match err {
        PipelineError::ClientInput { message } => AppError::bad_request(message.clone()),
        PipelineError::Config { message } => AppError::internal(message.clone()),
        PipelineError::Acquisition(AcquisitionError::NoSource) => {
            AppError::bad_request(NO_SOURCE_MESSAGE)
        }
        PipelineError::Acquisition(AcquisitionError::InvalidUrl { reason, .. }) => {
            AppError::bad_request("Invalid url.").with_detail(reason.clone())
        }
        PipelineError::Acquisition(acq) => {
            AppError::upstream(StatusCode::BAD_GATEWAY, CONTENT_UNAVAILABLE).with_detail(acq.to_string())
        }
        PipelineError::Evaluation(EvaluationError::Transport { message, timed_out }) => {
            let status = if *timed_out {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            AppError::upstream(status, UPSTREAM_UNAVAILABLE).with_detail(message.clone())
        }
        PipelineError::Evaluation(EvaluationError::ServiceRejected { status, message }) => {
            AppError::upstream(passthrough_status(*status), UPSTREAM_REJECTED)
                .with_detail(message.clone())
        }
    }
}

/// Upstream error statuses are passed through; anything else becomes 502.
fn passthrough_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status)
        .ok()
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::BAD_GATEWAY)
}

/// Process exit code for the command-line surface.
pub fn exit_code(err: &PipelineError) -> i32 {
    match compose_failure(err).status() {
        StatusCode::BAD_REQUEST => 2,
        _ => 1,
    }
}
