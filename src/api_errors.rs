use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::errors::PipelineError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    BadRequest {
        message: String,
        detail: Option<String>,
    },
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: String,
        detail: Option<String>,
    },
    #[error("{message}")]
    Internal {
        message: String,
        detail: Option<String>,
    },
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest {
            message: msg.into(),
            detail: None,
        }
    }

    pub fn upstream(status: StatusCode, msg: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: msg.into(),
            detail: None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            AppError::BadRequest { detail, .. }
            | AppError::Upstream { detail, .. }
            | AppError::Internal { detail, .. } => *detail = Some(value.into()),
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Upstream { status, .. } => *status,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            AppError::BadRequest { detail, .. }
            | AppError::Upstream { detail, .. }
            | AppError::Internal { detail, .. } => detail.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct ErrBody<'a> {
    score: Option<u8>,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrBody {
            score: None,
            error: self.to_string(),
            detail: self.detail(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        crate::composer::compose_failure(&err)
    }
}
