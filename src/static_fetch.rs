use async_trait::async_trait;
use reqwest::{header, redirect, Client};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::acquisition::{PageFetcher, STATIC_STAGE};
use crate::errors::StageError;

/// Pages larger than this are cut; only the first `max_chars` of text is used.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Single plain GET with a browser-like `User-Agent`.
pub struct HttpPageFetcher {
    http: Client,
    timeout: Duration,
    body_limit: usize,
}

impl HttpPageFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .redirect(redirect::Policy::limited(5))
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            http,
            timeout,
            body_limit: DEFAULT_BODY_LIMIT,
        })
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_html(&self, url: &Url) -> Result<String, StageError> {
        let mut response = self
            .http
            .get(url.clone())
            .header(header::ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StageError::failed(STATIC_STAGE, format!("HTTP {status}")));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            let room = self.body_limit - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                debug!(%url, limit = self.body_limit, "static fetch body capped");
                break;
            }
            body.extend_from_slice(&chunk);
        }
        debug!(%url, bytes = body.len(), "static fetch body received");
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

impl HttpPageFetcher {
    fn classify(&self, err: reqwest::Error) -> StageError {
        if err.is_timeout() {
            StageError::TimedOut {
                stage: STATIC_STAGE,
                secs: self.timeout.as_secs(),
            }
        } else {
            StageError::failed(STATIC_STAGE, err.to_string())
        }
    }
}
