//! Headless-browser stage of acquisition.
//!
//! Every render launches its own Chromium process with a private profile
//! directory. `BrowserSession` owns that process: `close` is awaited on
//! every completed path, and `Drop` reaps it when the render future is
//! cancelled mid-flight (acquisition budget exhausted, panic unwinding).

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::acquisition::{PageRenderer, RENDERED_STAGE};
use crate::config_loader::AnalyzerConfig;
use crate::errors::StageError;

const SETTLE_POLL: Duration = Duration::from_millis(500);
/// Consecutive unchanged polls before the page counts as idle.
const QUIET_POLLS: u32 = 2;

const READY_PROBE_JS: &str = "(() => document.readyState === 'complete' \
    ? (document.body ? document.body.innerText.length : 0) : -1)()";
const VISIBLE_TEXT_JS: &str = "(() => document.body ? document.body.innerText : '')()";

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub settle: Duration,
    pub timeout: Duration,
    pub no_sandbox: bool,
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: String,
}

impl RenderSettings {
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            settle: config.render_settle(),
            timeout: config.render_timeout(),
            no_sandbox: config.browser_no_sandbox,
            chrome_executable: config
                .chrome_executable
                .as_deref()
                .map(PathBuf::from)
                .or_else(find_chrome_binary),
            user_agent: config.user_agent.clone(),
        }
    }
}

pub struct BrowserRenderer {
    settings: RenderSettings,
}

impl BrowserRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PageRenderer for BrowserRenderer {
    async fn render_text(&self, url: &Url) -> Result<String, StageError> {
        let session = BrowserSession::launch(&self.settings).await?;

        let rendered = timeout(
            self.settings.timeout,
            session.visible_text(url, self.settings.settle),
        )
        .await;
        session.close().await;

        match rendered {
            Ok(result) => result,
            Err(_) => Err(StageError::TimedOut {
                stage: RENDERED_STAGE,
                secs: self.settings.timeout.as_secs(),
            }),
        }
    }
}

fn cdp_failure(context: &str, err: impl std::fmt::Display) -> StageError {
    StageError::failed(RENDERED_STAGE, format!("{context}: {err}"))
}

/// A launched browser process and the task pumping its CDP connection.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
}

impl BrowserSession {
    async fn launch(settings: &RenderSettings) -> Result<Self, StageError> {
        let profile_dir = std::env::temp_dir().join(format!("tos-trust-{}", Uuid::new_v4()));

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&profile_dir)
            .request_timeout(settings.timeout)
            .arg(format!("--user-agent={}", settings.user_agent))
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(bin) = &settings.chrome_executable {
            builder = builder.chrome_executable(bin);
        }
        let config = builder
            .build()
            .map_err(|e| cdp_failure("browser config", e))?;

        let (browser, mut handler) = match Browser::launch(config).await {
            Ok(launched) => launched,
            Err(e) => {
                remove_profile_dir(&profile_dir);
                return Err(cdp_failure("browser launch", e));
            }
        };
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        debug!(profile = ?profile_dir, "browser launched");

        Ok(Self {
            browser,
            handler,
            profile_dir,
        })
    }

    async fn visible_text(&self, url: &Url, settle: Duration) -> Result<String, StageError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| cdp_failure("open page", e))?;

        page.goto(url.as_str())
            .await
            .map_err(|e| cdp_failure("navigate", e))?
            .wait_for_navigation()
            .await
            .map_err(|e| cdp_failure("navigate", e))?;

        wait_until_idle(&page, settle).await;

        let text: String = page
            .evaluate(VISIBLE_TEXT_JS)
            .await
            .map_err(|e| cdp_failure("extract text", e))?
            .into_value()
            .map_err(|e| cdp_failure("extract text", e))?;
        info!(%url, chars = text.chars().count(), "rendered page text extracted");
        Ok(text)
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "browser close failed, killing process");
            let _ = self.browser.kill().await;
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "browser wait failed");
        }
        // Drop aborts the handler task and removes the profile directory.
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
        remove_profile_dir(&self.profile_dir);
    }
}

fn remove_profile_dir(dir: &Path) {
    if dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            warn!(profile = ?dir, error = %e, "failed to remove browser profile");
        }
    }
}

/// Poll until the document is complete and its text length stops changing,
/// or the settle window runs out. Running out is not an error.
async fn wait_until_idle(page: &Page, settle: Duration) {
    let deadline = Instant::now() + settle;
    let mut last_len: i64 = -1;
    let mut quiet = 0;

    while Instant::now() < deadline {
        let len = match page.evaluate(READY_PROBE_JS).await {
            Ok(result) => result.into_value::<i64>().unwrap_or(-1),
            Err(e) => {
                debug!(error = %e, "ready probe failed");
                -1
            }
        };
        if len >= 0 && len == last_len {
            quiet += 1;
            if quiet >= QUIET_POLLS {
                return;
            }
        } else {
            quiet = 0;
        }
        last_len = len;
        sleep(SETTLE_POLL).await;
    }
    debug!(settle_secs = settle.as_secs(), "settle window elapsed before page went idle");
}

fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROME_BIN") {
        let p = PathBuf::from(path);
        if p.is_file() {
            return Some(p);
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    candidates.iter().map(PathBuf::from).find(|p| p.is_file())
}
