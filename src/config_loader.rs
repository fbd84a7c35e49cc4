use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::static_fetch::DEFAULT_BODY_LIMIT;

pub const DEFAULT_CONFIG_FILE: &str = "tos_trust.toml";
pub const ENV_PREFIX: &str = "TOS_TRUST_";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Instruction style sent to the model service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InstructionVariant {
    Structured,
    FreeText,
}

/// What to do with a 1-10 rating found in free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingPolicy {
    /// Multiply by ten and report on the percent scale.
    Rescale,
    /// Report the rating as-is on the ten-point scale.
    Native,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub completions_url: String,
    pub model: String,
    pub temperature: f32,
    pub instruction_variant: InstructionVariant,
    pub rating_policy: RatingPolicy,
    pub max_chars: usize,
    pub min_chars: usize,
    pub max_body_bytes: usize,
    pub user_agent: String,
    pub static_timeout_secs: u64,
    pub render_settle_secs: u64,
    pub render_timeout_secs: u64,
    pub acquisition_budget_secs: u64,
    pub evaluation_timeout_secs: u64,
    pub browser_no_sandbox: bool,
    #[serde(default)]
    pub chrome_executable: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            completions_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4-turbo".to_string(),
            temperature: 0.5,
            instruction_variant: InstructionVariant::Structured,
            rating_policy: RatingPolicy::Rescale,
            max_chars: 6000,
            min_chars: 100,
            max_body_bytes: DEFAULT_BODY_LIMIT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            static_timeout_secs: 7,
            render_settle_secs: 15,
            render_timeout_secs: 30,
            acquisition_budget_secs: 45,
            evaluation_timeout_secs: 60,
            browser_no_sandbox: false,
            chrome_executable: None,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl AnalyzerConfig {
    pub fn static_timeout(&self) -> Duration {
        Duration::from_secs(self.static_timeout_secs)
    }

    pub fn render_settle(&self) -> Duration {
        Duration::from_secs(self.render_settle_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn acquisition_budget(&self) -> Duration {
        Duration::from_secs(self.acquisition_budget_secs)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    fn validate(&self) -> Result<(), figment::Error> {
        if self.min_chars >= self.max_chars {
            return Err(figment::Error::from(format!(
                "min_chars ({}) must be below max_chars ({})",
                self.min_chars, self.max_chars
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(figment::Error::from("max_body_bytes must be greater than zero"));
        }
        let timeouts = [
            ("static_timeout_secs", self.static_timeout_secs),
            ("render_settle_secs", self.render_settle_secs),
            ("render_timeout_secs", self.render_timeout_secs),
            ("acquisition_budget_secs", self.acquisition_budget_secs),
            ("evaluation_timeout_secs", self.evaluation_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(figment::Error::from(format!("{name} must be greater than zero")));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(figment::Error::from("temperature must be within 0..=2"));
        }
        if self.completions_url.trim().is_empty() {
            return Err(figment::Error::from("completions_url must be set"));
        }
        Ok(())
    }
}

/// Build the layered figment: defaults, then the TOML file, then `TOS_TRUST_*`.
pub fn figment_for(path: Option<&Path>) -> Figment {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    Figment::from(Serialized::defaults(AnalyzerConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX))
}

/// Extract and validate a config from an already-assembled figment.
///
/// The model credential falls back to the conventional `OPENAI_API_KEY`
/// variable when no layer provided one.
pub fn extract_config(figment: Figment) -> Result<AnalyzerConfig, figment::Error> {
    let mut config: AnalyzerConfig = figment.extract()?;

    if !config.has_api_key() {
        config.api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
    }

    config.validate()?;
    Ok(config)
}

/// An explicit `path` must exist; the default file is optional.
pub fn load_config(path: Option<&Path>) -> Result<AnalyzerConfig, figment::Error> {
    if let Some(path) = path {
        if !path.is_file() {
            return Err(figment::Error::from(format!(
                "config file {} not found",
                path.display()
            )));
        }
    }
    extract_config(figment_for(path))
}
