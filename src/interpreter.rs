//! Turns raw model output into a trust verdict.
//!
//! Models do not reliably honour format requests, so extraction is a
//! prioritised chain of independent strategies:
//!
//! 1. structured JSON `{ "trustScore": .., "summary": .. }`
//! 2. a `Trust Score: NN%` phrase (1-100)
//! 3. a `score`/`rating` phrase with a 1-10 value
//!
//! The first strategy that yields an in-range value wins. Out-of-range values
//! are discarded, never clamped. When nothing matches the verdict carries no
//! score and the raw text is kept as the summary.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use tracing::debug;

use crate::config_loader::RatingPolicy;
use crate::evaluation::EvaluationOutcome;

pub const NO_SCORE_REASON: &str = "no numeric score recognizable in model output";
pub const NULL_SCORE_REASON: &str = "model reported no trust score";
pub const NATIVE_SCALE_REASON: &str = "rating reported on its native 1-10 scale";

/// Filler allowed between a score keyword and its number ("is about", "of").
/// Anything else in that gap means the number belongs to something else.
const CONNECTIVES: &str =
    "is|was|would|be|of|at|a|an|about|around|approximately|roughly|this|it|as|to|overall|final|here";

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").unwrap();
    static ref PERCENTAGE: Regex = Regex::new(&format!(
        r"(?i)\btrust[\s_-]*score\b\W*(?:(?:{CONNECTIVES})\W+){{0,3}}?(\d{{1,3}})\b(\s*(?:/|out\s+of)\s*10\b)?"
    ))
    .unwrap();
    static ref RATING: Regex = Regex::new(&format!(
        r"(?i)\b(?:score[sd]?|rat(?:e|ed|ing))\b\W*(?:(?:{CONNECTIVES})\W+){{0,3}}?(\d{{1,2}})\b"
    ))
    .unwrap();
}

/// Which strategy produced the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Structured,
    PercentagePattern,
    RatingPattern,
    Indeterminate,
}

/// Scale the reported score is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScale {
    Percent,
    TenPoint,
}

/// Result of the extraction chain, before any rescaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Structured {
        score: Option<u8>,
        summary: String,
    },
    PercentagePattern {
        score: u8,
    },
    RatingPattern {
        rating: u8,
    },
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustVerdict {
    pub score: Option<u8>,
    pub summary: String,
    pub scale: ScoreScale,
    pub source: ScoreSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indeterminate_reason: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreInterpreter {
    rating_policy: RatingPolicy,
}

impl ScoreInterpreter {
    pub fn new(rating_policy: RatingPolicy) -> Self {
        Self { rating_policy }
    }

    /// Never fails; unrecognisable output becomes an indeterminate verdict.
    pub fn interpret(&self, outcome: &EvaluationOutcome) -> TrustVerdict {
        let raw = outcome.raw_model_text.trim();
        let extraction = extract(raw);
        debug!(?extraction, "score extraction finished");
        self.verdict(extraction, raw)
    }

    fn verdict(&self, extraction: Extraction, raw: &str) -> TrustVerdict {
        match extraction {
            Extraction::Structured { score, summary } => TrustVerdict {
                score,
                summary,
                scale: ScoreScale::Percent,
                source: ScoreSource::Structured,
                indeterminate_reason: score.is_none().then(|| NULL_SCORE_REASON.to_string()),
            },
            Extraction::PercentagePattern { score } => TrustVerdict {
                score: Some(score),
                summary: raw.to_string(),
                scale: ScoreScale::Percent,
                source: ScoreSource::PercentagePattern,
                indeterminate_reason: None,
            },
            Extraction::RatingPattern { rating } => match self.rating_policy {
                RatingPolicy::Rescale => TrustVerdict {
                    score: Some(rating * 10),
                    summary: raw.to_string(),
                    scale: ScoreScale::Percent,
                    source: ScoreSource::RatingPattern,
                    indeterminate_reason: None,
                },
                RatingPolicy::Native => TrustVerdict {
                    score: Some(rating),
                    summary: raw.to_string(),
                    scale: ScoreScale::TenPoint,
                    source: ScoreSource::RatingPattern,
                    indeterminate_reason: Some(NATIVE_SCALE_REASON.to_string()),
                },
            },
            Extraction::Indeterminate => TrustVerdict {
                score: None,
                summary: raw.to_string(),
                scale: ScoreScale::Percent,
                source: ScoreSource::Indeterminate,
                indeterminate_reason: Some(NO_SCORE_REASON.to_string()),
            },
        }
    }
}

/// Run the strategies in order of preference.
pub fn extract(raw: &str) -> Extraction {
    extract_structured(raw)
        .or_else(|| extract_percentage(raw))
        .or_else(|| extract_rating(raw))
        .unwrap_or(Extraction::Indeterminate)
}

/// Requires both `trustScore` (integer 1-100 or null) and `summary` (string).
pub fn extract_structured(raw: &str) -> Option<Extraction> {
    let object = parse_json_object(raw)?;
    let summary = object.get("summary")?.as_str()?.to_string();
    let score = match object.get("trustScore")? {
        Value::Null => None,
        value => Some(value.as_u64().filter(|s| (1..=100).contains(s))? as u8),
    };
    Some(Extraction::Structured { score, summary })
}

/// First `trust score ... NN` phrase, percent scale.
pub fn extract_percentage(raw: &str) -> Option<Extraction> {
    let caps = PERCENTAGE.captures(raw)?;
    // "Trust Score: 7/10" is a ten-point rating, not seven percent.
    if caps.get(2).is_some() {
        return None;
    }
    let score: u8 = caps[1].parse().ok()?;
    (1..=100)
        .contains(&score)
        .then_some(Extraction::PercentagePattern { score })
}

/// First `score`/`rating` phrase followed by a 1-10 value.
pub fn extract_rating(raw: &str) -> Option<Extraction> {
    let caps = RATING.captures(raw)?;
    let rating: u8 = caps[1].parse().ok()?;
    (1..=10)
        .contains(&rating)
        .then_some(Extraction::RatingPattern { rating })
}

/// Parse `raw` as a JSON object, tolerating a Markdown code fence and one
/// layer of surrounding quotes with escaped inner quotes.
pub fn parse_json_object(raw: &str) -> Option<Map<String, Value>> {
    let text = unwrap_encoded(raw);
    match serde_json::from_str::<Value>(&text).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn unwrap_encoded(raw: &str) -> Cow<'_, str> {
    let mut text = raw.trim();
    if let Some(inner) = CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        text = inner.as_str();
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return Cow::Owned(text[1..text.len() - 1].replace("\\\"", "\""));
    }
    Cow::Borrowed(text)
}
