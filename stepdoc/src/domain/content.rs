//! Structured manual content produced by the analyzer and enriched by the
//! synthesizer.
//!
//! This is a value shape, not a persisted entity: it is serialized to JSON
//! into the chapter's `content` column.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One extracted manual step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position in the source video, "MM:SS".
    pub timestamp: String,
    /// Human-readable description of the action.
    pub description: String,
    /// Artifact-store key of the narrated audio clip, if synthesis succeeded.
    /// `None` marks a step that needs regeneration.
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Clip duration in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
}

/// The full manual for one chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredContent {
    pub title: String,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl StructuredContent {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Diagnostic payload persisted in place of content when processing fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub error: String,
    pub details: String,
}

impl FailureReport {
    pub fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"error":"{}","details":""}}"#, self.error.replace('"', "'"))
        })
    }
}

/// Parse the raw text returned by the vision model into structured content.
///
/// Models occasionally wrap their JSON in a markdown code fence despite the
/// strict-JSON instruction; one fence-stripping retry is attempted before
/// giving up.
pub fn parse_model_output(raw: &str) -> Result<StructuredContent> {
    match serde_json::from_str::<StructuredContent>(raw) {
        Ok(content) => Ok(content),
        Err(first_err) => {
            let stripped = strip_code_fence(raw);
            if stripped == raw.trim() {
                return Err(Error::Validation(format!(
                    "model output is not valid structured content: {first_err}"
                )));
            }
            serde_json::from_str::<StructuredContent>(stripped).map_err(|e| {
                Error::Validation(format!("model output is not valid structured content: {e}"))
            })
        }
    }
}

/// Remove a leading/trailing markdown code fence (```json ... ``` or ``` ... ```).
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence line.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
