use crate::llm::Provider;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Raw response characters kept in logs and diagnostics.
pub const RAW_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

/// Why a model answer could not become an explanation. Always recovered by the
/// rule-based fallback.
#[derive(Debug)]
pub enum GenerationFailure {
    Transport(anyhow::Error),
    Timeout(Duration),
    InvalidJson { error: String, raw: String },
    Schema { detail: String, raw: String },
}

impl GenerationFailure {
    pub fn class(&self) -> &'static str {
        match self {
            GenerationFailure::Transport(_) => "transport",
            GenerationFailure::Timeout(_) => "timeout",
            GenerationFailure::InvalidJson { .. } => "invalid_json",
            GenerationFailure::Schema { .. } => "schema",
        }
    }

    pub fn raw_preview(&self) -> Option<String> {
        match self {
            GenerationFailure::InvalidJson { raw, .. } | GenerationFailure::Schema { raw, .. } => {
                Some(truncate_chars(raw, RAW_PREVIEW_CHARS))
            }
            GenerationFailure::Transport(err) => err
                .downcast_ref::<LlmDiagnosticsError>()
                .and_then(|d| d.raw_output.as_deref())
                .map(|raw| truncate_chars(raw, RAW_PREVIEW_CHARS)),
            GenerationFailure::Timeout(_) => None,
        }
    }

    /// Short, stable text appended to the fallback narrative.
    pub fn fallback_reason(&self) -> String {
        match self {
            GenerationFailure::Transport(err) => format!("AI service error: {err}"),
            GenerationFailure::Timeout(after) => {
                format!("AI service error: timed out after {}s", after.as_secs())
            }
            GenerationFailure::InvalidJson { .. } => "JSON parsing failed".to_string(),
            GenerationFailure::Schema { detail, .. } => {
                format!("AI response failed validation: {detail}")
            }
        }
    }
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationFailure::Transport(err) => write!(f, "generation transport failure: {err:#}"),
            GenerationFailure::Timeout(after) => {
                write!(f, "generation timed out after {after:?}")
            }
            GenerationFailure::InvalidJson { error, .. } => {
                write!(f, "model output is not valid JSON: {error}")
            }
            GenerationFailure::Schema { detail, .. } => {
                write!(f, "model output failed schema validation: {detail}")
            }
        }
    }
}

impl std::error::Error for GenerationFailure {}

pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
