use crate::domain::contract::{LlmExplanation, REQUIRED_KEYS};
use crate::domain::explanation::Explanation;
use crate::domain::forecast::ForecastRecord;
use crate::llm::error::GenerationFailure;
use serde_json::Value;

/// Strip a surrounding Markdown code fence (```json ... ``` or ``` ... ```), if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let mut inner = trimmed.trim_start_matches('`');
    // Drop an info string such as `json` on the opening fence line.
    inner = match inner.split_once('\n') {
        Some((first_line, rest)) if !first_line.trim_start().starts_with('{') => rest,
        _ => inner,
    };
    inner.trim_end().trim_end_matches('`').trim()
}

/// Parse a raw model answer into an explanation for `record`.
pub fn parse_explanation(
    text: &str,
    record: &ForecastRecord,
) -> Result<Explanation, GenerationFailure> {
    let body = strip_code_fence(text);

    let value = serde_json::from_str::<Value>(body).map_err(|e| GenerationFailure::InvalidJson {
        error: e.to_string(),
        raw: text.to_string(),
    })?;

    let schema_failure = |detail: String| GenerationFailure::Schema {
        detail,
        raw: text.to_string(),
    };

    let Value::Object(obj) = &value else {
        return Err(schema_failure("top-level value must be a JSON object".to_string()));
    };
    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|k| !obj.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        return Err(schema_failure(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )));
    }

    let parsed = serde_json::from_value::<LlmExplanation>(value)
        .map_err(|e| schema_failure(e.to_string()))?;
    parsed
        .validate_and_into_explanation(record)
        .map_err(|e| schema_failure(format!("{e:#}")))
}
