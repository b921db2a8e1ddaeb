pub mod error;
pub mod gemini;
pub mod json;

use serde::Serialize;

/// Fixed sampling parameters: low temperature, bounded output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    Disabled,
}

#[async_trait::async_trait]
pub trait GenerationClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// One model call. Returns the raw response text.
    async fn generate(&self, prompt: &str, sampling: &SamplingConfig) -> anyhow::Result<String>;
}

/// Stand-in used when no model credentials are configured. Every call fails,
/// so every record takes the rule-based path.
#[derive(Debug, Clone)]
pub struct DisabledClient {
    reason: String,
}

impl DisabledClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl GenerationClient for DisabledClient {
    fn provider(&self) -> Provider {
        Provider::Disabled
    }

    async fn generate(&self, _prompt: &str, _sampling: &SamplingConfig) -> anyhow::Result<String> {
        anyhow::bail!("generation disabled: {}", self.reason)
    }
}
