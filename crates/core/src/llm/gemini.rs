use crate::config::Settings;
use crate::llm::error::{truncate_chars, LlmDiagnosticsError, RAW_PREVIEW_CHARS};
use crate::llm::{GenerationClient, Provider, SamplingConfig};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_google_api_key()?.to_string();
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let timeout = Duration::from_secs(timeout_secs);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn request(prompt: &str, sampling: &SamplingConfig) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: sampling.temperature,
                top_p: sampling.top_p,
                top_k: sampling.top_k,
                max_output_tokens: sampling.max_output_tokens,
            },
        }
    }

    async fn generate_content(
        &self,
        req: &GenerateContentRequest,
    ) -> anyhow::Result<(serde_json::Value, GenerateContentResponse)> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&self.api_key).context("invalid GOOGLE_API_KEY")?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);

        let res = self
            .http
            .post(self.url())
            .headers(headers)
            .json(req)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Gemini request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to read Gemini response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        Self::decode_response(&text)
    }

    fn decode_response(text: &str) -> anyhow::Result<(serde_json::Value, GenerateContentResponse)> {
        let raw_json = serde_json::from_str::<serde_json::Value>(text).with_context(|| {
            format!(
                "failed to parse Gemini response JSON: {}",
                truncate_chars(text, RAW_PREVIEW_CHARS)
            )
        })?;
        let parsed = serde_json::from_value::<GenerateContentResponse>(raw_json.clone())
            .context("failed to decode Gemini response into GenerateContentResponse")?;
        Ok((raw_json, parsed))
    }

    fn response_text(
        raw_json: serde_json::Value,
        res: GenerateContentResponse,
    ) -> anyhow::Result<String> {
        let Some(candidate) = res.candidates.into_iter().next() else {
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "candidates",
                detail: "no candidates returned".to_string(),
                raw_output: None,
                raw_response_json: Some(raw_json),
            }
            .into());
        };

        let mut out = String::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                out.push_str(&text);
            }
        }

        if out.trim().is_empty() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "content",
                detail: format!(
                    "candidate has no text (finish_reason={})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                ),
                raw_output: None,
                raw_response_json: Some(raw_json),
            }
            .into());
        }

        Ok(out)
    }
}

#[async_trait::async_trait]
impl GenerationClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate(&self, prompt: &str, sampling: &SamplingConfig) -> anyhow::Result<String> {
        let req = Self::request(prompt, sampling);
        let (raw_json, res) = self.generate_content(&req).await?;

        if let Some(feedback) = &res.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                tracing::warn!(model = %self.model, %reason, "Gemini blocked the prompt");
            }
        }

        Self::response_text(raw_json, res)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::error::GenerationFailure;
    use serde_json::json;

    #[test]
    fn request_carries_sampling_config() {
        let req = GeminiClient::request("hello", &SamplingConfig::default());
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["contents"][0]["role"], "user");
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(v["generationConfig"]["topK"], 40);
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 1024);
    }

    fn client(base_url: &str, api_key: &str) -> GeminiClient {
        GeminiClient {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap(),
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            model: "m".to_string(),
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn transport_errors_never_carry_the_api_key() {
        let key = "SECRET-KEY-123";
        let c = client("http://127.0.0.1:1", key);
        let err = c
            .generate("hello", &SamplingConfig::default())
            .await
            .unwrap_err();

        let failure = GenerationFailure::Transport(err);
        let logged = format!("{failure} | {failure:?} | {}", failure.fallback_reason());
        assert!(logged.contains("Gemini request failed"));
        assert!(!logged.contains(key), "api key leaked: {logged}");
    }

    #[test]
    fn undecodable_body_is_truncated_in_errors() {
        let body = format!("<html>{}</html>", "x".repeat(5000));
        let err = GeminiClient::decode_response(&body).unwrap_err();
        let reason = GenerationFailure::Transport(err).fallback_reason();
        assert!(reason.contains("failed to parse Gemini response JSON"));
        assert!(reason.len() < 400, "reason too long: {} chars", reason.len());
    }

    #[test]
    fn url_has_no_query_string() {
        let c = client("https://example.test/v1beta/", "SECRET");
        assert_eq!(c.url(), "https://example.test/v1beta/models/m:generateContent");
    }

    #[test]
    fn joins_candidate_text_parts() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": "1}"}]},
                "finishReason": "STOP"
            }]
        });
        let res: GenerateContentResponse = serde_json::from_value(raw.clone()).unwrap();
        let text = GeminiClient::response_text(raw, res).unwrap();
        assert_eq!(text, "{\"a\":1}");
    }

    #[test]
    fn empty_candidates_is_diagnostic_error() {
        let raw = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let res: GenerateContentResponse = serde_json::from_value(raw.clone()).unwrap();
        let err = GeminiClient::response_text(raw, res).unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "candidates");
        assert!(diag.raw_response_json.is_some());
    }
}
