use crate::config::Settings;
use crate::context::TrendsSource;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PATH: &str = "/v1/interest_over_time";

/// Search-interest series from a JSON endpoint answering
/// `GET {base}{path}?keyword=..&timeframe=..` with `{"values": [..]}`.
#[derive(Debug, Clone)]
pub struct HttpTrendsSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
}

impl HttpTrendsSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_trends_provider_base_url()?.to_string();
        let api_key = settings.trends_provider_api_key.clone();

        let timeout_secs = std::env::var("TRENDS_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let path = std::env::var("TRENDS_PROVIDER_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build trends http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl TrendsSource for HttpTrendsSource {
    fn source_name(&self) -> &'static str {
        "http_trends"
    }

    async fn fetch_interest(&self, keyword: &str, timeframe: &str) -> Result<Vec<f64>> {
        let res = self
            .http
            .get(self.url())
            .headers(self.headers()?)
            .query(&[("keyword", keyword), ("timeframe", timeframe)])
            .send()
            .await
            .context("trends request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read trends response")?;
        if !status.is_success() {
            anyhow::bail!("trends HTTP {status}: {text}");
        }

        let parsed = serde_json::from_str::<InterestResponse>(&text)
            .with_context(|| format!("trends response is not valid JSON: {text}"))?;
        Ok(parsed.values.into_iter().filter(|v| v.is_finite()).collect())
    }
}

#[derive(Debug, Deserialize)]
struct InterestResponse {
    #[serde(default)]
    values: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_values_and_defaults_to_empty() {
        let parsed: InterestResponse =
            serde_json::from_value(json!({"values": [42.0, 55, 61.5]})).unwrap();
        assert_eq!(parsed.values, vec![42.0, 55.0, 61.5]);

        let empty: InterestResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.values.is_empty());
    }

    #[test]
    fn rejects_non_numeric_values() {
        let res = serde_json::from_value::<InterestResponse>(json!({"values": ["42"]}));
        assert!(res.is_err());
    }

    #[test]
    fn url_joins_base_and_path() {
        let source = HttpTrendsSource {
            http: reqwest::Client::new(),
            base_url: "http://trends.local/".to_string(),
            api_key: None,
            path: "v1/interest_over_time".to_string(),
        };
        assert_eq!(source.url(), "http://trends.local/v1/interest_over_time");
    }
}
