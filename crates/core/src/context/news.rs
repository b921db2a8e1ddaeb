use crate::config::Settings;
use crate::context::HeadlinesSource;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://newsapi.org";
const TOP_HEADLINES_PATH: &str = "/v2/top-headlines";
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// NewsAPI `top-headlines`, titles only.
#[derive(Debug, Clone)]
pub struct NewsApiSource {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NewsApiSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_newsapi_key()?.to_string();
        let base_url =
            std::env::var("NEWSAPI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("NEWSAPI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build news http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), TOP_HEADLINES_PATH)
    }
}

#[async_trait::async_trait]
impl HeadlinesSource for NewsApiSource {
    fn source_name(&self) -> &'static str {
        "newsapi"
    }

    async fn fetch_headlines(
        &self,
        query: &str,
        country: &str,
        page_size: usize,
    ) -> Result<Vec<String>> {
        let res = self
            .http
            .get(self.url())
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query.to_string()),
                ("country", country.to_string()),
                ("pageSize", page_size.to_string()),
            ])
            .send()
            .await
            .context("news request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read news response")?;
        if !status.is_success() {
            anyhow::bail!("news HTTP {status}: {text}");
        }

        let parsed = serde_json::from_str::<TopHeadlinesResponse>(&text)
            .with_context(|| format!("news response is not valid JSON: {text}"))?;
        Ok(titles(parsed))
    }
}

#[derive(Debug, Deserialize)]
struct TopHeadlinesResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: Option<String>,
}

fn titles(res: TopHeadlinesResponse) -> Vec<String> {
    res.articles
        .into_iter()
        .filter_map(|a| a.title)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
