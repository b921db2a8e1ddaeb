pub mod context;
pub mod domain;
pub mod explain;
pub mod ingest;
pub mod llm;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub google_api_key: Option<String>,
        pub newsapi_key: Option<String>,
        pub trends_provider_base_url: Option<String>,
        pub trends_provider_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                google_api_key: non_empty_var("GOOGLE_API_KEY"),
                newsapi_key: non_empty_var("NEWSAPI_KEY"),
                trends_provider_base_url: non_empty_var("TRENDS_PROVIDER_BASE_URL"),
                trends_provider_api_key: non_empty_var("TRENDS_PROVIDER_API_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
            })
        }

        pub fn require_google_api_key(&self) -> anyhow::Result<&str> {
            self.google_api_key
                .as_deref()
                .context("GOOGLE_API_KEY is required")
        }

        pub fn require_newsapi_key(&self) -> anyhow::Result<&str> {
            self.newsapi_key
                .as_deref()
                .context("NEWSAPI_KEY is required")
        }

        pub fn require_trends_provider_base_url(&self) -> anyhow::Result<&str> {
            self.trends_provider_base_url
                .as_deref()
                .context("TRENDS_PROVIDER_BASE_URL is required")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}
