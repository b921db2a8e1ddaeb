//! Auxiliary signals (search interest, headlines) used to enrich prompts.
//!
//! Everything here is best-effort: a failing source or cache yields empty data,
//! never an error.

pub mod news;
pub mod trends;

use crate::config::Settings;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use news::NewsApiSource;
pub use trends::HttpTrendsSource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSignals {
    /// Interest values, oldest first.
    pub trends: Vec<f64>,
    /// Headlines, most relevant first.
    pub headlines: Vec<String>,
}

/// Signal lookups as the pipeline sees them. Empty is a normal answer.
#[async_trait::async_trait]
pub trait ContextProvider: Send + Sync {
    async fn fetch_trends(&self, key: &str) -> Vec<f64>;

    async fn fetch_headlines(&self, key: &str) -> Vec<String>;

    async fn fetch_signals(&self, key: &str) -> ContextSignals {
        let (trends, headlines) = tokio::join!(self.fetch_trends(key), self.fetch_headlines(key));
        ContextSignals { trends, headlines }
    }
}

#[async_trait::async_trait]
pub trait TrendsSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_interest(&self, keyword: &str, timeframe: &str) -> anyhow::Result<Vec<f64>>;
}

#[async_trait::async_trait]
pub trait HeadlinesSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_headlines(
        &self,
        query: &str,
        country: &str,
        page_size: usize,
    ) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub trends_timeframe: String,
    pub trends_ttl: Duration,
    pub news_country: String,
    pub news_page_size: usize,
    pub headlines_ttl: Duration,
    pub max_cache_entries: u64,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            trends_timeframe: "now 7-d".to_string(),
            trends_ttl: Duration::from_secs(3600),
            news_country: "us".to_string(),
            news_page_size: 5,
            headlines_ttl: Duration::from_secs(1800),
            max_cache_entries: 10_000,
        }
    }
}

impl ContextOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("TRENDS_TIMEFRAME") {
            if !s.trim().is_empty() {
                out.trends_timeframe = s.trim().to_string();
            }
        }

        if let Ok(s) = std::env::var("TRENDS_CACHE_TTL_SECS") {
            if let Ok(n) = s.parse::<u64>() {
                out.trends_ttl = Duration::from_secs(n);
            }
        }

        if let Ok(s) = std::env::var("NEWS_COUNTRY") {
            if !s.trim().is_empty() {
                out.news_country = s.trim().to_string();
            }
        }

        if let Ok(s) = std::env::var("NEWS_PAGE_SIZE") {
            if let Ok(n) = s.parse::<usize>() {
                out.news_page_size = n.clamp(1, 20);
            }
        }

        if let Ok(s) = std::env::var("NEWS_CACHE_TTL_SECS") {
            if let Ok(n) = s.parse::<u64>() {
                out.headlines_ttl = Duration::from_secs(n);
            }
        }

        out
    }
}

/// `ContextProvider` over optional sources with per-key TTL caches.
pub struct CachedContextProvider {
    trends: Option<Arc<dyn TrendsSource>>,
    headlines: Option<Arc<dyn HeadlinesSource>>,
    trends_cache: Cache<String, Vec<f64>>,
    headlines_cache: Cache<String, Vec<String>>,
    options: ContextOptions,
}

impl CachedContextProvider {
    pub fn new(
        trends: Option<Arc<dyn TrendsSource>>,
        headlines: Option<Arc<dyn HeadlinesSource>>,
        options: ContextOptions,
    ) -> Self {
        let trends_cache = Cache::builder()
            .max_capacity(options.max_cache_entries)
            .time_to_live(options.trends_ttl)
            .build();
        let headlines_cache = Cache::builder()
            .max_capacity(options.max_cache_entries)
            .time_to_live(options.headlines_ttl)
            .build();

        Self {
            trends,
            headlines,
            trends_cache,
            headlines_cache,
            options,
        }
    }

    /// Wire up whichever sources are configured; missing ones stay disabled.
    pub fn from_settings(settings: &Settings) -> Self {
        let trends: Option<Arc<dyn TrendsSource>> = match HttpTrendsSource::from_settings(settings) {
            Ok(source) => Some(Arc::new(source)),
            Err(err) => {
                tracing::info!(reason = %err, "trends source disabled");
                None
            }
        };

        let headlines: Option<Arc<dyn HeadlinesSource>> = match NewsApiSource::from_settings(settings) {
            Ok(source) => Some(Arc::new(source)),
            Err(err) => {
                tracing::info!(reason = %err, "news source disabled");
                None
            }
        };

        Self::new(trends, headlines, ContextOptions::from_env())
    }

    pub fn trends_enabled(&self) -> bool {
        self.trends.is_some()
    }

    pub fn headlines_enabled(&self) -> bool {
        self.headlines.is_some()
    }
}

#[async_trait::async_trait]
impl ContextProvider for CachedContextProvider {
    async fn fetch_trends(&self, key: &str) -> Vec<f64> {
        let Some(source) = &self.trends else {
            return Vec::new();
        };

        let timeframe = self.options.trends_timeframe.as_str();
        let cache_key = format!("trends:{key}:{timeframe}");
        if let Some(hit) = self.trends_cache.get(&cache_key) {
            return hit;
        }

        match source.fetch_interest(key, timeframe).await {
            Ok(values) => {
                self.trends_cache.insert(cache_key, values.clone());
                values
            }
            Err(err) => {
                tracing::warn!(
                    source = source.source_name(),
                    key,
                    error = %err,
                    "trends fetch failed; continuing without trend data"
                );
                Vec::new()
            }
        }
    }

    async fn fetch_headlines(&self, key: &str) -> Vec<String> {
        let Some(source) = &self.headlines else {
            return Vec::new();
        };

        let country = self.options.news_country.as_str();
        let cache_key = format!("news:{key}:{country}");
        if let Some(hit) = self.headlines_cache.get(&cache_key) {
            return hit;
        }

        match source
            .fetch_headlines(key, country, self.options.news_page_size)
            .await
        {
            Ok(headlines) => {
                self.headlines_cache.insert(cache_key, headlines.clone());
                headlines
            }
            Err(err) => {
                tracing::warn!(
                    source = source.source_name(),
                    key,
                    error = %err,
                    "headline fetch failed; continuing without news"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod stubs {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixed signals, no I/O.
    #[derive(Debug, Clone, Default)]
    pub struct StaticContext(pub ContextSignals);

    #[async_trait::async_trait]
    impl ContextProvider for StaticContext {
        async fn fetch_trends(&self, _key: &str) -> Vec<f64> {
            self.0.trends.clone()
        }

        async fn fetch_headlines(&self, _key: &str) -> Vec<String> {
            self.0.headlines.clone()
        }
    }

    #[derive(Default)]
    pub struct CountingTrends {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    #[async_trait::async_trait]
    impl TrendsSource for CountingTrends {
        fn source_name(&self) -> &'static str {
            "counting"
        }

        async fn fetch_interest(&self, keyword: &str, _timeframe: &str) -> anyhow::Result<Vec<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(!self.fail, "upstream unavailable for {keyword}");
            Ok(vec![10.0, 20.0])
        }
    }

    #[derive(Default)]
    pub struct CountingHeadlines {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    #[async_trait::async_trait]
    impl HeadlinesSource for CountingHeadlines {
        fn source_name(&self) -> &'static str {
            "counting"
        }

        async fn fetch_headlines(
            &self,
            query: &str,
            _country: &str,
            _page_size: usize,
        ) -> anyhow::Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(!self.fail, "quota exceeded");
            Ok(vec![format!("{query} flies off the shelves")])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stubs::{CountingHeadlines, CountingTrends};
    use super::*;
    use std::sync::atomic::Ordering;

    fn provider(
        trends: Arc<CountingTrends>,
        headlines: Arc<CountingHeadlines>,
    ) -> CachedContextProvider {
        CachedContextProvider::new(Some(trends), Some(headlines), ContextOptions::default())
    }

    #[tokio::test]
    async fn caches_successful_lookups_per_key() {
        let trends = Arc::new(CountingTrends::default());
        let headlines = Arc::new(CountingHeadlines::default());
        let p = provider(trends.clone(), headlines.clone());

        let first = p.fetch_signals("SKU1").await;
        let second = p.fetch_signals("SKU1").await;
        assert_eq!(first, second);
        assert_eq!(first.trends, vec![10.0, 20.0]);
        assert_eq!(trends.calls.load(Ordering::SeqCst), 1);
        assert_eq!(headlines.calls.load(Ordering::SeqCst), 1);

        p.fetch_signals("SKU2").await;
        assert_eq!(trends.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_degrade_to_empty_and_are_not_cached() {
        let trends = Arc::new(CountingTrends {
            fail: true,
            ..Default::default()
        });
        let headlines = Arc::new(CountingHeadlines {
            fail: true,
            ..Default::default()
        });
        let p = provider(trends.clone(), headlines.clone());

        assert_eq!(p.fetch_signals("SKU1").await, ContextSignals::default());
        assert_eq!(p.fetch_signals("SKU1").await, ContextSignals::default());
        assert_eq!(trends.calls.load(Ordering::SeqCst), 2);
        assert_eq!(headlines.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_sources_yield_empty_signals() {
        let p = CachedContextProvider::new(None, None, ContextOptions::default());
        assert!(!p.trends_enabled());
        assert!(!p.headlines_enabled());
        assert_eq!(p.fetch_signals("SKU1").await, ContextSignals::default());
    }
}
