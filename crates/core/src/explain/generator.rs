use crate::config::Settings;
use crate::context::{CachedContextProvider, ContextProvider};
use crate::domain::explanation::Explanation;
use crate::domain::forecast::ForecastRecord;
use crate::explain::fallback::fallback_explanation;
use crate::explain::prompt::{compose_prompt, ScenarioOverrides};
use crate::llm::error::GenerationFailure;
use crate::llm::gemini::GeminiClient;
use crate::llm::json::parse_explanation;
use crate::llm::{DisabledClient, GenerationClient, Provider, SamplingConfig};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(35);
/// Slack on top of the HTTP timeout so the client reports its own error first.
const TIMEOUT_SLACK: Duration = Duration::from_secs(5);

pub struct ExplanationGenerator {
    client: Arc<dyn GenerationClient>,
    context: Arc<dyn ContextProvider>,
    sampling: SamplingConfig,
    timeout: Duration,
}

impl ExplanationGenerator {
    pub fn new(client: Arc<dyn GenerationClient>, context: Arc<dyn ContextProvider>) -> Self {
        Self {
            client,
            context,
            sampling: SamplingConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Gemini when a key is configured; otherwise every record is explained by rules.
    pub fn from_settings(settings: &Settings) -> Self {
        let (client, client_timeout): (Arc<dyn GenerationClient>, Option<Duration>) =
            match GeminiClient::from_settings(settings) {
                Ok(gemini) => {
                    let t = gemini.timeout();
                    (Arc::new(gemini), Some(t))
                }
                Err(err) => {
                    tracing::warn!(
                        reason = %err,
                        "model client unavailable; explanations will be rule-based"
                    );
                    (Arc::new(DisabledClient::new(err.to_string())), None)
                }
            };

        let timeout = std::env::var("GENERATION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .or_else(|| client_timeout.map(|t| t + TIMEOUT_SLACK))
            .unwrap_or(DEFAULT_TIMEOUT);

        let context = Arc::new(CachedContextProvider::from_settings(settings));
        Self::new(client, context).with_timeout(timeout)
    }

    pub fn provider(&self) -> Provider {
        self.client.provider()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn explain(&self, record: &ForecastRecord) -> Explanation {
        self.explain_with(record, &ScenarioOverrides::default()).await
    }

    /// Never fails: any generation problem is logged and replaced by the
    /// rule-based explanation carrying the reason.
    pub async fn explain_with(
        &self,
        record: &ForecastRecord,
        overrides: &ScenarioOverrides,
    ) -> Explanation {
        match self.try_generate(record, overrides).await {
            Ok(explanation) => explanation,
            Err(failure) => {
                tracing::warn!(
                    sku_id = %record.sku_id,
                    store_id = %record.store_id,
                    class = failure.class(),
                    raw_preview = failure.raw_preview().as_deref().unwrap_or(""),
                    error = %failure,
                    "falling back to rule-based explanation"
                );
                fallback_explanation(record, &failure.fallback_reason())
            }
        }
    }

    pub async fn try_generate(
        &self,
        record: &ForecastRecord,
        overrides: &ScenarioOverrides,
    ) -> Result<Explanation, GenerationFailure> {
        let signals = self.context.fetch_signals(&record.sku_id).await;
        let prompt = compose_prompt(record, &signals, overrides);

        let text = tokio::time::timeout(self.timeout, self.client.generate(&prompt, &self.sampling))
            .await
            .map_err(|_| GenerationFailure::Timeout(self.timeout))?
            .map_err(GenerationFailure::Transport)?;

        let explanation = parse_explanation(&text, record)?;
        tracing::debug!(
            sku_id = %record.sku_id,
            top_influencer = %explanation.top_influencer,
            "model explanation accepted"
        );
        Ok(explanation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::stubs::StaticContext;
    use crate::context::ContextSignals;
    use crate::domain::explanation::{ExplanationType, TopInfluencer};
    use crate::domain::forecast::fixtures::record;
    use crate::explain::stubs::{answer, ScriptedClient};
    use std::sync::Mutex;

    fn generator(client: ScriptedClient) -> ExplanationGenerator {
        ExplanationGenerator::new(Arc::new(client), Arc::new(StaticContext::default()))
    }

    #[tokio::test]
    async fn well_formed_answer_becomes_ai_explanation() {
        let g = generator(ScriptedClient::new(|_| Ok(answer("promotion", 0.85))));
        let exp = g.explain(&record("SKU1")).await;
        assert_eq!(exp.explanation_type, ExplanationType::AiGenerated);
        assert_eq!(exp.top_influencer, TopInfluencer::Promotion);
        assert_eq!(exp.confidence_score, Some(0.85));
        assert_eq!(exp.sku_id, "SKU1");
    }

    #[tokio::test]
    async fn fenced_answer_is_accepted() {
        let g = generator(ScriptedClient::new(|_| {
            Ok(format!("```json\n{}\n```", answer("holiday", 0.6)))
        }));
        let exp = g.explain(&record("SKU1")).await;
        assert_eq!(exp.explanation_type, ExplanationType::AiGenerated);
        assert_eq!(exp.top_influencer, TopInfluencer::Holiday);
    }

    #[tokio::test]
    async fn invalid_json_falls_back() {
        let g = generator(ScriptedClient::new(|_| Ok("Demand is up.".to_string())));
        let mut r = record("SKU1");
        r.promotion_flag = Some(true);
        let exp = g.explain(&r).await;
        assert_eq!(exp.explanation_type, ExplanationType::RuleBased);
        assert_eq!(exp.top_influencer, TopInfluencer::Promotion);
        assert!(exp.narrative_explanation.ends_with("Note: JSON parsing failed"));
    }

    #[tokio::test]
    async fn missing_key_falls_back_with_schema_reason() {
        let g = generator(ScriptedClient::new(|_| {
            Ok(r#"{"narrative_explanation":"x","top_influencer":"weather","confidence_score":0.5}"#
                .to_string())
        }));
        let err = g
            .try_generate(&record("SKU1"), &ScenarioOverrides::default())
            .await
            .unwrap_err();
        assert_eq!(err.class(), "schema");

        let exp = g.explain(&record("SKU1")).await;
        assert_eq!(exp.explanation_type, ExplanationType::RuleBased);
        assert!(exp.narrative_explanation.contains("structured_explanation"));
    }

    #[tokio::test]
    async fn transport_error_falls_back() {
        let g = generator(ScriptedClient::new(|_| anyhow::bail!("quota exceeded")));
        let exp = g.explain(&record("SKU1")).await;
        assert_eq!(exp.explanation_type, ExplanationType::RuleBased);
        assert!(exp
            .narrative_explanation
            .ends_with("Note: AI service error: quota exceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let client = ScriptedClient::new(|_| Ok(answer("promotion", 0.9)))
            .with_delay(Duration::from_secs(60));
        let g = generator(client).with_timeout(Duration::from_secs(2));
        let err = g
            .try_generate(&record("SKU1"), &ScenarioOverrides::default())
            .await
            .unwrap_err();
        assert_eq!(err.class(), "timeout");
    }

    #[tokio::test]
    async fn prompt_carries_context_and_overrides() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        let client = ScriptedClient::new(move |prompt| {
            *sink.lock().unwrap() = prompt.to_string();
            Ok(answer("promotion", 0.8))
        });
        let context = StaticContext(ContextSignals {
            trends: vec![10.0, 15.0],
            headlines: vec!["Holiday rush starts early".to_string()],
        });
        let g = ExplanationGenerator::new(Arc::new(client), Arc::new(context));

        let overrides = ScenarioOverrides {
            weather_severity: None,
            promotion_discount: Some(20),
        };
        g.explain_with(&record("SKU1"), &overrides).await;

        let prompt = seen.lock().unwrap().clone();
        assert!(prompt.contains("Holiday rush starts early"));
        assert!(prompt.contains("scenario discount: 20%"));
    }

    #[tokio::test]
    async fn sends_configured_sampling_once_per_record() {
        let client = Arc::new(ScriptedClient::new(|_| Ok(answer("promotion", 0.8))));
        let sampling = SamplingConfig {
            temperature: 0.1,
            ..SamplingConfig::default()
        };
        let g = ExplanationGenerator::new(client.clone(), Arc::new(StaticContext::default()))
            .with_sampling(sampling);

        g.explain(&record("SKU1")).await;
        assert_eq!(client.calls(), 1);
        assert_eq!(client.last_sampling(), Some(sampling));

        let g = ExplanationGenerator::new(client.clone(), Arc::new(StaticContext::default()));
        g.explain(&record("SKU2")).await;
        assert_eq!(client.last_sampling(), Some(SamplingConfig::default()));
    }

    #[tokio::test]
    async fn disabled_client_always_falls_back() {
        let g = ExplanationGenerator::new(
            Arc::new(DisabledClient::new("GOOGLE_API_KEY is required")),
            Arc::new(StaticContext::default()),
        );
        assert_eq!(g.provider(), Provider::Disabled);
        let exp = g.explain(&record("SKU1")).await;
        assert_eq!(exp.explanation_type, ExplanationType::RuleBased);
        assert_eq!(exp.top_influencer, TopInfluencer::Unknown);
    }
}
