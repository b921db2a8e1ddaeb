use crate::domain::explanation::{Explanation, ExplanationType, TopInfluencer};
use crate::domain::forecast::ForecastRecord;
use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys the model must return. Restated in every prompt.
pub const REQUIRED_KEYS: [&str; 4] = [
    "narrative_explanation",
    "top_influencer",
    "structured_explanation",
    "confidence_score",
];

/// Raw shape of the model's JSON answer, before semantic validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmExplanation {
    pub narrative_explanation: String,
    pub top_influencer: String,
    pub structured_explanation: Value,
    pub confidence_score: Option<f64>,
}

impl LlmExplanation {
    pub fn validate_and_into_explanation(
        self,
        record: &ForecastRecord,
    ) -> anyhow::Result<Explanation> {
        let narrative = self.narrative_explanation.trim().to_string();
        ensure!(!narrative.is_empty(), "narrative_explanation must be non-empty");

        let top_influencer = TopInfluencer::parse(&self.top_influencer).with_context(|| {
            format!("top_influencer is not a known factor: {:?}", self.top_influencer)
        })?;

        let structured_explanation = match self.structured_explanation {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => Default::default(),
            other => bail!("structured_explanation must be an object (got {other})"),
        };

        if let Some(confidence) = self.confidence_score {
            ensure!(
                (0.0..=1.0).contains(&confidence),
                "confidence_score must be between 0 and 1 (got {confidence})"
            );
        }

        Ok(Explanation {
            sku_id: record.sku_id.clone(),
            store_id: record.store_id.clone(),
            forecast_date: record.forecast_date,
            narrative_explanation: narrative,
            top_influencer,
            structured_explanation,
            confidence_score: self.confidence_score,
            explanation_type: ExplanationType::AiGenerated,
        })
    }
}
