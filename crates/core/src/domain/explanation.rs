use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub sku_id: String,
    pub store_id: String,
    pub forecast_date: NaiveDate,
    pub narrative_explanation: String,
    pub top_influencer: TopInfluencer,
    /// Factor name -> impact description.
    pub structured_explanation: BTreeMap<String, Value>,
    pub confidence_score: Option<f64>,
    pub explanation_type: ExplanationType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopInfluencer {
    Weather,
    Holiday,
    Event,
    Promotion,
    SocialTrend,
    HistoricalPattern,
    SupplyConstraint,
    Anomaly,
    Unknown,
}

impl TopInfluencer {
    pub const ALL: [TopInfluencer; 9] = [
        TopInfluencer::Weather,
        TopInfluencer::Holiday,
        TopInfluencer::Event,
        TopInfluencer::Promotion,
        TopInfluencer::SocialTrend,
        TopInfluencer::HistoricalPattern,
        TopInfluencer::SupplyConstraint,
        TopInfluencer::Anomaly,
        TopInfluencer::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TopInfluencer::Weather => "weather",
            TopInfluencer::Holiday => "holiday",
            TopInfluencer::Event => "event",
            TopInfluencer::Promotion => "promotion",
            TopInfluencer::SocialTrend => "social_trend",
            TopInfluencer::HistoricalPattern => "historical_pattern",
            TopInfluencer::SupplyConstraint => "supply_constraint",
            TopInfluencer::Anomaly => "anomaly",
            TopInfluencer::Unknown => "unknown",
        }
    }

    /// Lenient parse of model output: case, surrounding whitespace, spaces and
    /// hyphens are ignored, and a trailing plural `s` is accepted ("Social Trends").
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        let find = |candidate: &str| Self::ALL.into_iter().find(|i| i.as_str() == candidate);
        find(&normalized).or_else(|| normalized.strip_suffix('s').and_then(find))
    }

    /// Pipe-separated list used when restating the output schema.
    pub fn schema_choices() -> String {
        Self::ALL
            .iter()
            .map(|i| i.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }
}

impl fmt::Display for TopInfluencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationType {
    AiGenerated,
    RuleBased,
    Manual,
}
