use crate::domain::explanation::{Explanation, ExplanationType, TopInfluencer};
use crate::domain::forecast::ForecastRecord;
use serde_json::Value;
use std::collections::BTreeMap;

pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Rule-based explanation from record fields alone. No I/O, cannot fail.
///
/// Influencer precedence: promotion, then holiday, then weather, else unknown.
/// `reason` is appended verbatim so the cause stays visible in the output.
pub fn fallback_explanation(record: &ForecastRecord, reason: &str) -> Explanation {
    let demand = record.predicted_demand;

    let (top_influencer, narrative) = if record.is_promotion() {
        (
            TopInfluencer::Promotion,
            format!("Higher demand ({demand} units) expected due to promotional activity."),
        )
    } else if record.is_holiday() {
        (
            TopInfluencer::Holiday,
            format!("Holiday period driving increased demand forecast of {demand} units."),
        )
    } else if let Some(weather) = record.active_weather() {
        (
            TopInfluencer::Weather,
            format!("Weather conditions ({weather}) influencing demand forecast of {demand} units."),
        )
    } else {
        (
            TopInfluencer::Unknown,
            format!("Forecast for {demand} units based on historical patterns."),
        )
    };

    let mut structured_explanation = BTreeMap::new();
    structured_explanation.insert("error".to_string(), Value::String(reason.to_string()));
    structured_explanation.insert(
        "method".to_string(),
        Value::String("rule_based_fallback".to_string()),
    );

    Explanation {
        sku_id: record.sku_id.clone(),
        store_id: record.store_id.clone(),
        forecast_date: record.forecast_date,
        narrative_explanation: format!("{narrative} Note: {reason}"),
        top_influencer,
        structured_explanation,
        confidence_score: Some(FALLBACK_CONFIDENCE),
        explanation_type: ExplanationType::RuleBased,
    }
}
