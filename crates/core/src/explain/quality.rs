use crate::domain::explanation::{Explanation, TopInfluencer};
use std::fmt;

pub const MIN_NARRATIVE_CHARS: usize = 20;
/// An `unknown` influencer above this confidence is contradictory.
pub const MAX_UNKNOWN_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityIssue {
    NarrativeTooShort,
    ConfidentButUnexplained,
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityIssue::NarrativeTooShort => {
                write!(f, "narrative shorter than {MIN_NARRATIVE_CHARS} characters")
            }
            QualityIssue::ConfidentButUnexplained => write!(
                f,
                "unknown influencer with confidence above {MAX_UNKNOWN_CONFIDENCE}"
            ),
        }
    }
}

pub fn quality_issue(explanation: &Explanation) -> Option<QualityIssue> {
    if explanation.narrative_explanation.chars().count() < MIN_NARRATIVE_CHARS {
        return Some(QualityIssue::NarrativeTooShort);
    }
    if explanation.top_influencer == TopInfluencer::Unknown
        && explanation
            .confidence_score
            .is_some_and(|c| c > MAX_UNKNOWN_CONFIDENCE)
    {
        return Some(QualityIssue::ConfidentButUnexplained);
    }
    None
}

pub fn validate_explanation(explanation: &Explanation) -> bool {
    quality_issue(explanation).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::explanation::ExplanationType;
    use chrono::NaiveDate;

    fn explanation(narrative: &str, influencer: TopInfluencer, confidence: f64) -> Explanation {
        Explanation {
            sku_id: "SKU1".to_string(),
            store_id: "S1".to_string(),
            forecast_date: NaiveDate::from_ymd_opt(2024, 12, 25).unwrap(),
            narrative_explanation: narrative.to_string(),
            top_influencer: influencer,
            structured_explanation: Default::default(),
            confidence_score: Some(confidence),
            explanation_type: ExplanationType::AiGenerated,
        }
    }

    #[test]
    fn rejects_short_narrative() {
        let e = explanation("Short", TopInfluencer::Event, 0.5);
        assert!(!validate_explanation(&e));
        assert_eq!(quality_issue(&e), Some(QualityIssue::NarrativeTooShort));
    }

    #[test]
    fn rejects_confident_unknown() {
        let narrative = "a".repeat(30);
        let e = explanation(&narrative, TopInfluencer::Unknown, 0.9);
        assert_eq!(quality_issue(&e), Some(QualityIssue::ConfidentButUnexplained));
    }

    #[test]
    fn accepts_reasonable_explanations() {
        let narrative = "Promotion drives a clear uplift this week.";
        assert!(validate_explanation(&explanation(narrative, TopInfluencer::Promotion, 0.95)));
        assert!(validate_explanation(&explanation(narrative, TopInfluencer::Unknown, 0.7)));
        assert!(validate_explanation(&explanation(&"b".repeat(20), TopInfluencer::Holiday, 0.5)));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let narrative = "é".repeat(19);
        assert!(!validate_explanation(&explanation(&narrative, TopInfluencer::Weather, 0.5)));
    }
}
