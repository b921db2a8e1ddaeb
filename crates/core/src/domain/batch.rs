use crate::domain::explanation::{Explanation, ExplanationType};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of failure descriptors echoed in the summary.
pub const FAILED_DETAILS_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub explanations: Vec<Explanation>,
    pub failures: Vec<FailureDetail>,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_requested: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage, rounded to 2 decimals.
    pub success_rate: f64,
    pub ai_generated: usize,
    pub rule_based: usize,
    pub failed_details: Vec<FailureDetail>,
    pub processing_time_seconds: f64,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub index: usize,
    pub sku_id: String,
    pub store_id: String,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Explanation produced but rejected by the quality check.
    ValidationFailed,
    /// Batch stopped before this record was processed.
    Cancelled,
}

impl BatchResult {
    pub fn new(
        batch_id: Uuid,
        total_requested: usize,
        explanations: Vec<Explanation>,
        mut failures: Vec<FailureDetail>,
        processing_time_seconds: f64,
        cancelled: bool,
    ) -> Self {
        failures.sort_by_key(|f| f.index);

        let successful = explanations.len();
        let success_rate = if total_requested == 0 {
            0.0
        } else {
            round_to(successful as f64 / total_requested as f64 * 100.0, 2)
        };
        let ai_generated = explanations
            .iter()
            .filter(|e| e.explanation_type == ExplanationType::AiGenerated)
            .count();
        let rule_based = explanations
            .iter()
            .filter(|e| e.explanation_type == ExplanationType::RuleBased)
            .count();

        let summary = BatchSummary {
            total_requested,
            successful,
            failed: failures.len(),
            success_rate,
            ai_generated,
            rule_based,
            failed_details: failures.iter().take(FAILED_DETAILS_LIMIT).cloned().collect(),
            processing_time_seconds: round_to(processing_time_seconds, 3),
            cancelled,
        };

        Self {
            batch_id,
            explanations,
            failures,
            summary,
        }
    }
}

/// Request-level rejection raised before any record is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchCapacityError {
    Empty,
    TooMany { limit: usize, got: usize },
}

impl fmt::Display for BatchCapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchCapacityError::Empty => write!(f, "empty forecast list provided"),
            BatchCapacityError::TooMany { limit, got } => {
                write!(f, "too many rows (limit: {limit} per batch, got {got})")
            }
        }
    }
}

impl std::error::Error for BatchCapacityError {}

pub(crate) fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(index: usize) -> FailureDetail {
        FailureDetail {
            index,
            sku_id: format!("SKU{index}"),
            store_id: "S1".to_string(),
            reason: FailureReason::ValidationFailed,
        }
    }

    #[test]
    fn summary_truncates_details_and_keeps_full_counts() {
        let failures: Vec<_> = (0..8).rev().map(failure).collect();
        let res = BatchResult::new(Uuid::new_v4(), 8, Vec::new(), failures, 1.23456, false);

        assert_eq!(res.summary.failed, 8);
        assert_eq!(res.failures.len(), 8);
        assert_eq!(res.summary.failed_details.len(), FAILED_DETAILS_LIMIT);
        assert_eq!(res.summary.failed_details[0].index, 0);
        assert_eq!(res.summary.success_rate, 0.0);
        assert_eq!(res.summary.processing_time_seconds, 1.235);
    }

    #[test]
    fn capacity_error_messages() {
        assert_eq!(
            BatchCapacityError::TooMany { limit: 100, got: 101 }.to_string(),
            "too many rows (limit: 100 per batch, got 101)"
        );
        assert_eq!(BatchCapacityError::Empty.to_string(), "empty forecast list provided");
    }

    #[test]
    fn round_to_two_decimals() {
        assert_eq!(round_to(2.0 / 3.0 * 100.0, 2), 66.67);
    }
}
