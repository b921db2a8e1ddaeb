use crate::domain::batch::round_to;
use crate::domain::forecast::ForecastRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One untyped input row: column name -> raw cell value.
pub type RawRow = Map<String, Value>;

/// Invalid rows echoed in an ingest report.
pub const INVALID_ROWS_PREVIEW: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub row_index: usize,
    pub errors: Vec<FieldError>,
    pub raw_data: RawRow,
}

/// Non-fatal remark about a valid row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub row_index: usize,
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub record: ForecastRecord,
    pub advisories: Vec<Advisory>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub valid: Vec<ForecastRecord>,
    pub invalid: Vec<ValidationFailure>,
    pub advisories: Vec<Advisory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub total_rows: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub advisory_count: usize,
    pub success_rate: f64,
    pub invalid_rows: Vec<ValidationFailure>,
    pub advisories: Vec<Advisory>,
}

impl IngestReport {
    pub fn total_rows(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    pub fn summary(&self) -> IngestSummary {
        let total_rows = self.total_rows();
        let success_rate = if total_rows == 0 {
            0.0
        } else {
            round_to(self.valid.len() as f64 / total_rows as f64 * 100.0, 2)
        };

        IngestSummary {
            total_rows,
            valid_count: self.valid.len(),
            invalid_count: self.invalid.len(),
            advisory_count: self.advisories.len(),
            success_rate,
            invalid_rows: self.invalid.iter().take(INVALID_ROWS_PREVIEW).cloned().collect(),
            advisories: self.advisories.clone(),
        }
    }
}
