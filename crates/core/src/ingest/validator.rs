use crate::domain::forecast::{ForecastRecord, WeatherType};
use crate::ingest::types::{
    Advisory, FieldError, IngestReport, RawRow, ValidatedRow, ValidationFailure,
};
use chrono::NaiveDate;
use serde_json::Value;

// Cell values that mean "no value", as CSV exporters and dataframe tools write them.
// Compared case-insensitively.
const MISSING_SENTINELS: &[&str] = &[
    "", "#n/a", "#na", "<na>", "n/a", "na", "null", "nan", "-nan", "none",
];

// `none` is a real value in this column.
const WEATHER_TYPE: &str = "weather_type";

const MAX_WEATHER_SEVERITY: u8 = 3;

/// Validate a whole batch. Every row is checked independently.
pub fn validate_rows(rows: &[RawRow]) -> IngestReport {
    let mut report = IngestReport::default();
    for (row_index, raw) in rows.iter().enumerate() {
        match validate_row(row_index, raw) {
            Ok(validated) => {
                report.advisories.extend(validated.advisories);
                report.valid.push(validated.record);
            }
            Err(failure) => {
                tracing::debug!(
                    row_index,
                    errors = failure.errors.len(),
                    "forecast row rejected"
                );
                report.invalid.push(failure);
            }
        }
    }
    report
}

/// Coerce one raw row into a `ForecastRecord`, collecting every field error.
pub fn validate_row(row_index: usize, raw: &RawRow) -> Result<ValidatedRow, ValidationFailure> {
    let mut r = RowReader::new(raw);

    let sku_id = r.required_text("sku_id");
    let store_id = r.required_text("store_id");
    let forecast_date = r.required_date("forecast_date");
    let generated_at = r.required_date("generated_at");
    let predicted_demand = r.required_count("predicted_demand");

    let hist_sales_1w = r.count("hist_sales_1w");
    let hist_sales_4w_avg = r.count("hist_sales_4w_avg");
    let conf_interval_lower = r.count("conf_interval_lower");
    let conf_interval_upper = r.count("conf_interval_upper");
    if let (Some(lower), Some(upper)) = (conf_interval_lower, conf_interval_upper) {
        if upper < lower {
            r.error(
                "conf_interval_upper",
                format!("conf_interval_upper ({upper}) cannot be less than conf_interval_lower ({lower})"),
            );
        }
    }

    let weather_type = r.weather_type("weather_type");
    let weather_severity = if weather_type == Some(WeatherType::None) {
        // No weather means no severity, whatever the input says.
        None
    } else {
        r.severity("weather_severity")
    };

    let holiday_flag = r.flag("holiday_flag");
    let event_type = r.text("event_type");
    let promotion_flag = r.flag("promotion_flag");
    let social_sentiment_score = r.score("social_sentiment_score", -1.0, 1.0);

    let anomaly_flag = r.flag("anomaly_flag");
    let supply_constraint_flag = r.flag("supply_constraint_flag");

    if !r.errors.is_empty() {
        return Err(ValidationFailure {
            row_index,
            errors: r.errors,
            raw_data: raw.clone(),
        });
    }

    // Every required field either produced a value or pushed an error above.
    let (
        Some(sku_id),
        Some(store_id),
        Some(forecast_date),
        Some(generated_at),
        Some(predicted_demand),
    ) = (sku_id, store_id, forecast_date, generated_at, predicted_demand)
    else {
        return Err(ValidationFailure {
            row_index,
            errors: vec![FieldError::new("row", "required field missing")],
            raw_data: raw.clone(),
        });
    };

    let mut advisories = Vec::new();
    if promotion_flag == Some(true) && social_sentiment_score.is_none() {
        tracing::warn!(
            row_index,
            %sku_id,
            "promotion_flag is set but social_sentiment_score is missing"
        );
        advisories.push(Advisory {
            row_index,
            field: "social_sentiment_score".to_string(),
            message: "promotion_flag is true but social_sentiment_score is missing; \
                      consider providing sentiment data for promotional periods"
                .to_string(),
        });
    }

    Ok(ValidatedRow {
        record: ForecastRecord {
            sku_id,
            store_id,
            forecast_date,
            generated_at,
            predicted_demand,
            hist_sales_1w,
            hist_sales_4w_avg,
            conf_interval_lower,
            conf_interval_upper,
            weather_type,
            weather_severity,
            holiday_flag,
            event_type,
            promotion_flag,
            social_sentiment_score,
            anomaly_flag,
            supply_constraint_flag,
        },
        advisories,
    })
}

struct RowReader<'a> {
    raw: &'a RawRow,
    errors: Vec<FieldError>,
}

impl<'a> RowReader<'a> {
    fn new(raw: &'a RawRow) -> Self {
        Self {
            raw,
            errors: Vec::new(),
        }
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// The cell value, or `None` when missing, null, or a missing-value sentinel.
    fn present(&self, field: &str) -> Option<&'a Value> {
        match self.raw.get(field)? {
            Value::Null => None,
            Value::String(s) if is_missing(field, s) => None,
            v => Some(v),
        }
    }

    fn require<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() && self.present(field).is_none() {
            self.error(field, "field required");
        }
        value
    }

    fn text(&mut self, field: &str) -> Option<String> {
        let v = self.present(field)?;
        match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => {
                self.error(field, format!("expected text, got {other}"));
                None
            }
        }
    }

    fn required_text(&mut self, field: &str) -> Option<String> {
        let v = self.text(field);
        self.require(field, v)
    }

    fn date(&mut self, field: &str) -> Option<NaiveDate> {
        let v = self.present(field)?;
        let parsed = v
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok());
        if parsed.is_none() {
            self.error(field, format!("expected a YYYY-MM-DD date, got {v}"));
        }
        parsed
    }

    fn required_date(&mut self, field: &str) -> Option<NaiveDate> {
        let v = self.date(field);
        self.require(field, v)
    }

    fn count(&mut self, field: &str) -> Option<u32> {
        let v = self.present(field)?;
        match coerce_count(v) {
            Ok(n) => Some(n),
            Err(message) => {
                self.error(field, message);
                None
            }
        }
    }

    fn required_count(&mut self, field: &str) -> Option<u32> {
        let v = self.count(field);
        self.require(field, v)
    }

    fn flag(&mut self, field: &str) -> Option<bool> {
        let v = self.present(field)?;
        let parsed = coerce_flag(v);
        if parsed.is_none() {
            self.error(field, format!("expected a boolean (true/false, 1/0, yes/no), got {v}"));
        }
        parsed
    }

    fn number(&mut self, field: &str) -> Option<f64> {
        let v = self.present(field)?;
        let parsed = match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|n| n.is_finite());
        if parsed.is_none() {
            self.error(field, format!("expected a number, got {v}"));
        }
        parsed
    }

    fn score(&mut self, field: &str, min: f64, max: f64) -> Option<f64> {
        let n = self.number(field)?;
        if !(min..=max).contains(&n) {
            self.error(field, format!("must be between {min} and {max} (got {n})"));
            return None;
        }
        Some(n)
    }

    fn severity(&mut self, field: &str) -> Option<u8> {
        let n = self.count(field)?;
        match u8::try_from(n) {
            Ok(s) if s <= MAX_WEATHER_SEVERITY => Some(s),
            _ => {
                self.error(
                    field,
                    format!("must be between 0 and {MAX_WEATHER_SEVERITY} (got {n})"),
                );
                None
            }
        }
    }

    fn weather_type(&mut self, field: &str) -> Option<WeatherType> {
        let v = self.present(field)?;
        let parsed = v.as_str().and_then(WeatherType::parse);
        if parsed.is_none() {
            self.error(
                field,
                format!("expected one of rain, sunny, cloudy, snow, none (got {v})"),
            );
        }
        parsed
    }
}

fn is_missing(field: &str, s: &str) -> bool {
    let s = s.trim();
    if field == WEATHER_TYPE && s.eq_ignore_ascii_case("none") {
        return false;
    }
    MISSING_SENTINELS
        .iter()
        .any(|sentinel| sentinel.eq_ignore_ascii_case(s))
}

fn coerce_count(v: &Value) -> Result<u32, String> {
    let n: f64 = match v {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return u32::try_from(u).map_err(|_| format!("value too large (got {u})"));
            }
            n.as_f64().ok_or_else(|| format!("expected a whole number, got {v}"))?
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                i as f64
            } else {
                s.parse::<f64>()
                    .map_err(|_| format!("expected a whole number, got {v}"))?
            }
        }
        _ => return Err(format!("expected a whole number, got {v}")),
    };

    if !n.is_finite() || n.fract() != 0.0 {
        return Err(format!("expected a whole number, got {v}"));
    }
    if n < 0.0 {
        return Err(format!("must be greater than or equal to 0 (got {n})"));
    }
    if n > u32::MAX as f64 {
        return Err(format!("value too large (got {n})"));
    }
    Ok(n as u32)
}

fn coerce_flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 0.0 => Some(false),
            Some(x) if x == 1.0 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "1.0" | "true" | "t" | "yes" | "y" => Some(true),
            "0" | "0.0" | "false" | "f" | "no" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
