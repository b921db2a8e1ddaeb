use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One validated SKU/store/date demand prediction.
///
/// Only `ingest::validator` builds these; the weather and confidence-interval
/// invariants hold for every value that leaves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub sku_id: String,
    pub store_id: String,
    pub forecast_date: NaiveDate,
    pub generated_at: NaiveDate,

    pub predicted_demand: u32,
    pub hist_sales_1w: Option<u32>,
    pub hist_sales_4w_avg: Option<u32>,
    pub conf_interval_lower: Option<u32>,
    pub conf_interval_upper: Option<u32>,

    pub weather_type: Option<WeatherType>,
    /// 0 = mild, 3 = severe. Always `None` when `weather_type` is `None` or `WeatherType::None`.
    pub weather_severity: Option<u8>,
    pub holiday_flag: Option<bool>,
    pub event_type: Option<String>,
    pub promotion_flag: Option<bool>,
    /// -1 = negative, 1 = positive.
    pub social_sentiment_score: Option<f64>,

    pub anomaly_flag: Option<bool>,
    pub supply_constraint_flag: Option<bool>,
}

impl ForecastRecord {
    pub fn is_promotion(&self) -> bool {
        self.promotion_flag == Some(true)
    }

    pub fn is_holiday(&self) -> bool {
        self.holiday_flag == Some(true)
    }

    /// Weather that actually carries a signal (present and not `none`).
    pub fn active_weather(&self) -> Option<WeatherType> {
        self.weather_type.filter(|w| *w != WeatherType::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherType {
    Rain,
    Sunny,
    Cloudy,
    Snow,
    None,
}

impl WeatherType {
    pub const ALL: [WeatherType; 5] = [
        WeatherType::Rain,
        WeatherType::Sunny,
        WeatherType::Cloudy,
        WeatherType::Snow,
        WeatherType::None,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WeatherType::Rain => "rain",
            WeatherType::Sunny => "sunny",
            WeatherType::Cloudy => "cloudy",
            WeatherType::Snow => "snow",
            WeatherType::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|w| w.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for WeatherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_type_parse_is_case_insensitive() {
        assert_eq!(WeatherType::parse(" Rain "), Some(WeatherType::Rain));
        assert_eq!(WeatherType::parse("NONE"), Some(WeatherType::None));
        assert_eq!(WeatherType::parse("hail"), None);
    }

    #[test]
    fn active_weather_ignores_none() {
        let mut r = fixtures::record("SKU1");
        r.weather_type = Some(WeatherType::None);
        assert_eq!(r.active_weather(), None);
        r.weather_type = Some(WeatherType::Snow);
        assert_eq!(r.active_weather(), Some(WeatherType::Snow));
    }
}
