use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One day's worth of metrics, keyed by calendar date.
///
/// Metric fields are `None` when the upstream `data` array for that day was
/// empty or the source field was missing. A later fetch for the same date
/// replaces the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub readiness_score: Option<i64>,
    pub sleep_hours: Option<f64>,
    pub rhr: Option<i64>,
    pub hrv: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// Element of a range fetch: either the day's summary or a placeholder
/// recording why that day could not be fetched.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DayRecord {
    Summary(DailySummary),
    Failed { date: NaiveDate, error: String },
}

impl DayRecord {
    #[allow(dead_code)]
    pub fn date(&self) -> NaiveDate {
        match self {
            DayRecord::Summary(summary) => summary.date,
            DayRecord::Failed { date, .. } => *date,
        }
    }
}

/// Which upstream field supplies the resting heart rate.
///
/// The Oura sleep entry carries several candidates and no single one is
/// authoritative, so the mapping is a config choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RhrSource {
    /// `lowest_heart_rate`, falling back to `average_heart_rate`.
    #[default]
    LowestHeartRate,
    /// `average_bpm` only.
    AverageBpm,
}
