use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{DailySummary, DayRecord, RhrSource};

/// The calendar date used for "today" throughout: local wall-clock time.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Capability: fetch the daily metrics summary for a given date.
///
/// `fetch_range` is built on `fetch_daily`, so implementations (including
/// test doubles) only need to supply the single-date fetch.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn fetch_daily(&self, date: NaiveDate) -> Result<DailySummary>;

    /// Fetch `days` consecutive summaries ending today, oldest first.
    /// A failed day becomes a placeholder record instead of aborting the batch.
    async fn fetch_range(&self, days: u32) -> Vec<DayRecord> {
        let today = today();
        let mut records = Vec::with_capacity(days as usize);

        for i in 0..days {
            let date = today - chrono::Duration::days(i64::from(i));
            match self.fetch_daily(date).await {
                Ok(summary) => records.push(DayRecord::Summary(summary)),
                Err(e) => {
                    tracing::debug!(%date, error = %e, "fetch failed, recording placeholder");
                    records.push(DayRecord::Failed {
                        date,
                        error: e.to_string(),
                    });
                }
            }
        }

        records.reverse();
        records
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    #[serde(default)]
    data: Vec<Value>,
}

pub struct OuraClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    rhr_source: RhrSource,
}

impl OuraClient {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("oura-sync/0.1")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.clone(),
            access_token: config.access_token.clone(),
            rhr_source: config.rhr_source,
        }
    }

    fn token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AppError::MissingToken)
    }

    /// One single-day range query against a usercollection endpoint.
    async fn get_collection(&self, endpoint: &str, date: NaiveDate) -> Result<Vec<Value>> {
        let token = self.token()?;
        let date_str = date.to_string();

        let response = self
            .client
            .get(format!("{}/usercollection/{}", self.base_url, endpoint))
            .bearer_auth(token)
            .query(&[("start_date", date_str.as_str()), ("end_date", date_str.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::OuraApi(format!(
                "{} returned HTTP {}",
                endpoint,
                response.status()
            )));
        }

        let envelope: DataEnvelope = response.json().await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl MetricsProvider for OuraClient {
    async fn fetch_daily(&self, date: NaiveDate) -> Result<DailySummary> {
        let readiness = self.get_collection("daily_readiness", date).await?;
        let sleep = self.get_collection("daily_sleep", date).await?;
        Ok(extract_summary(date, readiness, sleep, self.rhr_source))
    }
}

/// Canonical field mapping from the raw upstream arrays to a summary.
///
/// Upstream returns at most one entry for a single-day range; only the first
/// element is consulted. Empty arrays leave the affected fields unset.
fn extract_summary(
    date: NaiveDate,
    readiness: Vec<Value>,
    sleep: Vec<Value>,
    rhr_source: RhrSource,
) -> DailySummary {
    let readiness_score = readiness.first().and_then(|r| r.get("score")).and_then(Value::as_i64);

    let mut sleep_hours = None;
    let mut rhr = None;
    let mut hrv = None;

    if let Some(s) = sleep.first() {
        sleep_hours = s
            .get("total_sleep_duration")
            .and_then(Value::as_f64)
            .map(|secs| (secs / 3600.0 * 100.0).round() / 100.0);

        rhr = match rhr_source {
            RhrSource::LowestHeartRate => field_i64(s, "lowest_heart_rate")
                .or_else(|| field_i64(s, "average_heart_rate")),
            RhrSource::AverageBpm => field_i64(s, "average_bpm"),
        };

        hrv = field_i64(s, "average_hrv");
    }

    DailySummary {
        date,
        readiness_score,
        sleep_hours,
        rhr,
        hrv,
        raw: Some(json!({ "readiness": readiness, "sleep": sleep })),
    }
}

fn field_i64(entry: &Value, key: &str) -> Option<i64> {
    entry
        .get(key)
        .and_then(Value::as_f64)
        .map(|v| v.round() as i64)
}
