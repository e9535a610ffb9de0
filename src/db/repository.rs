use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::DailySummary;

use super::schema::SCHEMA;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Insert the summary, or overwrite every field if a row for that date
    /// already exists. Single statement, commits immediately.
    pub async fn upsert_summary(&self, summary: DailySummary) -> Result<()> {
        let raw_json = summary
            .raw
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO daily_summaries (date, readiness, sleep_hours, rhr, hrv, raw_json, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
                       ON CONFLICT(date) DO UPDATE SET
                           readiness = excluded.readiness,
                           sleep_hours = excluded.sleep_hours,
                           rhr = excluded.rhr,
                           hrv = excluded.hrv,
                           raw_json = excluded.raw_json,
                           updated_at = datetime('now')"#,
                    params![
                        summary.date.to_string(),
                        summary.readiness_score,
                        summary.sleep_hours,
                        summary.rhr,
                        summary.hrv,
                        raw_json,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Newest stored row by date (ISO strings sort chronologically),
    /// or `None` when the table is empty.
    pub async fn get_latest(&self) -> Result<Option<DailySummary>> {
        let summary = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT date, readiness, sleep_hours, rhr, hrv, raw_json
                     FROM daily_summaries ORDER BY date DESC LIMIT 1",
                )?;
                let summary = stmt
                    .query_row([], |row| Ok(summary_from_row(row)))
                    .optional()?;
                Ok(summary)
            })
            .await?;
        Ok(summary)
    }

    #[allow(dead_code)]
    pub async fn get_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>> {
        let date_str = date.to_string();
        let summary = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT date, readiness, sleep_hours, rhr, hrv, raw_json
                     FROM daily_summaries WHERE date = ?1",
                )?;
                let summary = stmt
                    .query_row(params![date_str], |row| Ok(summary_from_row(row)))
                    .optional()?;
                Ok(summary)
            })
            .await?;
        Ok(summary)
    }
}

fn summary_from_row(row: &Row) -> DailySummary {
    DailySummary {
        date: row
            .get::<_, String>(0)
            .ok()
            .and_then(|s| s.parse::<NaiveDate>().ok())
            .unwrap_or_default(),
        readiness_score: row.get(1).unwrap(),
        sleep_hours: row.get(2).unwrap(),
        rhr: row.get(3).unwrap(),
        hrv: row.get(4).unwrap(),
        raw: row
            .get::<_, Option<String>>(5)
            .unwrap()
            .and_then(|s| serde_json::from_str(&s).ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary(date: &str, readiness: Option<i64>) -> DailySummary {
        DailySummary {
            date: date.parse().unwrap(),
            readiness_score: readiness,
            sleep_hours: Some(7.5),
            rhr: Some(52),
            hrv: Some(41),
            raw: Some(json!({"readiness": [], "sleep": []})),
        }
    }

    async fn temp_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        (dir, repo)
    }

    #[tokio::test]
    async fn get_latest_on_empty_store_returns_none() {
        let (_dir, repo) = temp_repo().await;
        assert!(repo.get_latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_then_get_latest_round_trips() {
        let (_dir, repo) = temp_repo().await;
        let s = summary("2026-08-29", Some(81));
        repo.upsert_summary(s.clone()).await.unwrap();

        let latest = repo.get_latest().await.unwrap().unwrap();
        assert_eq!(latest, s);
    }

    #[tokio::test]
    async fn upsert_same_date_twice_keeps_one_row_with_second_values() {
        let (_dir, repo) = temp_repo().await;
        repo.upsert_summary(summary("2026-08-29", Some(60))).await.unwrap();

        let second = DailySummary {
            date: "2026-08-29".parse().unwrap(),
            readiness_score: Some(90),
            sleep_hours: None,
            rhr: None,
            hrv: None,
            raw: None,
        };
        repo.upsert_summary(second.clone()).await.unwrap();

        // All fields replaced, including the ones the second write left empty
        let stored = repo.get_summary("2026-08-29".parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(stored, second);
        assert_eq!(repo.get_latest().await.unwrap().unwrap(), second);
    }

    #[tokio::test]
    async fn get_latest_returns_chronologically_later_date() {
        let (_dir, repo) = temp_repo().await;
        repo.upsert_summary(summary("2026-08-30", Some(70))).await.unwrap();
        repo.upsert_summary(summary("2026-08-29", Some(99))).await.unwrap();

        let latest = repo.get_latest().await.unwrap().unwrap();
        assert_eq!(latest.date.to_string(), "2026-08-30");
        assert_eq!(latest.readiness_score, Some(70));
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        repo.upsert_summary(summary("2026-08-29", Some(75))).await.unwrap();
        drop(repo);

        // Reopening runs the schema again and keeps existing rows
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        assert!(repo.get_latest().await.unwrap().is_some());
    }
}
