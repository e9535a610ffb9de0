pub const SCHEMA: &str = r#"
-- daily_summaries table: one row per calendar date
CREATE TABLE IF NOT EXISTS daily_summaries (
    date TEXT PRIMARY KEY,
    readiness INTEGER,
    sleep_hours REAL,
    rhr INTEGER,
    hrv INTEGER,
    raw_json TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
