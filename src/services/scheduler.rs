use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use tokio::sync::watch;

use crate::db::Repository;
use crate::error::Result;
use crate::oura::{today, MetricsProvider};

/// Background task that refreshes today's metrics once per day.
///
/// The loop alternates between waiting and refreshing: it refreshes once on
/// startup, then sleeps until the configured local time tomorrow, racing the
/// timer against the stop channel. A stop signal during the wait ends the
/// loop without a final refresh; a refresh already underway always completes.
pub struct Scheduler {
    provider: Arc<dyn MetricsProvider>,
    repository: Arc<Repository>,
    refresh_at: NaiveTime,
}

impl Scheduler {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        repository: Arc<Repository>,
        refresh_hour: u32,
        refresh_minute: u32,
    ) -> Self {
        let refresh_at = NaiveTime::from_hms_opt(refresh_hour, refresh_minute, 0)
            .unwrap_or_else(|| {
                tracing::warn!(
                    refresh_hour,
                    refresh_minute,
                    "invalid refresh time in config, using 02:30"
                );
                NaiveTime::from_hms_opt(2, 30, 0).expect("02:30 is a valid time")
            });

        Self {
            provider,
            repository,
            refresh_at,
        }
    }

    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        // Best-effort refresh on startup
        self.refresh_once().await;

        loop {
            let wait = self.until_next_run(Local::now());
            tracing::info!(wait_secs = wait.as_secs(), "waiting for next refresh slot");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.refresh_once().await;
                }
                _ = stop.changed() => {
                    tracing::info!("stop signal received, scheduler exiting");
                    return;
                }
            }
        }
    }

    /// Fetch today's summary and upsert it. Failures are logged, never fatal;
    /// the next scheduled slot is the retry.
    async fn refresh_once(&self) {
        let date = today();
        tracing::info!(%date, "refreshing daily metrics");

        match self.refresh(date).await {
            Ok(()) => tracing::info!(%date, "daily metrics stored"),
            Err(e) => tracing::error!(
                %date,
                error = %e,
                "daily refresh failed, deferring to the next scheduled slot"
            ),
        }
    }

    async fn refresh(&self, date: chrono::NaiveDate) -> Result<()> {
        let summary = self.provider.fetch_daily(date).await?;
        self.repository.upsert_summary(summary).await?;
        Ok(())
    }

    fn until_next_run(&self, now: DateTime<Local>) -> Duration {
        (next_run_after(now, self.refresh_at) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Next run instant: tomorrow at `refresh_at` local time, always a full day
/// ahead even when `refresh_at` has not yet passed today.
fn next_run_after(now: DateTime<Local>, refresh_at: NaiveTime) -> DateTime<Local> {
    let tomorrow = now.date_naive() + chrono::Duration::days(1);
    match Local.from_local_datetime(&tomorrow.and_time(refresh_at)) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => dt,
        // refresh_at falls inside a DST gap; a plain +24h keeps the cadence
        chrono::LocalResult::None => now + chrono::Duration::days(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::error::AppError;
    use crate::models::DailySummary;

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingProvider {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MetricsProvider for CountingProvider {
        async fn fetch_daily(&self, date: NaiveDate) -> crate::error::Result<DailySummary> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::OuraApi("daily_sleep returned HTTP 500".into()));
            }
            Ok(DailySummary {
                date,
                readiness_score: Some(72),
                sleep_hours: Some(8.0),
                rhr: Some(50),
                hrv: Some(38),
                raw: None,
            })
        }
    }

    async fn temp_repo() -> (tempfile::TempDir, Arc<Repository>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        (dir, Arc::new(repo))
    }

    #[test]
    fn next_run_is_tomorrow_at_the_refresh_time() {
        let refresh_at = NaiveTime::from_hms_opt(2, 30, 0).unwrap();

        let now = Local.with_ymd_and_hms(2026, 8, 29, 10, 0, 0).unwrap();
        let next = next_run_after(now, refresh_at);
        assert_eq!(next, Local.with_ymd_and_hms(2026, 8, 30, 2, 30, 0).unwrap());

        // Even before 02:30, the next slot is still tomorrow's
        let early = Local.with_ymd_and_hms(2026, 8, 29, 1, 0, 0).unwrap();
        let next = next_run_after(early, refresh_at);
        assert_eq!(next, Local.with_ymd_and_hms(2026, 8, 30, 2, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn startup_refresh_stores_todays_summary() {
        let provider = CountingProvider::new(false);
        let (_dir, repo) = temp_repo().await;
        let scheduler = Scheduler::new(provider.clone(), repo.clone(), 2, 30);

        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();
        scheduler.run(stop_rx).await;

        assert_eq!(provider.calls(), 1);
        let latest = repo.get_latest().await.unwrap().unwrap();
        assert_eq!(latest.date, today());
        assert_eq!(latest.readiness_score, Some(72));
    }

    #[tokio::test]
    async fn stop_during_wait_exits_without_extra_refresh() {
        let provider = CountingProvider::new(false);
        let (_dir, repo) = temp_repo().await;
        let scheduler = Scheduler::new(provider.clone(), repo, 2, 30);

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(stop_rx).await });

        // Let the startup refresh complete and the loop reach the wait
        tokio::time::sleep(Duration::from_millis(200)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_the_next_slot_scheduled() {
        let provider = CountingProvider::new(true);
        let (_dir, repo) = temp_repo().await;
        let scheduler = Scheduler::new(provider.clone(), repo.clone(), 2, 30);

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(stop_rx).await });

        // Paused time auto-advances through the 02:30 slots; two days is
        // enough for the startup refresh plus at least one scheduled one.
        tokio::time::sleep(Duration::from_secs(48 * 3600)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(provider.calls() >= 2, "calls = {}", provider.calls());
        // Every refresh failed, so nothing was stored
        assert!(repo.get_latest().await.unwrap().is_none());
    }
}
