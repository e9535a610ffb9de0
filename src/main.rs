use std::sync::Arc;

use chrono::NaiveDate;

mod config;
mod db;
mod error;
mod models;
mod oura;
mod services;

use config::Config;
use db::Repository;
use error::{AppError, Result};
use oura::{today, MetricsProvider, OuraClient};
use services::Scheduler;

/// CLI mode, parsed from the arguments after the program name.
#[derive(Debug, PartialEq)]
enum Mode {
    Daily(Option<NaiveDate>),
    Range(u32),
    Refresh,
    Latest,
    Scheduler,
}

impl Mode {
    fn parse(args: &[String]) -> Result<Self> {
        match args.first().map(String::as_str) {
            None => Ok(Mode::Scheduler),

            Some("--daily") => {
                let date = match args.get(1) {
                    Some(s) => Some(s.parse().map_err(|_| {
                        AppError::Config(format!("invalid date {:?} (expected YYYY-MM-DD)", s))
                    })?),
                    None => None,
                };
                Ok(Mode::Daily(date))
            }

            Some("--range") => {
                let days = args
                    .get(1)
                    .and_then(|s| s.parse().ok())
                    .filter(|d| *d >= 1)
                    .ok_or_else(|| {
                        AppError::Config("--range requires a day count of at least 1".to_string())
                    })?;
                Ok(Mode::Range(days))
            }

            Some("--refresh") => Ok(Mode::Refresh),
            Some("--latest") => Ok(Mode::Latest),

            Some(other) => Err(AppError::Config(format!("unknown flag {:?}", other))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = match Mode::parse(&args) {
        Ok(mode) => mode,
        Err(e) => {
            print_usage();
            return Err(e);
        }
    };

    // Load configuration
    let config = Config::load()?;

    match mode {
        // On-demand fetch for one date (default today), no persistence
        Mode::Daily(date) => {
            let client = OuraClient::new(&config);
            let summary = client.fetch_daily(date.unwrap_or_else(today)).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        // Last N days including today, oldest first
        Mode::Range(days) => {
            let client = OuraClient::new(&config);
            let records = client.fetch_range(days).await;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }

        // Headless one-shot refresh: fetch today and upsert, then exit
        Mode::Refresh => {
            let client = OuraClient::new(&config);
            let repository = Repository::new(&config.db_path).await?;
            let summary = client.fetch_daily(today()).await?;
            let date = summary.date;
            repository.upsert_summary(summary).await?;
            println!("Refreshed metrics for {}", date);
        }

        // Newest stored row
        Mode::Latest => {
            let repository = Repository::new(&config.db_path).await?;
            match repository.get_latest().await? {
                Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
                None => println!("No data stored yet"),
            }
        }

        // Default: run the daily scheduler until Ctrl-C
        Mode::Scheduler => run_scheduler(&config).await?,
    }

    Ok(())
}

async fn run_scheduler(config: &Config) -> Result<()> {
    let provider: Arc<dyn MetricsProvider> = Arc::new(OuraClient::new(config));
    let repository = Arc::new(Repository::new(&config.db_path).await?);
    let scheduler = Scheduler::new(
        provider,
        repository,
        config.refresh_hour,
        config.refresh_minute,
    );

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { scheduler.run(stop_rx).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, stopping scheduler");
    let _ = stop_tx.send(true);
    handle
        .await
        .map_err(|e| anyhow::anyhow!("scheduler task panicked: {e}"))?;

    Ok(())
}

fn print_usage() {
    eprintln!("Usage: oura-sync [--daily [YYYY-MM-DD] | --range N | --refresh | --latest]");
    eprintln!("  (no flags)          run the daily refresh scheduler");
    eprintln!("  --daily [date]      fetch one day's metrics and print JSON");
    eprintln!("  --range N           fetch the last N days, oldest first");
    eprintln!("  --refresh           fetch today and store it, then exit");
    eprintln!("  --latest            print the newest stored summary");
}
