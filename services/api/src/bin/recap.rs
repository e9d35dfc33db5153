//! services/api/src/bin/recap.rs
//!
//! One-shot automated recap run, meant to be fired by external cron at the
//! cycle boundary (04:00 local for the daily cycle, Sunday for the weekly
//! one). Prints the report as JSON on stdout.

use api_lib::{adapters::PgStore, config::Config, error::ApiError, web::rest::RecapResponse};
use commitment_core::domain::CycleType;
use commitment_core::recap::RecapAggregator;
use commitment_core::windows::{WindowCalculator, WindowMode};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cycle_arg = std::env::args().nth(1).unwrap_or_else(|| "daily".to_string());
    let cycle = CycleType::parse(&cycle_arg).ok_or_else(|| {
        ApiError::Internal(format!(
            "Unknown cycle type '{}': expected 'daily' or 'weekly'",
            cycle_arg
        ))
    })?;

    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgStore::new(db_pool));

    let windows = WindowCalculator::new(config.reference_tz);
    let aggregator = RecapAggregator::new(store, windows);

    info!(cycle = cycle.as_str(), "Generating automated recap...");
    let report = aggregator.generate(cycle, WindowMode::Automated).await?;
    info!(
        total = report.total,
        completed = report.completed,
        users = report.user_stats.len(),
        "Recap generated"
    );

    let response = RecapResponse::from_report(report);
    println!(
        "{}",
        serde_json::to_string_pretty(&response).map_err(|e| ApiError::Internal(e.to_string()))?
    );

    Ok(())
}
