//! End-to-end batch run.
//!
//! Orchestrates the stages in order: freshness gate, daily fetch, weekly
//! aggregation, population join, summary aggregation, and finally the
//! `data_timestamp` commit that marks the new generation as consistent.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::info;

use crate::api::CasesApiClient;
use crate::cache::CacheStore;
use crate::config::Settings;
use crate::model::PopulationReference;
use crate::pipeline::{daily, freshness, summary, weekly};

/// Runs one batch cycle. Returns `Ok(true)` when a new data generation
/// was published, `Ok(false)` when upstream had nothing new. `force`
/// skips the freshness gate and stamps the run with the current time.
pub async fn run(
    api: &CasesApiClient,
    store: &CacheStore,
    settings: &Settings,
    force: bool,
) -> Result<bool> {
    let start = Instant::now();

    let timestamp = if force {
        Utc::now().naive_utc()
    } else {
        match freshness::should_refresh(api, store).await {
            Some(ts) => ts,
            None => {
                info!("No new data to load.");
                return Ok(false);
            }
        }
    };

    info!("Data update detected, loading new data...");

    let daily = daily::run(api, store, settings).await?;
    if daily.is_empty() {
        bail!("Daily fetch produced no records, aborting run");
    }

    let weekly = weekly::run(store, &daily, settings).await?;

    let population = PopulationReference::from_csv_path(&settings.batch.population_file)
        .context("Failed to load population reference")?;

    summary::run(store, &daily, &weekly, &population, &settings.batch).await?;

    // Committed last: readers treat this as the all-keys-consistent signal
    store
        .write_timestamp(timestamp)
        .await
        .context("Failed to commit data timestamp")?;

    info!(
        "Data load complete in {}s",
        start.elapsed().as_secs_f64().round()
    );
    Ok(true)
}
