//! Daily fetch-and-publish stage.
//!
//! For every (level, month) pair from the configured start month to the
//! current month: fetch from the API (with retries), normalize and publish
//! as a dedicated cache entry. Units are independent and run concurrently
//! bounded by available CPU cores. After all levels pass the sanity check
//! the per-key entries are re-read and merged into the canonical daily
//! dataset.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use futures::{stream, StreamExt};
use log::info;
use strum::IntoEnumIterator;

use crate::api::CasesApiClient;
use crate::cache::{self, keys, CacheStore};
use crate::config::Settings;
use crate::model::{normalize, AreaLevel, CaseRecord, DailySeries};

/// Months (yyyy-mm) from `start_month` through the month of `today`,
/// inclusive.
pub fn month_list(start_month: &str, today: NaiveDate) -> Result<Vec<String>> {
    let (start_year, start_month) = start_month
        .split_once('-')
        .and_then(|(y, m)| Some((y.parse::<i32>().ok()?, m.parse::<u32>().ok()?)))
        .with_context(|| format!("Invalid start month {start_month:?}, expected yyyy-mm"))?;

    let mut months = Vec::new();
    let (mut year, mut month) = (start_year, start_month);
    while (year, month) <= (today.year(), today.month()) {
        months.push(format!("{year:04}-{month:02}"));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    Ok(months)
}

/// Sanity check over one level's monthly totals. Returns true when the
/// check FAILS: any missing total, or a grand total below the threshold
/// (strictly below, so exactly at the threshold passes).
pub fn failure_check(month_totals: &[Option<i64>], threshold: i64) -> bool {
    if month_totals.iter().any(|t| t.is_none()) {
        info!("Missing monthly total - failure detected");
        return true;
    }

    let total: i64 = month_totals.iter().flatten().sum();
    info!("Total: {total}");
    total < threshold
}

/// Fetches one (level, month) unit, publishes it under its own cache key
/// and returns the month's total cases. Empty after the retry budget
/// yields `Ok(None)`; a cache write failure is a hard error.
async fn fetch_month(
    api: &CasesApiClient,
    store: &CacheStore,
    settings: &Settings,
    level: AreaLevel,
    month: &str,
) -> Result<Option<i64>> {
    let filters = CasesApiClient::month_filters(level, month);
    let structure = CasesApiClient::query_structure(level);

    // The API can be flaky, so retry a fully empty result
    let mut rows = Vec::new();
    for attempt in 1..=settings.api.fetch_attempts {
        info!("Querying API... attempt {attempt} - level {level} - month {month}");
        rows = api.fetch_paginated(&filters, &structure).await;
        if !rows.is_empty() {
            break;
        }
        if attempt < settings.api.fetch_attempts {
            tokio::time::sleep(Duration::from_secs(settings.api.retry_delay_secs)).await;
        }
    }

    if rows.is_empty() {
        info!("No data for level {level} month {month}");
        return Ok(None);
    }

    let records = normalize(rows, level);
    let total = records.iter().map(|r| r.cases).sum();

    let blob = cache::encode(&records)?;
    store
        .publish_rotating(&keys::daily(level, month), &blob)
        .await
        .with_context(|| format!("Failed to publish daily entry for {level} {month}"))?;

    Ok(Some(total))
}

/// Runs the full daily stage: every level and month fetched, checked and
/// published, then re-read and merged into one date-sorted series.
pub async fn run(
    api: &CasesApiClient,
    store: &CacheStore,
    settings: &Settings,
) -> Result<DailySeries> {
    info!("Loading daily cases data...");

    let today = Utc::now().date_naive();
    let months = month_list(&settings.batch.start_month, today)?;

    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    for level in AreaLevel::iter() {
        let totals: Vec<Option<i64>> = if parallelism > 1 {
            // Per-month units are independent, so fetch them concurrently.
            // The futures are materialized up front so the stream owns them
            // and the whole run future stays boxable.
            let fetches: Vec<_> = months
                .iter()
                .map(|month| fetch_month(api, store, settings, level, month))
                .collect();
            stream::iter(fetches)
                .buffered(parallelism)
                .collect::<Vec<_>>()
                .await
                .into_iter()
                .collect::<Result<_>>()?
        } else {
            let mut totals = Vec::with_capacity(months.len());
            for month in &months {
                totals.push(fetch_month(api, store, settings, level, month).await?);
            }
            totals
        };

        info!("{level} monthly totals: {totals:?}");

        if failure_check(&totals, settings.batch.cases_threshold) {
            bail!("Level {level} failed the sanity check, stopping");
        }
    }

    // Reload the published per-(level, month) entries and merge; sorting
    // by date makes the result independent of fetch completion order
    let mut chunks = Vec::new();
    for key in store.keys_with_prefix(keys::DAILY_PREFIX).await? {
        let blob = store
            .get(&key)
            .await?
            .with_context(|| format!("Cache entry {key} disappeared during merge"))?;
        chunks.push(cache::decode::<CaseRecord>(&blob)?);
    }

    let series = DailySeries::from_chunks(chunks);
    info!("Daily dataset merged ({} records)", series.len());
    Ok(series)
}
