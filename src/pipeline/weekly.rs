//! Weekly aggregation stage.
//!
//! Derives the weekly dataset from the merged daily series: dates after
//! the pandemic-start cutoff, grouped per area into Sunday-ending week
//! buckets, with the trailing (incomplete) week dropped.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;

use crate::cache::{self, keys, CacheStore};
use crate::config::Settings;
use crate::model::{week_ending, week_label, AreaKey, DailySeries, WeeklyRecord, WeeklySeries};

/// Builds the weekly series from daily data.
///
/// The maximum week bucket is always excluded: it is necessarily
/// incomplete at fetch time. Output is ordered by area identity then week.
pub fn aggregate(daily: &DailySeries, cutoff: NaiveDate) -> WeeklySeries {
    let mut buckets: BTreeMap<(AreaKey, NaiveDate), i64> = BTreeMap::new();
    for r in daily.after(cutoff) {
        *buckets
            .entry((r.area_key(), week_ending(r.date)))
            .or_insert(0) += r.cases;
    }

    let last_bucket = buckets.keys().map(|(_, end)| *end).max();

    let records = buckets
        .into_iter()
        .filter(|((_, end), _)| Some(*end) != last_bucket)
        .map(|((key, end), cases)| WeeklyRecord {
            area_code: key.code,
            area_name: key.name,
            area_type: key.level,
            week_end: end,
            week: week_label(end),
            cases,
        })
        .collect();

    WeeklySeries::new(records)
}

/// Aggregates and publishes the weekly dataset.
pub async fn run(
    store: &CacheStore,
    daily: &DailySeries,
    settings: &Settings,
) -> Result<WeeklySeries> {
    info!("Creating weekly dataset...");

    let cutoff = NaiveDate::parse_from_str(&settings.batch.weekly_cutoff, "%Y-%m-%d")
        .with_context(|| format!("Invalid weekly cutoff {:?}", settings.batch.weekly_cutoff))?;

    let weekly = aggregate(daily, cutoff);
    info!("Weekly dataset built ({} rows)", weekly.records().len());

    let blob = cache::encode(weekly.records())?;
    store
        .publish_rotating(keys::WEEKLY, &blob)
        .await
        .context("Error updating CasesWeekly")?;

    Ok(weekly)
}
