//! Summary aggregation stage.
//!
//! Builds one row per area combining full-history daily statistics, recent
//! weekly windows, a smoothed case trend and population-normalized rates.
//! Areas without a population reference entry are dropped. The whole table
//! is recomputed and republished on every batch run.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::Duration;
use log::info;

use crate::cache::{self, keys, CacheStore};
use crate::config::BatchSettings;
use crate::model::{
    per_1000, percent_change, round_to, AreaKey, DailySeries, PopulationReference,
    SummaryRecord, WeeklySeries,
};

/// Recent weekly case totals for one area, windowed off the latest
/// complete week.
#[derive(Debug, Clone, Copy, Default)]
struct WeekWindows {
    last_4_weeks: i64,
    last_fortnight: i64,
    previous_fortnight: i64,
}

fn week_windows(weekly: &WeeklySeries) -> BTreeMap<AreaKey, WeekWindows> {
    let mut windows: BTreeMap<AreaKey, WeekWindows> = BTreeMap::new();
    let max_week = match weekly.max_week() {
        Some(week) => week,
        None => return windows,
    };

    for r in weekly.records() {
        let entry = windows.entry(r.area_key()).or_default();
        if r.week > max_week.saturating_sub(4) {
            entry.last_4_weeks += r.cases;
            if r.week > max_week.saturating_sub(2) {
                entry.last_fortnight += r.cases;
            } else {
                entry.previous_fortnight += r.cases;
            }
        }
    }
    windows
}

/// Least-squares slope of `values` against x = 0, 1, 2, ...
fn least_squares_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let sum_x: f64 = (0..values.len()).map(|x| x as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(x, y)| x as f64 * y).sum();
    let sum_xx: f64 = (0..values.len()).map(|x| (x * x) as f64).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denominator
}

/// Case trend for one area: a trailing rolling mean over `smoothing` days,
/// then the least-squares slope of the last `window` smoothed values with
/// the final `lag` days excluded (they under-report). Too little history
/// reads as a flat trend.
pub fn trend_slope(values: &[i64], window: usize, lag: usize, smoothing: usize) -> f64 {
    if smoothing == 0 || window <= lag || values.len() < window + smoothing - 1 {
        return 0.0;
    }

    let smoothed: Vec<f64> = values
        .windows(smoothing)
        .map(|w| w.iter().sum::<i64>() as f64 / smoothing as f64)
        .collect();

    let slice = &smoothed[smoothed.len() - window..smoothed.len() - lag];
    round_to(least_squares_slope(slice), 2)
}

/// Sum of the last `n` entries (the whole row when shorter).
fn last_n_total(row: &[i64], n: usize) -> i64 {
    row[row.len().saturating_sub(n)..].iter().sum()
}

/// Builds the summary table from the daily and weekly datasets joined
/// against the population reference.
pub fn aggregate(
    daily: &DailySeries,
    weekly: &WeeklySeries,
    population: &PopulationReference,
    cfg: &BatchSettings,
) -> Vec<SummaryRecord> {
    let stats = daily.area_stats();
    let windows = week_windows(weekly);

    let pivot = match daily.latest_date() {
        Some(latest) => daily.pivot_window(latest - Duration::days(cfg.pivot_window_days), latest),
        None => BTreeMap::new(),
    };
    let empty_row: Vec<i64> = Vec::new();

    let mut records = Vec::new();
    for (key, area) in stats {
        let population = match population.get(&key) {
            Some(population) => population,
            None => continue,
        };
        let weeks = windows.get(&key).copied().unwrap_or_default();
        let row = pivot.get(&key).unwrap_or(&empty_row);
        let last_7_days = last_n_total(row, 7);

        records.push(SummaryRecord {
            area_code: key.code,
            area_name: key.name,
            area_type: key.level,
            population,
            all_time_cases: area.total_cases,
            average_daily_cases: round_to(area.mean_daily_cases, 1),
            peak_daily_cases: area.peak_daily_cases,
            last_4_weeks_cases: weeks.last_4_weeks,
            last_fortnight_cases: weeks.last_fortnight,
            previous_fortnight_cases: weeks.previous_fortnight,
            trend_slope_14d: trend_slope(
                row,
                cfg.trend_window_days,
                cfg.reporting_lag_days,
                cfg.smoothing_window_days,
            ),
            last_7_days_cases: last_7_days,
            all_time_per_1000: per_1000(area.total_cases, population),
            last_4_weeks_per_1000: per_1000(weeks.last_4_weeks, population),
            last_7_days_per_1000: per_1000(last_7_days, population),
            fortnightly_change_pct: percent_change(
                weeks.last_fortnight,
                weeks.previous_fortnight,
            ),
        });
    }
    records
}

/// Aggregates and publishes the summary dataset.
pub async fn run(
    store: &CacheStore,
    daily: &DailySeries,
    weekly: &WeeklySeries,
    population: &PopulationReference,
    cfg: &BatchSettings,
) -> Result<Vec<SummaryRecord>> {
    info!("Creating summary dataset...");

    let records = aggregate(daily, weekly, population, cfg);
    info!("Summary dataset built ({} areas)", records.len());

    let blob = cache::encode(&records)?;
    store
        .publish_rotating(keys::SUMMARY, &blob)
        .await
        .context("Error updating CasesSummary")?;

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AreaLevel, CaseRecord};
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn area_key(code: &str) -> AreaKey {
        AreaKey {
            code: code.to_string(),
            name: code.to_string(),
            level: AreaLevel::Region,
        }
    }

    fn constant_series(code: &str, start: &str, days: i64, cases: i64) -> Vec<CaseRecord> {
        let start = date(start);
        (0..days)
            .map(|i| CaseRecord {
                date: start + Duration::days(i),
                area_code: code.to_string(),
                area_name: code.to_string(),
                area_type: AreaLevel::Region,
                cases,
                tests: 0,
                hospital_cases: 0,
                deaths_28d: 0,
            })
            .collect()
    }

    #[test]
    fn test_slope_of_linear_series_is_one() {
        let values: Vec<i64> = (0..=30).collect();
        assert_eq!(trend_slope(&values, 16, 2, 7), 1.0);
    }

    #[test]
    fn test_slope_of_constant_series_is_zero() {
        let values = vec![50; 31];
        assert_eq!(trend_slope(&values, 16, 2, 7), 0.0);
    }

    #[test]
    fn test_slope_with_short_history_is_zero() {
        let values: Vec<i64> = (0..10).collect();
        assert_eq!(trend_slope(&values, 16, 2, 7), 0.0);
    }

    #[test]
    fn test_last_n_total_handles_short_rows() {
        assert_eq!(last_n_total(&[1, 2, 3, 4, 5], 3), 12);
        assert_eq!(last_n_total(&[1, 2], 7), 3);
        assert_eq!(last_n_total(&[], 7), 0);
    }

    #[test]
    fn test_aggregate_constant_area() {
        // 40 days of 10 cases from Monday 2020-06-01: five complete weeks
        // of 70 (labels 202023..202027) plus a dropped partial week
        let daily = DailySeries::new(constant_series("A", "2020-06-01", 40, 10));
        let weekly = crate::pipeline::weekly::aggregate(&daily, date("2020-02-29"));
        assert_eq!(weekly.max_week(), Some(202027));

        let population = PopulationReference::from_entries(vec![(area_key("A"), 1000)]);
        let records = aggregate(&daily, &weekly, &population, &BatchSettings::default());

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.population, 1000);
        assert_eq!(r.all_time_cases, 400);
        assert_eq!(r.average_daily_cases, 10.0);
        assert_eq!(r.peak_daily_cases, 10);
        assert_eq!(r.last_4_weeks_cases, 280);
        assert_eq!(r.last_fortnight_cases, 140);
        assert_eq!(r.previous_fortnight_cases, 140);
        assert_eq!(r.fortnightly_change_pct, 0.0);
        assert_eq!(r.last_7_days_cases, 70);
        assert_eq!(r.trend_slope_14d, 0.0);
        assert_eq!(r.all_time_per_1000, 400.0);
        assert_eq!(r.last_4_weeks_per_1000, 280.0);
        assert_eq!(r.last_7_days_per_1000, 70.0);
    }

    #[test]
    fn test_aggregate_zero_population_rates_are_zero() {
        let daily = DailySeries::new(constant_series("A", "2020-06-01", 40, 10));
        let weekly = crate::pipeline::weekly::aggregate(&daily, date("2020-02-29"));
        let population = PopulationReference::from_entries(vec![(area_key("A"), 0)]);

        let records = aggregate(&daily, &weekly, &population, &BatchSettings::default());
        let r = &records[0];
        assert_eq!(r.all_time_per_1000, 0.0);
        assert_eq!(r.last_4_weeks_per_1000, 0.0);
        assert_eq!(r.last_7_days_per_1000, 0.0);
    }

    #[test]
    fn test_aggregate_drops_areas_without_population() {
        let mut records = constant_series("A", "2020-06-01", 40, 10);
        records.extend(constant_series("B", "2020-06-01", 40, 5));
        let daily = DailySeries::new(records);
        let weekly = crate::pipeline::weekly::aggregate(&daily, date("2020-02-29"));
        let population = PopulationReference::from_entries(vec![(area_key("A"), 1000)]);

        let summary = aggregate(&daily, &weekly, &population, &BatchSettings::default());
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].area_code, "A");
    }

    #[tokio::test]
    async fn test_run_publishes_summary_key() {
        let store = CacheStore::in_memory();
        let daily = DailySeries::new(constant_series("A", "2020-06-01", 40, 10));
        let weekly = crate::pipeline::weekly::aggregate(&daily, date("2020-02-29"));
        let population = PopulationReference::from_entries(vec![(area_key("A"), 1000)]);

        let records = run(
            &store,
            &daily,
            &weekly,
            &population,
            &BatchSettings::default(),
        )
        .await
        .unwrap();

        let blob = store.get(keys::SUMMARY).await.unwrap().unwrap();
        let stored: Vec<SummaryRecord> = cache::decode(&blob).unwrap();
        assert_eq!(stored, records);
    }
}
