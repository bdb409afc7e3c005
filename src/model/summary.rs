use serde::{Deserialize, Serialize};

use crate::model::AreaLevel;

/// Per-area summary statistics recomputed wholesale on every batch run.
///
/// Every ratio has a defined zero-denominator policy: a zero population or
/// a zero previous fortnight yields 0.0, never NaN or infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub area_code: String,
    pub area_name: String,
    pub area_type: AreaLevel,
    pub population: i64,
    pub all_time_cases: i64,
    /// Mean daily cases over the full history, 1dp
    pub average_daily_cases: f64,
    pub peak_daily_cases: i64,
    pub last_4_weeks_cases: i64,
    pub last_fortnight_cases: i64,
    pub previous_fortnight_cases: i64,
    /// Least-squares slope of the smoothed 14-day case window, 2dp
    pub trend_slope_14d: f64,
    pub last_7_days_cases: i64,
    pub all_time_per_1000: f64,
    pub last_4_weeks_per_1000: f64,
    pub last_7_days_per_1000: f64,
    /// (last fortnight - previous fortnight) / previous fortnight * 100, 0dp
    pub fortnightly_change_pct: f64,
}

/// Cases per 1000 population, rounded to 2dp. Zero population yields 0.0.
pub fn per_1000(cases: i64, population: i64) -> f64 {
    if population <= 0 {
        return 0.0;
    }
    round_to(cases as f64 / population as f64 * 1000.0, 2)
}

/// Period-over-period percentage change, rounded to 0dp. A zero previous
/// period yields 0.0 rather than infinity.
pub fn percent_change(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        return 0.0;
    }
    round_to((current - previous) as f64 / previous as f64 * 100.0, 0)
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}
