use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::{AreaKey, AreaLevel};

/// One week of summed cases for a single area.
///
/// `week` is a numerically sortable year+week composite (e.g. 202032 for
/// week 32 of 2020, Sunday-based week numbering). `week_end` is the Sunday
/// the bucket closes on, kept for display purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyRecord {
    pub area_code: String,
    pub area_name: String,
    pub area_type: AreaLevel,
    pub week_end: NaiveDate,
    pub week: u32,
    pub cases: i64,
}

impl WeeklyRecord {
    pub fn area_key(&self) -> AreaKey {
        AreaKey {
            code: self.area_code.clone(),
            name: self.area_name.clone(),
            level: self.area_type,
        }
    }
}

/// Weekly dataset derived from the daily series, excluding the trailing
/// (necessarily incomplete) week.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklySeries {
    records: Vec<WeeklyRecord>,
}

impl WeeklySeries {
    pub fn new(records: Vec<WeeklyRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[WeeklyRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum week label present (the latest complete week).
    pub fn max_week(&self) -> Option<u32> {
        self.records.iter().map(|r| r.week).max()
    }

    /// Sunday ending the latest complete week.
    pub fn latest_week_end(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.week_end).max()
    }
}

/// The Sunday ending the week bucket that contains `date` (the date itself
/// when it already is a Sunday).
pub fn week_ending(date: NaiveDate) -> NaiveDate {
    let days_to_sunday = (7 - date.weekday().num_days_from_sunday()) % 7;
    date + Duration::days(days_to_sunday as i64)
}

/// Sortable year+week label for a bucket-ending Sunday, using Sunday-based
/// week-of-year numbering (week 01 starts on the year's first Sunday).
pub fn week_label(week_end: NaiveDate) -> u32 {
    let week = (week_end.ordinal0() + 7 - week_end.weekday().num_days_from_sunday()) / 7;
    week_end.year() as u32 * 100 + week
}
