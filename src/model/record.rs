use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::api::ApiCaseRow;
use crate::model::AreaLevel;

/// One canonical daily observation for a single area.
///
/// Unique per (date, area_code). Counts are non-negative; 0 means the
/// measure was unavailable for that day. Hospital cases and deaths are
/// only populated at Nation level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub date: NaiveDate,
    pub area_code: String,
    pub area_name: String,
    pub area_type: AreaLevel,
    pub cases: i64,
    pub tests: i64,
    pub hospital_cases: i64,
    pub deaths_28d: i64,
}

impl CaseRecord {
    pub fn area_key(&self) -> AreaKey {
        AreaKey {
            code: self.area_code.clone(),
            name: self.area_name.clone(),
            level: self.area_type,
        }
    }
}

/// Composite grouping key identifying one area across datasets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AreaKey {
    pub code: String,
    pub name: String,
    pub level: AreaLevel,
}

/// Normalizes raw API rows for one hierarchy level into canonical records.
///
/// Parses dates, fills missing numeric fields with 0, coerces counts to
/// non-negative integers and sorts by date. Rows with an unparseable date
/// are dropped with a warning.
pub fn normalize(rows: Vec<ApiCaseRow>, level: AreaLevel) -> Vec<CaseRecord> {
    let mut records: Vec<CaseRecord> = rows
        .into_iter()
        .filter_map(|row| {
            let date = match NaiveDate::parse_from_str(&row.date, "%Y-%m-%d") {
                Ok(d) => d,
                Err(e) => {
                    warn!("Dropping row with bad date {:?}: {}", row.date, e);
                    return None;
                }
            };
            Some(CaseRecord {
                date,
                area_code: row.code,
                area_name: row.name,
                area_type: level,
                cases: clamp_count(row.cases),
                tests: clamp_count(row.tests),
                hospital_cases: clamp_count(row.hospital_cases),
                deaths_28d: clamp_count(row.deaths_28d),
            })
        })
        .collect();

    records.sort_by_key(|r| r.date);
    records
}

fn clamp_count(value: Option<f64>) -> i64 {
    let v = value.unwrap_or(0.0);
    if v.is_finite() && v > 0.0 {
        v as i64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row(date: &str, cases: Option<f64>) -> ApiCaseRow {
        ApiCaseRow {
            date: date.to_string(),
            name: "England".to_string(),
            code: "E92000001".to_string(),
            area_type: "nation".to_string(),
            cases,
            tests: None,
            hospital_cases: Some(12.0),
            deaths_28d: Some(-3.0),
        }
    }

    #[test]
    fn test_normalize_fills_missing_and_clamps_negative() {
        let records = normalize(vec![raw_row("2020-03-01", None)], AreaLevel::Nation);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cases, 0);
        assert_eq!(records[0].tests, 0);
        assert_eq!(records[0].hospital_cases, 12);
        assert_eq!(records[0].deaths_28d, 0);
        assert_eq!(records[0].area_type, AreaLevel::Nation);
    }

    #[test]
    fn test_normalize_sorts_by_date_and_drops_bad_dates() {
        let rows = vec![
            raw_row("2020-03-02", Some(5.0)),
            raw_row("not-a-date", Some(1.0)),
            raw_row("2020-03-01", Some(3.0)),
        ];
        let records = normalize(rows, AreaLevel::Nation);
        assert_eq!(records.len(), 2);
        assert!(records[0].date < records[1].date);
        assert_eq!(records[0].cases, 3);
    }
}
