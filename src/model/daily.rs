use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::{AreaKey, CaseRecord};

/// Per-area aggregate over the full daily history.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaDailyStats {
    pub total_cases: i64,
    pub mean_daily_cases: f64,
    pub peak_daily_cases: i64,
}

/// The canonical daily dataset: all case records across levels, sorted by
/// date. Built fresh each batch run from the merged per-(level, month)
/// cache entries and exposed read-only to consumers after publish.
#[derive(Debug, Clone, Default)]
pub struct DailySeries {
    records: Vec<CaseRecord>,
}

impl DailySeries {
    pub fn new(mut records: Vec<CaseRecord>) -> Self {
        records.sort_by_key(|r| r.date);
        Self { records }
    }

    /// Merges independently fetched chunks, re-sorting by date so the
    /// result is identical regardless of fetch completion order.
    pub fn from_chunks(chunks: Vec<Vec<CaseRecord>>) -> Self {
        Self::new(chunks.into_iter().flatten().collect())
    }

    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Latest date with any fetched data.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// Records strictly after the given cutoff date.
    pub fn after(&self, cutoff: NaiveDate) -> impl Iterator<Item = &CaseRecord> {
        self.records.iter().filter(move |r| r.date > cutoff)
    }

    /// Sum, mean and max of daily cases per area over the full history.
    pub fn area_stats(&self) -> BTreeMap<AreaKey, AreaDailyStats> {
        let mut acc: BTreeMap<AreaKey, (i64, i64, i64)> = BTreeMap::new();
        for r in &self.records {
            let entry = acc.entry(r.area_key()).or_insert((0, 0, 0));
            entry.0 += r.cases;
            entry.1 += 1;
            entry.2 = entry.2.max(r.cases);
        }
        acc.into_iter()
            .map(|(key, (total, days, peak))| {
                let stats = AreaDailyStats {
                    total_cases: total,
                    mean_daily_cases: total as f64 / days as f64,
                    peak_daily_cases: peak,
                };
                (key, stats)
            })
            .collect()
    }

    /// Pivots the `from..=to` window into one gap-filled cases array per
    /// area, one slot per date. Missing days are 0; duplicate rows for the
    /// same (area, date) are summed.
    pub fn pivot_window(&self, from: NaiveDate, to: NaiveDate) -> BTreeMap<AreaKey, Vec<i64>> {
        let days = (to - from).num_days();
        if days < 0 {
            return BTreeMap::new();
        }
        let width = days as usize + 1;

        let mut pivot: BTreeMap<AreaKey, Vec<i64>> = BTreeMap::new();
        for r in &self.records {
            if r.date < from || r.date > to {
                continue;
            }
            let idx = (r.date - from).num_days() as usize;
            let row = pivot.entry(r.area_key()).or_insert_with(|| vec![0; width]);
            row[idx] += r.cases;
        }
        pivot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AreaLevel;

    fn record(date: &str, code: &str, cases: i64) -> CaseRecord {
        CaseRecord {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            area_code: code.to_string(),
            area_name: code.to_string(),
            area_type: AreaLevel::Region,
            cases,
            tests: 0,
            hospital_cases: 0,
            deaths_28d: 0,
        }
    }

    #[test]
    fn test_from_chunks_sorts_by_date() {
        let series = DailySeries::from_chunks(vec![
            vec![record("2020-04-01", "A", 1)],
            vec![record("2020-03-01", "A", 2)],
        ]);
        assert_eq!(series.latest_date().unwrap().to_string(), "2020-04-01");
        assert_eq!(series.records()[0].cases, 2);
    }

    #[test]
    fn test_area_stats() {
        let series = DailySeries::new(vec![
            record("2020-03-01", "A", 10),
            record("2020-03-02", "A", 30),
            record("2020-03-01", "B", 5),
        ]);
        let stats = series.area_stats();
        let a = &stats[&record("2020-03-01", "A", 0).area_key()];
        assert_eq!(a.total_cases, 40);
        assert_eq!(a.mean_daily_cases, 20.0);
        assert_eq!(a.peak_daily_cases, 30);
    }

    #[test]
    fn test_pivot_window_gap_fills_with_zero() {
        let series = DailySeries::new(vec![
            record("2020-03-01", "A", 10),
            record("2020-03-03", "A", 7),
        ]);
        let from = NaiveDate::parse_from_str("2020-03-01", "%Y-%m-%d").unwrap();
        let to = NaiveDate::parse_from_str("2020-03-04", "%Y-%m-%d").unwrap();
        let pivot = series.pivot_window(from, to);
        let row = &pivot[&record("2020-03-01", "A", 0).area_key()];
        assert_eq!(row, &vec![10, 0, 7, 0]);
    }
}
