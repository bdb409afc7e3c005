//! Read side of the cache: consumer-facing dataset snapshots.
//!
//! `CaseData` lazily loads the published datasets and only reloads when
//! the committed `data_timestamp` changes, so polling it is cheap. A load
//! is refused until a summary has been published at least once, which
//! shields consumers from a half-written first generation.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use log::info;

use crate::cache::{self, keys, CacheStore};
use crate::model::{AreaLevel, CaseRecord, DailySeries, SummaryRecord, WeeklyRecord, WeeklySeries};

/// One consistent generation of published data, plus the display strings
/// derived from it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub daily: DailySeries,
    pub weekly: WeeklySeries,
    pub summary: Vec<SummaryRecord>,
    /// Latest date with case data, dd/mm/yyyy
    pub latest_case_date: String,
    /// Latest complete week's closing Sunday, e.g. "14th June 2020"
    pub latest_complete_week: String,
    /// Area names per hierarchy level, sorted and deduplicated
    pub hierarchy: BTreeMap<AreaLevel, Vec<String>>,
    /// Finest level with any published areas
    pub plot_level: Option<AreaLevel>,
}

impl Snapshot {
    /// Resolves an area name to its hierarchy level. Names present at
    /// several levels resolve to the finest one; unknown names fall back
    /// to Nation.
    pub fn level_for_area(&self, name: &str) -> AreaLevel {
        AreaLevel::finest_first()
            .into_iter()
            .find(|level| {
                self.hierarchy
                    .get(level)
                    .is_some_and(|names| names.iter().any(|n| n == name))
            })
            .unwrap_or(AreaLevel::Nation)
    }
}

/// Cache reader with change detection on `data_timestamp`.
pub struct CaseData {
    store: Arc<CacheStore>,
    last_load_timestamp: Option<NaiveDateTime>,
    snapshot: Option<Snapshot>,
}

impl CaseData {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            last_load_timestamp: None,
            snapshot: None,
        }
    }

    /// The last loaded snapshot, if any generation has been loaded yet.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Reloads from the cache when a new data generation is available.
    /// Returns true when a reload happened.
    pub async fn load(&mut self) -> Result<bool> {
        let timestamp = self.store.read_timestamp().await;
        if self.last_load_timestamp == Some(timestamp) {
            return Ok(false);
        }
        if !self.store.exists(keys::SUMMARY).await? {
            info!("No summary published yet, nothing to load");
            return Ok(false);
        }

        info!("Loading published datasets (generation {timestamp})...");

        let mut chunks = Vec::new();
        for key in self.store.keys_with_prefix(keys::DAILY_PREFIX).await? {
            let blob = self
                .store
                .get(&key)
                .await?
                .with_context(|| format!("Cache entry {key} disappeared during load"))?;
            chunks.push(cache::decode::<CaseRecord>(&blob)?);
        }
        let daily = DailySeries::from_chunks(chunks);

        let weekly = match self.store.get(keys::WEEKLY).await? {
            Some(blob) => WeeklySeries::new(cache::decode::<WeeklyRecord>(&blob)?),
            None => WeeklySeries::default(),
        };

        let summary: Vec<SummaryRecord> = match self.store.get(keys::SUMMARY).await? {
            Some(blob) => cache::decode(&blob)?,
            None => Vec::new(),
        };

        let latest_case_date = daily
            .latest_date()
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_default();
        let latest_complete_week = weekly
            .latest_week_end()
            .map(ordinal_date_label)
            .unwrap_or_default();
        let hierarchy = hierarchy(&daily);
        let plot_level = plot_level(&hierarchy);

        self.snapshot = Some(Snapshot {
            daily,
            weekly,
            summary,
            latest_case_date,
            latest_complete_week,
            hierarchy,
            plot_level,
        });
        self.last_load_timestamp = Some(timestamp);
        Ok(true)
    }
}

// Built from the daily data, not the summary: areas missing a population
// entry still belong in the dashboard's area lists
fn hierarchy(daily: &DailySeries) -> BTreeMap<AreaLevel, Vec<String>> {
    let mut hierarchy: BTreeMap<AreaLevel, Vec<String>> = BTreeMap::new();
    for r in daily.records() {
        hierarchy
            .entry(r.area_type)
            .or_default()
            .push(r.area_name.clone());
    }
    for names in hierarchy.values_mut() {
        names.sort();
        names.dedup();
    }
    hierarchy
}

/// Finest hierarchy level with any published areas.
fn plot_level(hierarchy: &BTreeMap<AreaLevel, Vec<String>>) -> Option<AreaLevel> {
    AreaLevel::finest_first()
        .into_iter()
        .find(|level| hierarchy.get(level).is_some_and(|names| !names.is_empty()))
}

/// "14th June 2020"-style display label.
fn ordinal_date_label(date: NaiveDate) -> String {
    let day = date.day();
    let suffix = match day {
        4..=20 | 24..=30 => "th",
        _ => ["st", "nd", "rd"][(day % 10) as usize - 1],
    };
    format!("{day}{suffix} {}", date.format("%B %Y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AreaKey;
    use crate::pipeline;
    use chrono::Duration;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn area_day(name: &str, level: AreaLevel) -> CaseRecord {
        CaseRecord {
            date: date("2020-06-01"),
            area_code: name.to_string(),
            area_name: name.to_string(),
            area_type: level,
            cases: 1,
            tests: 0,
            hospital_cases: 0,
            deaths_28d: 0,
        }
    }

    fn daily_of(areas: &[(&str, AreaLevel)]) -> DailySeries {
        DailySeries::new(
            areas
                .iter()
                .map(|(name, level)| area_day(name, *level))
                .collect(),
        )
    }

    #[test]
    fn test_ordinal_labels() {
        assert_eq!(ordinal_date_label(date("2020-06-01")), "1st June 2020");
        assert_eq!(ordinal_date_label(date("2020-06-02")), "2nd June 2020");
        assert_eq!(ordinal_date_label(date("2020-06-03")), "3rd June 2020");
        assert_eq!(ordinal_date_label(date("2020-06-14")), "14th June 2020");
        assert_eq!(ordinal_date_label(date("2020-06-21")), "21st June 2020");
        assert_eq!(ordinal_date_label(date("2020-06-22")), "22nd June 2020");
        assert_eq!(ordinal_date_label(date("2020-06-23")), "23rd June 2020");
        assert_eq!(ordinal_date_label(date("2020-07-31")), "31st July 2020");
    }

    #[test]
    fn test_plot_level_prefers_finest_present() {
        let coarse = hierarchy(&daily_of(&[
            ("England", AreaLevel::Nation),
            ("London", AreaLevel::Region),
        ]));
        assert_eq!(plot_level(&coarse), Some(AreaLevel::Region));

        let fine = hierarchy(&daily_of(&[
            ("England", AreaLevel::Nation),
            ("Liverpool", AreaLevel::LowerTierLocalAuthority),
        ]));
        assert_eq!(plot_level(&fine), Some(AreaLevel::LowerTierLocalAuthority));

        assert_eq!(plot_level(&BTreeMap::new()), None);
    }

    #[test]
    fn test_level_for_area_prefers_finest_level() {
        let snapshot = Snapshot {
            daily: DailySeries::default(),
            weekly: WeeklySeries::default(),
            summary: Vec::new(),
            latest_case_date: String::new(),
            latest_complete_week: String::new(),
            hierarchy: hierarchy(&daily_of(&[
                ("Liverpool", AreaLevel::UpperTierLocalAuthority),
                ("Liverpool", AreaLevel::LowerTierLocalAuthority),
                ("North West", AreaLevel::Region),
            ])),
            plot_level: None,
        };
        assert_eq!(
            snapshot.level_for_area("Liverpool"),
            AreaLevel::LowerTierLocalAuthority
        );
        assert_eq!(snapshot.level_for_area("North West"), AreaLevel::Region);
        assert_eq!(snapshot.level_for_area("Atlantis"), AreaLevel::Nation);
    }

    #[test]
    fn test_hierarchy_sorts_and_dedups() {
        let hierarchy = hierarchy(&daily_of(&[
            ("London", AreaLevel::Region),
            ("East", AreaLevel::Region),
            ("London", AreaLevel::Region),
        ]));
        assert_eq!(hierarchy[&AreaLevel::Region], vec!["East", "London"]);
    }

    async fn publish_generation(store: &CacheStore, timestamp: &str) {
        let records: Vec<CaseRecord> = (0..40)
            .map(|i| CaseRecord {
                date: date("2020-06-01") + Duration::days(i),
                area_code: "E12000007".to_string(),
                area_name: "London".to_string(),
                area_type: AreaLevel::Region,
                cases: 10,
                tests: 0,
                hospital_cases: 0,
                deaths_28d: 0,
            })
            .collect();
        let daily = DailySeries::new(records.clone());
        let weekly = pipeline::weekly::aggregate(&daily, date("2020-02-29"));
        let population = crate::model::PopulationReference::from_entries(vec![(
            AreaKey {
                code: "E12000007".to_string(),
                name: "London".to_string(),
                level: AreaLevel::Region,
            },
            1000,
        )]);
        let summary = pipeline::summary::aggregate(
            &daily,
            &weekly,
            &population,
            &crate::config::BatchSettings::default(),
        );

        let key = keys::daily(AreaLevel::Region, "2020-06");
        store
            .publish_rotating(&key, &cache::encode(&records).unwrap())
            .await
            .unwrap();
        store
            .publish_rotating(keys::WEEKLY, &cache::encode(weekly.records()).unwrap())
            .await
            .unwrap();
        store
            .publish_rotating(keys::SUMMARY, &cache::encode(&summary).unwrap())
            .await
            .unwrap();
        let ts =
            NaiveDateTime::parse_from_str(timestamp, cache::TIMESTAMP_FORMAT).unwrap();
        store.write_timestamp(ts).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_only_reloads_on_new_generation() {
        let store = Arc::new(CacheStore::in_memory());
        let mut reader = CaseData::new(store.clone());

        // Nothing published yet
        assert!(!reader.load().await.unwrap());
        assert!(reader.snapshot().is_none());

        publish_generation(&store, "2025-01-01 06:00:00").await;
        assert!(reader.load().await.unwrap());

        let snapshot = reader.snapshot().unwrap();
        assert_eq!(snapshot.latest_case_date, "10/07/2020");
        assert_eq!(snapshot.latest_complete_week, "5th July 2020");
        assert_eq!(snapshot.plot_level, Some(AreaLevel::Region));
        assert_eq!(snapshot.summary.len(), 1);

        // Same generation, no reload
        assert!(!reader.load().await.unwrap());

        publish_generation(&store, "2025-01-01 07:00:00").await;
        assert!(reader.load().await.unwrap());
    }

    #[tokio::test]
    async fn test_hierarchy_keeps_areas_missing_from_population() {
        let store = Arc::new(CacheStore::in_memory());

        let records: Vec<CaseRecord> = (0..40)
            .flat_map(|i| {
                ["London", "East"].map(|name| CaseRecord {
                    date: date("2020-06-01") + Duration::days(i),
                    area_code: name.to_string(),
                    area_name: name.to_string(),
                    area_type: AreaLevel::Region,
                    cases: 10,
                    tests: 0,
                    hospital_cases: 0,
                    deaths_28d: 0,
                })
            })
            .collect();
        let daily = DailySeries::new(records.clone());
        let weekly = pipeline::weekly::aggregate(&daily, date("2020-02-29"));
        let population = crate::model::PopulationReference::from_entries(vec![(
            AreaKey {
                code: "London".to_string(),
                name: "London".to_string(),
                level: AreaLevel::Region,
            },
            1000,
        )]);
        let summary = pipeline::summary::aggregate(
            &daily,
            &weekly,
            &population,
            &crate::config::BatchSettings::default(),
        );

        let key = keys::daily(AreaLevel::Region, "2020-06");
        store
            .publish_rotating(&key, &cache::encode(&records).unwrap())
            .await
            .unwrap();
        store
            .publish_rotating(keys::WEEKLY, &cache::encode(weekly.records()).unwrap())
            .await
            .unwrap();
        store
            .publish_rotating(keys::SUMMARY, &cache::encode(&summary).unwrap())
            .await
            .unwrap();
        let ts =
            NaiveDateTime::parse_from_str("2025-01-01 06:00:00", cache::TIMESTAMP_FORMAT).unwrap();
        store.write_timestamp(ts).await.unwrap();

        let mut reader = CaseData::new(store);
        assert!(reader.load().await.unwrap());
        let snapshot = reader.snapshot().unwrap();

        // The summary inner-joins population, the area lists must not
        assert_eq!(snapshot.summary.len(), 1);
        assert_eq!(
            snapshot.hierarchy[&AreaLevel::Region],
            vec!["East", "London"]
        );
        assert_eq!(snapshot.level_for_area("East"), AreaLevel::Region);
    }
}
