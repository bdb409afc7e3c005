use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use log::info;
use serde::Deserialize;

use crate::model::{AreaKey, AreaLevel};

#[derive(Debug, Deserialize)]
struct PopulationRow {
    area_code: String,
    area_name: String,
    area_type: AreaLevel,
    population: i64,
}

/// Static population reference keyed by (area_code, area_name, area_type).
///
/// Loaded fresh from CSV on every batch run, immutable afterwards. Areas
/// missing from the reference are silently excluded from the summary.
#[derive(Debug, Clone, Default)]
pub struct PopulationReference {
    entries: BTreeMap<AreaKey, i64>,
}

impl PopulationReference {
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open population file {}", path.display()))?;

        let mut entries = BTreeMap::new();
        for row in reader.deserialize::<PopulationRow>() {
            let row = row.context("Invalid population row")?;
            let key = AreaKey {
                code: row.area_code,
                name: row.area_name,
                level: row.area_type,
            };
            entries.insert(key, row.population.max(0));
        }

        info!("Population reference loaded ({} areas)", entries.len());
        Ok(Self { entries })
    }

    #[cfg(test)]
    pub fn from_entries(entries: Vec<(AreaKey, i64)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, key: &AreaKey) -> Option<i64> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
