//! Typed data model for the case statistics pipeline.
//!
//! - [`level`] - Closed enumeration of the four geographic hierarchy levels
//! - [`record`] - Canonical daily case records and API-row normalization
//! - [`daily`] - The merged, date-sorted daily dataset
//! - [`weekly`] - Week bucketing and the derived weekly dataset
//! - [`summary`] - Per-area summary statistics and ratio policies
//! - [`population`] - Static population reference data

mod daily;
mod level;
mod population;
mod record;
mod summary;
mod weekly;

pub use daily::{AreaDailyStats, DailySeries};
pub use level::AreaLevel;
pub use population::PopulationReference;
pub use record::{normalize, AreaKey, CaseRecord};
pub use summary::{per_1000, percent_change, round_to, SummaryRecord};
pub use weekly::{week_ending, week_label, WeeklyRecord, WeeklySeries};
