//! Upstream freshness gate.
//!
//! A batch run is only worth the fetch cost when the upstream
//! Last-Modified timestamp is strictly newer than the one committed with
//! the currently published data generation.

use chrono::NaiveDateTime;
use log::info;

use crate::api::CasesApiClient;
use crate::cache::CacheStore;

/// Returns the upstream timestamp when a refresh is due, `None` when the
/// published data is already current or the API gave no answer.
pub async fn should_refresh(api: &CasesApiClient, store: &CacheStore) -> Option<NaiveDateTime> {
    let upstream = match api.last_modified().await {
        Some(ts) => ts,
        None => {
            info!("No response from API.");
            return None;
        }
    };

    let published = store.read_timestamp().await;
    info!("API data timestamp: {upstream}; published data timestamp: {published}");

    if upstream > published {
        Some(upstream)
    } else {
        None
    }
}
