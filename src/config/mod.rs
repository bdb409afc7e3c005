mod config;

pub use config::{ApiSettings, BatchSettings, CacheSettings, Settings};
