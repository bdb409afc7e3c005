use config::{Config, ConfigError, File};
use serde::Deserialize;

/// Upstream statistics API configuration.
///
/// Controls the endpoint, per-request timeouts and the retry budget used
/// when a (level, month) fetch comes back empty.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for paginated data calls
    #[serde(default = "default_data_timeout_secs")]
    pub data_timeout_secs: u64,
    /// Timeout for the lightweight Last-Modified probe
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Full-fetch attempts per (level, month) before giving up
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    /// Fixed delay between fetch attempts
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_base_url() -> String {
    "https://api.coronavirus.data.gov.uk/v1/data".to_string()
}

fn default_data_timeout_secs() -> u64 {
    120
}

fn default_probe_timeout_secs() -> u64 {
    60
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    30
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            data_timeout_secs: default_data_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            fetch_attempts: default_fetch_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

/// PostgreSQL connection configuration for the shared key-value cache.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Batch pipeline configuration.
///
/// The trend window and reporting lag reflect empirical tuning against
/// upstream reporting latency, so they are configurable rather than
/// hard-coded.
#[derive(Debug, Deserialize, Clone)]
pub struct BatchSettings {
    /// First month of data to fetch (yyyy-mm)
    #[serde(default = "default_start_month")]
    pub start_month: String,
    /// Weekly aggregation only considers dates strictly after this date
    #[serde(default = "default_weekly_cutoff")]
    pub weekly_cutoff: String,
    /// Minimum total cases a level must report to pass the sanity check
    #[serde(default = "default_cases_threshold")]
    pub cases_threshold: i64,
    /// Days of smoothed history fed to the trend regression (includes lag)
    #[serde(default = "default_trend_window_days")]
    pub trend_window_days: usize,
    /// Most recent days excluded from the trend (reporting lag)
    #[serde(default = "default_reporting_lag_days")]
    pub reporting_lag_days: usize,
    /// Trailing rolling-mean window applied before the regression
    #[serde(default = "default_smoothing_window_days")]
    pub smoothing_window_days: usize,
    /// Days of daily history pivoted per area for the trend/last-7 stats
    #[serde(default = "default_pivot_window_days")]
    pub pivot_window_days: i64,
    /// Scheduler interval between batch runs
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Population reference CSV, re-read on every run
    #[serde(default = "default_population_file")]
    pub population_file: String,
}

fn default_start_month() -> String {
    "2020-02".to_string()
}

fn default_weekly_cutoff() -> String {
    "2020-02-29".to_string()
}

fn default_cases_threshold() -> i64 {
    250_000
}

fn default_trend_window_days() -> usize {
    16
}

fn default_reporting_lag_days() -> usize {
    2
}

fn default_smoothing_window_days() -> usize {
    7
}

fn default_pivot_window_days() -> i64 {
    31
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_population_file() -> String {
    "data/population.csv".to_string()
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            start_month: default_start_month(),
            weekly_cutoff: default_weekly_cutoff(),
            cases_threshold: default_cases_threshold(),
            trend_window_days: default_trend_window_days(),
            reporting_lag_days: default_reporting_lag_days(),
            smoothing_window_days: default_smoothing_window_days(),
            pivot_window_days: default_pivot_window_days(),
            poll_interval_secs: default_poll_interval_secs(),
            population_file: default_population_file(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    pub cache: CacheSettings,
    #[serde(default)]
    pub batch: BatchSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
