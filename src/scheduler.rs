//! Scheduler for periodic batch runs.

use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::api::CasesApiClient;
use crate::cache::CacheStore;
use crate::config::Settings;
use crate::pipeline::batch;

/// Runs the batch pipeline on a fixed interval until cancellation.
///
/// A failed run is logged and the schedule keeps going; the cache still
/// holds the previous consistent generation for readers.
pub struct BatchScheduler {
    api: Arc<CasesApiClient>,
    store: Arc<CacheStore>,
    settings: Arc<Settings>,
}

impl BatchScheduler {
    pub fn new(api: Arc<CasesApiClient>, store: Arc<CacheStore>, settings: Arc<Settings>) -> Self {
        Self {
            api,
            store,
            settings,
        }
    }

    /// Starts the scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_batch_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Batch scheduler started");

        cancellation_token.cancelled().await;
        info!("Batch scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_batch_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let api = self.api.clone();
        let store = self.store.clone();
        let settings = self.settings.clone();
        let interval = self.settings.batch.poll_interval_secs;

        let job = Job::new_repeated_async(
            std::time::Duration::from_secs(interval),
            move |_uuid, _lock| {
                let api = api.clone();
                let store = store.clone();
                let settings = settings.clone();
                Box::pin(async move {
                    if let Err(e) = batch::run(&api, &store, &settings, false).await {
                        error!("Batch run failed: {:#}", e);
                    }
                })
            },
        )?;

        scheduler.add(job).await?;
        info!("Registered batch job (every {}s)", interval);
        Ok(())
    }
}
