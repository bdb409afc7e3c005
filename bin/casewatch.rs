use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use casewatch::{
    api::CasesApiClient, cache::CacheStore, pipeline::batch, BatchScheduler, Settings,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    let args: Vec<String> = std::env::args().collect();
    let once = args.iter().any(|a| a == "--once");
    let force = args.iter().any(|a| a == "--force");

    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );

    let store = Arc::new(
        CacheStore::connect(&settings.cache)
            .await
            .context("Failed to initialize cache connection")?,
    );

    let api = Arc::new(CasesApiClient::new(&settings.api)?);

    if once {
        let published = batch::run(&api, &store, &settings, force).await?;
        info!("Single batch run finished (published: {published})");
        return Ok(());
    }

    run_service(api, store, settings).await
}

async fn run_service(
    api: Arc<CasesApiClient>,
    store: Arc<CacheStore>,
    settings: Arc<Settings>,
) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();

    let scheduler = BatchScheduler::new(api, store, settings);

    let scheduler_token = cancellation_token.child_token();
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.run(scheduler_token).await {
            error!("Batch scheduler failed: {:#}", e);
        }
    });

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Service running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Finishing all tasks...");
    cancellation_token.cancel();

    let _ = scheduler_handle.await;

    info!("Scheduler stopped");
    Ok(())
}
