use anyhow::{Context, Result};
use bucket_worker::{
    config::{AppConfig, Backend},
    create_router,
    services::{
        bucket::Bucket, local_bucket::LocalBucket, memory_bucket::MemoryBucket,
        scheduler::Scheduler, worker_service::WorkerService,
    },
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucket-worker with config: {:?}", cfg);

    // --- Handle migration mode ---
    if migrate {
        if cfg.backend != Backend::Local {
            tracing::warn!("--migrate has no effect for the {:?} backend", cfg.backend);
            return Ok(());
        }
        open_local_bucket(&cfg).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize the bucket ---
    let bucket: Arc<dyn Bucket> = match cfg.backend {
        Backend::Local => Arc::new(open_local_bucket(&cfg).await?),
        Backend::Memory => {
            tracing::warn!("Using in-memory bucket; objects are lost on exit");
            Arc::new(MemoryBucket::new())
        }
    };
    let service = WorkerService::new(bucket, cfg.seed_writes);

    // --- Scheduled writes ---
    let tracker = TaskTracker::new();
    let shutdown = CancellationToken::new();
    let scheduler = cfg.schedule_interval().map(|period| {
        Scheduler::new(service.clone(), tracker.clone(), period).spawn(shutdown.clone())
    });
    if scheduler.is_none() {
        tracing::info!("Scheduler disabled");
    }

    // --- Build router ---
    let app = create_router(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // --- Let detached writes finish ---
    shutdown.cancel();
    if let Some(handle) = scheduler {
        if let Err(err) = handle.await {
            tracing::error!("Scheduler task failed: {}", err);
        }
    }
    tracker.close();
    tracing::info!("Waiting for {} scheduled writes", tracker.len());
    tracker.wait().await;

    Ok(())
}

async fn open_local_bucket(cfg: &AppConfig) -> Result<LocalBucket> {
    tracing::debug!("Connecting using raw URL => {}", cfg.database_url);
    LocalBucket::open(&cfg.database_url, &cfg.storage_dir)
        .await
        .with_context(|| format!("opening local bucket at {}", cfg.database_url))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install terminate handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => tracing::info!("Received terminate signal, starting graceful shutdown..."),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
