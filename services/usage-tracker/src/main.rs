use std::sync::Arc;

use anyhow::{Context, Result};
use model_quota_ledger::{PersistenceAdapter, QuotaLedger, SystemClock};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use model_usage_tracker::tracker::{start_change_listener, start_limit_notifier, start_sweep_task};
use model_usage_tracker::{create_router, ApiState, InputGate, UsageDatabase, UsageTrackerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = UsageTrackerConfig::from_env()?;
    init_tracing(&config.log_level)?;

    info!(
        host = %config.server_host,
        port = config.server_port,
        data_dir = %config.data_dir.display(),
        "starting usage-tracker service"
    );

    let database = Arc::new(
        UsageDatabase::open(&config.data_dir).context("failed to open usage database")?,
    );
    let store: Arc<dyn PersistenceAdapter> = database.clone();
    let ledger = Arc::new(QuotaLedger::new(store, Arc::new(SystemClock)));
    let restored = ledger
        .initialize()
        .await
        .context("failed to load usage data")?;
    info!(tracked_models = restored.records.len(), "usage ledger ready");

    let gate = Arc::new(InputGate::new());
    let _notifier = start_limit_notifier(Arc::clone(&ledger), Arc::clone(&gate));
    let _listener = start_change_listener(Arc::clone(&ledger), Arc::clone(&gate));
    let _sweeper = start_sweep_task(
        Arc::clone(&ledger),
        Arc::clone(&gate),
        config.sweep_interval(),
    );
    let _watcher = database.start_change_watcher(config.change_poll_interval());

    // Windows may have lapsed while the service was down.
    ledger.sweep_expired().await?;
    let over_limit = ledger.recheck_limits().await?;
    if !over_limit.is_empty() {
        info!(models = over_limit.len(), "models over limit at startup");
    }

    let addr = config.listen_addr();
    let state = Arc::new(ApiState::new(Arc::clone(&ledger), gate, config));
    let router = create_router(state);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "usage-tracker listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("usage-tracker service shutting down");
    Ok(())
}

fn init_tracing(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
