use booth_core::{Config, CoreServices, init_logger_with_file};
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), BoxError> {
    // Cooperative scheduling: one thread, every request suspends at I/O
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run())
}

async fn run() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    init_logger_with_file(&config.log_level, config.log_json, config.log_dir.as_deref())?;

    tracing::info!(environment = %config.environment, "Starting booth-core");

    let services = CoreServices::connect(&config).await?;

    let shutdown = CancellationToken::new();
    let reconciler = services.reconciler(shutdown.clone()).map(|r| tokio::spawn(r.run()));
    if reconciler.is_none() {
        tracing::info!("Mirror reconciler disabled (RECONCILE_INTERVAL_SECS=0)");
    }

    tracing::info!("booth-core ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    shutdown.cancel();
    if let Some(handle) = reconciler {
        handle.await?;
    }

    Ok(())
}
