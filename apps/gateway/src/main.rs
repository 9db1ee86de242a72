//! RouteMesh Gateway binary
//!
//! Loads configuration from the environment, sets up logging and runs the
//! gateway until SIGINT/SIGTERM.

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use routemesh_gateway::{cancel_on_signal, GatewayConfig, GatewayServer};

/// Log file prefix, e.g. `routemesh-gateway.2026-10-19.log`
const LOG_PREFIX: &str = "routemesh-gateway";

/// Initialize the tracing subscriber.
///
/// Console output always; a daily-rotated file when `LOG_DIR` is set. The
/// returned guard must live as long as the process.
fn init_tracing() -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // RUST_LOG takes precedence over these defaults
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "info,routemesh_core=debug,routemesh_registry=debug,routemesh_gateway=debug,tower_http=info,hyper=warn",
        )
    });

    // Console layer: colored, compact
    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let (file_layer, guard) = match std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()) {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create log directory {}", dir))?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_PREFIX)
                .filename_suffix("log")
                .build(&dir)
                .context("failed to create log file appender")?;
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

            // File layer: no colors, more detail
            let layer = fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // loads .env files before anything reads the environment
    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;
    let _guard = init_tracing()?;

    info!(
        "RouteMesh Gateway v{} starting (mode={})",
        env!("CARGO_PKG_VERSION"),
        config.mode
    );

    let server = GatewayServer::new(config)?;
    let shutdown = CancellationToken::new();
    let signals = cancel_on_signal(shutdown.clone());

    let result = server.run(shutdown.clone()).await;
    shutdown.cancel();
    let _ = signals.await;

    result
}
