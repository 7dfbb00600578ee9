use anyhow::Result;
use chanvault::utils::{ensure_dir, get_chanvault_home};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".parse().unwrap());

    // Rotating event log alongside stderr output.
    let log_dir = ensure_dir(get_chanvault_home()?.join("logs"))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "chanvault.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    chanvault::cli::run().await
}
