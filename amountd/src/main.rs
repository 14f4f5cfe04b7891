use arguments::Arguments;
use clap::Parser;
use config::ServerConfig;
use multiplexer::Multiplexer;

mod arguments;
mod config;
mod handler;
mod multiplexer;
mod store;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

// One thread only: the store has a single writer, the readiness loop.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Arguments::parse();
    let config = ServerConfig::from_file(&args.config)?;
    tracing::info!("Loaded configuration from {}", args.config.display());

    let multiplexer = Multiplexer::bind(config).await?;
    multiplexer.run().await
}
