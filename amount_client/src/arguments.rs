use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Arguments {
    /// Client configuration file (host, port, keywords, buffer capacity)
    #[arg(short, long, default_value = "amount_client.toml")]
    pub config: PathBuf,
}
