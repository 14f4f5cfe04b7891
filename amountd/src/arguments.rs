use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Arguments {
    /// Server configuration file (host, ports, halt keyword, buffer capacity, placeholder)
    #[arg(short, long, default_value = "amountd.toml")]
    pub config: PathBuf,
}
