use amount_codecs::MessageCodec;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub app_terminator: String,
    pub processing_terminator: String,
    #[serde(default = "default_capacity")]
    pub buffer_capacity: usize,
}

impl ClientConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_toml(&config)
            .with_context(|| format!("Invalid configuration file {}", path.display()))
    }

    pub fn from_toml(config: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(config).context("Failed to parse client toml")?;
        anyhow::ensure!(
            !config.app_terminator.trim().is_empty(),
            "appTerminator must not be empty"
        );
        anyhow::ensure!(
            !config.processing_terminator.trim().is_empty(),
            "processingTerminator must not be empty"
        );
        anyhow::ensure!(config.buffer_capacity > 0, "bufferCapacity must be positive");
        Ok(config)
    }
}

fn default_capacity() -> usize {
    MessageCodec::DEFAULT_CAPACITY
}
