use amount_codecs::MessageCodec;
use anyhow::Context;
use serde::{Deserialize, Deserializer};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub main_host: String,
    #[serde(deserialize_with = "port_list")]
    pub ports: Vec<u16>,
    pub app_terminator: String,
    #[serde(default = "default_capacity")]
    pub buffer_capacity: usize,
    pub temporary_message: String,
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_toml(&config)
            .with_context(|| format!("Invalid configuration file {}", path.display()))
    }

    pub fn from_toml(config: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(config).context("Failed to parse server toml")?;
        anyhow::ensure!(!config.ports.is_empty(), "No ports configured");
        anyhow::ensure!(
            !config.app_terminator.trim().is_empty(),
            "appTerminator must not be empty"
        );
        anyhow::ensure!(config.buffer_capacity > 0, "bufferCapacity must be positive");
        Ok(config)
    }
}

fn default_capacity() -> usize {
    MessageCodec::DEFAULT_CAPACITY
}

/// Accepts `ports = "9000, 9001"`, `ports = [9000, 9001]` or `ports = 9000`.
fn port_list<'de, D>(deserializer: D) -> Result<Vec<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ports {
        Single(u16),
        List(Vec<u16>),
        Text(String),
    }

    match Ports::deserialize(deserializer)? {
        Ports::Single(port) => Ok(vec![port]),
        Ports::List(ports) => Ok(ports),
        Ports::Text(text) => parse_ports(&text).map_err(serde::de::Error::custom),
    }
}

pub fn parse_ports(text: &str) -> anyhow::Result<Vec<u16>> {
    text.split(',')
        .map(str::trim)
        .filter(|port| !port.is_empty())
        .map(|port| {
            port.parse::<u16>()
                .with_context(|| format!("Invalid port {port:?}"))
        })
        .collect()
}
