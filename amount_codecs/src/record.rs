use crate::{Timestamp, ROOT};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, de::Error as _, Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

/// One submitted reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmountRecord {
    pub timestamp: Timestamp,
    #[serde(deserialize_with = "finite")]
    pub amount: f64,
}

/// End-of-session marker, always the last record of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HaltRecord {
    pub timestamp: Timestamp,
    pub halt_message: String,
}

impl AmountRecord {
    pub fn new(timestamp: Timestamp, amount: f64) -> Self {
        Self { timestamp, amount }
    }
}

impl HaltRecord {
    pub fn new(timestamp: Timestamp, halt_message: impl Into<String>) -> Self {
        Self {
            timestamp,
            halt_message: halt_message.into(),
        }
    }
}

impl fmt::Display for AmountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_xml(self)?)
    }
}

impl fmt::Display for HaltRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_xml(self)?)
    }
}

impl FromStr for AmountRecord {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        from_xml(s).context("Invalid amount record")
    }
}

impl FromStr for HaltRecord {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        from_xml(s).context("Invalid halt record")
    }
}

/// Serializes under the `<data>` root, one record per line: line breaks in
/// text content become character references.
fn to_xml<T: Serialize>(record: &T) -> Result<String, fmt::Error> {
    let xml = quick_xml::se::to_string_with_root(ROOT, record).map_err(|e| {
        tracing::error!("Failed to serialize record: {e}");
        fmt::Error
    })?;
    Ok(xml.replace('\n', "&#10;").replace('\r', "&#13;"))
}

/// The reader ignores the root name and anything after the first element,
/// so both are checked up front.
fn from_xml<T: DeserializeOwned>(s: &str) -> anyhow::Result<T> {
    let s = s.trim();
    let open = format!("<{ROOT}>");
    let close = format!("</{ROOT}>");
    anyhow::ensure!(
        s.starts_with(&open) && s.ends_with(&close) && s.matches(&close).count() == 1,
        "Expected exactly one {open} element"
    );
    Ok(quick_xml::de::from_str(s)?)
}

fn finite<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let amount = f64::deserialize(deserializer)?;
    if !amount.is_finite() {
        return Err(D::Error::custom(format!("amount {amount} is not finite")));
    }
    Ok(amount)
}

pub fn format_timestamp(timestamp: &Timestamp) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_timestamp(s: &str) -> anyhow::Result<Timestamp> {
    let timestamp = DateTime::parse_from_rfc3339(s.trim())
        .with_context(|| format!("Failed to parse timestamp {s:?}"))?;
    Ok(timestamp.with_timezone(&Utc))
}
