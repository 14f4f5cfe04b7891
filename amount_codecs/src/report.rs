use crate::{record::format_timestamp, AmountRecord, Timestamp};
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Wraps each reported record as `{"data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataWrapper {
    pub data: AmountRecord,
}

/// Renders aggregated totals as a JSON array, keeping the given order.
/// JSON has no spelling for infinities, so a non-finite total is an error.
pub fn encode<I>(entries: I) -> anyhow::Result<String>
where
    I: IntoIterator<Item = (Timestamp, f64)>,
{
    let report = entries
        .into_iter()
        .map(|(timestamp, amount)| {
            anyhow::ensure!(
                amount.is_finite(),
                "Total {amount} at {} cannot be reported",
                format_timestamp(&timestamp)
            );
            Ok(DataWrapper {
                data: AmountRecord::new(timestamp, amount),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    serde_json::to_string(&report).context("Failed to serialize report")
}

pub fn decode(text: &str) -> anyhow::Result<Vec<AmountRecord>> {
    let report: Vec<DataWrapper> =
        serde_json::from_str(text).context("Failed to parse report")?;
    Ok(report.into_iter().map(|wrapper| wrapper.data).collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn encodes_wrapped_entries() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 1).unwrap();
        let json = encode([(t1, 8.0), (t2, -1.5)]).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let entries = value.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["data"]["amount"], 8.0);
        assert_eq!(entries[1]["data"]["amount"], -1.5);
        assert_eq!(entries[0]["data"]["timestamp"], "2024-05-01T10:00:00Z");

        let records = decode(&json).unwrap();
        assert_eq!(
            records,
            vec![AmountRecord::new(t1, 8.0), AmountRecord::new(t2, -1.5)]
        );
    }

    #[test]
    fn empty_report_is_an_empty_array() {
        assert_eq!(encode(std::iter::empty()).unwrap(), "[]");
    }

    #[test]
    fn non_finite_totals_are_refused() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert!(encode([(t1, f64::INFINITY)]).is_err());
        assert!(encode([(t1, 1.0), (t1, f64::NAN)]).is_err());
        assert!(decode(r#"[{"data":{"timestamp":"2024-05-01T10:00:00Z","amount":null}}]"#).is_err());
    }

    #[test]
    fn placeholder_is_not_a_report() {
        assert!(decode("No amounts recorded yet").is_err());
    }
}
