use amount_codecs::{record::format_timestamp, Timestamp};
use std::collections::BTreeMap;

/// Running totals per timestamp, shared by every connection of the process.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Store(BTreeMap<Timestamp, f64>);

impl Store {
    /// Adds to the total at `timestamp`, creating it on first sight.
    #[cfg(test)]
    pub fn upsert(&mut self, timestamp: Timestamp, amount: f64) -> anyhow::Result<()> {
        self.apply([(timestamp, amount)])
    }

    /// Upserts every entry or none of them: if any running total would stop
    /// being finite, the store is left as it was.
    pub fn apply<I>(&mut self, entries: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = (Timestamp, f64)>,
    {
        let mut pending = BTreeMap::new();
        for (timestamp, amount) in entries {
            let total = match pending.get(&timestamp).copied().or_else(|| self.get(&timestamp)) {
                Some(total) => total + amount,
                None => amount,
            };
            anyhow::ensure!(
                total.is_finite(),
                "Adding {amount} at {} leaves no finite total",
                format_timestamp(&timestamp)
            );
            pending.insert(timestamp, total);
        }
        self.0.extend(pending);
        Ok(())
    }

    pub fn get(&self, timestamp: &Timestamp) -> Option<f64> {
        self.0.get(timestamp).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn snapshot(&self) -> Vec<(Timestamp, f64)> {
        self.0.iter().map(|(ts, total)| (*ts, *total)).collect()
    }
}
