use crate::{contains_keyword, AmountRecord, HaltRecord, Timestamp, RECORD_SEPARATOR};
use chrono::{Duration, Utc};

/// Amounts typed in one console batch, ready to be turned into a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub amounts: Vec<f64>,
    pub halt: bool,
}

impl Batch {
    /// Lines up to the first one mentioning the halt keyword are eligible;
    /// anything after it is ignored. Values that are not finite numbers are
    /// dropped with a warning.
    pub fn from_lines<S: AsRef<str>>(lines: &[S], halt_keyword: &str) -> Self {
        let halt_at = lines
            .iter()
            .position(|line| contains_keyword(line.as_ref(), halt_keyword));
        let eligible = &lines[..halt_at.unwrap_or(lines.len())];
        let amounts = eligible
            .iter()
            .filter_map(|line| parse_amount(line.as_ref()))
            .collect::<Vec<_>>();
        if amounts.is_empty() && !eligible.is_empty() {
            tracing::warn!("No suitable numerical values found in {} lines", eligible.len());
        }
        Self {
            amounts,
            halt: halt_at.is_some(),
        }
    }

    /// Renders the request, one record per line with the halt record last.
    /// `None` when there is nothing to send.
    pub fn into_message(self, halt_keyword: &str) -> Option<String> {
        let mut clock = Clock::default();
        let mut records = self
            .amounts
            .into_iter()
            .map(|amount| AmountRecord::new(clock.stamp(), amount).to_string())
            .collect::<Vec<_>>();
        if self.halt {
            records.push(HaltRecord::new(clock.stamp(), halt_keyword).to_string());
        }
        if records.is_empty() {
            None
        } else {
            Some(records.join(&RECORD_SEPARATOR.to_string()))
        }
    }
}

fn parse_amount(line: &str) -> Option<f64> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.parse::<f64>() {
        Ok(amount) if amount.is_finite() => Some(amount),
        Ok(_) => {
            tracing::warn!("Unable to use {line:?}, it is not a finite number");
            None
        }
        Err(e) => {
            tracing::warn!("Unable to convert {line:?}, it is not a valid number: {e}");
            None
        }
    }
}

/// Wall clock that never hands out the same instant twice.
#[derive(Debug, Default)]
struct Clock {
    last: Option<Timestamp>,
}

impl Clock {
    fn stamp(&mut self) -> Timestamp {
        let now = Utc::now();
        let stamp = match self.last {
            Some(last) if now <= last => last + Duration::nanoseconds(1),
            _ => now,
        };
        self.last = Some(stamp);
        stamp
    }
}
