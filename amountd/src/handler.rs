use crate::store::Store;
use amount_codecs::{contains_keyword, report, AmountRecord, HaltRecord, RECORD_SEPARATOR};
use anyhow::Context;

/// Outcome of one client message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    /// Report to send back; `None` means the caller substitutes its placeholder.
    pub response: Option<String>,
    /// The message carried the halt keyword, close after writing.
    pub halt: bool,
}

/// Applies one message to the store.
///
/// When the halt keyword appears anywhere in the message, the last line is
/// taken as the halt record, wherever the keyword actually was. All amount
/// lines are decoded before the store is touched, so a malformed line or a
/// total that overflows rejects the whole message.
pub fn process(message: &str, halt_keyword: &str, store: &mut Store) -> anyhow::Result<Reply> {
    let halt = contains_keyword(message, halt_keyword);
    let mut lines = message
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();

    if halt {
        if let Some(line) = lines.pop() {
            log_halt(line);
        }
    }

    let response = if !lines.is_empty() {
        let records = lines
            .iter()
            .map(|line| {
                line.parse::<AmountRecord>()
                    .with_context(|| format!("Failed to parse amount record: {line}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        store
            .apply(records.into_iter().map(|record| (record.timestamp, record.amount)))
            .context("Failed to apply amounts")?;
        tracing::debug!("Store holds {} timestamps", store.len());
        Some(report::encode(store.snapshot())?)
    } else if halt && !store.is_empty() {
        Some(report::encode(store.snapshot())?)
    } else {
        None
    };

    Ok(Reply { response, halt })
}

fn log_halt(line: &str) {
    match line.parse::<HaltRecord>() {
        Ok(record) => tracing::info!("Client resignation received: {record:?}"),
        Err(e) => tracing::warn!("Halt keyword present but last line is no halt record: {e:#}"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use amount_codecs::{Batch, Timestamp};
    use chrono::{Duration, TimeZone, Utc};

    const QUIT: &str = "quit";

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn amount(secs: i64, amount: f64) -> String {
        AmountRecord::new(t(secs), amount).to_string()
    }

    fn halt(message: &str) -> String {
        HaltRecord::new(t(99), message).to_string()
    }

    fn message(lines: &[String]) -> String {
        lines.join("\n")
    }

    #[test]
    fn amounts_are_stored_and_reported() {
        let mut store = Store::default();
        let reply = process(
            &message(&[amount(1, 5.0), amount(2, 3.0)]),
            QUIT,
            &mut store,
        )
        .unwrap();
        assert!(!reply.halt);
        let report = report::decode(&reply.response.unwrap()).unwrap();
        assert_eq!(
            report,
            vec![AmountRecord::new(t(1), 5.0), AmountRecord::new(t(2), 3.0)]
        );
    }

    #[test]
    fn amounts_followed_by_halt() {
        let mut store = Store::default();
        let reply = process(
            &message(&[amount(1, 5.0), amount(2, 3.0), halt("QUIT")]),
            QUIT,
            &mut store,
        )
        .unwrap();
        assert!(reply.halt);
        assert_eq!(report::decode(&reply.response.unwrap()).unwrap().len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn console_batch_with_halt() {
        let request = Batch::from_lines(&["5", "3", "QUIT"], QUIT)
            .into_message(QUIT)
            .unwrap();
        let mut store = Store::default();
        let reply = process(&request, QUIT, &mut store).unwrap();
        assert!(reply.halt);
        let report = report::decode(&reply.response.unwrap()).unwrap();
        let amounts = report.iter().map(|r| r.amount).collect::<Vec<_>>();
        assert_eq!(amounts, vec![5.0, 3.0]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn client_skips_bad_values_but_server_rejects_bad_records() {
        let request = Batch::from_lines(&["5", "oops", "3"], QUIT)
            .into_message(QUIT)
            .unwrap();
        let mut store = Store::default();
        let reply = process(&request, QUIT, &mut store).unwrap();
        assert_eq!(report::decode(&reply.response.unwrap()).unwrap().len(), 2);

        let tampered = format!("{request}\n<data><amount>oops</amount></data>");
        assert!(process(&tampered, QUIT, &mut store).is_err());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn halt_only_on_empty_store_yields_nothing() {
        let mut store = Store::default();
        let reply = process(&halt("quit"), QUIT, &mut store).unwrap();
        assert_eq!(
            reply,
            Reply {
                response: None,
                halt: true
            }
        );
    }

    #[test]
    fn halt_only_reports_existing_totals() {
        let mut store = Store::default();
        store.upsert(t(1), 7.0).unwrap();
        let reply = process(&halt("quit"), QUIT, &mut store).unwrap();
        assert!(reply.halt);
        assert_eq!(
            report::decode(&reply.response.unwrap()).unwrap(),
            vec![AmountRecord::new(t(1), 7.0)]
        );
    }

    #[test]
    fn empty_message_yields_nothing() {
        let mut store = Store::default();
        store.upsert(t(1), 7.0).unwrap();
        for text in ["", "\n\n", "   "] {
            assert_eq!(process(text, QUIT, &mut store).unwrap(), Reply::default());
        }
    }

    #[test]
    fn repeated_timestamp_accumulates_across_messages() {
        let mut store = Store::default();
        process(&amount(1, 2.5), QUIT, &mut store).unwrap();
        let reply = process(&amount(1, 4.0), QUIT, &mut store).unwrap();
        assert_eq!(
            report::decode(&reply.response.unwrap()).unwrap(),
            vec![AmountRecord::new(t(1), 6.5)]
        );
    }

    #[test]
    fn malformed_line_rejects_whole_message() {
        let mut store = Store::default();
        let result = process(
            &message(&[amount(1, 5.0), "<data><amount>x</amount></data>".to_string()]),
            QUIT,
            &mut store,
        );
        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn overflowing_total_rejects_whole_message() {
        let mut store = Store::default();
        let reply = process(&amount(0, 1e308), QUIT, &mut store).unwrap();
        assert!(reply.response.is_some());

        let result = process(&message(&[amount(1, 1.0), amount(0, 1e308)]), QUIT, &mut store);
        assert!(result.is_err());
        assert_eq!(store.snapshot(), vec![(t(0), 1e308)]);

        let reply = process(&amount(0, -1e308), QUIT, &mut store).unwrap();
        let report = report::decode(&reply.response.unwrap()).unwrap();
        assert_eq!(report, vec![AmountRecord::new(t(0), 0.0)]);
    }

    #[test]
    fn keyword_anywhere_drops_only_the_last_line() {
        // Keyword in the first line: the trailing amount is what gets dropped,
        // and the leading halt record then fails to decode as an amount.
        let mut store = Store::default();
        let reply = process(&message(&[halt("quit"), amount(2, 2.0)]), QUIT, &mut store);
        assert!(reply.is_err());
        assert!(store.is_empty());

        let reply = process(
            &message(&[amount(1, 1.0), amount(2, 2.0), "QUIT".to_string(), amount(3, 3.0)]),
            QUIT,
            &mut store,
        );
        assert!(reply.is_err(), "bare keyword line mid-batch is not an amount");
        assert!(store.is_empty());

        let reply = process(
            &message(&[amount(1, 1.0), amount(2, 2.0)]),
            "data",
            &mut store,
        )
        .unwrap();
        assert!(reply.halt);
        assert_eq!(store.snapshot(), vec![(t(1), 1.0)]);
    }

    #[test]
    fn undecodable_halt_line_still_halts() {
        let mut store = Store::default();
        let reply = process(&message(&[amount(1, 1.0), "QUIT".to_string()]), QUIT, &mut store)
            .unwrap();
        assert!(reply.halt);
        assert_eq!(store.snapshot(), vec![(t(1), 1.0)]);
    }
}
