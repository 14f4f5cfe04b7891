use amount_codecs::{record::format_timestamp, report};
use rustyline::{error::ReadlineError, DefaultEditor};

/// Reads lines until the processing terminator. `None` on CTRL+C or CTRL+D.
pub fn read_batch(rl: &mut DefaultEditor, terminator: &str) -> anyhow::Result<Option<Vec<String>>> {
    let mut lines = Vec::new();
    loop {
        match rl.readline(">> ") {
            Ok(line) => {
                if is_terminator(&line, terminator) {
                    return Ok(Some(lines));
                }
                lines.push(line);
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL+C");
                return Ok(None);
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL+D");
                return Ok(None);
            }
            Err(e) => {
                anyhow::bail!("{e:?}");
            }
        }
    }
}

pub fn is_terminator(line: &str, terminator: &str) -> bool {
    line.trim().to_lowercase() == terminator.trim().to_lowercase()
}

/// Totals table for a report, or the raw text for anything else.
pub fn describe(response: &str) -> String {
    match report::decode(response) {
        Ok(records) if records.is_empty() => "No totals yet".to_string(),
        Ok(records) => records
            .iter()
            .map(|record| format!("{}  {}", format_timestamp(&record.timestamp), record.amount))
            .collect::<Vec<_>>()
            .join("\n"),
        Err(_) => response.to_string(),
    }
}
