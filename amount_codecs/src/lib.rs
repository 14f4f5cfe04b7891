pub mod batch;
pub mod codec;
pub mod record;
pub mod report;

pub use crate::batch::Batch;
pub use crate::codec::MessageCodec;
pub use crate::record::{AmountRecord, HaltRecord};

pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Root element of every record on the wire.
pub const ROOT: &str = "data";

/// Separates records inside one message.
pub const RECORD_SEPARATOR: char = '\n';

/// Case-insensitive substring match used for the halt keyword on both ends.
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    text.to_lowercase().contains(&keyword.to_lowercase())
}

#[cfg(test)]
mod test {
    use super::contains_keyword;

    #[test]
    fn keyword_matches_anywhere_ignoring_case() {
        assert!(contains_keyword("5\n3\nQuIt", "quit"));
        assert!(contains_keyword("<haltMessage>QUIT</haltMessage>", "quit"));
        assert!(contains_keyword("quitting time", "QUIT"));
        assert!(!contains_keyword("5\n3", "quit"));
        assert!(!contains_keyword("anything", ""));
    }
}
