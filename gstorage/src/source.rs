use crate::entity::EntitySet;
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// One source row: its absolute offset plus the raw field map. Fields stay
/// as text until a transformer resolves them; a record has no identity
/// beyond its offset.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub offset: u64,
    fields: HashMap<String, String>,
}

impl RawRecord {
    pub fn new(offset: u64, fields: HashMap<String, String>) -> Self {
        Self { offset, fields }
    }

    /// A field that must be present and non-empty.
    pub fn required_str(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// An optional text field; empty strings count as absent.
    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.required_str(name)
    }

    /// An optional numeric field. Unparseable text counts as absent.
    pub fn opt_i64(&self, name: &str) -> Option<i64> {
        self.opt_str(name).and_then(|v| v.trim().parse().ok())
    }

    /// A field holding a JSON array. `Ok(None)` when the field is absent,
    /// `Err` when present but unparseable.
    pub fn json_list<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> std::result::Result<Option<Vec<T>>, serde_json::Error> {
        match self.opt_str(name) {
            Some(raw) => serde_json::from_str(raw).map(Some),
            None => Ok(None),
        }
    }
}

/// An ordered slice of records pulled from the source in one read. A
/// corrupt chunk comes back with no records but a real `end_offset`, so
/// the pipeline can still account for the rows it spanned.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub records: Vec<RawRecord>,
    /// Offset of the first row after this chunk.
    pub end_offset: u64,
}

/// An ordered, resumable stream of rows. Implementations must preserve
/// row order within and across chunks, and must survive a bad chunk by
/// skipping it rather than aborting the stream.
#[async_trait]
pub trait RecordSource: Send {
    /// Total row count when the source knows it cheaply; progress only.
    fn total_rows(&self) -> Option<u64>;

    /// Repositions the cursor. Only valid before the first `next_chunk`.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// The next ordered chunk, or `None` at end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Chunk>>;

    /// Chunks dropped so far because they could not be parsed.
    fn chunks_skipped(&self) -> u64;
}

/// Why a record produced no entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingKey(&'static str),
    BadEmbeddedList(String),
}

/// Outcome of transforming one record. Skips are expected data-quality
/// events, not errors; they are counted and never retried.
#[derive(Debug, Clone)]
pub enum Transformed {
    Set(EntitySet),
    Skip(SkipReason),
}

/// Maps one raw record to a typed entity set. Implementations must be
/// pure functions of the record so they stay safe to call concurrently.
pub trait RecordTransformer: Send + Sync {
    fn transform(&self, record: &RawRecord) -> Transformed;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, &str)]) -> RawRecord {
        let map = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawRecord::new(0, map)
    }

    #[test]
    fn empty_fields_count_as_absent() {
        let rec = record(&[("name", "  "), ("age", "41")]);
        assert_eq!(rec.required_str("name"), None);
        assert_eq!(rec.opt_i64("age"), Some(41));
        assert_eq!(rec.opt_i64("missing"), None);
    }

    #[test]
    fn json_list_distinguishes_absent_from_malformed() {
        let rec = record(&[("tags", r#"["rust","sql"]"#), ("bad", "[not json")]);
        let tags: Option<Vec<String>> = rec.json_list("tags").unwrap();
        assert_eq!(tags.unwrap(), vec!["rust", "sql"]);
        assert!(rec.json_list::<String>("bad").is_err());
        let absent: Option<Vec<String>> = rec.json_list("nope").unwrap();
        assert!(absent.is_none());
    }
}
