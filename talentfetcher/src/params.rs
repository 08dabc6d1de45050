use crate::error::{Result, TalentFetcherError};
use crate::models::TalentColumns;
use serde::Deserialize;

/// How to read the source file. Loaded alongside the pipeline config;
/// everything has a default matching the standard talent export.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceParams {
    /// Field delimiter, a single byte.
    pub delimiter: char,
    pub columns: TalentColumns,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            delimiter: ',',
            columns: TalentColumns::default(),
        }
    }
}

impl SourceParams {
    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter).map_err(|_| {
            TalentFetcherError::InvalidParam(format!(
                "delimiter must be a single-byte character, got '{}'",
                self.delimiter
            ))
        })
    }
}
