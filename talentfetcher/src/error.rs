use thiserror::Error;

#[derive(Debug, Error)]
pub enum TalentFetcherError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TalentFetcherError>;
