use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Configuration error in '{file}' (field `{field}`): {reason}")]
    Configuration {
        file: String,
        field: &'static str,
        reason: String,
    },

    #[error("Load integrity error in '{file}': {reason}")]
    LoadIntegrity { file: String, reason: String },

    #[error("Ambiguous {metric} aggregate for segment {segment_id}: found {found} flagged rows")]
    AmbiguousAggregate {
        segment_id: i64,
        metric: &'static str,
        found: usize,
    },

    #[error("Stored value '{value}' in {column} could not be read back")]
    CorruptColumn { column: &'static str, value: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EtlError {
    pub fn config(file: &str, field: &'static str, reason: impl Into<String>) -> Self {
        EtlError::Configuration {
            file: file.to_string(),
            field,
            reason: reason.into(),
        }
    }
}

pub type EtlResult<T> = Result<T, EtlError>;
