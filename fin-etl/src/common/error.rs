use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("page fetch failed at offset {offset}: {message}")]
    Fetch { offset: u64, message: String },

    #[error("malformed record: {message}")]
    MalformedRecord { message: String },

    #[error("export intake failed: {message}")]
    Export { message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] fin_core::common::error::CoreError),
}

pub type Result<T> = std::result::Result<T, EtlError>;
