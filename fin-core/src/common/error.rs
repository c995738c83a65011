use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("staging load failed: {message}")]
    Load { message: String },

    #[error("merge failed: {message}")]
    Merge { message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
