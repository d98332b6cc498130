use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The review source has no such app. Recorded verbatim on the app result.
    #[error("app_not_found")]
    AppNotFound,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Review source error: {message}")]
    Source { message: String },

    /// A stored value could not be read back, e.g. an unparseable timestamp.
    #[error("Invalid stored data: {0}")]
    Data(String),

    #[error("Unknown run status: {0}")]
    UnknownStatus(String),

    #[error("Cannot reconstruct run #{run_id}: {message}")]
    Reconstruction { run_id: i64, message: String },
}

pub type Result<T> = std::result::Result<T, IngestError>;
