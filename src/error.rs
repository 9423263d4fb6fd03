use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildTrendError {
    /// Input of the wrong shape was handed to an entry point; a bug at the call site.
    #[error("Type error: {0}")]
    Type(String),

    /// Input of the right shape carrying an unusable value.
    #[error("Invalid value: {0}")]
    Value(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    BuildCheck(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BuildTrendError>;
