use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with its JSON error shape.
    #[error("Chat history service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("IP lookup failed: {0}")]
    Resolve(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
