use thiserror::Error;

pub type Result<T> = std::result::Result<T, WaybackError>;

#[derive(Debug, Error)]
pub enum WaybackError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by the Wayback Machine")]
    RateLimited,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Client setup failed: {0}")]
    Setup(String),
}

impl From<reqwest::Error> for WaybackError {
    fn from(err: reqwest::Error) -> Self {
        WaybackError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for WaybackError {
    fn from(err: serde_json::Error) -> Self {
        WaybackError::Parse(err.to_string())
    }
}
