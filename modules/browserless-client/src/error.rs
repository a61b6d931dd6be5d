use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserlessError>;

#[derive(Debug, Error)]
pub enum BrowserlessError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Client setup failed: {0}")]
    Setup(String),
}

impl BrowserlessError {
    /// Whether retrying the same request later could succeed.
    /// Rate limiting and server-side failures qualify; other 4xx responses do not.
    pub fn is_transient(&self) -> bool {
        match self {
            BrowserlessError::Network(_) | BrowserlessError::Timeout(_) => true,
            BrowserlessError::Api { status, .. } => *status == 429 || *status >= 500,
            BrowserlessError::Setup(_) => false,
        }
    }
}

impl From<reqwest::Error> for BrowserlessError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BrowserlessError::Timeout(err.to_string())
        } else {
            BrowserlessError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        assert!(BrowserlessError::Api { status: 429, message: String::new() }.is_transient());
        assert!(BrowserlessError::Api { status: 503, message: String::new() }.is_transient());
        assert!(BrowserlessError::Timeout("slow".into()).is_transient());
    }

    #[test]
    fn missing_resource_is_permanent() {
        assert!(!BrowserlessError::Api { status: 404, message: String::new() }.is_transient());
        assert!(!BrowserlessError::Setup("bad tls".into()).is_transient());
    }
}
