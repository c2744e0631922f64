//! Upstream client error types.

/// Errors from querying the monitor endpoint.
#[derive(Debug, thiserror::Error)]
pub enum WienError {
    /// Request could not be sent or the response body not read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("API error {status}")]
    Status { status: u16 },

    /// Response body is not a monitor document
    #[error("JSON parse error: {message}")]
    Json {
        message: String,
        body: Option<String>,
    },

    /// Configured base URL cannot be parsed
    #[error("invalid base URL {url:?}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl WienError {
    /// Failures where the endpoint was never successfully reached.
    pub fn is_transport(&self) -> bool {
        matches!(self, WienError::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WienError::Status { status: 503 };
        assert_eq!(err.to_string(), "API error 503");
        assert!(!err.is_transport());

        let err = WienError::Json {
            message: "expected value".into(),
            body: Some("<html>".into()),
        };
        assert!(err.to_string().contains("expected value"));

        let err = WienError::InvalidUrl {
            url: "::".into(),
            message: "relative URL without a base".into(),
        };
        assert!(err.to_string().contains("\"::\""));
    }
}
