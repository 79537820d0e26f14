/// The main error type for Lernwerk applications
#[derive(Debug, thiserror::Error)]
pub enum LernwerkError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl LernwerkError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Returns a safe error message suitable for client responses in production.
    ///
    /// Client errors (4xx-equivalent) expose their message since the client
    /// needs to know what went wrong. Server errors return a generic message
    /// to prevent information disclosure; the details are logged server-side.
    #[must_use]
    pub fn safe_message(&self) -> String {
        match self {
            Self::NotFound(msg) => format!("Not found: {msg}"),
            Self::BadRequest(msg) => format!("Bad request: {msg}"),
            Self::Unauthorized(msg) => format!("Unauthorized: {msg}"),
            Self::Forbidden(msg) => format!("Forbidden: {msg}"),
            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
            Self::ServiceUnavailable(_) => "Service unavailable".to_string(),
        }
    }
}

/// Result type alias for Lernwerk operations
pub type Result<T> = std::result::Result<T, LernwerkError>;

impl From<serde_json::Error> for LernwerkError {
    fn from(err: serde_json::Error) -> Self {
        // Classify based on error category
        if err.is_data() || err.is_syntax() || err.is_eof() {
            LernwerkError::BadRequest(format!("JSON error: {err}"))
        } else {
            // IO errors are internal
            LernwerkError::Internal(format!("JSON serialization error: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = LernwerkError::not_found("User not found");
        assert!(matches!(err, LernwerkError::NotFound(_)));
        assert_eq!(err.to_string(), "Not found: User not found");
    }

    #[test]
    fn test_bad_request_error() {
        let err = LernwerkError::bad_request("Invalid input");
        assert!(matches!(err, LernwerkError::BadRequest(_)));
        assert_eq!(err.to_string(), "Bad request: Invalid input");
    }

    #[test]
    fn test_anyhow_error() {
        let anyhow_err = anyhow::anyhow!("Something unexpected");
        let err: LernwerkError = anyhow_err.into();
        assert!(matches!(err, LernwerkError::Anyhow(_)));
    }

    #[test]
    fn test_safe_message_client_errors_exposed() {
        assert_eq!(
            LernwerkError::bad_request("Invalid email").safe_message(),
            "Bad request: Invalid email"
        );
        assert_eq!(
            LernwerkError::not_found("User").safe_message(),
            "Not found: User"
        );
    }

    #[test]
    fn test_safe_message_server_errors_hidden() {
        assert_eq!(
            LernwerkError::internal("Connection to db-prod-01:5432 failed").safe_message(),
            "Internal server error"
        );
        assert_eq!(
            LernwerkError::service_unavailable("Upstream at 10.0.0.3 unreachable").safe_message(),
            "Service unavailable"
        );
    }

    #[test]
    fn test_from_serde_json_syntax_error() {
        let result: std::result::Result<serde_json::Value, _> =
            serde_json::from_str("{ invalid json }");
        let err: LernwerkError = result.unwrap_err().into();
        assert!(matches!(err, LernwerkError::BadRequest(_)));
        assert!(err.to_string().contains("JSON error"));
    }
}
