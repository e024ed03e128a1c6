use thiserror::Error;

/// Terminal failure of a transport call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Non-retryable HTTP status (bad request, auth failure, not found, ...).
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Every attempt hit a transient fault.
    #[error("request failed after {attempts} attempts (last: {last})")]
    Exhausted { attempts: u32, last: String },

    /// The request could not be built at all; retrying cannot help.
    #[error("invalid request: {0}")]
    Request(#[source] reqwest::Error),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl TransportError {
    /// HTTP status for caller errors, `None` otherwise.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_exposes_code() {
        let err = TransportError::Status {
            status: 404,
            body: "not found".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_exhausted());
        assert_eq!(err.to_string(), "HTTP 404: not found");
    }

    #[test]
    fn exhausted_error_has_no_status() {
        let err = TransportError::Exhausted {
            attempts: 3,
            last: "HTTP 503".into(),
        };
        assert_eq!(err.status(), None);
        assert!(err.is_exhausted());
        assert!(err.to_string().contains("3 attempts"));
    }
}
