use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Invalid URI format: {0}")]
    InvalidUri(String),

    #[error("{0} is required")]
    MissingArgument(&'static str),

    #[error("No refresh token available. Please login first.")]
    NoRefreshToken,

    #[error("token contains characters that are not valid in a header")]
    InvalidToken,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}
