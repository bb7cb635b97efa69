use thiserror::Error;

use crate::api_error::{ApiError, ErrorKind};

/// Error type for RetailCRM API operations.
///
/// - `RequestFailed` — network/transport errors (wraps `reqwest::Error`)
/// - `Decode` — a response body that could not be parsed
/// - `Encode` — a request entity that could not be serialized
/// - `Api` — the server reported a failure, classified into an [`ErrorKind`]
/// - `InvalidConfig` — the client was configured with unusable values
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl CrmError {
    /// The classified API failure, if this is one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            CrmError::Api(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.api_error().is_some_and(|err| err.is(kind))
    }
}

pub type Result<T> = std::result::Result<T, CrmError>;
