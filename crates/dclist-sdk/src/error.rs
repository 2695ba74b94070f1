//! Error types for the dclist client.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code used when a push message carries neither errors nor an update.
pub const CLIENT_ERROR: &str = "CLIENT_ERROR";

/// Code used when the subscription socket closes or fails.
pub const WEBSOCKET_ERROR: &str = "WEBSOCKET_ERROR";

/// Code used when the server omits `extensions.code`.
pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

/// HTTP error information captured from reqwest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorInfo {
    /// Error message.
    pub message: String,
    /// HTTP status code (if available).
    pub status_code: Option<u16>,
    /// Whether the error was a timeout.
    pub is_timeout: bool,
    /// Whether the error was a connection failure.
    pub is_connect: bool,
}

impl From<reqwest::Error> for HttpErrorInfo {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            status_code: err.status().map(|status| status.as_u16()),
            is_timeout: err.is_timeout(),
            is_connect: err.is_connect(),
        }
    }
}

impl HttpErrorInfo {
    /// Build from a non-success reply whose body was not a GraphQL response.
    #[must_use]
    pub fn from_status(status: StatusCode, body: String) -> Self {
        Self {
            message: body,
            status_code: Some(status.as_u16()),
            is_timeout: false,
            is_connect: false,
        }
    }
}

/// `extensions` block of a GraphQL error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorExtensions {
    /// Short categorical code, e.g. `UNAUTHENTICATED`.
    #[serde(default)]
    pub code: Option<String>,
}

/// GraphQL error as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human-readable message.
    pub message: String,
    /// Extensions metadata.
    #[serde(default)]
    pub extensions: GraphqlErrorExtensions,
}

impl GraphqlError {
    /// Create an error with a code.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: GraphqlErrorExtensions {
                code: Some(code.into()),
            },
        }
    }

    /// The error code, or [`UNKNOWN_ERROR`] when the server sent none.
    #[must_use]
    pub fn code(&self) -> &str {
        self.extensions.code.as_deref().unwrap_or(UNKNOWN_ERROR)
    }
}

/// Error type for all client operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DclistError {
    /// No token was supplied and none was found in the environment.
    #[error("Token you provided is invalid")]
    InvalidToken,

    /// Caller input has the wrong shape.
    #[error("{0}")]
    InvalidArgument(String),

    /// Structured error from the API, or one synthesized locally with
    /// [`CLIENT_ERROR`] / [`WEBSOCKET_ERROR`].
    #[error("{code} -> {message}")]
    Api {
        /// Short categorical code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// HTTP/network failure.
    #[error("HTTP error: {0:?}")]
    Http(HttpErrorInfo),

    /// Body could not be decoded.
    #[error("JSON error: {0}")]
    Json(String),

    /// `graphql-transport-ws` protocol violation.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Details.
        message: String,
    },
}

impl DclistError {
    /// Shorthand for [`DclistError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Shorthand for [`DclistError::Api`].
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The payload-less push message error.
    #[must_use]
    pub fn cannot_receive_data() -> Self {
        Self::api(CLIENT_ERROR, "Cannot receive data from API")
    }

    /// The connection-level failure error.
    pub fn websocket(reason: impl Into<String>) -> Self {
        Self::api(WEBSOCKET_ERROR, reason)
    }

    /// Error code for [`DclistError::Api`], `None` otherwise.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns `true` if a transport retry may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(info) => {
                info.is_timeout
                    || info.is_connect
                    || info.status_code.is_some_and(|status| {
                        status >= 500 || status == StatusCode::TOO_MANY_REQUESTS.as_u16()
                    })
            }
            _ => false,
        }
    }
}

impl From<GraphqlError> for DclistError {
    fn from(err: GraphqlError) -> Self {
        let code = err.code().to_string();
        Self::Api {
            code,
            message: err.message,
        }
    }
}

impl From<reqwest::Error> for DclistError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(HttpErrorInfo::from(err))
    }
}

impl From<serde_json::Error> for DclistError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type for dclist operations.
pub type DclistResult<T> = Result<T, DclistError>;
