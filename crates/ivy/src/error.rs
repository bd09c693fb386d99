//! Error types and error handlers.
//!
//! Handlers report failure by returning an [`Error`]. The router converts
//! a failed chain into a response by invoking its [`ErrorHandler`] exactly
//! once per request; handlers never write error responses themselves unless
//! they choose to.
//!
//! | Variant | Status |
//! |---|---|
//! | [`Error::Http`] | the carried status |
//! | [`Error::Multiple`] | the first carried status, else 500 |
//! | [`Error::Json`] | 400 |
//! | anything else | 500 |

use std::fmt;
use std::sync::Arc;

use http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderValue, StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::response::ResponseWriter;
use crate::types::Request;

/// Result type returned by every handler.
pub type HandlerResult = Result<(), Error>;

/// Callback that turns a chain failure into a response.
///
/// The handler receives the error, the response sink the chain was writing
/// into, and the request as the chain last saw it.
pub type ErrorHandler = Arc<dyn Fn(Error, &mut dyn ResponseWriter, &Request) + Send + Sync>;

/// Error returned by a handler.
#[derive(Debug, Error)]
pub enum Error {
    /// An error that maps to a specific HTTP status.
    #[error("{message}")]
    Http {
        /// Response status.
        status: StatusCode,
        /// Client-facing message.
        message: String,
    },

    /// Several errors reported together.
    #[error("{}", join_messages(.0))]
    Multiple(Vec<Error>),

    /// A JSON body could not be decoded or a value could not be encoded.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A header name or value was rejected.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Creates an error carrying an explicit status.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates a 400 error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(StatusCode::BAD_REQUEST, message)
    }

    /// Creates a 401 error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::http(StatusCode::UNAUTHORIZED, message)
    }

    /// Creates a 404 error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(StatusCode::NOT_FOUND, message)
    }

    /// Creates an opaque error from a message. Maps to 500.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Other(anyhow::Error::msg(message))
    }

    /// Wraps any error type. Maps to 500.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(anyhow::Error::new(err))
    }

    /// Joins errors into one.
    ///
    /// Nested aggregates are flattened. A single error is returned as is.
    pub fn join(errors: impl IntoIterator<Item = Error>) -> Self {
        let mut flat = Vec::new();
        for err in errors {
            match err {
                Self::Multiple(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            if let Some(only) = flat.pop() {
                return only;
            }
        }
        Self::Multiple(flat)
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http { status, .. } => *status,
            Self::Multiple(errors) => errors
                .iter()
                .map(Self::status)
                .find(|s| *s != StatusCode::INTERNAL_SERVER_ERROR)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::InvalidHeader(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The individual errors: the members of an aggregate, or this error
    /// alone.
    #[must_use]
    pub fn errors(&self) -> &[Error] {
        match self {
            Self::Multiple(errors) => errors,
            other => std::slice::from_ref(other),
        }
    }

    /// The JSON error envelope: `{"errors": ["...", ...]}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let messages: Vec<String> = self.errors().iter().map(ToString::to_string).collect();
        json!({ "errors": messages })
    }
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A failure that prevents the router from building a request context.
///
/// Fatal errors bypass the error handler: the router logs them and answers
/// with a bare 500.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FatalError {
    /// The request metadata slot reserved for the key-value store holds a
    /// value of another type.
    #[error("request metadata key `{key}` does not hold a key-value store")]
    CorruptStore {
        /// The reserved key.
        key: &'static str,
    },
}

/// Plain-text error handler used when none is configured.
///
/// Always writes 500 and the error message followed by a newline, whatever
/// status the error carries. Use [`json_error_handler`] or a custom handler
/// to answer with [`Error::status`].
pub fn default_error_handler(err: Error, writer: &mut dyn ResponseWriter, _request: &Request) {
    let headers = writer.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    writer.write_status(StatusCode::INTERNAL_SERVER_ERROR);
    writer.write(format!("{err}\n").as_bytes());
}

/// Error handler that writes the JSON error envelope.
///
/// ```json
/// {"errors": ["first failure", "second failure"]}
/// ```
pub fn json_error_handler(err: Error, writer: &mut dyn ResponseWriter, _request: &Request) {
    writer
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    writer.write_status(err.status());
    writer.write(err.to_json().to_string().as_bytes());
}

/// Wraps a closure as an [`ErrorHandler`].
pub fn error_handler<F>(f: F) -> ErrorHandler
where
    F: Fn(Error, &mut dyn ResponseWriter, &Request) + Send + Sync + 'static,
{
    Arc::new(f)
}
