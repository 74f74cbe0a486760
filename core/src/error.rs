//! Error types for the request pipeline.
//!
//! # Design
//! `NetworkError` is the closed taxonomy every failure resolves to before it
//! reaches the retry policy or the caller. The leaf types (`TransportError`,
//! `DecodeError`, `RequestBuildError`, and `StatusValidationError` in the
//! `status` module) keep the original cause so diagnostics survive
//! classification.

use std::fmt;

use thiserror::Error;

use crate::status::StatusValidationError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The closed failure taxonomy surfaced to callers.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The response status was rejected by the processing pipeline.
    #[error("HTTP Error: {0}")]
    Http(#[from] StatusValidationError),

    /// The response body could not be decoded into the requested shape.
    #[error("Decoding Error: {0}")]
    Decoding(#[from] DecodeError),

    /// The transport failed before a response was available.
    #[error("Connection Error: {0}")]
    Connection(#[from] TransportError),

    #[error("Unknown Error: {0}")]
    Unknown(#[source] BoxError),
}

/// Fieldless mirror of `NetworkError`, handy for comparisons and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Http,
    Decoding,
    Connection,
    Unknown,
}

impl NetworkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetworkError::Http(_) => ErrorKind::Http,
            NetworkError::Decoding(_) => ErrorKind::Decoding,
            NetworkError::Connection(_) => ErrorKind::Connection,
            NetworkError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn unknown(cause: impl Into<BoxError>) -> Self {
        NetworkError::Unknown(cause.into())
    }

    /// Status code carried by an `Http` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Http(err) => Some(err.code()),
            _ => None,
        }
    }

    /// Whether this is the failure produced by caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            NetworkError::Connection(TransportError {
                kind: TransportErrorKind::Cancelled,
                ..
            })
        )
    }
}

/// Transport-level failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    ConnectionLost,
    TimedOut,
    CannotFindHost,
    CannotConnect,
    DnsFailure,
    NotConnected,
    BadUrl,
    Cancelled,
    BadServerResponse,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransportErrorKind::ConnectionLost => "connection lost",
            TransportErrorKind::TimedOut => "timed out",
            TransportErrorKind::CannotFindHost => "cannot find host",
            TransportErrorKind::CannotConnect => "cannot connect to host",
            TransportErrorKind::DnsFailure => "dns lookup failed",
            TransportErrorKind::NotConnected => "not connected to the internet",
            TransportErrorKind::BadUrl => "bad url",
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::BadServerResponse => "bad server response",
            TransportErrorKind::Other => "transport failure",
        };
        f.write_str(text)
    }
}

/// Failure reported by a `Transport`.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn cancelled() -> Self {
        Self::new(TransportErrorKind::Cancelled, "request was cancelled")
    }
}

/// The response body could not be turned into the requested type.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DecodeError {
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Failure while turning a descriptor into a `TransportRequest`.
#[derive(Debug, Error)]
pub enum RequestBuildError {
    #[error("invalid request url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header {name}")]
    InvalidHeader { name: String },

    #[error("field {field} cannot be bound to the {location} of the request: {reason}")]
    PropertyTagMismatch {
        field: String,
        location: &'static str,
        reason: String,
    },

    #[error("failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),
}
