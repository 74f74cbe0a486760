//! Status code validation.
//!
//! # Design
//! Acceptance and categorisation are separate questions. The acceptance
//! policy only decides whether a code passes; a rejected code is always
//! categorised by its numeric bucket, so a 404 is a client error whether the
//! validator is strict or lenient.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::http::RawResponse;

/// Rejection produced by a `StatusCodeValidator`, bucketed by status code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusValidationError {
    /// Codes below 200, and rejected codes in 200–399.
    #[error("invalid status {code}: {}", lossy(.body))]
    Invalid { code: u16, body: Vec<u8> },

    #[error("client error {code}: {}", lossy(.body))]
    ClientError { code: u16, body: Vec<u8> },

    #[error("server error {code}: {}", lossy(.body))]
    ServerError { code: u16, body: Vec<u8> },

    /// Codes 600 and above.
    #[error("unknown status {code}: {}", lossy(.body))]
    UnknownError { code: u16, body: Vec<u8> },
}

fn lossy(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

impl StatusValidationError {
    /// Bucket a rejected status code.
    pub fn from_code(code: u16, body: Vec<u8>) -> Self {
        match code {
            400..=499 => StatusValidationError::ClientError { code, body },
            500..=599 => StatusValidationError::ServerError { code, body },
            600..=u16::MAX => StatusValidationError::UnknownError { code, body },
            _ => StatusValidationError::Invalid { code, body },
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            StatusValidationError::Invalid { code, .. }
            | StatusValidationError::ClientError { code, .. }
            | StatusValidationError::ServerError { code, .. }
            | StatusValidationError::UnknownError { code, .. } => *code,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            StatusValidationError::Invalid { body, .. }
            | StatusValidationError::ClientError { body, .. }
            | StatusValidationError::ServerError { body, .. }
            | StatusValidationError::UnknownError { body, .. } => body,
        }
    }
}

/// Which status codes a validator accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptancePolicy {
    Range { low: u16, high: u16 },
    Set(BTreeSet<u16>),
}

impl AcceptancePolicy {
    pub fn accepts(&self, code: u16) -> bool {
        match self {
            AcceptancePolicy::Range { low, high } => (*low..=*high).contains(&code),
            AcceptancePolicy::Set(codes) => codes.contains(&code),
        }
    }
}

impl fmt::Display for AcceptancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptancePolicy::Range { low, high } => write!(f, "[{low}, {high}]"),
            AcceptancePolicy::Set(codes) => write!(f, "{codes:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCodeValidator {
    policy: AcceptancePolicy,
}

impl StatusCodeValidator {
    /// Accepts `[200, 299]`.
    pub fn standard() -> Self {
        Self {
            policy: AcceptancePolicy::Range { low: 200, high: 299 },
        }
    }

    /// Accepts `[200, 399]`.
    pub fn lenient() -> Self {
        Self {
            policy: AcceptancePolicy::Range { low: 200, high: 399 },
        }
    }

    /// Accepts exactly 200, 201 and 204.
    pub fn strict() -> Self {
        Self::custom([200, 201, 204])
    }

    pub fn custom(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            policy: AcceptancePolicy::Set(codes.into_iter().collect()),
        }
    }

    pub fn policy(&self) -> &AcceptancePolicy {
        &self.policy
    }

    pub fn accepts(&self, code: u16) -> bool {
        self.policy.accepts(code)
    }

    /// Pass the response through unchanged, or reject it with its bucket.
    pub fn validate(&self, response: RawResponse) -> Result<RawResponse, StatusValidationError> {
        if self.accepts(response.status) {
            return Ok(response);
        }
        Err(StatusValidationError::from_code(response.status, response.body))
    }
}

impl Default for StatusCodeValidator {
    fn default() -> Self {
        Self::standard()
    }
}

/// Whether `code` is accepted by the default `[200, 299]` policy.
pub fn is_success(code: u16) -> bool {
    (200..=299).contains(&code)
}

/// Only server errors are worth repeating.
pub fn is_retryable_status(code: u16) -> bool {
    (500..=599).contains(&code)
}
