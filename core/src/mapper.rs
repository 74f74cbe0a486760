//! Failure classification and retry eligibility.
//!
//! # Design
//! `classify` folds any error into the closed `NetworkError` taxonomy by
//! downcasting in priority order. Retry eligibility is an open, ordered chain
//! of `RetryRule`s: each rule may answer or abstain, the first answer wins and
//! a chain where every rule abstains says "do not retry".

use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, DecodeError, NetworkError, TransportError, TransportErrorKind};
use crate::status::StatusValidationError;

/// Fold an arbitrary error into the taxonomy.
///
/// Already-classified values pass through unchanged, so classification is
/// idempotent.
pub fn classify(error: BoxError) -> NetworkError {
    let error = match error.downcast::<NetworkError>() {
        Ok(classified) => return *classified,
        Err(error) => error,
    };
    let error = match error.downcast::<StatusValidationError>() {
        Ok(status) => return NetworkError::Http(*status),
        Err(error) => error,
    };
    let error = match error.downcast::<DecodeError>() {
        Ok(decode) => return NetworkError::Decoding(*decode),
        Err(error) => error,
    };
    let error = match error.downcast::<serde_json::Error>() {
        Ok(json) => return NetworkError::Decoding(DecodeError::from(*json)),
        Err(error) => error,
    };
    match error.downcast::<TransportError>() {
        Ok(transport) => NetworkError::Connection(*transport),
        Err(error) => NetworkError::Unknown(error),
    }
}

/// One link of the retry-eligibility chain.
///
/// `None` means the rule has no opinion about this error.
pub trait RetryRule: Send + Sync {
    fn evaluate(&self, error: &NetworkError) -> Option<bool>;
}

impl<F> RetryRule for F
where
    F: Fn(&NetworkError) -> Option<bool> + Send + Sync,
{
    fn evaluate(&self, error: &NetworkError) -> Option<bool> {
        self(error)
    }
}

/// Transient transport failures are retryable; caller or request faults are not.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportErrorRule;

impl RetryRule for TransportErrorRule {
    fn evaluate(&self, error: &NetworkError) -> Option<bool> {
        let NetworkError::Connection(transport) = error else {
            return None;
        };
        let retryable = match transport.kind {
            TransportErrorKind::ConnectionLost
            | TransportErrorKind::TimedOut
            | TransportErrorKind::CannotFindHost
            | TransportErrorKind::CannotConnect
            | TransportErrorKind::DnsFailure
            | TransportErrorKind::NotConnected => true,
            TransportErrorKind::BadUrl
            | TransportErrorKind::Cancelled
            | TransportErrorKind::BadServerResponse
            | TransportErrorKind::Other => false,
        };
        Some(retryable)
    }
}

/// Server errors are retryable; every other status bucket is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerStatusRule;

impl RetryRule for ServerStatusRule {
    fn evaluate(&self, error: &NetworkError) -> Option<bool> {
        match error {
            NetworkError::Http(StatusValidationError::ServerError { .. }) => Some(true),
            NetworkError::Http(_) => Some(false),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ErrorMapper {
    rules: Vec<Arc<dyn RetryRule>>,
}

impl ErrorMapper {
    /// Transport rule first, then the server-status rule.
    pub fn standard() -> Self {
        Self {
            rules: vec![Arc::new(TransportErrorRule), Arc::new(ServerStatusRule)],
        }
    }

    /// A mapper with no rules; nothing is retryable until rules are added.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule, consulted after the existing ones.
    pub fn with_rule(mut self, rule: impl RetryRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Insert a rule ahead of the existing ones.
    pub fn with_leading_rule(mut self, rule: impl RetryRule + 'static) -> Self {
        self.rules.insert(0, Arc::new(rule));
        self
    }

    pub fn classify(&self, error: BoxError) -> NetworkError {
        classify(error)
    }

    pub fn is_retryable(&self, error: &NetworkError) -> bool {
        self.rules
            .iter()
            .find_map(|rule| rule.evaluate(error))
            .unwrap_or(false)
    }
}

impl Default for ErrorMapper {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for ErrorMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorMapper")
            .field("rules", &self.rules.len())
            .finish()
    }
}
