//! Ordered validation and transformation of raw responses.
//!
//! # Design
//! Each `ResponseStep` receives the response produced by the step before it
//! and either returns a (possibly rewritten) response or fails with a
//! classified `NetworkError`. The first failure ends the run. Status
//! validation is the built-in step; callers append their own.

use std::fmt;
use std::sync::Arc;

use crate::descriptor::RequestDescriptor;
use crate::error::NetworkError;
use crate::http::RawResponse;
use crate::status::StatusCodeValidator;

pub trait ResponseStep: Send + Sync {
    fn process(
        &self,
        response: RawResponse,
        descriptor: Option<&RequestDescriptor>,
    ) -> Result<RawResponse, NetworkError>;
}

impl<F> ResponseStep for F
where
    F: Fn(RawResponse, Option<&RequestDescriptor>) -> Result<RawResponse, NetworkError>
        + Send
        + Sync,
{
    fn process(
        &self,
        response: RawResponse,
        descriptor: Option<&RequestDescriptor>,
    ) -> Result<RawResponse, NetworkError> {
        self(response, descriptor)
    }
}

/// Rejects responses whose status the validator does not accept.
#[derive(Debug, Clone, Default)]
pub struct StatusValidationStep {
    validator: StatusCodeValidator,
}

impl StatusValidationStep {
    pub fn new(validator: StatusCodeValidator) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &StatusCodeValidator {
        &self.validator
    }
}

impl ResponseStep for StatusValidationStep {
    fn process(
        &self,
        response: RawResponse,
        _descriptor: Option<&RequestDescriptor>,
    ) -> Result<RawResponse, NetworkError> {
        Ok(self.validator.validate(response)?)
    }
}

#[derive(Clone, Default)]
pub struct ResponsePipeline {
    steps: Vec<Arc<dyn ResponseStep>>,
}

impl ResponsePipeline {
    /// A pipeline with no steps; every response passes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default `[200, 299]` status validation.
    pub fn standard() -> Self {
        Self::new().with_step(StatusValidationStep::default())
    }

    pub fn with_step(mut self, step: impl ResponseStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(
        &self,
        response: RawResponse,
        descriptor: Option<&RequestDescriptor>,
    ) -> Result<RawResponse, NetworkError> {
        self.steps
            .iter()
            .try_fold(response, |response, step| step.process(response, descriptor))
    }
}

impl fmt::Debug for ResponsePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponsePipeline")
            .field("steps", &self.steps.len())
            .finish()
    }
}
