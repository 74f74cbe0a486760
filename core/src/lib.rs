//! Resilient asynchronous HTTP request pipeline.
//!
//! # Overview
//! Turns a declarative `RequestDescriptor` into a `TransportRequest`, runs it
//! through interceptors and a pluggable `Transport`, validates and decodes
//! the response, and retries failures according to a taxonomy-driven
//! `RetryPolicy`. The core never touches the network itself; the transport
//! does.
//!
//! # Design
//! - Every failure is folded into the closed `NetworkError` taxonomy before
//!   it reaches the retry policy or the caller.
//! - Payload kinds are a closed enum; response steps, retry rules and
//!   interceptors are open, ordered lists of trait objects.
//! - `NetworkService` holds only immutable configuration, so a single
//!   instance is shared across concurrent requests without locks.

pub mod builder;
pub mod decode;
pub mod delay;
pub mod descriptor;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod mapper;
pub mod pipeline;
pub mod retry;
pub mod service;
pub mod status;
pub mod transport;

pub use builder::{apply_payload, build_request};
pub use decode::{Decoder, JsonDecoder, NoContent, ResponseShape};
pub use delay::{Delayer, TokioDelayer};
pub use descriptor::{Endpoint, FieldLocation, RequestDescriptor, TaggedField, TaskPayload};
pub use error::{
    BoxError, DecodeError, ErrorKind, NetworkError, RequestBuildError, TransportError,
    TransportErrorKind,
};
pub use http::{HttpHead, HttpMethod, RawResponse, ResponseMetadata, TransportRequest};
pub use interceptor::{
    HeaderInterceptor, Interceptor, InterceptorChain, RequestContext, TracingInterceptor,
};
pub use mapper::{classify, ErrorMapper, RetryRule, ServerStatusRule, TransportErrorRule};
pub use pipeline::{ResponsePipeline, ResponseStep, StatusValidationStep};
pub use retry::{JitterRange, RetryConfiguration, RetryDecision, RetryPolicy};
pub use service::{NetworkService, NetworkServiceBuilder};
pub use status::{
    is_retryable_status, is_success, AcceptancePolicy, StatusCodeValidator, StatusValidationError,
};
pub use transport::Transport;

pub use tokio_util::sync::CancellationToken;
