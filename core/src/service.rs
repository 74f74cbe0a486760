//! The request orchestrator.
//!
//! # Design
//! `NetworkService` drives one request through an explicit state machine:
//!
//! ```text
//! Building -> AwaitingSend -> Validating -> Decoding -> Succeeded
//!    ^             |              |             |
//!    |             v              v             v
//!    +-------- Retrying ----------+----------> Failed
//! ```
//!
//! Build and prepare failures fail immediately. Transport and pipeline
//! failures go through the retry policy. Decode failures are final.
//!
//! The service holds only immutable configuration, so one instance can serve
//! any number of concurrent requests. Each call owns its own attempt counter
//! and request id; cancellation is observed while waiting on the transport and
//! while sleeping between attempts.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::builder::build_request;
use crate::decode::{Decoder, JsonDecoder, ResponseShape};
use crate::delay::{Delayer, TokioDelayer};
use crate::descriptor::{Endpoint, RequestDescriptor};
use crate::error::{NetworkError, TransportError, TransportErrorKind};
use crate::http::{RawResponse, ResponseMetadata, TransportRequest};
use crate::interceptor::{Interceptor, InterceptorChain, RequestContext};
use crate::mapper::classify;
use crate::pipeline::ResponsePipeline;
use crate::retry::{RetryConfiguration, RetryDecision, RetryPolicy};
use crate::transport::Transport;

enum Stage {
    Building {
        attempt: u32,
    },
    AwaitingSend {
        attempt: u32,
        context: RequestContext,
        request: TransportRequest,
    },
    Validating {
        attempt: u32,
        context: RequestContext,
        response: RawResponse,
    },
    Decoding {
        response: RawResponse,
    },
    Retrying {
        attempt: u32,
        error: NetworkError,
    },
}

pub struct NetworkService<T, D = JsonDecoder> {
    transport: T,
    decoder: D,
    interceptors: InterceptorChain,
    pipeline: ResponsePipeline,
    retry: RetryPolicy,
    delayer: Arc<dyn Delayer>,
}

impl<T: Transport> NetworkService<T> {
    /// JSON decoding, standard status validation, default retry preset.
    pub fn new(transport: T) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder(transport: T) -> NetworkServiceBuilder<T> {
        NetworkServiceBuilder {
            transport,
            decoder: JsonDecoder,
            interceptors: InterceptorChain::new(),
            pipeline: ResponsePipeline::standard(),
            retry: RetryPolicy::default(),
            delayer: Arc::new(TokioDelayer),
        }
    }
}

impl<T: Transport, D: Decoder> NetworkService<T, D> {
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the endpoint and decode into its declared response type.
    pub async fn request<R: ResponseShape>(&self, endpoint: &Endpoint<R>) -> Result<R, NetworkError> {
        self.request_as(endpoint.descriptor()).await
    }

    /// Run a descriptor and decode into an explicitly chosen type.
    pub async fn request_as<R: ResponseShape>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<R, NetworkError> {
        self.request_as_with_cancel(descriptor, &CancellationToken::new())
            .await
    }

    pub async fn request_with_cancel<R: ResponseShape>(
        &self,
        endpoint: &Endpoint<R>,
        cancel: &CancellationToken,
    ) -> Result<R, NetworkError> {
        self.request_as_with_cancel(endpoint.descriptor(), cancel)
            .await
    }

    pub async fn request_as_with_cancel<R: ResponseShape>(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<R, NetworkError> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "request",
            %request_id,
            method = %descriptor.method,
            url = %format_args!("{}{}", descriptor.base_url, descriptor.path)
        );
        self.run(request_id, descriptor, cancel).instrument(span).await
    }

    async fn run<R: ResponseShape>(
        &self,
        request_id: Uuid,
        descriptor: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<R, NetworkError> {
        let mut stage = Stage::Building { attempt: 1 };
        loop {
            stage = match stage {
                Stage::Building { attempt } => {
                    debug!(attempt, "building request");
                    let mut request = build_request(descriptor).map_err(|err| classify(Box::new(err)))?;
                    let context = RequestContext::new(request_id, attempt, &request);
                    self.interceptors
                        .prepare(&context, &mut request)
                        .await
                        .map_err(classify)?;
                    Stage::AwaitingSend {
                        attempt,
                        context,
                        request,
                    }
                }

                Stage::AwaitingSend {
                    attempt,
                    context,
                    request,
                } => {
                    self.interceptors.will_send(&context, &request).await;
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(TransportError::cancelled()),
                        sent = self.transport.send(&request) => sent,
                    };
                    match sent {
                        Ok((body, metadata)) => match into_raw_response(body, metadata, request) {
                            Ok(response) => Stage::Validating {
                                attempt,
                                context,
                                response,
                            },
                            Err(error) => Stage::Retrying { attempt, error },
                        },
                        Err(err) if err.kind == TransportErrorKind::Cancelled => {
                            return Err(NetworkError::Connection(err));
                        }
                        Err(err) => Stage::Retrying {
                            attempt,
                            error: NetworkError::Connection(err),
                        },
                    }
                }

                Stage::Validating {
                    attempt,
                    context,
                    response,
                } => {
                    debug!(attempt, status = response.status, "validating response");
                    self.interceptors.did_receive(&context, &response).await;
                    match self.pipeline.run(response, Some(descriptor)) {
                        Ok(response) => Stage::Decoding { response },
                        Err(error) => Stage::Retrying { attempt, error },
                    }
                }

                Stage::Decoding { response } => {
                    return R::from_response(&self.decoder, &response).map_err(|err| {
                        debug!(error = %err, "decoding failed");
                        NetworkError::Decoding(err)
                    });
                }

                Stage::Retrying { attempt, error } => match self.retry.decide(&error, attempt) {
                    RetryDecision::Stop => {
                        debug!(attempt, error = %error, "giving up");
                        return Err(error);
                    }
                    RetryDecision::RetryAfter(delay) => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "retrying request"
                        );
                        let cancelled = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => true,
                            _ = self.delayer.sleep(delay) => false,
                        };
                        if cancelled {
                            return Err(NetworkError::Connection(TransportError::cancelled()));
                        }
                        Stage::Building {
                            attempt: attempt + 1,
                        }
                    }
                    RetryDecision::RetryImmediately => {
                        warn!(attempt, error = %error, "retrying request immediately");
                        if cancel.is_cancelled() {
                            return Err(NetworkError::Connection(TransportError::cancelled()));
                        }
                        Stage::Building {
                            attempt: attempt + 1,
                        }
                    }
                },
            };
        }
    }
}

fn into_raw_response(
    body: Vec<u8>,
    metadata: ResponseMetadata,
    request: TransportRequest,
) -> Result<RawResponse, NetworkError> {
    match metadata {
        ResponseMetadata::Http(head) => Ok(RawResponse {
            status: head.status,
            headers: head.headers,
            body,
            request: Some(request),
        }),
        ResponseMetadata::Opaque(description) => Err(NetworkError::Connection(TransportError::new(
            TransportErrorKind::BadServerResponse,
            format!("response is not HTTP: {description}"),
        ))),
    }
}

impl<T, D> fmt::Debug for NetworkService<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkService")
            .field("interceptors", &self.interceptors)
            .field("pipeline", &self.pipeline)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Configures a `NetworkService`.
pub struct NetworkServiceBuilder<T, D = JsonDecoder> {
    transport: T,
    decoder: D,
    interceptors: InterceptorChain,
    pipeline: ResponsePipeline,
    retry: RetryPolicy,
    delayer: Arc<dyn Delayer>,
}

impl<T: Transport, D: Decoder> NetworkServiceBuilder<T, D> {
    pub fn decoder<D2: Decoder>(self, decoder: D2) -> NetworkServiceBuilder<T, D2> {
        NetworkServiceBuilder {
            transport: self.transport,
            decoder,
            interceptors: self.interceptors,
            pipeline: self.pipeline,
            retry: self.retry,
            delayer: self.delayer,
        }
    }

    /// Append one interceptor to the chain.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors = self.interceptors.with(interceptor);
        self
    }

    pub fn shared_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors = self.interceptors.with_shared(interceptor);
        self
    }

    pub fn interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn pipeline(mut self, pipeline: ResponsePipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keep the current retry rules, replace the configuration.
    pub fn retry_configuration(mut self, config: RetryConfiguration) -> Self {
        let retry = RetryPolicy::new(config).with_mapper(self.retry.mapper().clone());
        self.retry = if self.retry.retries_immediately() {
            retry.with_immediate_retries()
        } else {
            retry
        };
        self
    }

    pub fn delayer(mut self, delayer: impl Delayer + 'static) -> Self {
        self.delayer = Arc::new(delayer);
        self
    }

    pub fn build(self) -> NetworkService<T, D> {
        NetworkService {
            transport: self.transport,
            decoder: self.decoder,
            interceptors: self.interceptors,
            pipeline: self.pipeline,
            retry: self.retry,
            delayer: self.delayer,
        }
    }
}
