//! Lifecycle hooks around each attempt.
//!
//! # Design
//! An interceptor may implement any of three hooks; the rest default to
//! no-ops. `prepare` may rewrite the pending request and its failure aborts
//! the request. `will_send` and `did_receive` are observers: their failures
//! are logged and swallowed.
//!
//! The same interceptor instance is shared by every request a service runs,
//! so implementations must be reentrant or synchronise internally.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::BoxError;
use crate::http::{HttpMethod, RawResponse, TransportRequest};

/// Identifies one attempt of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_id: Uuid,
    attempt: u32,
    method: HttpMethod,
    url: String,
}

impl RequestContext {
    pub fn new(request_id: Uuid, attempt: u32, request: &TransportRequest) -> Self {
        Self {
            request_id,
            attempt,
            method: request.method,
            url: request.url.clone(),
        }
    }

    /// Stable across all attempts of the same request.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn prepare(
        &self,
        _context: &RequestContext,
        _request: &mut TransportRequest,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    async fn will_send(
        &self,
        _context: &RequestContext,
        _request: &TransportRequest,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    async fn did_receive(
        &self,
        _context: &RequestContext,
        _response: &RawResponse,
    ) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Ordered, immutable list of interceptors.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn with_shared(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run every `prepare` hook in order, stopping at the first failure.
    pub async fn prepare(
        &self,
        context: &RequestContext,
        request: &mut TransportRequest,
    ) -> Result<(), BoxError> {
        for (index, interceptor) in self.interceptors.iter().enumerate() {
            if let Err(err) = interceptor.prepare(context, request).await {
                debug!(interceptor = index, error = %err, "prepare hook failed");
                return Err(err);
            }
        }
        Ok(())
    }

    pub async fn will_send(&self, context: &RequestContext, request: &TransportRequest) {
        for (index, interceptor) in self.interceptors.iter().enumerate() {
            if let Err(err) = interceptor.will_send(context, request).await {
                warn!(interceptor = index, error = %err, "will_send hook failed");
            }
        }
    }

    pub async fn did_receive(&self, context: &RequestContext, response: &RawResponse) {
        for (index, interceptor) in self.interceptors.iter().enumerate() {
            if let Err(err) = interceptor.did_receive(context, response).await {
                warn!(interceptor = index, error = %err, "did_receive hook failed");
            }
        }
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// Sets a fixed header on every request, e.g. an `Authorization` token.
#[derive(Debug, Clone)]
pub struct HeaderInterceptor {
    name: String,
    value: String,
}

impl HeaderInterceptor {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self::new("Authorization", format!("Bearer {}", token.as_ref()))
    }
}

#[async_trait]
impl Interceptor for HeaderInterceptor {
    async fn prepare(
        &self,
        _context: &RequestContext,
        request: &mut TransportRequest,
    ) -> Result<(), BoxError> {
        request.set_header(self.name.clone(), self.value.clone());
        Ok(())
    }
}

/// Logs every sent request and received response at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInterceptor;

#[async_trait]
impl Interceptor for TracingInterceptor {
    async fn will_send(
        &self,
        context: &RequestContext,
        request: &TransportRequest,
    ) -> Result<(), BoxError> {
        debug!(
            request_id = %context.request_id(),
            attempt = context.attempt(),
            method = %request.method,
            url = %request.url,
            body_bytes = request.body.as_ref().map_or(0, Vec::len),
            "sending request"
        );
        Ok(())
    }

    async fn did_receive(
        &self,
        context: &RequestContext,
        response: &RawResponse,
    ) -> Result<(), BoxError> {
        debug!(
            request_id = %context.request_id(),
            attempt = context.attempt(),
            status = response.status,
            body_bytes = response.body.len(),
            "received response"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    fn request() -> TransportRequest {
        TransportRequest {
            url: "http://localhost:3000/users".to_string(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            body: None,
            timeout: Duration::from_secs(30),
        }
    }

    fn context(request: &TransportRequest) -> RequestContext {
        RequestContext::new(Uuid::nil(), 1, request)
    }

    /// Appends its label to a shared log on every hook.
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Interceptor for Recorder {
        async fn prepare(
            &self,
            _context: &RequestContext,
            request: &mut TransportRequest,
        ) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(format!("prepare:{}", self.label));
            request.headers.push(("X-Seen".to_string(), self.label.to_string()));
            Ok(())
        }

        async fn will_send(
            &self,
            _context: &RequestContext,
            _request: &TransportRequest,
        ) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(format!("will_send:{}", self.label));
            Ok(())
        }

        async fn did_receive(
            &self,
            _context: &RequestContext,
            _response: &RawResponse,
        ) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(format!("did_receive:{}", self.label));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Interceptor for Failing {
        async fn prepare(
            &self,
            _context: &RequestContext,
            _request: &mut TransportRequest,
        ) -> Result<(), BoxError> {
            Err("token expired".into())
        }

        async fn will_send(
            &self,
            _context: &RequestContext,
            _request: &TransportRequest,
        ) -> Result<(), BoxError> {
            Err("observer broke".into())
        }
    }

    struct Nothing;

    impl Interceptor for Nothing {}

    #[tokio::test]
    async fn hooks_run_in_declared_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new()
            .with(Recorder { label: "a", log: log.clone() })
            .with(Nothing)
            .with(Recorder { label: "b", log: log.clone() });

        let mut req = request();
        let ctx = context(&req);
        chain.prepare(&ctx, &mut req).await.unwrap();
        chain.will_send(&ctx, &req).await;
        chain.did_receive(&ctx, &RawResponse::new(200, "")).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "prepare:a",
                "prepare:b",
                "will_send:a",
                "will_send:b",
                "did_receive:a",
                "did_receive:b"
            ]
        );
        let seen: Vec<&str> = req
            .headers
            .iter()
            .filter(|(k, _)| k == "X-Seen")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn prepare_failure_aborts_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new()
            .with(Failing)
            .with(Recorder { label: "after", log: log.clone() });

        let mut req = request();
        let ctx = context(&req);
        let err = chain.prepare(&ctx, &mut req).await.unwrap_err();
        assert_eq!(err.to_string(), "token expired");
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn observer_failures_are_swallowed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new()
            .with(Failing)
            .with(Recorder { label: "after", log: log.clone() });

        let req = request();
        chain.will_send(&context(&req), &req).await;
        assert_eq!(*log.lock().unwrap(), vec!["will_send:after"]);
    }

    #[tokio::test]
    async fn header_interceptor_sets_authorization() {
        let chain = InterceptorChain::new()
            .with(HeaderInterceptor::bearer("secret"))
            .with(TracingInterceptor);
        let mut req = request();
        let ctx = context(&req);
        chain.prepare(&ctx, &mut req).await.unwrap();
        assert_eq!(req.header("authorization"), Some("Bearer secret"));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn context_exposes_attempt_details() {
        let req = request();
        let id = Uuid::new_v4();
        let ctx = RequestContext::new(id, 3, &req);
        assert_eq!(ctx.request_id(), id);
        assert_eq!(ctx.attempt(), 3);
        assert_eq!(ctx.method(), HttpMethod::Get);
        assert_eq!(ctx.url(), "http://localhost:3000/users");
    }
}
