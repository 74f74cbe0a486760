//! The collaborator that performs the actual I/O.
//!
//! # Design
//! The pipeline never opens sockets. A `Transport` receives a finished
//! `TransportRequest` and hands back the body bytes plus response metadata,
//! or a `TransportError`. It performs no retries and no status
//! interpretation; connection pooling and TLS are its own business.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::{ResponseMetadata, TransportRequest};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &TransportRequest,
    ) -> Result<(Vec<u8>, ResponseMetadata), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(
        &self,
        request: &TransportRequest,
    ) -> Result<(Vec<u8>, ResponseMetadata), TransportError> {
        (**self).send(request).await
    }
}
