//! The clock used between retry attempts.

use std::time::Duration;

use async_trait::async_trait;

/// Suspends the current request for a backoff period.
///
/// The service races every sleep against the caller's cancellation token, so
/// implementations only need to wait.
#[async_trait]
pub trait Delayer: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelayer;

#[async_trait]
impl Delayer for TokioDelayer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
