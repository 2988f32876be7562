//! Subscriber handlers.

use std::future::Future;

use async_trait::async_trait;
use sb_domain::error::Result;
use sb_domain::message::Message;

/// Implement this trait to receive messages published on a channel.
///
/// Handlers run on bus workers and may suspend freely. An `Err` (or a
/// panic) is logged by the worker and affects only the one work item.
/// Long CPU-bound work belongs in `tokio::task::spawn_blocking`, otherwise
/// it holds a worker for its whole duration.
///
/// Any `Fn(Message) -> impl Future<Output = Result<()>>` closure is a
/// handler too.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, message: Message) -> Result<()>;

    /// Label used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, message: Message) -> Result<()> {
        (self)(message).await
    }
}
