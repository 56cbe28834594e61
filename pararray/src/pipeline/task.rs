//! Worker trait for stage execution.

use std::future::Future;

use async_trait::async_trait;

use super::tagged::{BoxError, Reason};

/// The per-item work a stage applies.
///
/// Implement this for stateful workers, or pass any
/// `Fn(usize, In) -> impl Future<Output = Result<Out, E>>` closure; the
/// blanket impl below adapts it. A returned error becomes the item's
/// [`Reason`] and is carried forward, it never stops the stage.
#[async_trait]
pub trait Worker<In, Out>: Send + Sync + 'static {
    /// Process the item originally at `idx`.
    async fn work(&self, idx: usize, value: In) -> Result<Out, Reason>;
}

#[async_trait]
impl<F, Fut, In, Out, E> Worker<In, Out> for F
where
    F: Fn(usize, In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Out, E>> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    async fn work(&self, idx: usize, value: In) -> Result<Out, Reason> {
        (self)(idx, value).await.map_err(Reason::new)
    }
}
