//! Handler traits for bus subscribers.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Event;

/// A handler invoked inline while an event is published.
///
/// Closures of the shape `Fn(&E) -> anyhow::Result<()>` implement this
/// automatically.
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    fn handle(&self, event: &E) -> anyhow::Result<()>;
}

impl<E, F> EventHandler<E> for F
where
    E: Event,
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, event: &E) -> anyhow::Result<()> {
        self(event)
    }
}

/// A handler whose work completes asynchronously.
///
/// Handlers shared between concurrent publishes must tolerate being
/// invoked concurrently.
#[async_trait]
pub trait AsyncEventHandler<E: Event>: Send + Sync + 'static {
    async fn handle(&self, event: &E) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an [`AsyncEventHandler`].
///
/// The closure receives its own clone of the event so the returned future
/// does not borrow from the publisher.
pub struct AsyncFnHandler<E, F> {
    f: F,
    _event: PhantomData<fn(E)>,
}

impl<E, F> fmt::Debug for AsyncFnHandler<E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFnHandler").finish_non_exhaustive()
    }
}

/// Wrap an async closure as a subscribable handler.
///
/// ```ignore
/// let handler = async_handler(|event: FilesRenamed| async move {
///     index.refresh(&event.dir).await
/// });
/// bus.subscribe_async(handler.clone());
/// ```
pub fn async_handler<E, F, Fut>(f: F) -> Arc<AsyncFnHandler<E, F>>
where
    E: Event,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(AsyncFnHandler {
        f,
        _event: PhantomData,
    })
}

#[async_trait]
impl<E, F, Fut> AsyncEventHandler<E> for AsyncFnHandler<E, F>
where
    E: Event,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: &E) -> anyhow::Result<()> {
        (self.f)(event.clone()).await
    }
}
