//! Lifecycle-aware stream decorator.
//!
//! [`StreamTransformer`] wraps a fallible source stream, maps every item
//! through a transform and fires completion callbacks around the end of
//! the source:
//!
//! - success: items, then `on_complete`, then `on_finally`
//! - failure: items, then `on_error(err)`, then `on_finally`
//! - dropped before the end: `on_finally` only
//!
//! `on_finally` runs exactly once in every case. The error is handed to
//! `on_error` and the transformed stream simply ends.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, FusedStream};
use futures::{Stream, StreamExt};

type Callback = Box<dyn FnOnce() + Send>;
type ErrorCallback<E> = Box<dyn FnOnce(E) + Send>;

/// Transform and lifecycle callbacks for a [`StreamTransformer`]
pub struct TransformConfig<T, U, E> {
    transform: Box<dyn FnMut(T) -> U + Send>,
    on_complete: Option<Callback>,
    on_error: Option<ErrorCallback<E>>,
    on_finally: Option<Callback>,
}

impl<T, U, E> TransformConfig<T, U, E> {
    pub fn new(transform: impl FnMut(T) -> U + Send + 'static) -> Self {
        Self {
            transform: Box::new(transform),
            on_complete: None,
            on_error: None,
            on_finally: None,
        }
    }

    pub fn on_complete(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(E) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn on_finally(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_finally = Some(Box::new(callback));
        self
    }
}

/// Stream of `U` produced from a source of `Result<T, E>`
pub struct StreamTransformer<T, U, E> {
    /// `None` once the source has ended or failed
    source: Option<BoxStream<'static, Result<T, E>>>,
    config: TransformConfig<T, U, E>,
}

impl<T, U, E> StreamTransformer<T, U, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(
        source: impl Stream<Item = Result<T, E>> + Send + 'static,
        config: TransformConfig<T, U, E>,
    ) -> Self {
        Self {
            source: Some(source.boxed()),
            config,
        }
    }
}

impl<T, U, E> StreamTransformer<T, U, E> {
    fn complete(&mut self) {
        self.source = None;
        if let Some(on_complete) = self.config.on_complete.take() {
            on_complete();
        }
        self.finish();
    }

    fn fail(&mut self, error: E) {
        self.source = None;
        if let Some(on_error) = self.config.on_error.take() {
            on_error(error);
        }
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(on_finally) = self.config.on_finally.take() {
            on_finally();
        }
    }
}

impl<T, U, E> Stream for StreamTransformer<T, U, E> {
    type Item = U;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<U>> {
        let this = self.get_mut();
        let Some(source) = this.source.as_mut() else {
            return Poll::Ready(None);
        };

        match source.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(item))) => Poll::Ready(Some((this.config.transform)(item))),
            Poll::Ready(Some(Err(error))) => {
                this.fail(error);
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                this.complete();
                Poll::Ready(None)
            }
        }
    }
}

impl<T, U, E> FusedStream for StreamTransformer<T, U, E> {
    fn is_terminated(&self) -> bool {
        self.source.is_none()
    }
}

impl<T, U, E> Drop for StreamTransformer<T, U, E> {
    fn drop(&mut self) {
        // Abandoned mid-stream: cleanup still runs, but neither outcome fired
        self.finish();
    }
}
