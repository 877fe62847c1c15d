//! The future-to-lazy-value bridge (component A, §4.A).
//!
//! A [`LazyValue<T>`] wraps a zero-arg async factory without running it. Nothing
//! happens until it is `.await`ed (via [`IntoFuture`]) or explicitly
//! [`subscribe`](LazyValue::subscribe)d — Rust's `Future` trait is already cold by
//! construction, so this bridge only has to make sure the factory itself is not
//! invoked early. Re-awaiting a clone re-invokes the factory; see [`CachedLazyValue`]
//! for the one place (§4.C) where repeat subscriptions must observe a memoized value.

use std::future::IntoFuture;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::error::{Result, SpannerError};

type Factory<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// A cold producer of zero-or-one `T`, with an optional terminal error.
pub struct LazyValue<T> {
    factory: Factory<T>,
}

/// `LazyValue<()>` for operations that produce no value on success (begin/commit/
/// rollback/close/set_autocommit/run_ddl_statement).
pub type LazyUnit = LazyValue<()>;

impl<T> LazyValue<T>
where
    T: Send + 'static,
{
    /// Wraps a factory that is invoked fresh on every subscription.
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        LazyValue {
            factory: Arc::new(move || Box::pin(factory())),
        }
    }

    /// A lazy value that resolves to an already-known outcome on every subscription,
    /// without touching the native client. Used for no-op terminal states (e.g.
    /// `commit_transaction` while Idle).
    pub fn ready(value: Result<T>) -> Self
    where
        T: Clone + Send + Sync,
    {
        LazyValue::new(move || {
            let value = value.clone();
            async move { value }
        })
    }

    /// Invokes the factory, returning the resulting future. Dropping the returned
    /// future before it resolves cancels the underlying native operation (§5).
    pub fn subscribe(&self) -> BoxFuture<'static, Result<T>> {
        (self.factory)()
    }

    /// Invokes the factory on a spawned `tokio::task`, for callers that need to
    /// cancel from a task other than the one driving the subscription. The returned
    /// `AbortHandle` reaches the same drop-based cancellation `subscribe()` gets for
    /// free when polled inline; `abort()` just forces it from across the task
    /// boundary instead of requiring the polling task to drop the future itself.
    pub fn spawn(&self) -> (tokio::task::AbortHandle, tokio::task::JoinHandle<Result<T>>) {
        let join = tokio::spawn(self.subscribe());
        (join.abort_handle(), join)
    }
}

impl<T> Clone for LazyValue<T> {
    fn clone(&self) -> Self {
        LazyValue {
            factory: self.factory.clone(),
        }
    }
}

impl<T> IntoFuture for LazyValue<T>
where
    T: Send + 'static,
{
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.subscribe()
    }
}

/// A [`LazyValue`] whose result is memoized after the first successful or failed
/// subscription, so every later `.await` observes the same outcome without
/// re-invoking the native operation (§4.C: `SpannerResult::rows_updated`).
pub struct CachedLazyValue<T> {
    source: LazyValue<T>,
    cell: Arc<OnceCell<Result<T>>>,
}

impl<T> CachedLazyValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(source: LazyValue<T>) -> Self {
        CachedLazyValue {
            source,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Resolves the value, running the underlying factory only on the first call.
    pub async fn get(&self) -> Result<T> {
        self.cell
            .get_or_init(|| async { self.source.subscribe().await })
            .await
            .clone()
    }
}

impl<T> Clone for CachedLazyValue<T> {
    fn clone(&self) -> Self {
        CachedLazyValue {
            source: self.source.clone(),
            cell: self.cell.clone(),
        }
    }
}

/// Helper used throughout the adapter: wraps any `impl Into<NativeCause>` error from
/// a native call into [`SpannerError::operation`], preserving its source chain.
pub fn operation_failed<E: Into<crate::error::NativeCause>>(source: E) -> SpannerError {
    SpannerError::operation(source)
}
