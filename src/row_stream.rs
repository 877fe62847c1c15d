//! The async-cursor-to-`Stream` bridge (component B, §4.B).
//!
//! [`AsyncResultSet`] is a callback-shaped cursor: call `advance`, check the
//! returned [`CursorState`], then read `current_row`. [`RowStream`] drives that
//! protocol from inside an `async_stream::try_stream!` block so callers get a plain
//! `Stream<Item = Result<Row>>` instead of hand-rolling the advance/check/yield loop
//! themselves on every call site.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::native::{AsyncResultSet, CursorState};
use crate::row::Row;

/// A cancellable stream of [`Row`]s backed by a native cursor.
///
/// Dropping the stream before it is exhausted cancels the underlying cursor (§5);
/// calling [`cancel`](RowStream::cancel) does the same without requiring ownership
/// to be given up.
pub struct RowStream {
    inner: Pin<Box<dyn Stream<Item = Result<Row>> + Send>>,
    cancelled: Arc<AtomicBool>,
}

impl RowStream {
    /// Builds a stream from a future that resolves to the cursor once the underlying
    /// scope (single-use read, transaction context, ...) has actually opened one.
    /// Kept cold like every other bridge here: nothing runs until the stream is
    /// polled.
    pub(crate) fn from_future(opening: BoxFuture<'static, Result<Box<dyn AsyncResultSet>>>) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancelled.clone();

        let inner = async_stream::try_stream! {
            let mut cursor = opening.await?;
            loop {
                if cancel_flag.load(Ordering::Acquire) {
                    cursor.cancel();
                    break;
                }
                match cursor.advance().await? {
                    CursorState::Done => break,
                    CursorState::NotReady => continue,
                    CursorState::Ready => yield cursor.current_row(),
                }
            }
        };

        RowStream {
            inner: Box::pin(inner),
            cancelled,
        }
    }

    /// An already-empty stream, for operations that ran without attaching rows.
    pub(crate) fn empty() -> Self {
        RowStream {
            inner: Box::pin(futures_util::stream::empty()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests cancellation of the underlying cursor. Takes effect on the next
    /// poll; already-yielded rows are unaffected.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl Stream for RowStream {
    type Item = Result<Row>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowMetadata;
    use crate::value::Value;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::sync::Mutex;

    struct FixedCursor {
        metadata: RowMetadata,
        remaining: Vec<Vec<Value>>,
        cancelled: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl AsyncResultSet for FixedCursor {
        async fn advance(&mut self) -> Result<CursorState> {
            if self.remaining.is_empty() {
                Ok(CursorState::Done)
            } else {
                Ok(CursorState::Ready)
            }
        }

        fn current_row(&self) -> Row {
            Row::new(self.metadata.clone(), self.remaining[0].clone())
        }

        fn cancel(&mut self) {
            *self.cancelled.lock().unwrap() = true;
        }
    }

    struct PoppingCursor(FixedCursor);

    #[async_trait]
    impl AsyncResultSet for PoppingCursor {
        async fn advance(&mut self) -> Result<CursorState> {
            if self.0.remaining.is_empty() {
                return Ok(CursorState::Done);
            }
            Ok(CursorState::Ready)
        }

        fn current_row(&self) -> Row {
            let row = Row::new(self.0.metadata.clone(), self.0.remaining[0].clone());
            self.0.remaining.remove(0);
            row
        }

        fn cancel(&mut self) {
            self.0.cancel();
        }
    }

    fn metadata() -> RowMetadata {
        RowMetadata::new(vec!["id".to_string()])
    }

    fn opening(cursor: PoppingCursor) -> BoxFuture<'static, Result<Box<dyn AsyncResultSet>>> {
        Box::pin(async move { Ok(Box::new(cursor) as Box<dyn AsyncResultSet>) })
    }

    #[tokio::test]
    async fn yields_every_row_then_ends() {
        let cursor = PoppingCursor(FixedCursor {
            metadata: metadata(),
            remaining: vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
            cancelled: Arc::new(Mutex::new(false)),
        });
        let mut stream = RowStream::from_future(opening(cursor));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.get_i64(1).unwrap(), 1);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.get_i64(1).unwrap(), 2);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        let mut stream = RowStream::empty();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn cancel_stops_the_stream_and_marks_the_cursor() {
        let cancelled = Arc::new(Mutex::new(false));
        let cursor = PoppingCursor(FixedCursor {
            metadata: metadata(),
            remaining: vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
            cancelled: cancelled.clone(),
        });
        let mut stream = RowStream::from_future(opening(cursor));
        stream.cancel();
        assert!(stream.next().await.is_none());
        assert!(*cancelled.lock().unwrap());
    }
}
