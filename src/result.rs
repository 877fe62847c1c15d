//! The outcome of running a statement (component C, §4.C).

use std::pin::Pin;

use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::Result;
use crate::lazy::CachedLazyValue;
use crate::row::{Row, RowMetadata};
use crate::row_stream::RowStream;

/// What running a statement produced: an update count, and — for statements that
/// read — a row stream attached at most once.
///
/// `rows_updated` is a [`CachedLazyValue`] rather than a plain `i64` because the
/// native client reports it asynchronously (it may only be known once the attached
/// row stream is fully drained, e.g. for a DML statement whose affected-row count is
/// determined by a streamed `ResultSetStats`); memoizing it means awaiting it twice
/// does not re-run the statement.
pub struct SpannerResult {
    rows_updated: CachedLazyValue<i64>,
    rows: Option<RowStream>,
}

impl SpannerResult {
    pub(crate) fn new(rows_updated: CachedLazyValue<i64>, rows: Option<RowStream>) -> Self {
        SpannerResult { rows_updated, rows }
    }

    /// A result with no attached row stream, e.g. DDL or a DML statement that ran
    /// without needing one.
    pub(crate) fn without_rows(rows_updated: CachedLazyValue<i64>) -> Self {
        SpannerResult::new(rows_updated, None)
    }

    /// The number of rows affected, or `0` for a statement that did not write.
    /// Safe to call any number of times and in any order relative to
    /// [`rows`](Self::rows) — the count is memoized independently of row iteration.
    pub async fn rows_updated(&self) -> Result<i64> {
        self.rows_updated.get().await
    }

    /// Consumes the result to take ownership of its row stream. A result with no
    /// attached rows (DDL, writer-only DML) yields an already-empty stream rather
    /// than `None`, so callers can always iterate without matching on whether a
    /// query was actually a query (§4.C MUST NOT silently re-run the statement: this
    /// takes `self` by value precisely so a second call cannot reattach the stream).
    pub fn rows(self) -> RowStream {
        self.rows.unwrap_or_else(RowStream::empty)
    }

    /// Consumes the result, running every row through `f` as it streams by. A result
    /// with no attached rows maps to an already-empty stream, same as [`rows`](Self::rows).
    pub fn map_rows<F, T>(self, f: F) -> Pin<Box<dyn Stream<Item = Result<T>> + Send>>
    where
        F: Fn(&Row, &RowMetadata) -> T + Send + 'static,
        T: Send + 'static,
    {
        match self.rows {
            Some(rows) => Box::pin(rows.map(move |row| {
                row.map(|row| {
                    let metadata = row.metadata().clone();
                    f(&row, &metadata)
                })
            })),
            None => Box::pin(futures_util::stream::empty()),
        }
    }
}
