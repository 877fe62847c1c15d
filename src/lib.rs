//! A reactive adapter over Cloud Spanner's async client primitives.
//!
//! The crate bridges a future/callback-based native Spanner client (modeled here by
//! the [`native`] trait boundary) into `Future`/`Stream`-based building blocks —
//! [`LazyValue`], [`RowStream`], [`SpannerResult`] — plus a per-connection transaction
//! state machine ([`TransactionManager`]) and the [`ConnectionAdapter`] that ties them
//! together.

mod config;
mod connection;
mod error;
mod lazy;
mod native;
mod result;
mod row;
mod row_stream;
mod statement;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod timestamp_bound;
mod txn;
mod value;

pub use config::{ConnectionConfig, Credentials, QueryOptions};
pub use connection::ConnectionAdapter;
pub use error::{NativeCause, Result, SpannerError, TransactionMode};
pub use lazy::{CachedLazyValue, LazyUnit, LazyValue};
pub use native::{
    AsyncResultSet, AsyncTransactionManager, CursorState, DatabaseAdminClient, DatabaseClient,
    ReadContext, ReadOnlyTransaction, TransactionContext,
};
pub use result::SpannerResult;
pub use row::{Row, RowMetadata};
pub use row_stream::RowStream;
pub use statement::Statement;
pub use timestamp_bound::TimestampBound;
pub use txn::TransactionManager;
pub use value::Value;
