//! The trait boundary standing in for the out-of-scope Spanner client library (§1).
//!
//! The spec assumes, but does not define, a native layer exposing a database client,
//! a database-admin client, an async transaction manager, read contexts, and an
//! async result-set cursor. Modeling that surface as traits — the same move
//! `tokio-postgres` makes for `TlsConnect`/`MakeTlsConnect` and `spanner-rs` makes for
//! its `Connection` trait — lets the adapter core be tested against an in-memory
//! double (see [`crate::testing`]) without a live Spanner instance, and lets a real
//! deployment plug in a gRPC-backed implementation without touching the core.

use async_trait::async_trait;

use crate::error::Result;
use crate::row::Row;
use crate::statement::Statement;
use crate::timestamp_bound::TimestampBound;

/// The three-way state a cursor reports on each advance (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// The result set is exhausted.
    Done,
    /// No row is available yet; poll again.
    NotReady,
    /// A row is available via [`AsyncResultSet::current_row`].
    Ready,
}

/// A read-only scope: single-use, a read-write transaction's context, or a
/// standalone read-only transaction all implement this.
#[async_trait]
pub trait ReadContext: Send + Sync {
    async fn execute_query(&self, statement: &Statement) -> Result<Box<dyn AsyncResultSet>>;
}

/// The active context of a read-write transaction. Also a [`ReadContext`], since
/// reads-within-a-transaction see the transaction's own uncommitted writes (§8
/// scenario 4).
#[async_trait]
pub trait TransactionContext: ReadContext {
    async fn execute_update(&self, statement: &Statement) -> Result<i64>;
    async fn batch_update(&self, statements: &[Statement]) -> Result<Vec<i64>>;
}

/// The native async transaction manager: `beginAsync`/`commitAsync`/`rollbackAsync`.
#[async_trait]
pub trait AsyncTransactionManager: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn TransactionContext>>;
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;
}

/// A standalone read-only transaction opened with a [`TimestampBound`].
#[async_trait]
pub trait ReadOnlyTransaction: ReadContext {
    /// Closes the transaction. Both commit and rollback map to this on the native
    /// side (§4.D) since a read-only transaction never writes.
    async fn close(&self) -> Result<()>;
}

/// An async, cursor-style result set (§4.B).
#[async_trait]
pub trait AsyncResultSet: Send {
    /// Advances the cursor and reports its state.
    async fn advance(&mut self) -> Result<CursorState>;
    /// Materializes the row the cursor currently points at. Only valid to call after
    /// `advance` returned [`CursorState::Ready`].
    fn current_row(&self) -> Row;
    /// Best-effort cancellation of the underlying native cursor.
    fn cancel(&mut self);
}

/// The database client: sessions, transactions, single-use reads, autocommit DML.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn new_transaction_manager(&self) -> Result<Box<dyn AsyncTransactionManager>>;
    async fn begin_readonly_transaction(
        &self,
        bound: TimestampBound,
    ) -> Result<Box<dyn ReadOnlyTransaction>>;
    fn single_use_read_context(&self) -> Box<dyn ReadContext>;
    async fn run_autocommit_update(&self, statement: &Statement) -> Result<i64>;
    async fn run_autocommit_batch(&self, statements: &[Statement]) -> Result<Vec<i64>>;
    fn is_closed(&self) -> bool;
}

/// The database-admin client: DDL only.
#[async_trait]
pub trait DatabaseAdminClient: Send + Sync {
    async fn update_database_ddl(
        &self,
        instance: &str,
        database: &str,
        statements: &[String],
    ) -> Result<()>;
}
