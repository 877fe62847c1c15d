//! The transaction-state machine (component D, §4.D).
//!
//! A connection is in exactly one of three states at a time: [`TxState::Idle`], a
//! read-write transaction in progress, or a read-only transaction in progress. The
//! manager is the single owner of whichever native handle is live, guarded by a
//! `tokio::sync::Mutex` so state transitions and reads never interleave. Callers are
//! expected to serialize their own calls (§5) — the mutex protects the state machine's
//! integrity, it does not make concurrent use of one connection meaningful.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SpannerError, TransactionMode};
use crate::lazy::{LazyUnit, LazyValue};
use crate::native::{
    AsyncTransactionManager, DatabaseClient, ReadContext, ReadOnlyTransaction, TransactionContext,
};
use crate::timestamp_bound::TimestampBound;

enum TxState {
    Idle,
    ReadWrite {
        manager: Arc<dyn AsyncTransactionManager>,
        context: Option<Arc<dyn TransactionContext>>,
    },
    ReadOnly {
        transaction: Arc<dyn ReadOnlyTransaction>,
    },
}

/// Whether `commit_transaction`/`rollback_transaction` is driving this resolution.
/// A read-only transaction has no separate rollback path, so both kinds close it.
enum TerminalKind {
    Commit,
    Rollback,
}

/// The concrete native call to make for the state the manager was in when a commit
/// or rollback was requested, resolved before the state is handed to `ClearOnDrop`.
enum TerminalAction {
    Noop,
    Commit(Arc<dyn AsyncTransactionManager>),
    Rollback(Arc<dyn AsyncTransactionManager>),
    Close(Arc<dyn ReadOnlyTransaction>),
}

impl TerminalAction {
    fn resolve(state: &TxState, kind: TerminalKind) -> Self {
        match state {
            TxState::Idle => TerminalAction::Noop,
            TxState::ReadWrite { manager, .. } => match kind {
                TerminalKind::Commit => TerminalAction::Commit(manager.clone()),
                TerminalKind::Rollback => TerminalAction::Rollback(manager.clone()),
            },
            TxState::ReadOnly { transaction } => TerminalAction::Close(transaction.clone()),
        }
    }

    async fn run(self) -> Result<()> {
        match self {
            TerminalAction::Noop => Ok(()),
            TerminalAction::Commit(manager) => manager.commit().await,
            TerminalAction::Rollback(manager) => manager.rollback().await,
            TerminalAction::Close(transaction) => transaction.close().await,
        }
    }
}

/// Clears the transaction state back to Idle whenever dropped — on normal
/// completion of the terminal future, on an early `Err`, or on the caller dropping
/// the future mid-commit/rollback — so the state machine never gets stuck holding a
/// native handle past the point its owning future stopped running.
struct ClearOnDrop<'a>(&'a mut TxState);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        *self.0 = TxState::Idle;
    }
}

/// Owns the connection's transaction state and dispatches reads/writes to whichever
/// native handle is currently active.
pub struct TransactionManager {
    client: Arc<dyn DatabaseClient>,
    state: Mutex<TxState>,
}

impl TransactionManager {
    pub(crate) fn new(client: Arc<dyn DatabaseClient>) -> Self {
        TransactionManager {
            client,
            state: Mutex::new(TxState::Idle),
        }
    }

    pub async fn is_in_transaction(&self) -> bool {
        !matches!(*self.state.lock().await, TxState::Idle)
    }

    pub async fn is_in_read_write_transaction(&self) -> bool {
        matches!(*self.state.lock().await, TxState::ReadWrite { .. })
    }

    pub async fn is_in_readonly_transaction(&self) -> bool {
        matches!(*self.state.lock().await, TxState::ReadOnly { .. })
    }

    /// §4.D begin_transaction.
    #[instrument(skip(self))]
    pub fn begin_transaction(self: &Arc<Self>) -> LazyUnit {
        let this = self.clone();
        LazyValue::new(move || {
            let this = this.clone();
            async move {
                let mut state = this.state.lock().await;
                exclude_existing(&state)?;
                let manager = this.client.new_transaction_manager().await?;
                let manager: Arc<dyn AsyncTransactionManager> = Arc::from(manager);
                *state = TxState::ReadWrite {
                    manager,
                    context: None,
                };
                debug!("read-write transaction started");
                Ok(())
            }
        })
    }

    /// §4.D begin_readonly_transaction.
    #[instrument(skip(self))]
    pub fn begin_readonly_transaction(self: &Arc<Self>, bound: TimestampBound) -> LazyUnit {
        let this = self.clone();
        LazyValue::new(move || {
            let this = this.clone();
            async move {
                let mut state = this.state.lock().await;
                exclude_existing(&state)?;
                let transaction = this.client.begin_readonly_transaction(bound).await?;
                *state = TxState::ReadOnly {
                    transaction: Arc::from(transaction),
                };
                debug!("read-only transaction started");
                Ok(())
            }
        })
    }

    /// §4.D commit_transaction. Clears to Idle on every terminal outcome, including
    /// the caller dropping the returned future mid-commit, via `ClearOnDrop`.
    #[instrument(skip(self))]
    pub fn commit_transaction(self: &Arc<Self>) -> LazyUnit {
        let this = self.clone();
        LazyValue::new(move || {
            let this = this.clone();
            async move {
                let mut state = this.state.lock().await;
                let action = TerminalAction::resolve(&state, TerminalKind::Commit);
                let _guard = ClearOnDrop(&mut *state);
                let result = action.run().await;
                match &result {
                    Ok(()) => debug!("transaction committed"),
                    Err(err) => warn!(%err, "commit failed"),
                }
                result
            }
        })
    }

    /// §4.D rollback_transaction. Same clear-on-any-outcome guarantee as commit.
    #[instrument(skip(self))]
    pub fn rollback_transaction(self: &Arc<Self>) -> LazyUnit {
        let this = self.clone();
        LazyValue::new(move || {
            let this = this.clone();
            async move {
                let mut state = this.state.lock().await;
                let action = TerminalAction::resolve(&state, TerminalKind::Rollback);
                let _guard = ClearOnDrop(&mut *state);
                let result = action.run().await;
                match &result {
                    Ok(()) => debug!("transaction rolled back"),
                    Err(err) => warn!(%err, "rollback failed"),
                }
                result
            }
        })
    }

    /// §4.D run_in_transaction: resolves the active read-write context (opening it on
    /// first use, per native contract: `begin()` yields the context) and hands it to
    /// the closure.
    pub async fn run_in_transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn TransactionContext>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut state = self.state.lock().await;
        match &mut *state {
            TxState::ReadWrite { manager, context } => {
                let ctx = match context {
                    Some(ctx) => ctx.clone(),
                    None => {
                        let fresh: Arc<dyn TransactionContext> = Arc::from(manager.begin().await?);
                        *context = Some(fresh.clone());
                        fresh
                    }
                };
                drop(state);
                f(ctx).await
            }
            _ => Err(SpannerError::NotInTransaction),
        }
    }

    /// §4.D read_context: whichever read scope is active, or a fresh single-use one.
    pub async fn read_context(&self) -> Result<Arc<dyn ReadContext>> {
        let mut state = self.state.lock().await;
        match &mut *state {
            TxState::ReadWrite { manager, context } => {
                let ctx = match context {
                    Some(ctx) => ctx.clone(),
                    None => {
                        let fresh: Arc<dyn TransactionContext> = Arc::from(manager.begin().await?);
                        *context = Some(fresh.clone());
                        fresh
                    }
                };
                Ok(ctx as Arc<dyn ReadContext>)
            }
            TxState::ReadOnly { transaction } => Ok(transaction.clone() as Arc<dyn ReadContext>),
            TxState::Idle => Ok(Arc::from(self.client.single_use_read_context())),
        }
    }

    /// §4.D clear: idempotent release of any held native handles.
    pub async fn clear(&self) {
        *self.state.lock().await = TxState::Idle;
    }
}

fn exclude_existing(state: &TxState) -> Result<()> {
    match state {
        TxState::Idle => Ok(()),
        TxState::ReadWrite { .. } => Err(SpannerError::transaction_in_progress(
            TransactionMode::ReadWrite,
        )),
        TxState::ReadOnly { .. } => Err(SpannerError::transaction_in_progress(
            TransactionMode::ReadOnly,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{AsyncResultSet, CursorState};
    use crate::row::Row;
    use crate::statement::Statement;
    use async_trait::async_trait;

    struct NullResultSet;

    #[async_trait]
    impl AsyncResultSet for NullResultSet {
        async fn advance(&mut self) -> Result<CursorState> {
            Ok(CursorState::Done)
        }
        fn current_row(&self) -> Row {
            unreachable!()
        }
        fn cancel(&mut self) {}
    }

    struct NullReadContext;

    #[async_trait]
    impl ReadContext for NullReadContext {
        async fn execute_query(&self, _statement: &Statement) -> Result<Box<dyn AsyncResultSet>> {
            Ok(Box::new(NullResultSet))
        }
    }

    #[async_trait]
    impl TransactionContext for NullReadContext {
        async fn execute_update(&self, _statement: &Statement) -> Result<i64> {
            Ok(1)
        }
        async fn batch_update(&self, statements: &[Statement]) -> Result<Vec<i64>> {
            Ok(vec![1; statements.len()])
        }
    }

    #[async_trait]
    impl ReadOnlyTransaction for NullReadContext {
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NullTransactionManager;

    #[async_trait]
    impl AsyncTransactionManager for NullTransactionManager {
        async fn begin(&self) -> Result<Box<dyn TransactionContext>> {
            Ok(Box::new(NullReadContext))
        }
        async fn commit(&self) -> Result<()> {
            Ok(())
        }
        async fn rollback(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NullClient;

    #[async_trait]
    impl DatabaseClient for NullClient {
        async fn new_transaction_manager(&self) -> Result<Box<dyn AsyncTransactionManager>> {
            Ok(Box::new(NullTransactionManager))
        }
        async fn begin_readonly_transaction(
            &self,
            _bound: TimestampBound,
        ) -> Result<Box<dyn ReadOnlyTransaction>> {
            Ok(Box::new(NullReadContext))
        }
        fn single_use_read_context(&self) -> Box<dyn ReadContext> {
            Box::new(NullReadContext)
        }
        async fn run_autocommit_update(&self, _statement: &Statement) -> Result<i64> {
            Ok(1)
        }
        async fn run_autocommit_batch(&self, statements: &[Statement]) -> Result<Vec<i64>> {
            Ok(vec![1; statements.len()])
        }
        fn is_closed(&self) -> bool {
            false
        }
    }

    fn manager() -> Arc<TransactionManager> {
        Arc::new(TransactionManager::new(Arc::new(NullClient)))
    }

    #[tokio::test]
    async fn begin_transaction_twice_is_excluded() {
        let mgr = manager();
        mgr.begin_transaction().await.unwrap();
        let err = mgr.begin_transaction().await.unwrap_err();
        assert!(matches!(
            err,
            SpannerError::TransactionInProgress {
                mode: TransactionMode::ReadWrite
            }
        ));
    }

    #[tokio::test]
    async fn begin_readonly_while_read_write_is_excluded() {
        let mgr = manager();
        mgr.begin_transaction().await.unwrap();
        let err = mgr
            .begin_readonly_transaction(TimestampBound::strong_read())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SpannerError::TransactionInProgress {
                mode: TransactionMode::ReadWrite
            }
        ));
    }

    #[tokio::test]
    async fn commit_clears_state_back_to_idle() {
        let mgr = manager();
        mgr.begin_transaction().await.unwrap();
        assert!(mgr.is_in_read_write_transaction().await);
        mgr.commit_transaction().await.unwrap();
        assert!(!mgr.is_in_transaction().await);
    }

    #[tokio::test]
    async fn run_in_transaction_outside_a_transaction_fails() {
        let mgr = manager();
        let err = mgr
            .run_in_transaction(|ctx| async move { ctx.execute_update(&Statement::new("x")).await })
            .await
            .unwrap_err();
        assert!(matches!(err, SpannerError::NotInTransaction));
    }

    #[tokio::test]
    async fn commit_on_idle_is_a_no_op() {
        let mgr = manager();
        mgr.commit_transaction().await.unwrap();
        assert!(!mgr.is_in_transaction().await);
    }
}
