//! The connection adapter (component E, §4.E): the public surface that routes a
//! statement to the right native call based on its kind and the transaction
//! manager's current state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::config::{ConnectionConfig, QueryOptions};
use crate::error::{Result, SpannerError};
use crate::lazy::{LazyUnit, LazyValue};
use crate::native::{self, DatabaseAdminClient, DatabaseClient};
use crate::row_stream::RowStream;
use crate::statement::Statement;
use crate::timestamp_bound::TimestampBound;
use crate::txn::TransactionManager;

/// A reactive handle onto one Spanner session, bridging the native client traits into
/// the `LazyValue`/`RowStream`/`SpannerResult` vocabulary (§4.E).
///
/// Cloning an adapter is cheap (it is a handle over shared `Arc` state) and every
/// clone observes the same transaction state and `autocommit` flag, mirroring a
/// single logical connection shared by however many references a caller keeps.
#[derive(Clone)]
pub struct ConnectionAdapter {
    config: Arc<ConnectionConfig>,
    client: Arc<dyn DatabaseClient>,
    admin: Arc<dyn DatabaseAdminClient>,
    txn: Arc<TransactionManager>,
    dispatch_permits: Arc<Semaphore>,
    autocommit: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl ConnectionAdapter {
    pub fn new(
        config: ConnectionConfig,
        client: Arc<dyn DatabaseClient>,
        admin: Arc<dyn DatabaseAdminClient>,
    ) -> Self {
        let worker_threads = config.worker_threads.get();
        ConnectionAdapter {
            config: Arc::new(config),
            txn: Arc::new(TransactionManager::new(client.clone())),
            client,
            admin,
            dispatch_permits: Arc::new(Semaphore::new(worker_threads)),
            autocommit: Arc::new(AtomicBool::new(true)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// §6: query-time options carried for the lifetime of the connection.
    pub fn query_options(&self) -> &QueryOptions {
        &self.config.query_options
    }

    pub fn transaction_manager(&self) -> &Arc<TransactionManager> {
        &self.txn
    }

    pub fn begin_transaction(&self) -> LazyUnit {
        self.guarded(self.txn.begin_transaction())
    }

    pub fn begin_readonly_transaction(&self, bound: TimestampBound) -> LazyUnit {
        self.guarded(self.txn.begin_readonly_transaction(bound))
    }

    pub fn commit_transaction(&self) -> LazyUnit {
        self.guarded(self.txn.commit_transaction())
    }

    pub fn rollback_transaction(&self) -> LazyUnit {
        self.guarded(self.txn.rollback_transaction())
    }

    /// §4.E SELECT routing.
    pub fn run_select_statement(&self, statement: Statement) -> RowStream {
        let txn = self.txn.clone();
        let sem = self.dispatch_permits.clone();
        let closed = self.closed.clone();
        let opening: BoxFuture<'static, Result<Box<dyn native::AsyncResultSet>>> = Box::pin(async move {
            let _permit = sem.acquire().await;
            if closed.load(Ordering::Acquire) {
                return Err(SpannerError::Closed);
            }
            let ctx = txn.read_context().await?;
            ctx.execute_query(&statement).await
        });
        RowStream::from_future(opening)
    }

    /// §4.E DML routing.
    pub fn run_dml_statement(&self, statement: Statement) -> LazyValue<i64> {
        let this = self.clone();
        self.guarded(LazyValue::new(move || {
            let this = this.clone();
            let statement = statement.clone();
            async move { this.dispatch_dml(statement).await }
        }))
    }

    /// §4.E DML routing for a caller that wants to cancel from a different task than
    /// the one that issued the call — spawns the dispatch and hands back its
    /// `AbortHandle` alongside the `JoinHandle`.
    pub fn spawn_dml_statement(
        &self,
        statement: Statement,
    ) -> (tokio::task::AbortHandle, tokio::task::JoinHandle<Result<i64>>) {
        self.run_dml_statement(statement).spawn()
    }

    #[instrument(skip(self, statement))]
    async fn dispatch_dml(&self, statement: Statement) -> Result<i64> {
        let _permit = self.dispatch_permits.acquire().await;
        self.check_open()?;
        if self.txn.is_in_readonly_transaction().await {
            return Err(SpannerError::DmlInReadonlyTransaction);
        }
        if self.txn.is_in_read_write_transaction().await {
            return self
                .txn
                .run_in_transaction(|ctx| async move { ctx.execute_update(&statement).await })
                .await;
        }
        if !self.autocommit.load(Ordering::Acquire) {
            return Err(SpannerError::DmlOutsideTransaction);
        }
        self.client.run_autocommit_update(&statement).await
    }

    /// §4.E batch DML routing.
    pub fn run_batch_dml(&self, statements: Vec<Statement>) -> LazyValue<Vec<i64>> {
        let this = self.clone();
        self.guarded(LazyValue::new(move || {
            let this = this.clone();
            let statements = statements.clone();
            async move { this.dispatch_batch(statements).await }
        }))
    }

    async fn dispatch_batch(&self, statements: Vec<Statement>) -> Result<Vec<i64>> {
        let _permit = self.dispatch_permits.acquire().await;
        self.check_open()?;
        if self.txn.is_in_readonly_transaction().await {
            return Err(SpannerError::DmlInReadonlyTransaction);
        }
        if self.txn.is_in_read_write_transaction().await {
            return self
                .txn
                .run_in_transaction(|ctx| async move { ctx.batch_update(&statements).await })
                .await;
        }
        if !self.autocommit.load(Ordering::Acquire) {
            return Err(SpannerError::DmlOutsideTransaction);
        }
        self.client.run_autocommit_batch(&statements).await
    }

    /// §4.E DDL routing: never participates in a transaction.
    pub fn run_ddl_statement(&self, sql: impl Into<String>) -> LazyUnit {
        let this = self.clone();
        let sql = sql.into();
        self.guarded(LazyValue::new(move || {
            let this = this.clone();
            let sql = sql.clone();
            async move {
                let _permit = this.dispatch_permits.acquire().await;
                this.check_open()?;
                this.admin
                    .update_database_ddl(&this.config.instance, &this.config.database, &[sql])
                    .await
            }
        }))
    }

    /// §4.E set_autocommit: commits any in-progress transaction first if the value
    /// is changing.
    pub fn set_autocommit(&self, value: bool) -> LazyUnit {
        let this = self.clone();
        LazyValue::new(move || {
            let this = this.clone();
            async move {
                if this.autocommit.load(Ordering::Acquire) != value && this.txn.is_in_transaction().await
                {
                    this.txn.commit_transaction().await?;
                }
                this.autocommit.store(value, Ordering::Release);
                Ok(())
            }
        })
    }

    /// §4.E close: idempotent via `closed`.
    #[instrument(skip(self))]
    pub fn close(&self) -> LazyUnit {
        let this = self.clone();
        LazyValue::new(move || {
            let this = this.clone();
            async move {
                if this.closed.swap(true, Ordering::AcqRel) {
                    debug!("close called on an already-closed connection");
                    return Ok(());
                }
                this.txn.clear().await;
                this.dispatch_permits.close();
                debug!("connection closed");
                Ok(())
            }
        })
    }

    /// §4.E health_check: errors resolve to `Ok(false)`, never `Err`. Always probes
    /// through a single-use read context (never `txn.read_context()`), so a health
    /// check issued while a transaction is open reads an isolated snapshot instead of
    /// joining that transaction's read set.
    #[instrument(skip(self))]
    pub fn health_check(&self) -> LazyValue<bool> {
        let this = self.clone();
        LazyValue::new(move || {
            let this = this.clone();
            async move {
                if !this.local_healthcheck() {
                    debug!("health check failed locally without a round trip");
                    return Ok(false);
                }
                let _permit = this.dispatch_permits.acquire().await;
                let probe = Statement::new("SELECT 1");
                let ctx = this.client.single_use_read_context();
                let opening: BoxFuture<'static, Result<Box<dyn native::AsyncResultSet>>> =
                    Box::pin(async move { ctx.execute_query(&probe).await });
                let mut rows = RowStream::from_future(opening);
                let healthy = matches!(rows.next().await, Some(Ok(_)));
                if !healthy {
                    warn!("health check probe did not return a row");
                }
                Ok(healthy)
            }
        })
    }

    /// §4.E local_healthcheck: pure, synchronous.
    pub fn local_healthcheck(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.client.is_closed()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(SpannerError::Closed)
        } else {
            Ok(())
        }
    }

    /// Wraps a `LazyUnit`/`LazyValue` so every subscription first checks `closed`.
    fn guarded<T: Send + 'static>(&self, inner: LazyValue<T>) -> LazyValue<T> {
        let closed = self.closed.clone();
        LazyValue::new(move || {
            let closed = closed.clone();
            let inner = inner.clone();
            async move {
                if closed.load(Ordering::Acquire) {
                    return Err(SpannerError::Closed);
                }
                inner.subscribe().await
            }
        })
    }
}

#[cfg(test)]
mod scenarios {
    use super::*;
    use crate::error::TransactionMode;
    use crate::testing::MockDatabase;
    use futures_util::StreamExt;

    fn adapter() -> ConnectionAdapter {
        let db = MockDatabase::new();
        ConnectionAdapter::new(
            ConnectionConfig::new("proj", "inst", "db"),
            db.client(),
            db.admin_client(),
        )
    }

    fn insert(uuid: &str, category: i64, wps: f64) -> Statement {
        Statement::new("INSERT INTO BOOKS (uuid, category, wps) VALUES (@uuid, @category, @wps)")
            .bind("uuid", uuid)
            .bind("category", category)
            .bind("wps", wps)
    }

    fn update_category(old: i64, new: i64) -> Statement {
        Statement::new("UPDATE BOOKS SET category=@new_category WHERE category=@old_category")
            .bind("old_category", old)
            .bind("new_category", new)
    }

    fn count_by_uuid(uuid: &str) -> Statement {
        Statement::new("SELECT COUNT(*) FROM BOOKS WHERE uuid=@uuid").bind("uuid", uuid)
    }

    fn uuids_by_category(category: i64) -> Statement {
        Statement::new("SELECT UUID FROM BOOKS WHERE category=@category ORDER BY UUID")
            .bind("category", category)
    }

    fn uuids_by_uuid(uuid: &str) -> Statement {
        Statement::new("SELECT UUID FROM BOOKS WHERE uuid=@uuid").bind("uuid", uuid)
    }

    async fn collect_counts(conn: &ConnectionAdapter, stmt: Statement) -> i64 {
        let mut rows = conn.run_select_statement(stmt);
        let row = rows.next().await.unwrap().unwrap();
        row.get_i64(1).unwrap()
    }

    async fn collect_uuids(conn: &ConnectionAdapter, stmt: Statement) -> Vec<String> {
        let mut rows = conn.run_select_statement(stmt);
        let mut out = Vec::new();
        while let Some(row) = rows.next().await {
            out.push(row.unwrap().get_string(1).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn single_statement_commit() {
        let conn = adapter();
        conn.begin_transaction().await.unwrap();
        let inserted = conn.run_dml_statement(insert("t1", 100, 15.0)).await.unwrap();
        conn.commit_transaction().await.unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(collect_counts(&conn, count_by_uuid("t1")).await, 1);
    }

    #[tokio::test]
    async fn multi_statement_commit_with_update() {
        let conn = adapter();
        conn.begin_transaction().await.unwrap();
        let a = conn.run_dml_statement(insert("a", 100, 15.0)).await.unwrap();
        let b = conn.run_dml_statement(insert("b", 100, 15.0)).await.unwrap();
        let updated = conn.run_dml_statement(update_category(100, 200)).await.unwrap();
        conn.commit_transaction().await.unwrap();

        assert_eq!((a, b, updated), (1, 1, 2));
        assert_eq!(
            collect_uuids(&conn, uuids_by_category(200)).await,
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[tokio::test]
    async fn rollback_hides_writes() {
        let conn = adapter();
        conn.begin_transaction().await.unwrap();
        conn.run_dml_statement(insert("r", 1, 1.0)).await.unwrap();
        conn.rollback_transaction().await.unwrap();
        assert_eq!(collect_counts(&conn, count_by_uuid("r")).await, 0);
    }

    #[tokio::test]
    async fn read_within_transaction_sees_own_writes() {
        let conn = adapter();
        conn.begin_transaction().await.unwrap();
        let inserted = conn.run_dml_statement(insert("x", 1, 1.0)).await.unwrap();
        let seen = collect_uuids(&conn, uuids_by_uuid("x")).await;
        conn.commit_transaction().await.unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(seen, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn exclusion_is_synchronous_with_a_stable_discriminant() {
        let conn = adapter();
        conn.begin_transaction().await.unwrap();
        let err = conn
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
    async fn ddl_round_trip() {
        let db = MockDatabase::new();
        let conn = ConnectionAdapter::new(
            ConnectionConfig::new("proj", "inst", "db"),
            db.client(),
            db.admin_client(),
        );

        assert!(!db.table_exists("T"));
        conn.run_ddl_statement("CREATE TABLE T (id INT64) PRIMARY KEY (id)")
            .await
            .unwrap();
        assert!(db.table_exists("T"));
        conn.run_ddl_statement("DROP TABLE T").await.unwrap();
        assert!(!db.table_exists("T"));
    }

    #[tokio::test]
    async fn health_check_is_true_while_open() {
        let conn = adapter();
        assert!(conn.health_check().await.unwrap());
        conn.close().await.unwrap();
        assert!(!conn.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn health_check_is_independent_of_an_open_transaction() {
        let conn = adapter();
        conn.begin_transaction().await.unwrap();
        conn.run_dml_statement(insert("in-progress", 1, 1.0)).await.unwrap();

        assert!(conn.health_check().await.unwrap());
        assert!(conn.transaction_manager().is_in_read_write_transaction().await);

        conn.commit_transaction().await.unwrap();
        conn.close().await.unwrap();
        assert!(!conn.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let conn = adapter();
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(!conn.local_healthcheck());
    }

    #[tokio::test]
    async fn set_autocommit_false_blocks_dml_outside_a_transaction() {
        let conn = adapter();
        conn.set_autocommit(false).await.unwrap();
        let err = conn.run_dml_statement(insert("y", 1, 1.0)).await.unwrap_err();
        assert!(matches!(err, SpannerError::DmlOutsideTransaction));
    }

    #[tokio::test]
    async fn dml_in_readonly_transaction_is_rejected() {
        let conn = adapter();
        conn.begin_readonly_transaction(TimestampBound::strong_read())
            .await
            .unwrap();
        let err = conn.run_dml_statement(insert("z", 1, 1.0)).await.unwrap_err();
        assert!(matches!(err, SpannerError::DmlInReadonlyTransaction));
    }

    #[tokio::test]
    async fn aborting_a_spawned_dml_statement_leaves_no_trace() {
        let conn = adapter();
        let (abort, join) = conn.spawn_dml_statement(insert("aborted", 1, 1.0));
        abort.abort();
        let _ = join.await;
        assert_eq!(collect_counts(&conn, count_by_uuid("aborted")).await, 0);
    }
}
