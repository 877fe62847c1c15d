//! An in-memory double for the `native` trait boundary (§1, §2 ambient stack).
//!
//! There is no live Spanner instance to test the teacher's way (a real `postgres`
//! server on `localhost`), so instead of a SQL engine this harness recognizes a
//! handful of canned statement shapes against one fixed `BOOKS(uuid, category, wps)`
//! table — just enough to drive the end-to-end scenarios the adapter core's
//! contracts describe. It is not a query planner; statement text is matched on a
//! fixed set of prefixes, and bound parameters are read by name.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Result, SpannerError};
use crate::native::{
    AsyncResultSet, AsyncTransactionManager, CursorState, DatabaseAdminClient, DatabaseClient,
    ReadContext, ReadOnlyTransaction, TransactionContext,
};
use crate::row::{Row, RowMetadata};
use crate::statement::Statement;
use crate::timestamp_bound::TimestampBound;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
struct Book {
    uuid: String,
    category: i64,
    wps: f64,
}

type Table = Vec<Book>;

/// A fixed in-memory `BOOKS` table plus a registry of DDL-created table names, shared
/// by every `native` collaborator a [`MockDatabase`] hands out. `committed` is its own
/// `Arc` (rather than relying on `Arc<Self>`) so trait methods taking only `&self` can
/// still clone a handle to it for a spawned transaction or single-use read.
pub struct MockDatabase {
    committed: Arc<Mutex<Table>>,
    ddl_tables: Mutex<Vec<String>>,
}

impl MockDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(MockDatabase {
            committed: Arc::new(Mutex::new(Vec::new())),
            ddl_tables: Mutex::new(Vec::new()),
        })
    }

    pub fn client(self: &Arc<Self>) -> Arc<dyn DatabaseClient> {
        self.clone()
    }

    pub fn admin_client(self: &Arc<Self>) -> Arc<dyn DatabaseAdminClient> {
        self.clone()
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.ddl_tables.lock().unwrap().iter().any(|t| t == name)
    }
}

#[async_trait]
impl DatabaseClient for MockDatabase {
    async fn new_transaction_manager(&self) -> Result<Box<dyn AsyncTransactionManager>> {
        let snapshot = self.committed.lock().unwrap().clone();
        Ok(Box::new(MockTransactionManager {
            committed: self.committed.clone(),
            working: Arc::new(Mutex::new(snapshot)),
        }))
    }

    async fn begin_readonly_transaction(
        &self,
        _bound: TimestampBound,
    ) -> Result<Box<dyn ReadOnlyTransaction>> {
        let snapshot = self.committed.lock().unwrap().clone();
        Ok(Box::new(MockReadOnlyTransaction {
            snapshot: Arc::new(snapshot),
        }))
    }

    fn single_use_read_context(&self) -> Box<dyn ReadContext> {
        Box::new(MockSingleUseRead {
            committed: self.committed.clone(),
        })
    }

    async fn run_autocommit_update(&self, statement: &Statement) -> Result<i64> {
        let mut table = self.committed.lock().unwrap();
        apply_statement(&mut table, statement)
    }

    async fn run_autocommit_batch(&self, statements: &[Statement]) -> Result<Vec<i64>> {
        let mut table = self.committed.lock().unwrap();
        statements.iter().map(|s| apply_statement(&mut table, s)).collect()
    }

    fn is_closed(&self) -> bool {
        false
    }
}

#[async_trait]
impl DatabaseAdminClient for MockDatabase {
    async fn update_database_ddl(
        &self,
        _instance: &str,
        _database: &str,
        statements: &[String],
    ) -> Result<()> {
        let mut tables = self.ddl_tables.lock().unwrap();
        for sql in statements {
            let sql_upper = sql.to_uppercase();
            if let Some(name) = ddl_table_name(&sql_upper, "CREATE TABLE") {
                if !tables.iter().any(|t| t == &name) {
                    tables.push(name);
                }
            } else if let Some(name) = ddl_table_name(&sql_upper, "DROP TABLE") {
                tables.retain(|t| t != &name);
            } else {
                return Err(SpannerError::operation(std::io::Error::other(format!(
                    "unrecognized DDL statement: {sql}"
                ))));
            }
        }
        Ok(())
    }
}

fn ddl_table_name(sql_upper: &str, verb: &str) -> Option<String> {
    let rest = sql_upper.strip_prefix(verb)?.trim();
    let name = rest.split(|c: char| c == '(' || c.is_whitespace()).next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// The active context of a transaction opened against a private `working` copy of
/// the table, swapped into `committed` on commit and discarded on rollback.
struct MockTransactionManager {
    committed: Arc<Mutex<Table>>,
    working: Arc<Mutex<Table>>,
}

#[async_trait]
impl AsyncTransactionManager for MockTransactionManager {
    async fn begin(&self) -> Result<Box<dyn TransactionContext>> {
        Ok(Box::new(MockTransactionContext {
            working: self.working.clone(),
        }))
    }

    async fn commit(&self) -> Result<()> {
        let working = self.working.lock().unwrap().clone();
        *self.committed.lock().unwrap() = working;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }
}

struct MockTransactionContext {
    working: Arc<Mutex<Table>>,
}

#[async_trait]
impl ReadContext for MockTransactionContext {
    async fn execute_query(&self, statement: &Statement) -> Result<Box<dyn AsyncResultSet>> {
        let table = self.working.lock().unwrap();
        Ok(Box::new(FixedResultSet::new(query_statement(&table, statement)?)))
    }
}

#[async_trait]
impl TransactionContext for MockTransactionContext {
    async fn execute_update(&self, statement: &Statement) -> Result<i64> {
        let mut table = self.working.lock().unwrap();
        apply_statement(&mut table, statement)
    }

    async fn batch_update(&self, statements: &[Statement]) -> Result<Vec<i64>> {
        let mut table = self.working.lock().unwrap();
        statements.iter().map(|s| apply_statement(&mut table, s)).collect()
    }
}

struct MockReadOnlyTransaction {
    snapshot: Arc<Table>,
}

#[async_trait]
impl ReadContext for MockReadOnlyTransaction {
    async fn execute_query(&self, statement: &Statement) -> Result<Box<dyn AsyncResultSet>> {
        Ok(Box::new(FixedResultSet::new(query_statement(
            &self.snapshot,
            statement,
        )?)))
    }
}

#[async_trait]
impl ReadOnlyTransaction for MockReadOnlyTransaction {
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MockSingleUseRead {
    committed: Arc<Mutex<Table>>,
}

#[async_trait]
impl ReadContext for MockSingleUseRead {
    async fn execute_query(&self, statement: &Statement) -> Result<Box<dyn AsyncResultSet>> {
        let table = self.committed.lock().unwrap();
        Ok(Box::new(FixedResultSet::new(query_statement(&table, statement)?)))
    }
}

/// An [`AsyncResultSet`] over a precomputed vector of rows. `position` is the index
/// `current_row` reads from; `advance` moves it forward one slot before reporting
/// whether a row landed there.
struct FixedResultSet {
    metadata: RowMetadata,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
    cancelled: bool,
}

impl FixedResultSet {
    fn new((metadata, rows): (RowMetadata, Vec<Vec<Value>>)) -> Self {
        FixedResultSet {
            metadata,
            rows,
            position: None,
            cancelled: false,
        }
    }
}

#[async_trait]
impl AsyncResultSet for FixedResultSet {
    async fn advance(&mut self) -> Result<CursorState> {
        if self.cancelled {
            return Ok(CursorState::Done);
        }
        let next = self.position.map_or(0, |p| p + 1);
        if next >= self.rows.len() {
            return Ok(CursorState::Done);
        }
        self.position = Some(next);
        Ok(CursorState::Ready)
    }

    fn current_row(&self) -> Row {
        let idx = self.position.expect("current_row called before a Ready advance");
        Row::new(self.metadata.clone(), self.rows[idx].clone())
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}

fn apply_statement(table: &mut Table, statement: &Statement) -> Result<i64> {
    let sql = statement.sql().trim_start().to_uppercase();
    if sql.starts_with("INSERT") {
        let uuid = require_string(statement, "uuid")?;
        let category = require_i64(statement, "category")?;
        let wps = require_f64(statement, "wps")?;
        table.push(Book { uuid, category, wps });
        Ok(1)
    } else if sql.starts_with("UPDATE") {
        let old_category = require_i64(statement, "old_category")?;
        let new_category = require_i64(statement, "new_category")?;
        let mut updated = 0;
        for book in table.iter_mut() {
            if book.category == old_category {
                book.category = new_category;
                updated += 1;
            }
        }
        Ok(updated)
    } else {
        Err(SpannerError::operation(std::io::Error::other(format!(
            "unrecognized DML statement: {}",
            statement.sql()
        ))))
    }
}

fn query_statement(table: &[Book], statement: &Statement) -> Result<(RowMetadata, Vec<Vec<Value>>)> {
    let sql = statement.sql().trim_start().to_uppercase();
    if sql.starts_with("SELECT COUNT") {
        let uuid = require_string(statement, "uuid")?;
        let count = table.iter().filter(|b| b.uuid == uuid).count() as i64;
        Ok((
            RowMetadata::new(vec!["count".to_string()]),
            vec![vec![Value::Int64(count)]],
        ))
    } else if sql.starts_with("SELECT UUID") {
        let mut uuids: Vec<String> = if let Some(Value::String(uuid)) = statement.params().get("uuid") {
            table.iter().filter(|b| &b.uuid == uuid).map(|b| b.uuid.clone()).collect()
        } else {
            let category = require_i64(statement, "category")?;
            table
                .iter()
                .filter(|b| b.category == category)
                .map(|b| b.uuid.clone())
                .collect()
        };
        uuids.sort();
        Ok((
            RowMetadata::new(vec!["uuid".to_string()]),
            uuids.into_iter().map(|u| vec![Value::String(u)]).collect(),
        ))
    } else if sql.starts_with("SELECT 1") {
        Ok((
            RowMetadata::new(vec!["probe".to_string()]),
            vec![vec![Value::Int64(1)]],
        ))
    } else {
        Err(SpannerError::operation(std::io::Error::other(format!(
            "unrecognized query statement: {}",
            statement.sql()
        ))))
    }
}

fn require_string(statement: &Statement, name: &str) -> Result<String> {
    match statement.params().get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(SpannerError::operation(std::io::Error::other(format!(
            "missing or wrong-typed parameter `{name}`"
        )))),
    }
}

fn require_i64(statement: &Statement, name: &str) -> Result<i64> {
    match statement.params().get(name) {
        Some(Value::Int64(v)) => Ok(*v),
        _ => Err(SpannerError::operation(std::io::Error::other(format!(
            "missing or wrong-typed parameter `{name}`"
        )))),
    }
}

fn require_f64(statement: &Statement, name: &str) -> Result<f64> {
    match statement.params().get(name) {
        Some(Value::Float64(v)) => Ok(*v),
        _ => Err(SpannerError::operation(std::io::Error::other(format!(
            "missing or wrong-typed parameter `{name}`"
        )))),
    }
}
