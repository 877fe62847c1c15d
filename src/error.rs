//! Errors produced by the reactive adapter core.
//!
//! The error surface keeps a closed set of "kinds" the way `tokio-postgres` does,
//! but expresses it with `thiserror` rather than a hand-rolled `Kind` enum plus a
//! boxed cause, since every Cloud Spanner client in the wild does it that way.

use std::fmt;

/// A boxed, type-erased cause from the native Spanner client library.
pub type NativeCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The stable transaction-mode discriminant carried by [`SpannerError::TransactionInProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadWrite,
    ReadOnly,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::ReadWrite => f.write_str("read-write"),
            TransactionMode::ReadOnly => f.write_str("read-only"),
        }
    }
}

/// An error produced by the reactive adapter core.
///
/// Variants are grouped the way §7 of the design groups them: state-violation errors
/// are synchronous and carry a stable discriminant; operation/streaming failures wrap
/// a native cause and preserve its `source()` chain.
#[derive(thiserror::Error, Debug)]
pub enum SpannerError {
    /// A `begin*` call was attempted while a transaction of the given mode was
    /// already in progress. `mode` names the *existing* transaction's mode.
    #[error("a {mode} transaction is already in progress")]
    TransactionInProgress { mode: TransactionMode },

    /// DML was attempted while the connection held a read-only transaction.
    #[error("cannot run DML in a readonly transaction")]
    DmlInReadonlyTransaction,

    /// DML was attempted outside any transaction while autocommit is disabled.
    #[error("cannot run DML outside a transaction when autocommit is false")]
    DmlOutsideTransaction,

    /// `run_in_transaction` was called while the state machine was not ReadWrite.
    #[error("connection is not in a read-write transaction")]
    NotInTransaction,

    /// An operation was attempted after the adapter was closed.
    #[error("connection is closed")]
    Closed,

    /// The native client failed to perform an RPC (commit, rollback, execute, ...).
    #[error("spanner operation failed")]
    Operation {
        #[source]
        source: NativeCause,
    },

    /// The native result-set cursor failed while advancing or materializing a row.
    #[error("error streaming rows")]
    Streaming {
        #[source]
        source: NativeCause,
    },

    /// A typed column accessor (`Row::get`) failed to convert the native value.
    #[error("column `{column}` could not be converted to the requested type")]
    ColumnConversion {
        column: String,
        #[source]
        source: NativeCause,
    },

    /// A column was addressed by a name or ordinal the row does not have.
    #[error("no such column: {0}")]
    UnknownColumn(String),
}

impl SpannerError {
    pub fn transaction_in_progress(mode: TransactionMode) -> Self {
        SpannerError::TransactionInProgress { mode }
    }

    pub fn operation<E>(source: E) -> Self
    where
        E: Into<NativeCause>,
    {
        SpannerError::Operation {
            source: source.into(),
        }
    }

    pub fn streaming<E>(source: E) -> Self
    where
        E: Into<NativeCause>,
    {
        SpannerError::Streaming {
            source: source.into(),
        }
    }

    /// True for the four synchronous state-violation variants (§7 kind 1).
    pub fn is_state_violation(&self) -> bool {
        matches!(
            self,
            SpannerError::TransactionInProgress { .. }
                | SpannerError::DmlInReadonlyTransaction
                | SpannerError::DmlOutsideTransaction
                | SpannerError::NotInTransaction
                | SpannerError::Closed
        )
    }
}

pub type Result<T> = std::result::Result<T, SpannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_mode_display_matches_stable_message() {
        assert_eq!(TransactionMode::ReadWrite.to_string(), "read-write");
        assert_eq!(TransactionMode::ReadOnly.to_string(), "read-only");
    }

    #[test]
    fn state_violations_are_tagged() {
        assert!(SpannerError::DmlInReadonlyTransaction.is_state_violation());
        assert!(SpannerError::transaction_in_progress(TransactionMode::ReadWrite)
            .is_state_violation());
        assert!(!SpannerError::operation(std::io::Error::other("boom")).is_state_violation());
    }
}
