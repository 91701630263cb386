//! SQLite persistence for the registry and the change ledgers.
//!
//! One database file holds every table; separate processes (ingestion,
//! reconciliation, remediation workers) share it and coordinate only through
//! transactions and unique constraints:
//!
//! ```text
//! repositories ─< repo_branches ─┬─ services ─< endpoints ─< endpoint_consumers >─ clients
//!                                └─ clients
//! endpoints ─< affected_endpoints ─< affected_clients ─< action_items
//! ```
//!
//! Each submodule exposes free functions over a `&Connection` so they compose
//! inside one transaction, plus `impl Storage` wrappers for standalone use.

pub(crate) mod action_items;
mod health;
pub(crate) mod impact;
pub(crate) mod ledger;
pub(crate) mod registry;
mod schema;

use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use jiff::Timestamp;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior, types::Type};

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("repository already exists: {0}")]
    RepositoryAlreadyExists(String),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("endpoint not found: {method} {url}")]
    EndpointNotFound { url: String, method: String },

    #[error("affected endpoint not found: {0}")]
    ChangeNotFound(i64),

    #[error("affected client not found: {0}")]
    AffectedClientNotFound(i64),

    #[error("action item not found: {0}")]
    ActionItemNotFound(i64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("corrupt database: {0}")]
    Corrupt(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// How long a writer waits for another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// An open handle on the ADAPT database.
///
/// Opening installs the schema if needed. Dropping the handle closes the
/// connection; any transaction still open at that point is rolled back.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::install(&conn)?;
        Ok(Self { conn })
    }

    /// Returns the default database path: `~/.adapt/adapt.sqlite`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".adapt").join("adapt.sqlite"))
    }

    /// Starts a write transaction.
    ///
    /// `IMMEDIATE` takes the write lock up front so two processes never both
    /// read under a shared lock and then fail to upgrade.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Current time in the stored timestamp format.
pub(crate) fn now() -> String {
    Timestamp::now().to_string()
}

/// Reads a text column and parses it, reporting parse failures as
/// conversion errors on that column.
pub(crate) fn parsed<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads a JSON text column.
pub(crate) fn json<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    let Some(text) = row.get::<_, Option<String>>(idx)? else {
        return Ok(T::default());
    };
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads a port column, rejecting values outside the `u16` range.
pub(crate) fn port(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u16> {
    let value: i64 = row.get(idx)?;
    u16::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

/// Whether an error is a UNIQUE / PRIMARY KEY violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}
