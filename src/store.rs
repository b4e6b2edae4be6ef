//! Connection acquisition for the SQLite database and classification of
//! database errors.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use rusqlite::{Connection, ErrorCode, OpenFlags, ffi};

use crate::db::initialize;

/// How long a connection waits for another writer to release the database
/// lock before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors originating from the database that the account service does not
/// handle itself.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StoreError {
    /// A UNIQUE or PRIMARY KEY constraint failed.
    ///
    /// `column` is the qualified column name reported by SQLite, e.g.
    /// "customers.email".
    #[error("duplicate value for {column}")]
    DuplicateKey {
        /// The column whose constraint failed.
        column: String,
    },

    /// A CHECK, NOT NULL or FOREIGN KEY constraint failed.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The database could not be opened, or stayed locked by another
    /// connection for longer than the busy timeout.
    #[error("could not use the database connection: {0}")]
    ConnectionError(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    Sql(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        match error {
            rusqlite::Error::SqliteFailure(sql_error, description)
                if sql_error.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || sql_error.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                let column = description
                    .as_deref()
                    .and_then(failed_constraint_target)
                    .unwrap_or_default()
                    .to_owned();

                StoreError::DuplicateKey { column }
            }
            rusqlite::Error::SqliteFailure(sql_error, description)
                if sql_error.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation(
                    description.unwrap_or_else(|| sql_error.to_string()),
                )
            }
            rusqlite::Error::SqliteFailure(sql_error, description)
                if matches!(
                    sql_error.code,
                    ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::CannotOpen
                        | ErrorCode::NotADatabase
                        | ErrorCode::ReadOnly
                        | ErrorCode::SystemIoFailure
                ) =>
            {
                StoreError::ConnectionError(description.unwrap_or_else(|| sql_error.to_string()))
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                StoreError::Sql(error)
            }
        }
    }
}

/// Extract "table.column" from a message like "UNIQUE constraint failed: customers.email".
fn failed_constraint_target(description: &str) -> Option<&str> {
    description
        .rsplit_once(": ")
        .map(|(_, target)| target.split(',').next().unwrap_or(target).trim())
}

/// A handle to a file-backed SQLite database.
///
/// The store itself only remembers where the database lives. Each unit of work
/// acquires its own connection with [SqliteStore::acquire] and releases it by
/// dropping it, so the database is the only point of synchronization between
/// concurrent callers.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open the database at `path`, creating the file and the tables for the
    /// domain models if they do not exist.
    ///
    /// # Errors
    /// Returns a [StoreError] if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Same as [SqliteStore::open] with a custom busy timeout.
    pub fn with_busy_timeout(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout,
        };

        let connection = store.acquire()?;
        initialize(&connection)?;
        tracing::debug!("Initialized database at {:?}", store.path);

        Ok(store)
    }

    /// The file path of the database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new connection to the database.
    ///
    /// Foreign keys are enforced on the returned connection and it waits up to
    /// the busy timeout for locks held by other connections.
    ///
    /// # Errors
    /// Returns [StoreError::ConnectionError] if the database cannot be opened.
    pub fn acquire(&self) -> Result<Connection, StoreError> {
        let connection = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|error| StoreError::ConnectionError(error.to_string()))?;

        connection.busy_timeout(self.busy_timeout)?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(connection)
    }
}

#[cfg(test)]
mod store_tests {
    use rusqlite::Connection;

    use crate::test_utils::temp_store;

    use super::{SqliteStore, StoreError, failed_constraint_target};

    #[test]
    fn open_creates_tables() {
        let (_dir, store) = temp_store();
        let connection = store.acquire().unwrap();

        let table_count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('customers', 'transactions')",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(table_count, 2);
    }

    #[test]
    fn open_twice_keeps_existing_tables() {
        let (dir, store) = temp_store();

        let reopened = SqliteStore::open(store.path());

        assert!(reopened.is_ok(), "reopening failed: {reopened:?}");
        drop(dir);
    }

    #[test]
    fn acquire_enables_foreign_keys() {
        let (_dir, store) = temp_store();
        let connection = store.acquire().unwrap();

        let enabled: i64 = connection
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();

        assert_eq!(enabled, 1);
    }

    #[test]
    fn open_fails_for_missing_directory() {
        let result = SqliteStore::open("/this/directory/does/not/exist/bank.db");

        assert!(
            matches!(result, Err(StoreError::ConnectionError(_))),
            "want connection error, got {result:?}"
        );
    }

    #[test]
    fn check_failure_is_constraint_violation() {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute("CREATE TABLE t (x INTEGER CHECK (x > 0))", ())
            .unwrap();

        let error = connection
            .execute("INSERT INTO t (x) VALUES (-1)", ())
            .unwrap_err();

        assert!(matches!(
            StoreError::from(error),
            StoreError::ConstraintViolation(_)
        ));
    }

    #[test]
    fn parses_constraint_target() {
        assert_eq!(
            failed_constraint_target("UNIQUE constraint failed: customers.phone"),
            Some("customers.phone")
        );
        assert_eq!(
            failed_constraint_target("UNIQUE constraint failed: t.a, t.b"),
            Some("t.a")
        );
        assert_eq!(failed_constraint_target("no colon here"), None);
    }
}
