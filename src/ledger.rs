//! The append-only ledger of credits and debits.

use std::fmt::Display;

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{AccountNumber, Error, Money};

/// A newtype wrapper for integer ledger entry IDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct TransactionId(i64);

impl TransactionId {
    /// Create a new transaction ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

/// Whether money went into or out of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money paid into the account.
    Credit,
    /// Money taken out of the account.
    Debit,
}

impl TransactionKind {
    fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
        }
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "credit" => Ok(TransactionKind::Credit),
            "debit" => Ok(TransactionKind::Debit),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// One credit or debit recorded against an account.
///
/// Entries are never changed or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// The ID of the entry.
    pub id: TransactionId,
    /// The account the money moved into or out of.
    pub account_number: AccountNumber,
    /// Whether this was a credit or a debit.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// How much money moved. Always positive.
    pub amount: Money,
    /// When the entry was written.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl LedgerEntry {
    /// The amount with its sign: positive for credits, negative for debits.
    pub fn signed_amount(&self) -> Money {
        match self.kind {
            TransactionKind::Credit => self.amount,
            TransactionKind::Debit => Money::from_minor_units(-self.amount.as_minor_units()),
        }
    }
}

/// Create the transaction table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_number INTEGER NOT NULL REFERENCES customers(account_number),
            type TEXT NOT NULL CHECK (type IN ('credit', 'debit')),
            amount INTEGER NOT NULL CHECK (amount > 0),
            timestamp TEXT NOT NULL
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_account
            ON transactions(account_number, timestamp)",
        (),
    )?;

    Ok(())
}

fn map_entry_row(row: &Row) -> Result<LedgerEntry, rusqlite::Error> {
    Ok(LedgerEntry {
        id: TransactionId::new(row.get(0)?),
        account_number: AccountNumber::new(row.get(1)?),
        kind: row.get(2)?,
        amount: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

/// Append an entry to the ledger, timestamped with the current time.
///
/// Callers are responsible for changing the account balance in the same
/// database transaction.
///
/// # Errors
/// Returns an [Error::Store] if `account_number` does not refer to an
/// account, `amount` is not positive, or some other SQL error occurred.
pub(crate) fn insert_entry(
    account_number: AccountNumber,
    kind: TransactionKind,
    amount: Money,
    connection: &Connection,
) -> Result<LedgerEntry, Error> {
    let entry = connection
        .prepare(
            "INSERT INTO transactions (account_number, type, amount, timestamp)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id, account_number, type, amount, timestamp",
        )?
        .query_row(
            (
                account_number.as_i64(),
                kind,
                amount,
                OffsetDateTime::now_utc(),
            ),
            map_entry_row,
        )?;

    Ok(entry)
}

/// Get the ledger entries for `account_number`, most recent first.
///
/// # Errors
/// Returns an [Error::Store] if an SQL related error occurred.
pub fn get_history(
    account_number: AccountNumber,
    connection: &Connection,
) -> Result<Vec<LedgerEntry>, Error> {
    connection
        .prepare(
            "SELECT id, account_number, type, amount, timestamp
             FROM transactions
             WHERE account_number = :account_number
             ORDER BY timestamp DESC, id DESC",
        )?
        .query_map(
            &[(":account_number", &account_number.as_i64())],
            map_entry_row,
        )?
        .map(|maybe_entry| maybe_entry.map_err(Error::from))
        .collect()
}

/// Credits minus debits for `account_number` over its whole history.
///
/// # Errors
/// Returns an [Error::Store] if an SQL related error occurred.
pub fn sum_signed_amounts(
    account_number: AccountNumber,
    connection: &Connection,
) -> Result<Money, Error> {
    connection
        .query_row(
            "SELECT COALESCE(SUM(CASE type WHEN 'credit' THEN amount ELSE -amount END), 0)
             FROM transactions
             WHERE account_number = ?1",
            (account_number.as_i64(),),
            |row| row.get(0),
        )
        .map_err(|error| error.into())
}
