//! A small retail banking core backed by SQLite.
//!
//! Customers register an account, authenticate to obtain a [Session], and then
//! read their balance, credit or debit money, and list their transaction
//! history. Every balance change happens in one database transaction together
//! with the matching ledger row, and debits can never overdraw an account.
//!
//! Presentation (forms, pages, prompts) is left to the caller. The `bank`
//! binary in this crate is one such caller.

#![warn(missing_docs)]

mod account;
mod db;
pub mod display;
mod ledger;
mod money;
mod password;
mod service;
mod session;
mod store;
mod timezone;
mod validation;

#[cfg(test)]
mod test_utils;

pub use account::{Account, AccountNumber};
pub use ledger::{LedgerEntry, TransactionId, TransactionKind};
pub use money::Money;
pub use password::{BcryptHasher, PasswordHash, PasswordHasher, Sha256Hasher};
pub use service::{AccountService, Reconciliation, Registration};
pub use session::Session;
pub use store::{SqliteStore, StoreError};
pub use timezone::get_local_offset;
pub use validation::{FieldKind, StandardValidator, ValidationError, Validator};

use rust_decimal::Decimal;

/// The errors that may occur in the account service.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The input did not pass validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Another account already uses the tax ID, national ID, email or phone
    /// number.
    #[error("an account with this {0} is already registered")]
    DuplicateIdentity(FieldKind),

    /// The requested account could not be found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested account could not be found")]
    NotFound,

    /// The password did not match the one stored for the account.
    #[error("invalid account number or password")]
    InvalidCredential,

    /// The amount was not positive, had more than two decimal places, or would
    /// take the balance past the largest representable amount.
    #[error("{0} is not a valid amount, amounts must be greater than zero with at most two decimal places")]
    InvalidAmount(Decimal),

    /// A debit asked for more money than the account holds.
    #[error("insufficient funds: requested {requested} but the balance is {balance}")]
    InsufficientFunds {
        /// The balance at the time of the debit.
        balance: Money,
        /// The amount that was asked for.
        requested: Money,
    },

    /// An error from the underlying database that is not covered by the
    /// variants above.
    #[error(transparent)]
    Store(StoreError),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging. When
    /// communicating with a customer this error should be replaced with a
    /// general error.
    #[error("hashing failed: {0}")]
    HashingError(String),
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        if let StoreError::DuplicateKey { column } = &error {
            if let Some(field) = FieldKind::from_column(column) {
                return Error::DuplicateIdentity(field);
            }
        }

        Error::Store(error)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => StoreError::from(error).into(),
        }
    }
}
