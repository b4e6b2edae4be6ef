//! Code for creating the customer table and reading and writing account
//! records.

use std::fmt::Display;

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, Money, PasswordHash};

/// A newtype wrapper for integer account numbers.
///
/// This helps disambiguate account numbers from other types of IDs, leading to
/// better compile time errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct AccountNumber(i64);

impl AccountNumber {
    /// Create a new account number.
    pub fn new(account_number: i64) -> Self {
        Self(account_number)
    }

    /// Cast the account number to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for AccountNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A customer's account: who they are, how they log in, and how much money
/// they hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The account number assigned by the database.
    pub account_number: AccountNumber,
    /// The customer's tax ID (PAN).
    pub tax_id: String,
    /// The customer's national ID (Aadhaar).
    pub national_id: String,
    /// The customer's first name.
    pub first_name: String,
    /// The customer's last name.
    pub last_name: String,
    /// The customer's email address.
    pub email: String,
    /// The customer's phone number.
    pub phone: String,
    /// The customer's password hash.
    #[serde(skip_serializing)]
    pub password_hash: PasswordHash,
    /// The current balance.
    pub balance: Money,
}

/// The fields needed to insert a new account.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewAccount {
    pub tax_id: String,
    pub national_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: PasswordHash,
}

/// Create the customer table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_customer_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS customers (
            account_number INTEGER PRIMARY KEY AUTOINCREMENT,
            tax_id TEXT NOT NULL UNIQUE,
            national_id TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            phone TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0)
        )",
        (),
    )?;

    Ok(())
}

const SELECT_ACCOUNT: &str = "SELECT account_number, tax_id, national_id, first_name, last_name, email, phone, password_hash, balance FROM customers";

fn map_account_row(row: &Row) -> Result<Account, rusqlite::Error> {
    let raw_password_hash: String = row.get(7)?;

    Ok(Account {
        account_number: AccountNumber::new(row.get(0)?),
        tax_id: row.get(1)?,
        national_id: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        phone: row.get(6)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        balance: row.get(8)?,
    })
}

/// Insert a new account with a zero balance.
///
/// # Errors
///
/// Returns a:
/// - [Error::DuplicateIdentity] if the tax ID, national ID, email or phone
///   number is already registered,
/// - or [Error::Store] if some other SQL error occurred.
pub(crate) fn create_account(
    new_account: NewAccount,
    connection: &Connection,
) -> Result<Account, Error> {
    let account = connection
        .prepare(
            "INSERT INTO customers (tax_id, national_id, first_name, last_name, email, phone, password_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING account_number, tax_id, national_id, first_name, last_name, email, phone, password_hash, balance",
        )?
        .query_row(
            (
                &new_account.tax_id,
                &new_account.national_id,
                &new_account.first_name,
                &new_account.last_name,
                &new_account.email,
                &new_account.phone,
                new_account.password_hash.as_ref(),
            ),
            map_account_row,
        )?;

    Ok(account)
}

/// Get the account with the number `account_number`.
///
/// # Errors
///
/// This function will return an error if:
/// - `account_number` does not belong to a registered account,
/// - there was an error trying to access the store.
pub fn get_account(
    account_number: AccountNumber,
    connection: &Connection,
) -> Result<Account, Error> {
    connection
        .prepare(&format!(
            "{SELECT_ACCOUNT} WHERE account_number = :account_number"
        ))?
        .query_row(
            &[(":account_number", &account_number.as_i64())],
            map_account_row,
        )
        .map_err(|error| error.into())
}

/// Get the balance of the account `account_number`, or `None` if there is no
/// such account.
///
/// # Errors
///
/// Returns an [Error::Store] if an SQL related error occurred.
pub(crate) fn get_balance(
    account_number: AccountNumber,
    connection: &Connection,
) -> Result<Option<Money>, Error> {
    connection
        .query_row(
            "SELECT balance FROM customers WHERE account_number = ?1",
            (account_number.as_i64(),),
            |row| row.get(0),
        )
        .optional()
        .map_err(|error| error.into())
}

/// Add `amount` to the balance of `account_number` and return the new balance.
///
/// Returns `Ok(None)` if there is no such account.
pub(crate) fn increase_balance(
    account_number: AccountNumber,
    amount: Money,
    connection: &Connection,
) -> Result<Option<Money>, Error> {
    connection
        .query_row(
            "UPDATE customers SET balance = balance + ?1
             WHERE account_number = ?2
             RETURNING balance",
            (amount, account_number.as_i64()),
            |row| row.get(0),
        )
        .optional()
        .map_err(|error| error.into())
}

/// Subtract `amount` from the balance of `account_number` if the balance covers
/// it, and return the new balance.
///
/// The check and the update are one statement, so no other writer can change
/// the balance in between. Returns `Ok(None)` if there is no such account or
/// the balance is less than `amount`.
pub(crate) fn decrease_balance_if_sufficient(
    account_number: AccountNumber,
    amount: Money,
    connection: &Connection,
) -> Result<Option<Money>, Error> {
    connection
        .query_row(
            "UPDATE customers SET balance = balance - ?1
             WHERE account_number = ?2 AND balance >= ?1
             RETURNING balance",
            (amount, account_number.as_i64()),
            |row| row.get(0),
        )
        .optional()
        .map_err(|error| error.into())
}

/// Get the number of accounts in the database.
///
/// # Errors
///
/// Returns an [Error::Store] if an SQL related error occurred.
#[cfg(test)]
pub(crate) fn count_accounts(connection: &Connection) -> Result<i64, Error> {
    connection
        .query_row("SELECT COUNT(account_number) FROM customers;", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

#[cfg(test)]
pub(crate) mod test_account {
    use crate::PasswordHash;

    use super::NewAccount;

    /// A valid account whose identity fields are derived from `n`, so accounts
    /// with different `n` do not collide.
    pub(crate) fn new_account(n: u8) -> NewAccount {
        NewAccount {
            tax_id: format!("ABCDE{:04}F", n),
            national_id: format!("{:012}", n),
            first_name: "Jane".to_owned(),
            last_name: "Doe".to_owned(),
            email: format!("jane{n}@example.com"),
            phone: format!("98765432{:02}", n),
            password_hash: PasswordHash::new_unchecked("hunter2"),
        }
    }
}
