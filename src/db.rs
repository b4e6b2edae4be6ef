//! Schema setup for the application database.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{account::create_customer_table, ledger::create_transaction_table};

/// Create the tables for the domain models if they do not already exist.
///
/// # Errors
/// Returns an error if a table could not be created, in which case no tables
/// are created.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_customer_table(&transaction)?;
    create_transaction_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
