//! Proof that a customer has logged in.

use crate::{Account, AccountNumber};

/// An authenticated customer.
///
/// A session can only be created by
/// [AccountService::authenticate](crate::AccountService::authenticate), so
/// holding one means the password for the account was checked. The caller
/// owns the session and decides how long it lives; logging out is dropping it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    account_number: AccountNumber,
    first_name: String,
    last_name: String,
}

impl Session {
    pub(crate) fn new(account: &Account) -> Self {
        Self {
            account_number: account.account_number,
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
        }
    }

    /// The number of the account that logged in.
    pub fn account_number(&self) -> AccountNumber {
        self.account_number
    }

    /// The customer's full name, for greeting them.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
