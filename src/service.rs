//! The account service: registration, login, and balance operations.
//!
//! Each operation acquires its own connection from the [SqliteStore], does one
//! unit of work, and releases the connection before returning. Credits and
//! debits run inside an immediate SQLite transaction, which takes the database
//! write lock up front, so the balance update and the ledger row are committed
//! together or not at all, and concurrent debits on one account cannot both
//! pass the balance check.

use std::fmt::Debug;

use rusqlite::TransactionBehavior;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Account, AccountNumber, BcryptHasher, Error, FieldKind, LedgerEntry, Money, PasswordHasher,
    Session, SqliteStore, StandardValidator, TransactionKind, ValidationError, Validator,
    account::{
        NewAccount, create_account, decrease_balance_if_sufficient, get_account, get_balance,
        increase_balance,
    },
    ledger::{get_history, insert_entry, sum_signed_amounts},
};

const COUNTRY_CODE: &str = "+91";

/// The details a customer fills in to open an account.
#[derive(Clone, Serialize, Deserialize)]
pub struct Registration {
    /// The tax ID (PAN).
    pub tax_id: String,
    /// The national ID (Aadhaar).
    pub national_id: String,
    /// The customer's first name.
    pub first_name: String,
    /// The customer's last name.
    pub last_name: String,
    /// The customer's email address.
    pub email: String,
    /// The customer's phone number.
    pub phone: String,
    /// The chosen password.
    pub password: String,
    /// The chosen password, typed a second time.
    pub confirm_password: String,
}

impl Registration {
    /// Trim surrounding whitespace, upper-case the tax ID, lower-case the email
    /// and drop the "+91" country code from the phone number, so one identity
    /// has one stored form. Passwords are left as typed.
    fn normalize(self) -> Self {
        let phone = self.phone.trim();
        let phone = phone.strip_prefix(COUNTRY_CODE).unwrap_or(phone).to_owned();

        Self {
            tax_id: self.tax_id.trim().to_uppercase(),
            national_id: self.national_id.trim().to_owned(),
            first_name: self.first_name.trim().to_owned(),
            last_name: self.last_name.trim().to_owned(),
            email: self.email.trim().to_lowercase(),
            phone,
            ..self
        }
    }
}

impl Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("tax_id", &self.tax_id)
            .field("national_id", &self.national_id)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("password", &"********")
            .field("confirm_password", &"********")
            .finish()
    }
}

/// The balance of an account next to the total of its ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reconciliation {
    /// The balance stored on the account.
    pub balance: Money,
    /// Credits minus debits over the account's history.
    pub ledger_total: Money,
}

impl Reconciliation {
    /// Whether the balance agrees with the ledger.
    pub fn is_consistent(&self) -> bool {
        self.balance == self.ledger_total
    }
}

/// Opens accounts, logs customers in, and moves money.
///
/// `V` checks the format of identity fields and `H` hashes passwords. Use
/// [AccountService::new] for the standard rules and bcrypt.
#[derive(Debug, Clone)]
pub struct AccountService<V = StandardValidator, H = BcryptHasher> {
    store: SqliteStore,
    validator: V,
    hasher: H,
}

impl AccountService {
    /// Create a service with the standard validator and bcrypt at the default cost.
    pub fn new(store: SqliteStore) -> Self {
        Self::with_capabilities(store, StandardValidator, BcryptHasher::default())
    }
}

impl<V, H> AccountService<V, H>
where
    V: Validator,
    H: PasswordHasher,
{
    /// Create a service with a custom validator and password hasher.
    pub fn with_capabilities(store: SqliteStore, validator: V, hasher: H) -> Self {
        Self {
            store,
            validator,
            hasher,
        }
    }

    /// Open a new account with a zero balance.
    ///
    /// # Errors
    /// Returns a:
    /// - [Error::Validation] if a field is malformed, a name is empty, or the
    ///   passwords are empty or differ,
    /// - [Error::DuplicateIdentity] if the tax ID, national ID, email or phone
    ///   number is already registered,
    /// - [Error::HashingError] if the password could not be hashed,
    /// - or [Error::Store] if the database failed.
    pub fn register(&self, registration: Registration) -> Result<Account, Error> {
        let registration = registration.normalize();
        self.validate(&registration)?;

        let password_hash = self.hasher.hash(&registration.password)?;

        let connection = self.store.acquire()?;
        let account = create_account(
            NewAccount {
                tax_id: registration.tax_id,
                national_id: registration.national_id,
                first_name: registration.first_name,
                last_name: registration.last_name,
                email: registration.email,
                phone: registration.phone,
                password_hash,
            },
            &connection,
        )
        .inspect_err(|error| {
            if let Error::DuplicateIdentity(field) = error {
                tracing::info!("Registration rejected, {field} is already registered");
            }
        })?;

        tracing::info!("Account {} created", account.account_number);

        Ok(account)
    }

    fn validate(&self, registration: &Registration) -> Result<(), ValidationError> {
        let fields = [
            (FieldKind::TaxId, &registration.tax_id),
            (FieldKind::NationalId, &registration.national_id),
            (FieldKind::Email, &registration.email),
            (FieldKind::Phone, &registration.phone),
        ];

        for (kind, value) in fields {
            if !self.validator.validate(kind, value) {
                return Err(ValidationError::InvalidFormat(kind));
            }
        }

        if registration.first_name.is_empty() || registration.last_name.is_empty() {
            return Err(ValidationError::EmptyName);
        }

        if registration.password.is_empty() {
            return Err(ValidationError::EmptyPassword);
        }

        if registration.password != registration.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }

        Ok(())
    }

    /// Check `password` for the account `account_number` and start a session.
    ///
    /// # Errors
    /// Returns a:
    /// - [Error::NotFound] if there is no such account,
    /// - [Error::InvalidCredential] if the password is wrong,
    /// - [Error::HashingError] if the stored hash could not be checked,
    /// - or [Error::Store] if the database failed.
    pub fn authenticate(
        &self,
        account_number: AccountNumber,
        password: &str,
    ) -> Result<Session, Error> {
        let connection = self.store.acquire()?;
        let account = get_account(account_number, &connection)?;

        if !self.hasher.verify(password, &account.password_hash)? {
            tracing::warn!("Failed log in attempt for account {account_number}");
            return Err(Error::InvalidCredential);
        }

        tracing::debug!("Account {account_number} logged in");

        Ok(Session::new(&account))
    }

    /// The current balance of the logged in account.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if the account no longer exists, or
    /// [Error::Store] if the database failed.
    pub fn balance(&self, session: &Session) -> Result<Money, Error> {
        let connection = self.store.acquire()?;

        get_balance(session.account_number(), &connection)?.ok_or(Error::NotFound)
    }

    /// Pay `amount` into the logged in account and return the new balance.
    ///
    /// # Errors
    /// Returns a:
    /// - [Error::InvalidAmount] if `amount` is not positive, has more than
    ///   two decimal places, or would overflow the balance,
    /// - [Error::NotFound] if the account no longer exists,
    /// - or [Error::Store] if the database failed.
    ///
    /// Nothing is changed when an error is returned.
    pub fn credit(&self, session: &Session, amount: Decimal) -> Result<Money, Error> {
        let amount = parse_amount(amount)?;
        let account_number = session.account_number();

        let mut connection = self.store.acquire()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current_balance = get_balance(account_number, &transaction)?.ok_or(Error::NotFound)?;
        if current_balance.checked_add(amount).is_none() {
            return Err(Error::InvalidAmount(amount.to_decimal()));
        }

        let balance =
            increase_balance(account_number, amount, &transaction)?.ok_or(Error::NotFound)?;
        insert_entry(account_number, TransactionKind::Credit, amount, &transaction)?;

        transaction.commit()?;

        tracing::info!("Credited {amount} to account {account_number}, balance is now {balance}");

        Ok(balance)
    }

    /// Take `amount` out of the logged in account and return the new balance.
    ///
    /// # Errors
    /// Returns a:
    /// - [Error::InvalidAmount] if `amount` is not positive or has more than
    ///   two decimal places,
    /// - [Error::InsufficientFunds] if the balance is less than `amount`,
    /// - [Error::NotFound] if the account no longer exists,
    /// - or [Error::Store] if the database failed.
    ///
    /// Nothing is changed when an error is returned.
    pub fn debit(&self, session: &Session, amount: Decimal) -> Result<Money, Error> {
        let amount = parse_amount(amount)?;
        let account_number = session.account_number();

        let mut connection = self.store.acquire()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let balance = match decrease_balance_if_sufficient(account_number, amount, &transaction)? {
            Some(balance) => balance,
            None => {
                let balance =
                    get_balance(account_number, &transaction)?.ok_or(Error::NotFound)?;
                tracing::warn!(
                    "Rejected debit of {amount} from account {account_number} with balance {balance}"
                );

                return Err(Error::InsufficientFunds {
                    balance,
                    requested: amount,
                });
            }
        };
        insert_entry(account_number, TransactionKind::Debit, amount, &transaction)?;

        transaction.commit()?;

        tracing::info!("Debited {amount} from account {account_number}, balance is now {balance}");

        Ok(balance)
    }

    /// The credits and debits of the logged in account, most recent first.
    ///
    /// # Errors
    /// Returns [Error::Store] if the database failed.
    pub fn history(&self, session: &Session) -> Result<Vec<LedgerEntry>, Error> {
        let connection = self.store.acquire()?;

        get_history(session.account_number(), &connection)
    }

    /// Compare the balance of the logged in account with the total of its
    /// ledger.
    ///
    /// Both are read in one transaction so they describe the same moment.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if the account no longer exists, or
    /// [Error::Store] if the database failed.
    pub fn reconcile(&self, session: &Session) -> Result<Reconciliation, Error> {
        let account_number = session.account_number();

        let mut connection = self.store.acquire()?;
        let transaction = connection.transaction()?;

        let balance = get_balance(account_number, &transaction)?.ok_or(Error::NotFound)?;
        let ledger_total = sum_signed_amounts(account_number, &transaction)?;

        transaction.commit()?;

        let reconciliation = Reconciliation {
            balance,
            ledger_total,
        };

        if !reconciliation.is_consistent() {
            tracing::error!(
                "Account {account_number} has balance {balance} but its ledger totals {ledger_total}"
            );
        }

        Ok(reconciliation)
    }
}

/// Convert a decimal amount into money, rejecting amounts that are not positive.
fn parse_amount(amount: Decimal) -> Result<Money, Error> {
    let money = Money::try_from(amount)?;

    if !money.is_positive() {
        return Err(Error::InvalidAmount(amount));
    }

    Ok(money)
}



#[cfg(test)]
mod balance_tests {
    use std::{sync::Barrier, thread};

    use rust_decimal_macros::dec;

    use crate::{
        Error, Money, TransactionKind,
        test_utils::{logged_in, test_service},
    };

    #[test]
    fn new_account_has_zero_balance() {
        let (_dir, service) = test_service();
        let session = logged_in(&service, 1);

        assert_eq!(service.balance(&session), Ok(Money::ZERO));
    }

    #[test]
    fn credit_then_debit_scenario() {
        let (_dir, service) = test_service();
        let session = logged_in(&service, 1);

        assert_eq!(
            service.credit(&session, dec!(500)),
            Ok(Money::from_minor_units(50_000))
        );
        let history = service.history(&session).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Credit);

        assert_eq!(
            service.debit(&session, dec!(200)),
            Ok(Money::from_minor_units(30_000))
        );
        assert_eq!(
            service.balance(&session),
            Ok(Money::from_minor_units(30_000))
        );

        let history = service.history(&session).unwrap();
        let got: Vec<_> = history
            .iter()
            .map(|entry| (entry.kind, entry.amount))
            .collect();
        assert_eq!(
            got,
            vec![
                (TransactionKind::Debit, Money::from_minor_units(20_000)),
                (TransactionKind::Credit, Money::from_minor_units(50_000)),
            ]
        );
        assert!(history[0].timestamp >= history[1].timestamp);
    }

    #[test]
    fn credit_and_debit_accept_cents() {
        let (_dir, service) = test_service();
        let session = logged_in(&service, 1);

        service.credit(&session, dec!(10.25)).unwrap();

        assert_eq!(
            service.debit(&session, dec!(0.75)),
            Ok(Money::from_minor_units(950))
        );
    }

    #[test]
    fn non_positive_amounts_are_rejected_without_change() {
        let (_dir, service) = test_service();
        let session = logged_in(&service, 1);
        service.credit(&session, dec!(100)).unwrap();

        for amount in [dec!(0), dec!(-5), dec!(0.00)] {
            assert_eq!(
                service.credit(&session, amount),
                Err(Error::InvalidAmount(amount))
            );
            assert_eq!(
                service.debit(&session, amount),
                Err(Error::InvalidAmount(amount))
            );
        }

        assert_eq!(
            service.credit(&session, dec!(1.001)),
            Err(Error::InvalidAmount(dec!(1.001)))
        );
        assert_eq!(
            service.balance(&session),
            Ok(Money::from_minor_units(10_000))
        );
        assert_eq!(service.history(&session).unwrap().len(), 1);
    }

    #[test]
    fn credit_past_largest_balance_is_rejected_without_change() {
        let (_dir, service) = test_service();
        let session = logged_in(&service, 1);
        let largest = Money::from_minor_units(i64::MAX);
        service.credit(&session, largest.to_decimal()).unwrap();

        assert_eq!(
            service.credit(&session, dec!(0.01)),
            Err(Error::InvalidAmount(dec!(0.01)))
        );
        assert_eq!(service.balance(&session), Ok(largest));
        assert_eq!(service.history(&session).unwrap().len(), 1);
        assert!(service.reconcile(&session).unwrap().is_consistent());
    }

    #[test]
    fn overdraft_is_rejected_without_change() {
        let (_dir, service) = test_service();
        let session = logged_in(&service, 1);
        service.credit(&session, dec!(100)).unwrap();

        assert_eq!(
            service.debit(&session, dec!(100.01)),
            Err(Error::InsufficientFunds {
                balance: Money::from_minor_units(10_000),
                requested: Money::from_minor_units(10_001),
            })
        );
        assert_eq!(
            service.balance(&session),
            Ok(Money::from_minor_units(10_000))
        );
        assert_eq!(service.history(&session).unwrap().len(), 1);
    }

    #[test]
    fn debit_of_whole_balance_leaves_zero() {
        let (_dir, service) = test_service();
        let session = logged_in(&service, 1);
        service.credit(&session, dec!(42)).unwrap();

        assert_eq!(service.debit(&session, dec!(42)), Ok(Money::ZERO));
    }

    #[test]
    fn accounts_do_not_affect_each_other() {
        let (_dir, service) = test_service();
        let alice = logged_in(&service, 1);
        let bob = logged_in(&service, 2);

        service.credit(&alice, dec!(70)).unwrap();
        service.credit(&bob, dec!(5)).unwrap();
        service.debit(&alice, dec!(20)).unwrap();

        assert_eq!(service.balance(&alice), Ok(Money::from_minor_units(5_000)));
        assert_eq!(service.balance(&bob), Ok(Money::from_minor_units(500)));
        assert_eq!(service.history(&bob).unwrap().len(), 1);
    }

    #[test]
    fn balance_matches_ledger_after_many_operations() {
        let (_dir, service) = test_service();
        let session = logged_in(&service, 1);

        let operations = [
            (true, dec!(100)),
            (false, dec!(30)),
            (false, dec!(80)),
            (true, dec!(12.50)),
            (false, dec!(82.50)),
            (false, dec!(0.01)),
            (true, dec!(0.99)),
        ];

        for (is_credit, amount) in operations {
            let _ = if is_credit {
                service.credit(&session, amount)
            } else {
                service.debit(&session, amount)
            };
        }

        let reconciliation = service.reconcile(&session).unwrap();
        assert!(reconciliation.is_consistent(), "{reconciliation:?}");
        assert_eq!(reconciliation.balance, Money::from_minor_units(99));

        let history_total: i64 = service
            .history(&session)
            .unwrap()
            .iter()
            .map(|entry| entry.signed_amount().as_minor_units())
            .sum();
        assert_eq!(history_total, 99);
    }

    #[test]
    fn concurrent_debits_cannot_overdraw() {
        let (_dir, service) = test_service();
        let session = logged_in(&service, 1);
        service.credit(&session, dec!(100)).unwrap();

        let barrier = &Barrier::new(2);
        let service = &service;
        let session = &session;
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(move || {
                        barrier.wait();
                        service.debit(&session, dec!(60))
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        let successes = results.iter().filter(|result| result.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|result| matches!(result, Err(Error::InsufficientFunds { .. })))
            .count();
        assert_eq!(successes, 1, "{results:?}");
        assert_eq!(insufficient, 1, "{results:?}");

        assert_eq!(
            service.balance(&session),
            Ok(Money::from_minor_units(4_000))
        );
        let debits = service
            .history(&session)
            .unwrap()
            .into_iter()
            .filter(|entry| entry.kind == TransactionKind::Debit)
            .count();
        assert_eq!(debits, 1);
    }
}
