//! Shared fixtures for the unit tests.

use tempfile::TempDir;

use crate::{
    AccountService, Registration, Session, Sha256Hasher, SqliteStore, StandardValidator,
};

pub(crate) type TestService = AccountService<StandardValidator, Sha256Hasher>;

/// A store backed by a database file in a fresh temporary directory.
///
/// Keep the returned [TempDir] alive for as long as the store is used, the
/// directory is deleted when it is dropped.
pub(crate) fn temp_store() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("Could not create temporary directory");
    let store =
        SqliteStore::open(dir.path().join("bank.db")).expect("Could not open test database");

    (dir, store)
}

/// An account service over a temporary database that uses the deterministic
/// SHA-256 hasher so tests do not pay for bcrypt.
pub(crate) fn test_service() -> (TempDir, TestService) {
    let (dir, store) = temp_store();

    (
        dir,
        AccountService::with_capabilities(store, StandardValidator, Sha256Hasher),
    )
}

/// A valid registration whose identity fields are derived from `n`, so
/// registrations with different `n` do not collide.
pub(crate) fn registration(n: u8) -> Registration {
    Registration {
        tax_id: format!("ABCDE{:04}F", n),
        national_id: format!("{:012}", n),
        first_name: "Jane".to_owned(),
        last_name: "Doe".to_owned(),
        email: format!("jane{n}@example.com"),
        phone: format!("98765432{:02}", n),
        password: "correcthorsebatterystaple".to_owned(),
        confirm_password: "correcthorsebatterystaple".to_owned(),
    }
}

/// Register account `n` and log in to it.
pub(crate) fn logged_in(service: &TestService, n: u8) -> Session {
    let account = service
        .register(registration(n))
        .expect("Could not register test account");

    service
        .authenticate(account.account_number, "correcthorsebatterystaple")
        .expect("Could not log in to test account")
}
