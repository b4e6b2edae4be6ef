//! Format checks for the identity fields of an account.

use std::{fmt::Display, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The identity fields of an account that are format checked and must be
/// unique across all accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// The tax ID (PAN), e.g. "ABCDE1234F".
    TaxId,
    /// The national ID (Aadhaar), twelve digits.
    NationalId,
    /// The email address.
    Email,
    /// The mobile phone number.
    Phone,
}

impl FieldKind {
    /// The column in the `customers` table that stores this field.
    pub fn column(&self) -> &'static str {
        match self {
            FieldKind::TaxId => "tax_id",
            FieldKind::NationalId => "national_id",
            FieldKind::Email => "email",
            FieldKind::Phone => "phone",
        }
    }

    /// Map a qualified column name reported by SQLite, e.g. "customers.email",
    /// back to the field it stores.
    pub(crate) fn from_column(qualified_column: &str) -> Option<Self> {
        let column = qualified_column.strip_prefix("customers.")?;

        [
            FieldKind::TaxId,
            FieldKind::NationalId,
            FieldKind::Email,
            FieldKind::Phone,
        ]
        .into_iter()
        .find(|field| field.column() == column)
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldKind::TaxId => "tax ID",
            FieldKind::NationalId => "national ID",
            FieldKind::Email => "email",
            FieldKind::Phone => "phone number",
        };

        f.write_str(name)
    }
}

/// Reasons why registration input was rejected before reaching the database.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    /// The value is not in the expected format for the field.
    #[error("invalid {0} format")]
    InvalidFormat(FieldKind),

    /// The first or last name was empty.
    #[error("first and last name cannot be empty")]
    EmptyName,

    /// The password was empty.
    #[error("password cannot be empty")]
    EmptyPassword,

    /// The password and its confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,
}

/// Checks whether a value is well formed for an identity field.
///
/// Implement this to apply a different set of format rules, e.g. for another
/// country's identity documents.
pub trait Validator {
    /// Returns `true` if `value` is a well formed value for `kind`.
    fn validate(&self, kind: FieldKind, value: &str) -> bool;
}

/// Format rules for Indian PAN and Aadhaar numbers, email addresses, and
/// Indian mobile numbers.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardValidator;

impl StandardValidator {
    fn pattern(kind: FieldKind) -> &'static Regex {
        static TAX_ID: OnceLock<Regex> = OnceLock::new();
        static NATIONAL_ID: OnceLock<Regex> = OnceLock::new();
        static EMAIL: OnceLock<Regex> = OnceLock::new();
        static PHONE: OnceLock<Regex> = OnceLock::new();

        let (cell, pattern) = match kind {
            FieldKind::TaxId => (&TAX_ID, r"^[A-Z]{5}[0-9]{4}[A-Z]$"),
            FieldKind::NationalId => (&NATIONAL_ID, r"^[0-9]{12}$"),
            FieldKind::Email => (
                &EMAIL,
                r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$",
            ),
            FieldKind::Phone => (&PHONE, r"^(\+91)?[6-9][0-9]{9}$"),
        };

        cell.get_or_init(|| Regex::new(pattern).expect("field patterns are valid regexes"))
    }
}

impl Validator for StandardValidator {
    fn validate(&self, kind: FieldKind, value: &str) -> bool {
        Self::pattern(kind).is_match(value)
    }
}

#[cfg(test)]
mod standard_validator_tests {
    use super::{FieldKind, StandardValidator, Validator};

    #[track_caller]
    fn assert_valid(kind: FieldKind, value: &str) {
        assert!(
            StandardValidator.validate(kind, value),
            "want {value:?} to be a valid {kind}"
        );
    }

    #[track_caller]
    fn assert_invalid(kind: FieldKind, value: &str) {
        assert!(
            !StandardValidator.validate(kind, value),
            "want {value:?} to be an invalid {kind}"
        );
    }

    #[test]
    fn tax_id() {
        assert_valid(FieldKind::TaxId, "ABCDE1234F");
        assert_invalid(FieldKind::TaxId, "abcde1234f");
        assert_invalid(FieldKind::TaxId, "ABCD1234F");
        assert_invalid(FieldKind::TaxId, "ABCDE1234FG");
        assert_invalid(FieldKind::TaxId, "");
    }

    #[test]
    fn national_id() {
        assert_valid(FieldKind::NationalId, "123456789012");
        assert_invalid(FieldKind::NationalId, "12345678901");
        assert_invalid(FieldKind::NationalId, "1234 5678 9012");
        assert_invalid(FieldKind::NationalId, "12345678901a");
    }

    #[test]
    fn email() {
        assert_valid(FieldKind::Email, "jane.doe@example.com");
        assert_valid(FieldKind::Email, "j+bank@mail.example.co.in");
        assert_invalid(FieldKind::Email, "jane.doe@example");
        assert_invalid(FieldKind::Email, "@example.com");
        assert_invalid(FieldKind::Email, "jane doe@example.com");
    }

    #[test]
    fn phone() {
        assert_valid(FieldKind::Phone, "9876543210");
        assert_valid(FieldKind::Phone, "+919876543210");
        assert_invalid(FieldKind::Phone, "1234567890");
        assert_invalid(FieldKind::Phone, "98765");
        assert_invalid(FieldKind::Phone, "98765432101");
    }

    #[test]
    fn from_column_maps_customer_columns_only() {
        assert_eq!(
            FieldKind::from_column("customers.national_id"),
            Some(FieldKind::NationalId)
        );
        assert_eq!(FieldKind::from_column("transactions.email"), None);
        assert_eq!(FieldKind::from_column("customers.first_name"), None);
    }
}
