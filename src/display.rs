//! Formatting amounts and timestamps for people to read.

use numfmt::{Formatter, Precision};
use time::{OffsetDateTime, UtcOffset, macros::format_description};

use crate::Money;

/// Format `amount` with a currency `symbol`, thousands separators and two
/// decimal places, e.g. "₹1,234.50".
pub fn format_currency(amount: Money, symbol: &str) -> String {
    if amount == Money::ZERO {
        // Zero is hardcoded as "0", so we must specify the formatted string for zero
        return format!("{symbol}0.00");
    }

    let prefix = if amount.as_minor_units() < 0 {
        format!("-{symbol}")
    } else {
        symbol.to_owned()
    };

    let formatter = match Formatter::currency(&prefix) {
        Ok(formatter) => formatter.precision(Precision::Decimals(2)),
        Err(_) => return format!("{symbol}{amount}"),
    };

    let magnitude = amount.as_minor_units().unsigned_abs() as f64 / 100.0;
    let formatted_string = formatter.fmt_string(magnitude);

    pad_decimals(formatted_string)
}

/// numfmt drops trailing zeros, so "12.30" is rendered as "12.3" and "12.00"
/// as "12". Put them back.
fn pad_decimals(formatted_string: String) -> String {
    match formatted_string.rfind('.') {
        Some(position) if formatted_string.len() - position == 2 => {
            format!("{formatted_string}0")
        }
        Some(_) => formatted_string,
        None => format!("{formatted_string}.00"),
    }
}

/// Format `timestamp` as "YYYY-MM-DD HH:MM:SS" in the timezone `offset`.
pub fn format_timestamp(timestamp: OffsetDateTime, offset: UtcOffset) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

    timestamp
        .to_offset(offset)
        .format(format)
        .unwrap_or_else(|_| timestamp.to_string())
}
