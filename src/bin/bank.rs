use std::{
    error::Error,
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use time::UtcOffset;
use tracing_subscriber::{EnvFilter, Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use bank_rs::{
    AccountNumber, AccountService, Registration, Session, SqliteStore,
    display::{format_currency, format_timestamp},
    get_local_offset,
};

/// Open an account, check its balance, and move money in and out of it.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "BANK_DB_PATH")]
    db_path: PathBuf,

    /// The canonical timezone to show timestamps in, e.g. "Asia/Kolkata".
    #[arg(long, env = "BANK_TIMEZONE", default_value = "Etc/UTC")]
    timezone: String,

    /// The symbol to print in front of amounts.
    #[arg(long, default_value = "₹")]
    currency: String,

    /// File path to append debug logs to.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a new account. The password is asked for interactively.
    Register {
        /// Tax ID (PAN), e.g. ABCDE1234F.
        #[arg(long)]
        tax_id: String,
        /// National ID (Aadhaar), 12 digits.
        #[arg(long)]
        national_id: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        /// Mobile number, 10 digits.
        #[arg(long)]
        phone: String,
    },
    /// Show the current balance.
    Balance {
        #[arg(long, short)]
        account: i64,
    },
    /// Pay money into the account.
    Credit {
        #[arg(long, short)]
        account: i64,
        amount: Decimal,
    },
    /// Take money out of the account.
    Debit {
        #[arg(long, short)]
        account: i64,
        amount: Decimal,
    },
    /// List credits and debits, most recent first.
    History {
        #[arg(long, short)]
        account: i64,
        /// Print the history as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check that the balance matches the transaction history.
    Reconcile {
        #[arg(long, short)]
        account: i64,
    },
}

/// Log level for stderr when `RUST_LOG` is not set. Command output goes to
/// stdout, so it stays clean for `history --json`.
const DEFAULT_LOG_FILTER: &str = "warn";

/// Settings shared by every command, resolved from the arguments.
struct Config {
    currency: String,
    local_offset: UtcOffset,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = setup_logging(args.log_file.as_deref()) {
        print_error(format!("Could not open log file: {error}"));
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            print_error(error);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let local_offset = get_local_offset(&args.timezone)
        .ok_or_else(|| format!("invalid timezone {:?}", args.timezone))?;
    let config = Config {
        currency: args.currency,
        local_offset,
    };

    let store = SqliteStore::open(&args.db_path)?;
    let service = AccountService::new(store);

    match args.command {
        Command::Register {
            tax_id,
            national_id,
            first_name,
            last_name,
            email,
            phone,
        } => {
            let Some((password, confirm_password)) = prompt_new_password()? else {
                return Ok(());
            };

            let account = service.register(Registration {
                tax_id,
                national_id,
                first_name,
                last_name,
                email,
                phone,
                password,
                confirm_password,
            })?;

            println!(
                "Account created successfully! Your account number is: {}",
                account.account_number
            );
        }
        Command::Balance { account } => {
            let session = log_in(&service, account)?;
            let balance = service.balance(&session)?;

            println!(
                "Your current balance is: {}",
                format_currency(balance, &config.currency)
            );
        }
        Command::Credit { account, amount } => {
            let session = log_in(&service, account)?;
            let balance = service.credit(&session, amount)?;

            println!("{amount} credited successfully!");
            println!(
                "Updated balance: {}",
                format_currency(balance, &config.currency)
            );
        }
        Command::Debit { account, amount } => {
            let session = log_in(&service, account)?;
            let balance = service.debit(&session, amount)?;

            println!("{amount} debited successfully!");
            println!(
                "Updated balance: {}",
                format_currency(balance, &config.currency)
            );
        }
        Command::History { account, json } => {
            let session = log_in(&service, account)?;
            let history = service.history(&session)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else if history.is_empty() {
                println!("No transactions found!");
            } else {
                println!("{:<20}  {:<6}  {:>16}", "Timestamp", "Type", "Amount");

                for entry in history {
                    println!(
                        "{:<20}  {:<6}  {:>16}",
                        format_timestamp(entry.timestamp, config.local_offset),
                        entry.kind,
                        format_currency(entry.amount, &config.currency)
                    );
                }
            }
        }
        Command::Reconcile { account } => {
            let session = log_in(&service, account)?;
            let reconciliation = service.reconcile(&session)?;

            println!(
                "Balance: {}\nLedger total: {}",
                format_currency(reconciliation.balance, &config.currency),
                format_currency(reconciliation.ledger_total, &config.currency)
            );

            if !reconciliation.is_consistent() {
                return Err("the balance does not match the transaction history".into());
            }

            println!("The balance matches the transaction history.");
        }
    }

    Ok(())
}

fn log_in(service: &AccountService, account: i64) -> Result<Session, Box<dyn Error>> {
    let password = rpassword::prompt_password("Enter password: ")?;
    let session = service.authenticate(AccountNumber::new(account), &password)?;

    println!("Welcome, {}!", session.display_name());

    Ok(session)
}

/// Ask for a password twice. Returns `None` if stdin is closed.
fn prompt_new_password() -> Result<Option<(String, String)>, io::Error> {
    let password = match rpassword::prompt_password("Enter password: ") {
        Ok(string) => string,
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(error),
    };

    let confirm_password = match rpassword::prompt_password("Confirm password: ") {
        Ok(string) => string,
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(error),
    };

    Ok(Some((password, confirm_password)))
}

fn setup_logging(log_file: Option<&Path>) -> io::Result<()> {
    let stderr_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        );

    let debug_log = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;

            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(filter::LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_log)
        .with(debug_log)
        .init();

    Ok(())
}

fn print_error(error: impl ToString) {
    eprintln!(
        "\x1b[31;1m{}\x1b[0m",
        capitalise_first_char(&error.to_string())
    )
}

/// From https://crates.io/crates/capitalize
fn capitalise_first_char(string: &str) -> String {
    let mut chars = string.chars();
    let Some(first) = chars.next() else {
        return String::with_capacity(0);
    };
    first.to_uppercase().chain(chars).collect()
}

#[cfg(test)]
mod logging_tests {
    use tracing_subscriber::{EnvFilter, filter::LevelFilter};

    use super::DEFAULT_LOG_FILTER;

    #[test]
    fn default_filter_shows_warnings_only() {
        let filter = EnvFilter::new(DEFAULT_LOG_FILTER);

        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }
}
