use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use hauskasse::log::init_logging;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::str::FromStr;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Convert an amount between currencies
    Convert {
        /// Amount in major units, e.g. 1000.00
        amount: String,
        from: String,
        to: String,
        /// Conversion date (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// List stored exchange rates for a currency pair
    Rates {
        base: String,
        target: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    /// Display net worth across configured accounts
    Networth {
        /// Valuation date (defaults to today)
        #[arg(short, long)]
        as_of: Option<NaiveDate>,
    },
    /// Display monthly cashflow and spending by category
    Cashflow,
}

/// Parses a major-unit decimal into minor units, rejecting sub-minor
/// precision instead of rounding it away.
fn parse_amount_minor(amount: &str) -> Result<i64> {
    let amount =
        Decimal::from_str(amount).with_context(|| format!("Invalid amount: {amount}"))?;
    let scaled = amount * Decimal::from(100);
    if !scaled.is_integer() {
        bail!("Amount {amount} has sub-minor-unit precision");
    }
    scaled
        .to_i64()
        .with_context(|| format!("Amount {amount} out of range"))
}

fn to_app_command(cmd: Commands) -> Result<hauskasse::AppCommand> {
    Ok(match cmd {
        Commands::Convert {
            amount,
            from,
            to,
            date,
        } => hauskasse::AppCommand::Convert {
            amount_minor: parse_amount_minor(&amount)?,
            from,
            to,
            date,
        },
        Commands::Rates {
            base,
            target,
            start,
            end,
        } => hauskasse::AppCommand::Rates {
            base,
            target,
            start,
            end,
        },
        Commands::Networth { as_of } => hauskasse::AppCommand::NetWorth { as_of },
        Commands::Cashflow => hauskasse::AppCommand::Cashflow,
        Commands::Setup => unreachable!("Setup command should be handled separately"),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => hauskasse::run_command(to_app_command(cmd)?, cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> Result<()> {
    let path = hauskasse::config::AppConfig::default_config_path()?;

    if path.exists() {
        bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
currency: "EUR"

accounts:
  - name: "Checking"
    kind: asset
    balance_minor: 0

transactions: []

providers:
  frankfurter:
    base_url: "https://api.frankfurter.dev/v1"
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
