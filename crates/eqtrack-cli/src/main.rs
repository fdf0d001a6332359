//! # eqtrack CLI entry point
//!
//! Parses command-line arguments, loads configuration, connects to
//! PostgreSQL and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use eqtrack_cli::config::CliConfig;
use eqtrack_cli::device::{run_device, DeviceArgs};
use eqtrack_cli::loan::{run_loan, LoanArgs};
use eqtrack_cli::maintenance::{run_maintenance, MaintenanceArgs};
use eqtrack_cli::returns::{run_return, ReturnArgs};
use eqtrack_cli::warranty::{run_warranty, WarrantyArgs};
use eqtrack_cli::Session;
use eqtrack_core::UserId;
use eqtrack_db::PgStore;
use eqtrack_lifecycle::Engine;

/// Equipment lifecycle operations: loans, returns, maintenance and
/// warranties.
#[derive(Parser, Debug)]
#[command(name = "eqtrack", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to a YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User performing the operation. Required for mutations.
    #[arg(long, global = true, env = "EQTRACK_ACTOR")]
    actor: Option<UserId>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply the embedded database migrations.
    Migrate,

    /// Loan slips (create, return, cancel, show, list).
    Loan(LoanArgs),

    /// Return slips recorded against loan slips.
    Return(ReturnArgs),

    /// Maintenance dispatch and repair returns.
    Maintenance(MaintenanceArgs),

    /// Warranty requests.
    Warranty(WarrantyArgs),

    /// Device inspection.
    Device(DeviceArgs),
}

fn log_filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let config = CliConfig::load(cli.config.as_deref())?;
    let db = config.database()?;
    let pool = eqtrack_db::init_pool(db)
        .await
        .context("connecting to PostgreSQL")?;

    if let Commands::Migrate = cli.command {
        eqtrack_db::migrate(&pool).await.context("applying migrations")?;
        return Ok(0);
    }

    let engine = Engine::new(PgStore::new(pool), config.engine.clone())?;
    let session = Session::new(engine, cli.actor);
    tracing::debug!(actor = ?cli.actor, "session ready");

    match &cli.command {
        Commands::Migrate => Ok(0),
        Commands::Loan(args) => run_loan(args, &session).await,
        Commands::Return(args) => run_return(args, &session).await,
        Commands::Maintenance(args) => run_maintenance(args, &session).await,
        Commands::Warranty(args) => run_warranty(args, &session).await,
        Commands::Device(args) => run_device(args, &session).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use eqtrack_cli::loan::LoanCommand;
    use eqtrack_cli::maintenance::MaintenanceCommand;
    use eqtrack_cli::warranty::WarrantyCommand;
    use eqtrack_core::DeviceId;

    #[test]
    fn test_parse_migrate() {
        let cli = Cli::try_parse_from(["eqtrack", "migrate"]).unwrap();
        assert!(matches!(cli.command, Commands::Migrate));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_loan_create_with_devices() {
        let actor = UserId::new();
        let borrower = UserId::new();
        let (a, b) = (DeviceId::new(), DeviceId::new());
        let cli = Cli::try_parse_from([
            "eqtrack".to_string(),
            "-vv".to_string(),
            "--actor".to_string(),
            actor.to_string(),
            "loan".to_string(),
            "create".to_string(),
            "--borrower".to_string(),
            borrower.0.to_string(),
            "--device".to_string(),
            a.to_string(),
            "--device".to_string(),
            b.to_string(),
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.actor, Some(actor));
        let Commands::Loan(args) = cli.command else {
            panic!("expected loan command");
        };
        let LoanCommand::Create {
            borrower: parsed,
            loaner,
            devices,
        } = args.command
        else {
            panic!("expected loan create");
        };
        assert_eq!(parsed, borrower);
        assert!(loaner.is_none());
        assert_eq!(devices, vec![a, b]);
    }

    #[test]
    fn test_parse_loan_create_requires_device() {
        let borrower = UserId::new();
        let err = Cli::try_parse_from([
            "eqtrack".to_string(),
            "loan".to_string(),
            "create".to_string(),
            "--borrower".to_string(),
            borrower.to_string(),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_parse_maintenance_return_items() {
        let slip = eqtrack_core::MaintenanceSlipId::new();
        let (a, b) = (DeviceId::new(), DeviceId::new());
        let cli = Cli::try_parse_from([
            "eqtrack".to_string(),
            "maintenance".to_string(),
            "return".to_string(),
            "--id".to_string(),
            slip.to_string(),
            "--returned".to_string(),
            a.to_string(),
            "--broken".to_string(),
            format!("{b}=board fried"),
        ])
        .unwrap();
        let Commands::Maintenance(args) = cli.command else {
            panic!("expected maintenance command");
        };
        let MaintenanceCommand::Return { id, resolve } = args.command else {
            panic!("expected maintenance return");
        };
        assert_eq!(id, slip);
        let items = resolve.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].note.as_deref(), Some("board fried"));
    }

    #[test]
    fn test_parse_maintenance_cancel_return_kebab_case() {
        let id = eqtrack_core::MaintenanceReturnSlipId::new();
        let cli = Cli::try_parse_from([
            "eqtrack".to_string(),
            "maintenance".to_string(),
            "cancel-return".to_string(),
            "--id".to_string(),
            id.to_string(),
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Maintenance(MaintenanceArgs {
                command: MaintenanceCommand::CancelReturn { .. }
            })
        ));
    }

    #[test]
    fn test_parse_warranty_list_open() {
        let cli = Cli::try_parse_from(["eqtrack", "warranty", "list", "--open"]).unwrap();
        let Commands::Warranty(args) = cli.command else {
            panic!("expected warranty command");
        };
        assert!(matches!(
            args.command,
            WarrantyCommand::List {
                device: None,
                open: true
            }
        ));
    }

    #[test]
    fn test_parse_loan_list_status() {
        let cli =
            Cli::try_parse_from(["eqtrack", "loan", "list", "--status", "PARTIAL_RETURNED"]).unwrap();
        let Commands::Loan(args) = cli.command else {
            panic!("expected loan command");
        };
        assert!(matches!(
            args.command,
            LoanCommand::List {
                status: Some(eqtrack_state::LoanSlipStatus::PartialReturned),
                borrower: None
            }
        ));
    }

    #[test]
    fn test_parse_rejects_bad_status() {
        assert!(Cli::try_parse_from(["eqtrack", "loan", "list", "--status", "OPEN"]).is_err());
    }
}
