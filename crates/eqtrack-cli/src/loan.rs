//! # Loan Subcommand
//!
//! - `create`: lend AVAILABLE devices to a borrower.
//! - `return`: resolve lines directly on the slip, without a return slip.
//! - `cancel`: cancel an untouched slip.
//! - `show`, `list`: read slips.

use anyhow::Result;
use clap::{Args, Subcommand};

use eqtrack_core::{DeviceId, LoanSlipId, UserId};
use eqtrack_lifecycle::{AuditRecorder, LoanSlipFilter, OperationContext};
use eqtrack_state::LoanSlipStatus;

use crate::{print_json, trace_audit, ResolveArgs, Session};

/// Arguments for the `eqtrack loan` subcommand.
#[derive(Args, Debug)]
pub struct LoanArgs {
    #[command(subcommand)]
    pub command: LoanCommand,
}

/// Loan slip subcommands.
#[derive(Subcommand, Debug)]
pub enum LoanCommand {
    /// Lend devices (AVAILABLE → ON_LOAN).
    Create {
        /// Borrowing user.
        #[arg(long)]
        borrower: UserId,
        /// Lending user. Defaults to the actor.
        #[arg(long)]
        loaner: Option<UserId>,
        /// Device to lend. Repeatable.
        #[arg(long = "device", required = true)]
        devices: Vec<DeviceId>,
    },

    /// Record returned or broken devices on the slip itself.
    Return {
        #[arg(long)]
        id: LoanSlipId,
        #[command(flatten)]
        resolve: ResolveArgs,
    },

    /// Cancel a slip with no resolved lines.
    Cancel {
        #[arg(long)]
        id: LoanSlipId,
    },

    /// Show one slip with its lines.
    Show {
        #[arg(long)]
        id: LoanSlipId,
    },

    /// List slips, newest first.
    List {
        /// BORROWING, PARTIAL_RETURNED, CLOSED or CANCELLED.
        #[arg(long)]
        status: Option<LoanSlipStatus>,
        #[arg(long)]
        borrower: Option<UserId>,
    },
}

/// Execute a loan subcommand.
pub async fn run_loan(args: &LoanArgs, session: &Session) -> Result<u8> {
    let loans = session.engine().loans();
    match &args.command {
        LoanCommand::Create {
            borrower,
            loaner,
            devices,
        } => {
            let actor = session.actor()?;
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(actor, &mut audit);
            let slip = loans
                .create(&mut ctx, *borrower, loaner.unwrap_or(actor), devices)
                .await?;
            trace_audit(&audit);
            print_json(&slip)?;
        }
        LoanCommand::Return { id, resolve } => {
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let resolved = loans.return_devices(&mut ctx, *id, &resolve.items()).await?;
            trace_audit(&audit);
            print_json(&resolved)?;
        }
        LoanCommand::Cancel { id } => {
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let slip = loans.cancel(&mut ctx, *id).await?;
            trace_audit(&audit);
            print_json(&slip)?;
        }
        LoanCommand::Show { id } => print_json(&loans.get(*id).await?)?,
        LoanCommand::List { status, borrower } => {
            let filter = LoanSlipFilter {
                status: *status,
                borrower_id: *borrower,
            };
            print_json(&loans.list(&filter).await?)?;
        }
    }
    Ok(0)
}
