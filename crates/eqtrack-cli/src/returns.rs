//! # Return Subcommand
//!
//! Return slips record a batch of returns against one loan slip. Cancelling
//! one reopens the loan lines it resolved.

use anyhow::Result;
use clap::{Args, Subcommand};

use eqtrack_core::{LoanSlipId, ReturnSlipId, Timestamp, UserId};
use eqtrack_lifecycle::{AuditRecorder, OperationContext};

use crate::{print_json, trace_audit, ResolveArgs, Session};

/// Arguments for the `eqtrack return` subcommand.
#[derive(Args, Debug)]
pub struct ReturnArgs {
    #[command(subcommand)]
    pub command: ReturnCommand,
}

/// Return slip subcommands.
#[derive(Subcommand, Debug)]
pub enum ReturnCommand {
    /// Record a return slip against a loan slip.
    Create {
        /// The loan slip being returned against.
        #[arg(long)]
        loan: LoanSlipId,
        /// User handing the devices back.
        #[arg(long)]
        returner: UserId,
        /// RFC 3339 return time. Defaults to now.
        #[arg(long, value_parser = parse_timestamp)]
        date: Option<Timestamp>,
        #[command(flatten)]
        resolve: ResolveArgs,
    },

    /// Cancel a return slip.
    Cancel {
        #[arg(long)]
        id: ReturnSlipId,
    },

    /// Show one return slip.
    Show {
        #[arg(long)]
        id: ReturnSlipId,
    },
}

fn parse_timestamp(raw: &str) -> Result<Timestamp, String> {
    Timestamp::parse(raw).map_err(|e| e.to_string())
}

/// Execute a return subcommand.
pub async fn run_return(args: &ReturnArgs, session: &Session) -> Result<u8> {
    let returns = session.engine().returns();
    match &args.command {
        ReturnCommand::Create {
            loan,
            returner,
            date,
            resolve,
        } => {
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let recorded = returns
                .create(&mut ctx, *loan, *returner, *date, &resolve.items())
                .await?;
            trace_audit(&audit);
            print_json(&recorded)?;
        }
        ReturnCommand::Cancel { id } => {
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let reverted = returns.cancel(&mut ctx, *id).await?;
            trace_audit(&audit);
            print_json(&reverted)?;
        }
        ReturnCommand::Show { id } => print_json(&returns.get(*id).await?)?,
    }
    Ok(0)
}
