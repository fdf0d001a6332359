//! # Maintenance Subcommand

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Subcommand};

use eqtrack_core::{DeviceId, MaintenanceReturnSlipId, MaintenanceSlipId, PartnerId, Timestamp};
use eqtrack_lifecycle::{AuditRecorder, MaintenanceSlipFilter, OperationContext};
use eqtrack_state::MaintenanceSlipStatus;

use crate::{print_json, trace_audit, ResolveArgs, Session};

/// Arguments for the `eqtrack maintenance` subcommand.
#[derive(Args, Debug)]
pub struct MaintenanceArgs {
    #[command(subcommand)]
    pub command: MaintenanceCommand,
}

/// Maintenance subcommands.
#[derive(Subcommand, Debug)]
pub enum MaintenanceCommand {
    /// Send an AVAILABLE device out for repair.
    Create {
        #[arg(long)]
        device: DeviceId,
        /// Repair partner, if external.
        #[arg(long)]
        partner: Option<PartnerId>,
        #[arg(long)]
        reason: String,
        /// Request date (YYYY-MM-DD). Defaults to today in the code offset.
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Cancel a slip whose device has not come back.
    Cancel {
        #[arg(long)]
        id: MaintenanceSlipId,
    },

    /// Record devices coming back from repair.
    Return {
        #[arg(long)]
        id: MaintenanceSlipId,
        #[command(flatten)]
        resolve: ResolveArgs,
    },

    /// Cancel a maintenance-return slip.
    CancelReturn {
        #[arg(long)]
        id: MaintenanceReturnSlipId,
    },

    /// Show one maintenance slip.
    Show {
        #[arg(long)]
        id: MaintenanceSlipId,
    },

    /// Show one maintenance-return slip.
    ShowReturn {
        #[arg(long)]
        id: MaintenanceReturnSlipId,
    },

    /// List maintenance slips, newest first.
    List {
        /// SENDING, PARTIAL_RETURNED, CLOSED or CANCELLED.
        #[arg(long)]
        status: Option<MaintenanceSlipStatus>,
        #[arg(long)]
        partner: Option<PartnerId>,
    },
}

/// Execute a maintenance subcommand.
pub async fn run_maintenance(args: &MaintenanceArgs, session: &Session) -> Result<u8> {
    let maintenance = session.engine().maintenance();
    match &args.command {
        MaintenanceCommand::Create {
            device,
            partner,
            reason,
            date,
        } => {
            let request_date = match date {
                Some(date) => *date,
                None => Timestamp::now().date_in(session.engine().config().code_offset()?),
            };
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let slip = maintenance
                .create(&mut ctx, *device, *partner, reason, request_date)
                .await?;
            trace_audit(&audit);
            print_json(&slip)?;
        }
        MaintenanceCommand::Cancel { id } => {
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let slip = maintenance.cancel(&mut ctx, *id).await?;
            trace_audit(&audit);
            print_json(&slip)?;
        }
        MaintenanceCommand::Return { id, resolve } => {
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let recorded = maintenance
                .create_return(&mut ctx, *id, &resolve.items())
                .await?;
            trace_audit(&audit);
            print_json(&recorded)?;
        }
        MaintenanceCommand::CancelReturn { id } => {
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let reverted = maintenance.cancel_return(&mut ctx, *id).await?;
            trace_audit(&audit);
            print_json(&reverted)?;
        }
        MaintenanceCommand::Show { id } => print_json(&maintenance.get(*id).await?)?,
        MaintenanceCommand::ShowReturn { id } => print_json(&maintenance.get_return(*id).await?)?,
        MaintenanceCommand::List { status, partner } => {
            let filter = MaintenanceSlipFilter {
                status: *status,
                partner_id: *partner,
            };
            print_json(&maintenance.list(&filter).await?)?;
        }
    }
    Ok(0)
}
