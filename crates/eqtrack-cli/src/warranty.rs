//! # Warranty Subcommand
//!
//! PENDING → PROCESSING → COMPLETED, or REJECTED from either open state.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Subcommand};

use eqtrack_core::{DeviceId, Timestamp, WarrantyId};
use eqtrack_lifecycle::{AuditRecorder, OperationContext, WarrantyFilter};

use crate::{print_json, trace_audit, Session};

/// Arguments for the `eqtrack warranty` subcommand.
#[derive(Args, Debug)]
pub struct WarrantyArgs {
    #[command(subcommand)]
    pub command: WarrantyCommand,
}

/// Warranty subcommands.
#[derive(Subcommand, Debug)]
pub enum WarrantyCommand {
    /// Open a warranty request for an AVAILABLE or BROKEN device.
    Request {
        #[arg(long)]
        device: DeviceId,
        #[arg(long)]
        reason: String,
        /// Request date (YYYY-MM-DD). Defaults to today in the code offset.
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Hand the device to the manufacturer (device → UNDER_WARRANTY).
    Assign {
        #[arg(long)]
        id: WarrantyId,
    },

    /// Close a PROCESSING warranty (device → AVAILABLE).
    Complete {
        #[arg(long)]
        id: WarrantyId,
    },

    /// Reject an open warranty; the device gets its prior status back.
    Reject {
        #[arg(long)]
        id: WarrantyId,
    },

    /// Show one warranty.
    Show {
        #[arg(long)]
        id: WarrantyId,
    },

    /// List warranties, newest first.
    List {
        #[arg(long)]
        device: Option<DeviceId>,
        /// Only PENDING and PROCESSING.
        #[arg(long)]
        open: bool,
    },
}

/// Execute a warranty subcommand.
pub async fn run_warranty(args: &WarrantyArgs, session: &Session) -> Result<u8> {
    let warranties = session.engine().warranties();
    match &args.command {
        WarrantyCommand::Request {
            device,
            reason,
            date,
        } => {
            let request_date = match date {
                Some(date) => *date,
                None => Timestamp::now().date_in(session.engine().config().code_offset()?),
            };
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let warranty = warranties
                .create_request(&mut ctx, *device, reason, request_date)
                .await?;
            trace_audit(&audit);
            print_json(&warranty)?;
        }
        WarrantyCommand::Assign { id } => {
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let warranty = warranties.assign(&mut ctx, *id).await?;
            trace_audit(&audit);
            print_json(&warranty)?;
        }
        WarrantyCommand::Complete { id } => {
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let warranty = warranties.complete(&mut ctx, *id).await?;
            trace_audit(&audit);
            print_json(&warranty)?;
        }
        WarrantyCommand::Reject { id } => {
            let mut audit = AuditRecorder::new();
            let mut ctx = OperationContext::new(session.actor()?, &mut audit);
            let warranty = warranties.reject(&mut ctx, *id).await?;
            trace_audit(&audit);
            print_json(&warranty)?;
        }
        WarrantyCommand::Show { id } => print_json(&warranties.get(*id).await?)?,
        WarrantyCommand::List { device, open } => {
            let filter = WarrantyFilter {
                device_id: *device,
                open_only: *open,
            };
            print_json(&warranties.list(&filter).await?)?;
        }
    }
    Ok(0)
}
