//! # Device Subcommand

use anyhow::Result;
use clap::{Args, Subcommand};

use eqtrack_core::DeviceId;
use eqtrack_lifecycle::WarrantyFilter;

use crate::{print_json, Session};

/// Arguments for the `eqtrack device` subcommand.
#[derive(Args, Debug)]
pub struct DeviceArgs {
    #[command(subcommand)]
    pub command: DeviceCommand,
}

/// Device subcommands.
#[derive(Subcommand, Debug)]
pub enum DeviceCommand {
    /// Show a device and its open warranty, if any.
    Show {
        #[arg(long)]
        id: DeviceId,
    },
}

/// Execute a device subcommand.
pub async fn run_device(args: &DeviceArgs, session: &Session) -> Result<u8> {
    match &args.command {
        DeviceCommand::Show { id } => {
            let device = session.engine().device(*id).await?;
            let open = session
                .engine()
                .warranties()
                .list(&WarrantyFilter::open_for(*id))
                .await?;
            print_json(&serde_json::json!({
                "device": device,
                "open_warranty": open.first(),
            }))?;
        }
    }
    Ok(0)
}
