//! # eqtrack-cli: Operator CLI
//!
//! Provides the `eqtrack` command-line interface over the lifecycle engine
//! backed by PostgreSQL.
//!
//! ## Subcommands
//!
//! - `eqtrack migrate`: apply the embedded schema migrations.
//! - `eqtrack loan`: create, return against, cancel, show and list loan slips.
//! - `eqtrack return`: record and cancel return slips.
//! - `eqtrack maintenance`: dispatch, cancel, and record repair returns.
//! - `eqtrack warranty`: request, assign, complete, reject and list warranties.
//! - `eqtrack device`: show a device.
//!
//! Every command prints its result as pretty JSON on stdout.
//!
//! ```bash
//! eqtrack --actor $CLERK loan create --borrower $USER --device $LAPTOP
//! eqtrack --actor $CLERK loan return --id $SLIP --returned $LAPTOP
//! eqtrack --actor $CLERK return create --loan $SLIP --returner $USER --broken "$LAPTOP=cracked screen"
//! ```

pub mod config;
pub mod device;
pub mod loan;
pub mod maintenance;
pub mod returns;
pub mod warranty;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use eqtrack_core::{DeviceId, UserId};
use eqtrack_db::PgStore;
use eqtrack_lifecycle::{AuditRecorder, Engine};
use eqtrack_state::ResolveItem;

/// An engine plus the acting user of this invocation.
pub struct Session {
    engine: Engine<PgStore>,
    actor: Option<UserId>,
}

impl Session {
    pub fn new(engine: Engine<PgStore>, actor: Option<UserId>) -> Self {
        Self { engine, actor }
    }

    pub fn engine(&self) -> &Engine<PgStore> {
        &self.engine
    }

    /// The `--actor` user. Required by every mutating command.
    pub fn actor(&self) -> Result<UserId> {
        self.actor.context("--actor is required for this command")
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("rendering output")?;
    println!("{rendered}");
    Ok(())
}

/// Emit the audit snapshots of one operation at debug level.
pub fn trace_audit(audit: &AuditRecorder) {
    if let (Some(before), Some(after)) = (audit.before.last(), audit.after.last()) {
        tracing::debug!(%before, %after, "audit snapshot");
    }
}

/// Per-device outcomes of a return, shared by every resolving command.
#[derive(Args, Debug, Clone, Default)]
pub struct ResolveArgs {
    /// Device returned in working order. Repeatable.
    #[arg(long = "returned", value_name = "DEVICE")]
    pub returned: Vec<DeviceId>,

    /// Device returned broken, as `DEVICE=NOTE`. Repeatable.
    #[arg(long = "broken", value_name = "DEVICE=NOTE", value_parser = parse_broken)]
    pub broken: Vec<ResolveItem>,
}

impl ResolveArgs {
    /// Returned devices first, then broken ones, each in argument order.
    pub fn items(&self) -> Vec<ResolveItem> {
        self.returned
            .iter()
            .map(|d| ResolveItem::returned(*d))
            .chain(self.broken.iter().cloned())
            .collect()
    }
}

/// Parse `DEVICE=NOTE` (or a bare `DEVICE`) into a BROKEN item.
pub fn parse_broken(raw: &str) -> Result<ResolveItem, String> {
    let (device, note) = match raw.split_once('=') {
        Some((device, note)) => (device, Some(note.trim())),
        None => (raw, None),
    };
    let device: DeviceId = device.trim().parse().map_err(|e| format!("{e}"))?;
    Ok(match note.filter(|n| !n.is_empty()) {
        Some(note) => ResolveItem::broken(device, note),
        None => ResolveItem {
            device_id: device,
            resolution: eqtrack_state::LineResolution::Broken,
            note: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use eqtrack_state::LineResolution;

    #[test]
    fn test_parse_broken_with_note() {
        let id = DeviceId::new();
        let item = parse_broken(&format!("{}=fan rattles", id.0)).unwrap();
        assert_eq!(item.device_id, id);
        assert_eq!(item.resolution, LineResolution::Broken);
        assert_eq!(item.note.as_deref(), Some("fan rattles"));
    }

    #[test]
    fn test_parse_broken_accepts_prefixed_id_without_note() {
        let id = DeviceId::new();
        let item = parse_broken(&id.to_string()).unwrap();
        assert_eq!(item.device_id, id);
        assert!(item.note.is_none());
    }

    #[test]
    fn test_parse_broken_rejects_garbage() {
        assert!(parse_broken("not-a-device=note").is_err());
    }

    #[test]
    fn test_resolve_args_order() {
        let (a, b) = (DeviceId::new(), DeviceId::new());
        let args = ResolveArgs {
            returned: vec![a],
            broken: vec![ResolveItem::broken(b, "dead")],
        };
        let items = args.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], ResolveItem::returned(a));
        assert_eq!(items[1].device_id, b);
    }
}
