//! # Line Resolution and Compensation
//!
//! One resolve operation serves every path that closes document lines:
//! direct loan returns, return slips, and maintenance-return slips. One
//! revert operation serves every cancellation of those resolutions.
//!
//! ## Resolve
//!
//! 1. Items must be non-empty, distinct, and name open lines.
//! 2. Every device must still be held by the document (ON_LOAN or
//!    MAINTENANCE).
//! 3. Per item: line → RETURNED | BROKEN, device → AVAILABLE | BROKEN. A
//!    BROKEN device without an open warranty gets a PENDING one, sourced to
//!    the resolving document.
//! 4. The header status is recomputed.
//!
//! Steps 1 and 2 finish before the first write.
//!
//! ## Revert
//!
//! Each device must still be where the resolution left it (AVAILABLE for
//! RETURNED, BROKEN for BROKEN). A PENDING warranty opened by the same
//! document is rejected; a PROCESSING one blocks the cancellation.

use eqtrack_core::{DeviceId, DocumentKind, Timestamp};
use eqtrack_state::{
    DeviceStatus, LineResolution, LoanSlip, MaintenanceSlip, ResolveItem, StateError, Warranty,
    WarrantySource, WarrantyStatus,
};

use crate::context::OperationContext;
use crate::device::DeviceStateStore;
use crate::error::CycleError;
use crate::ports::{Transaction, WarrantyFilter};
use crate::sequencer::CodeSequencer;

/// A document whose lines hold devices until resolved.
pub(crate) trait LineDocument {
    /// Device status while a line is open.
    const HELD: DeviceStatus;

    fn ensure_open_lines(&self, devices: &[DeviceId]) -> Result<(), StateError>;

    fn resolve_line(
        &mut self,
        device: DeviceId,
        resolution: LineResolution,
        note: Option<String>,
        at: Timestamp,
    ) -> Result<(), StateError>;

    fn reopen_line(&mut self, device: DeviceId, expected: LineResolution)
        -> Result<(), StateError>;

    fn refresh(&mut self, at: Timestamp) -> Result<(), StateError>;
}

impl LineDocument for LoanSlip {
    const HELD: DeviceStatus = DeviceStatus::OnLoan;

    fn ensure_open_lines(&self, devices: &[DeviceId]) -> Result<(), StateError> {
        LoanSlip::ensure_open_lines(self, devices)
    }

    fn resolve_line(
        &mut self,
        device: DeviceId,
        resolution: LineResolution,
        note: Option<String>,
        at: Timestamp,
    ) -> Result<(), StateError> {
        LoanSlip::resolve_line(self, device, resolution, note, at)
    }

    fn reopen_line(
        &mut self,
        device: DeviceId,
        expected: LineResolution,
    ) -> Result<(), StateError> {
        LoanSlip::reopen_line(self, device, expected)
    }

    fn refresh(&mut self, at: Timestamp) -> Result<(), StateError> {
        self.refresh_status(at).map(|_| ())
    }
}

impl LineDocument for MaintenanceSlip {
    const HELD: DeviceStatus = DeviceStatus::Maintenance;

    fn ensure_open_lines(&self, devices: &[DeviceId]) -> Result<(), StateError> {
        MaintenanceSlip::ensure_open_lines(self, devices)
    }

    fn resolve_line(
        &mut self,
        device: DeviceId,
        resolution: LineResolution,
        note: Option<String>,
        at: Timestamp,
    ) -> Result<(), StateError> {
        MaintenanceSlip::resolve_line(self, device, resolution, note, at)
    }

    fn reopen_line(
        &mut self,
        device: DeviceId,
        expected: LineResolution,
    ) -> Result<(), StateError> {
        MaintenanceSlip::reopen_line(self, device, expected)
    }

    fn refresh(&mut self, at: Timestamp) -> Result<(), StateError> {
        self.refresh_status(at).map(|_| ())
    }
}

fn device_status_for(resolution: LineResolution) -> DeviceStatus {
    match resolution {
        LineResolution::Returned => DeviceStatus::Available,
        LineResolution::Broken => DeviceStatus::Broken,
    }
}

/// Resolve `items` on `doc`. Returns the warranties opened on the way.
///
/// `resolved_at` is when the devices came back: it stamps each resolved
/// line and dates any warranty opened here. The caller persists `doc`
/// afterwards.
pub(crate) async fn resolve_lines<T, D>(
    tx: &mut T,
    sequencer: &CodeSequencer,
    ctx: &OperationContext<'_>,
    doc: &mut D,
    items: &[ResolveItem],
    source: WarrantySource,
    resolved_at: Timestamp,
) -> Result<Vec<Warranty>, CycleError>
where
    T: Transaction,
    D: LineDocument,
{
    let devices: Vec<DeviceId> = items.iter().map(|i| i.device_id).collect();
    doc.ensure_open_lines(&devices)?;

    let mut needs_warranty = Vec::with_capacity(items.len());
    for item in items {
        let device = DeviceStateStore::new(&mut *tx).load(item.device_id).await?;
        if device.status != D::HELD {
            return Err(CycleError::PreconditionFailed(format!(
                "{} is {}, expected {}",
                device.id,
                device.status,
                D::HELD
            )));
        }
        let needs = match item.resolution {
            LineResolution::Broken => tx
                .find_warranties(&WarrantyFilter::open_for(item.device_id))
                .await?
                .is_empty(),
            LineResolution::Returned => false,
        };
        needs_warranty.push(needs);
    }

    let mut warranties = Vec::new();
    for (item, needs) in items.iter().zip(needs_warranty) {
        doc.resolve_line(item.device_id, item.resolution, item.note.clone(), resolved_at)?;
        DeviceStateStore::new(&mut *tx)
            .transition(
                item.device_id,
                Some(D::HELD),
                device_status_for(item.resolution),
                ctx.now,
            )
            .await?;
        if needs {
            let code = sequencer.next(&mut *tx, DocumentKind::Warranty, ctx.now).await?;
            let reason = item
                .note
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "reported broken on return".to_string());
            let warranty = Warranty::request(
                code,
                item.device_id,
                reason,
                sequencer.business_date(resolved_at),
                DeviceStatus::Broken,
                source,
                ctx.actor,
                ctx.now,
            );
            tx.insert_warranty(&warranty).await?;
            tracing::info!(
                warranty = %warranty.code,
                device = %item.device_id,
                "warranty opened for broken device"
            );
            warranties.push(warranty);
        }
    }

    doc.refresh(ctx.now)?;
    Ok(warranties)
}

/// Undo the resolutions recorded in `items` on `doc`. Returns the
/// warranties rejected on the way.
///
/// The caller persists `doc` afterwards.
pub(crate) async fn revert_lines<T, D>(
    tx: &mut T,
    ctx: &OperationContext<'_>,
    doc: &mut D,
    items: &[ResolveItem],
    source: WarrantySource,
) -> Result<Vec<Warranty>, CycleError>
where
    T: Transaction,
    D: LineDocument,
{
    let mut to_reject = Vec::new();
    for item in items {
        let device = DeviceStateStore::new(&mut *tx).load(item.device_id).await?;
        let expected = device_status_for(item.resolution);
        if device.status != expected {
            return Err(CycleError::Conflict(format!(
                "{} moved on to {} since it was resolved as {}",
                device.id, device.status, item.resolution
            )));
        }
        if item.resolution == LineResolution::Broken {
            let opened_here = tx
                .find_warranties(&WarrantyFilter::open_for(item.device_id))
                .await?
                .into_iter()
                .filter(|w| w.source == source);
            for warranty in opened_here {
                if warranty.status == WarrantyStatus::Processing {
                    return Err(CycleError::Conflict(format!(
                        "warranty {} for {} is already PROCESSING",
                        warranty.code, item.device_id
                    )));
                }
                to_reject.push(warranty);
            }
        }
    }

    for item in items {
        doc.reopen_line(item.device_id, item.resolution)?;
        DeviceStateStore::new(&mut *tx)
            .transition(
                item.device_id,
                Some(device_status_for(item.resolution)),
                D::HELD,
                ctx.now,
            )
            .await?;
    }

    for warranty in &mut to_reject {
        warranty.reject(ctx.now)?;
        tx.update_warranty(warranty).await?;
        tracing::info!(warranty = %warranty.code, "warranty rejected by compensation");
    }

    doc.refresh(ctx.now)?;
    Ok(to_reject)
}
