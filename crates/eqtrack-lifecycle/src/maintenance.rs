//! # Maintenance Cycle
//!
//! Dispatching a device for repair, recording its return, and cancelling
//! either step.

use chrono::NaiveDate;

use eqtrack_core::{DeviceId, DocumentKind, MaintenanceReturnSlipId, MaintenanceSlipId, PartnerId};
use eqtrack_state::{
    DeviceStatus, MaintenanceReturnSlip, MaintenanceSlip, ResolveItem, WarrantySource,
};

use crate::audit::snapshot;
use crate::cache::CacheTag;
use crate::context::OperationContext;
use crate::device::DeviceStateStore;
use crate::engine::Engine;
use crate::error::CycleError;
use crate::outcome::{Recorded, Reverted};
use crate::ports::{MaintenanceSlipFilter, Store, Transaction};
use crate::resolve::{resolve_lines, revert_lines};

const TAGS: &[CacheTag] = &[CacheTag::Maintenance, CacheTag::Devices];
const RESOLVE_TAGS: &[CacheTag] = &[CacheTag::Maintenance, CacheTag::Devices, CacheTag::Warranty];

/// Maintenance operations.
pub struct MaintenanceCycle<'e, S: Store> {
    engine: &'e Engine<S>,
}

impl<'e, S: Store> MaintenanceCycle<'e, S> {
    pub(crate) fn new(engine: &'e Engine<S>) -> Self {
        Self { engine }
    }

    /// Send an AVAILABLE device for repair.
    pub async fn create(
        &self,
        ctx: &mut OperationContext<'_>,
        device_id: DeviceId,
        partner_id: Option<PartnerId>,
        reason: &str,
        request_date: NaiveDate,
    ) -> Result<MaintenanceSlip, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self
            .create_in(&mut tx, ctx, device_id, partner_id, reason, request_date)
            .await;
        self.engine.finish(tx, result, TAGS).await
    }

    async fn create_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        device_id: DeviceId,
        partner_id: Option<PartnerId>,
        reason: &str,
        request_date: NaiveDate,
    ) -> Result<MaintenanceSlip, CycleError> {
        if reason.trim().is_empty() {
            return Err(CycleError::Validation("maintenance reason is blank".into()));
        }
        if let Some(partner) = partner_id {
            if !tx.partner_exists(partner).await? {
                return Err(CycleError::Validation(format!("partner {partner} does not exist")));
            }
        }
        DeviceStateStore::new(&mut *tx)
            .require(&[device_id], DeviceStatus::Available)
            .await?;

        let code = self
            .engine
            .sequencer()
            .next(&mut *tx, DocumentKind::MaintenanceSlip, ctx.now)
            .await?;
        let slip = MaintenanceSlip::dispatch(
            code,
            device_id,
            partner_id,
            reason.trim(),
            request_date,
            ctx.actor,
            ctx.now,
        );
        tx.insert_maintenance_slip(&slip).await?;
        DeviceStateStore::new(&mut *tx)
            .transition(device_id, Some(DeviceStatus::Available), DeviceStatus::Maintenance, ctx.now)
            .await?;
        ctx.record_change(serde_json::Value::Null, snapshot(&slip));
        tracing::info!(slip = %slip.code, device = %device_id, "maintenance slip created");
        Ok(slip)
    }

    /// Cancel a SENDING slip; the device goes back to AVAILABLE.
    pub async fn cancel(
        &self,
        ctx: &mut OperationContext<'_>,
        id: MaintenanceSlipId,
    ) -> Result<MaintenanceSlip, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self.cancel_in(&mut tx, ctx, id).await;
        self.engine.finish(tx, result, TAGS).await
    }

    async fn cancel_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        id: MaintenanceSlipId,
    ) -> Result<MaintenanceSlip, CycleError> {
        let mut slip = load(tx, id).await?;
        let before = snapshot(&slip);
        slip.cancel(ctx.now)?;
        for device in slip.sent_devices() {
            DeviceStateStore::new(&mut *tx)
                .transition(
                    device,
                    Some(DeviceStatus::Maintenance),
                    DeviceStatus::Available,
                    ctx.now,
                )
                .await?;
        }
        tx.update_maintenance_slip(&mut slip).await?;
        ctx.record_change(before, snapshot(&slip));
        tracing::info!(slip = %slip.code, "maintenance slip cancelled");
        Ok(slip)
    }

    /// Record the repair return of `items`.
    pub async fn create_return(
        &self,
        ctx: &mut OperationContext<'_>,
        maintenance_slip_id: MaintenanceSlipId,
        items: &[ResolveItem],
    ) -> Result<Recorded<MaintenanceReturnSlip, MaintenanceSlip>, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self
            .create_return_in(&mut tx, ctx, maintenance_slip_id, items)
            .await;
        self.engine.finish(tx, result, RESOLVE_TAGS).await
    }

    async fn create_return_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        maintenance_slip_id: MaintenanceSlipId,
        items: &[ResolveItem],
    ) -> Result<Recorded<MaintenanceReturnSlip, MaintenanceSlip>, CycleError> {
        let mut parent = load(tx, maintenance_slip_id).await?;
        if !parent.status.accepts_returns() {
            return Err(CycleError::Conflict(format!(
                "maintenance slip {} is {}",
                parent.code, parent.status
            )));
        }

        let id = MaintenanceReturnSlipId::new();
        let warranties = resolve_lines(
            &mut *tx,
            self.engine.sequencer(),
            ctx,
            &mut parent,
            items,
            WarrantySource::MaintenanceReturnSlip(id),
            ctx.now,
        )
        .await?;

        let code = self
            .engine
            .sequencer()
            .next(&mut *tx, DocumentKind::MaintenanceReturnSlip, ctx.now)
            .await?;
        let slip =
            MaintenanceReturnSlip::record(id, code, maintenance_slip_id, items, ctx.actor, ctx.now)?;
        tx.insert_maintenance_return_slip(&slip).await?;
        tx.update_maintenance_slip(&mut parent).await?;
        ctx.record_change(serde_json::Value::Null, snapshot(&slip));
        tracing::info!(
            slip = %slip.code,
            maintenance = %parent.code,
            maintenance_status = %parent.status,
            warranties = warranties.len(),
            "maintenance return slip created"
        );
        Ok(Recorded {
            document: slip,
            parent,
            warranties,
        })
    }

    /// Cancel a maintenance-return slip and send its devices back to
    /// MAINTENANCE.
    pub async fn cancel_return(
        &self,
        ctx: &mut OperationContext<'_>,
        id: MaintenanceReturnSlipId,
    ) -> Result<Reverted<MaintenanceReturnSlip, MaintenanceSlip>, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self.cancel_return_in(&mut tx, ctx, id).await;
        self.engine.finish(tx, result, RESOLVE_TAGS).await
    }

    async fn cancel_return_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        id: MaintenanceReturnSlipId,
    ) -> Result<Reverted<MaintenanceReturnSlip, MaintenanceSlip>, CycleError> {
        let mut slip = load_return(tx, id).await?;
        let before = snapshot(&slip);
        slip.cancel(ctx.now)?;

        let mut parent = load(tx, slip.maintenance_slip_id).await?;
        let items: Vec<ResolveItem> = slip.details.iter().map(|d| d.item.clone()).collect();
        let rejected = revert_lines(
            &mut *tx,
            ctx,
            &mut parent,
            &items,
            WarrantySource::MaintenanceReturnSlip(id),
        )
        .await?;

        tx.update_maintenance_slip(&mut parent).await?;
        tx.update_maintenance_return_slip(&mut slip).await?;
        ctx.record_change(before, snapshot(&slip));
        tracing::info!(
            slip = %slip.code,
            maintenance = %parent.code,
            maintenance_status = %parent.status,
            "maintenance return slip cancelled"
        );
        Ok(Reverted {
            document: slip,
            parent,
            rejected_warranties: rejected,
        })
    }

    /// Load a maintenance slip with its lines.
    pub async fn get(&self, id: MaintenanceSlipId) -> Result<MaintenanceSlip, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = load(&mut tx, id).await;
        self.engine.finish(tx, result, &[]).await
    }

    /// Load a maintenance-return slip with its lines.
    pub async fn get_return(
        &self,
        id: MaintenanceReturnSlipId,
    ) -> Result<MaintenanceReturnSlip, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = load_return(&mut tx, id).await;
        self.engine.finish(tx, result, &[]).await
    }

    /// Maintenance slips passing `filter`, newest first.
    pub async fn list(
        &self,
        filter: &MaintenanceSlipFilter,
    ) -> Result<Vec<MaintenanceSlip>, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = tx
            .find_maintenance_slips(filter)
            .await
            .map_err(CycleError::from);
        self.engine.finish(tx, result, &[]).await
    }
}

async fn load<T: Transaction>(
    tx: &mut T,
    id: MaintenanceSlipId,
) -> Result<MaintenanceSlip, CycleError> {
    tx.find_maintenance_slip(id)
        .await?
        .ok_or_else(|| CycleError::not_found("maintenance slip", id))
}

async fn load_return<T: Transaction>(
    tx: &mut T,
    id: MaintenanceReturnSlipId,
) -> Result<MaintenanceReturnSlip, CycleError> {
    tx.find_maintenance_return_slip(id)
        .await?
        .ok_or_else(|| CycleError::not_found("maintenance return slip", id))
}
