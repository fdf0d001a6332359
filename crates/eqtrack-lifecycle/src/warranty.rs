//! # Warranty Cycle
//!
//! Manufacturer service requests, opened directly by an operator or
//! automatically when a document line is resolved as BROKEN.
//!
//! | Operation | Warranty | Device |
//! |---|---|---|
//! | `create_request` | → PENDING | AVAILABLE \| BROKEN → UNDER_WARRANTY |
//! | `assign` | PENDING → PROCESSING | BROKEN → UNDER_WARRANTY |
//! | `complete` | PROCESSING → COMPLETED | → AVAILABLE |
//! | `reject` | PENDING \| PROCESSING → REJECTED | → prior status |

use chrono::NaiveDate;

use eqtrack_core::{DeviceId, DocumentKind, WarrantyId};
use eqtrack_state::{DeviceStatus, Warranty, WarrantySource};

use crate::audit::snapshot;
use crate::cache::CacheTag;
use crate::context::OperationContext;
use crate::device::DeviceStateStore;
use crate::engine::Engine;
use crate::error::CycleError;
use crate::ports::{Store, Transaction, WarrantyFilter};

const TAGS: &[CacheTag] = &[CacheTag::Warranty, CacheTag::Devices];

/// Warranty operations.
pub struct WarrantyCycle<'e, S: Store> {
    engine: &'e Engine<S>,
}

impl<'e, S: Store> WarrantyCycle<'e, S> {
    pub(crate) fn new(engine: &'e Engine<S>) -> Self {
        Self { engine }
    }

    /// Open a warranty request for an AVAILABLE or BROKEN device within its
    /// coverage period.
    pub async fn create_request(
        &self,
        ctx: &mut OperationContext<'_>,
        device_id: DeviceId,
        reason: &str,
        request_date: NaiveDate,
    ) -> Result<Warranty, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self
            .create_in(&mut tx, ctx, device_id, reason, request_date)
            .await;
        self.engine.finish(tx, result, TAGS).await
    }

    async fn create_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        device_id: DeviceId,
        reason: &str,
        request_date: NaiveDate,
    ) -> Result<Warranty, CycleError> {
        if reason.trim().is_empty() {
            return Err(CycleError::Validation("warranty reason is blank".into()));
        }
        let device = match DeviceStateStore::new(&mut *tx).load(device_id).await {
            Ok(device) => device,
            Err(CycleError::NotFound { .. }) => {
                return Err(CycleError::Validation(format!("{device_id} does not exist")))
            }
            Err(other) => return Err(other),
        };
        if !device.warranty_covers(request_date) {
            return Err(CycleError::Validation(format!(
                "request date {request_date} is past the warranty expiry of {device_id}"
            )));
        }
        if !tx
            .find_warranties(&WarrantyFilter::open_for(device_id))
            .await?
            .is_empty()
        {
            return Err(CycleError::Validation(format!(
                "{device_id} already has an open warranty"
            )));
        }
        if !matches!(device.status, DeviceStatus::Available | DeviceStatus::Broken) {
            return Err(CycleError::Validation(format!(
                "{device_id} is {}, expected AVAILABLE or BROKEN",
                device.status
            )));
        }

        let code = self
            .engine
            .sequencer()
            .next(&mut *tx, DocumentKind::Warranty, ctx.now)
            .await?;
        let warranty = Warranty::request(
            code,
            device_id,
            reason.trim(),
            request_date,
            device.status,
            WarrantySource::Direct,
            ctx.actor,
            ctx.now,
        );
        tx.insert_warranty(&warranty).await?;
        DeviceStateStore::new(&mut *tx)
            .transition(
                device_id,
                Some(device.status),
                DeviceStatus::UnderWarranty,
                ctx.now,
            )
            .await?;
        ctx.record_change(serde_json::Value::Null, snapshot(&warranty));
        tracing::info!(warranty = %warranty.code, device = %device_id, "warranty requested");
        Ok(warranty)
    }

    /// Hand a PENDING warranty to the manufacturer.
    pub async fn assign(
        &self,
        ctx: &mut OperationContext<'_>,
        id: WarrantyId,
    ) -> Result<Warranty, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self.assign_in(&mut tx, ctx, id).await;
        self.engine.finish(tx, result, TAGS).await
    }

    async fn assign_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        id: WarrantyId,
    ) -> Result<Warranty, CycleError> {
        let mut warranty = load(tx, id).await?;
        let before = snapshot(&warranty);
        warranty.assign(ctx.now)?;
        let mut devices = DeviceStateStore::new(&mut *tx);
        let device = devices.load(warranty.device_id).await?;
        if device.status == DeviceStatus::Broken {
            devices
                .transition(
                    warranty.device_id,
                    Some(DeviceStatus::Broken),
                    DeviceStatus::UnderWarranty,
                    ctx.now,
                )
                .await?;
        }
        tx.update_warranty(&mut warranty).await?;
        ctx.record_change(before, snapshot(&warranty));
        tracing::info!(warranty = %warranty.code, "warranty assigned");
        Ok(warranty)
    }

    /// Close a PROCESSING warranty; the device is AVAILABLE again.
    pub async fn complete(
        &self,
        ctx: &mut OperationContext<'_>,
        id: WarrantyId,
    ) -> Result<Warranty, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self.complete_in(&mut tx, ctx, id).await;
        self.engine.finish(tx, result, TAGS).await
    }

    async fn complete_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        id: WarrantyId,
    ) -> Result<Warranty, CycleError> {
        let mut warranty = load(tx, id).await?;
        let before = snapshot(&warranty);
        warranty.complete(ctx.now)?;
        DeviceStateStore::new(&mut *tx)
            .transition(
                warranty.device_id,
                Some(DeviceStatus::UnderWarranty),
                DeviceStatus::Available,
                ctx.now,
            )
            .await?;
        tx.update_warranty(&mut warranty).await?;
        ctx.record_change(before, snapshot(&warranty));
        tracing::info!(warranty = %warranty.code, "warranty completed");
        Ok(warranty)
    }

    /// Reject an open warranty; the device returns to the status it had
    /// when the warranty was opened.
    pub async fn reject(
        &self,
        ctx: &mut OperationContext<'_>,
        id: WarrantyId,
    ) -> Result<Warranty, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self.reject_in(&mut tx, ctx, id).await;
        self.engine.finish(tx, result, TAGS).await
    }

    async fn reject_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        id: WarrantyId,
    ) -> Result<Warranty, CycleError> {
        let mut warranty = load(tx, id).await?;
        let before = snapshot(&warranty);
        let restore = warranty.reject(ctx.now)?;
        DeviceStateStore::new(&mut *tx)
            .transition(warranty.device_id, None, restore, ctx.now)
            .await?;
        tx.update_warranty(&mut warranty).await?;
        ctx.record_change(before, snapshot(&warranty));
        tracing::info!(warranty = %warranty.code, restored = %restore, "warranty rejected");
        Ok(warranty)
    }

    /// Load a warranty.
    pub async fn get(&self, id: WarrantyId) -> Result<Warranty, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = load(&mut tx, id).await;
        self.engine.finish(tx, result, &[]).await
    }

    /// Warranties passing `filter`, newest first.
    pub async fn list(&self, filter: &WarrantyFilter) -> Result<Vec<Warranty>, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = tx.find_warranties(filter).await.map_err(CycleError::from);
        self.engine.finish(tx, result, &[]).await
    }
}

async fn load<T: Transaction>(tx: &mut T, id: WarrantyId) -> Result<Warranty, CycleError> {
    tx.find_warranty(id)
        .await?
        .ok_or_else(|| CycleError::not_found("warranty", id))
}
