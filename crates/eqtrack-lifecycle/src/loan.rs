//! # Loan Cycle
//!
//! Lending devices to a borrower, taking them back directly on the slip,
//! and cancelling a slip before anything came back.

use eqtrack_core::{DeviceId, DocumentKind, LoanSlipId, UserId};
use eqtrack_state::{DeviceStatus, LoanSlip, ResolveItem, WarrantySource};

use crate::audit::snapshot;
use crate::cache::CacheTag;
use crate::context::OperationContext;
use crate::device::DeviceStateStore;
use crate::engine::Engine;
use crate::error::CycleError;
use crate::outcome::Resolved;
use crate::ports::{LoanSlipFilter, Store, Transaction};
use crate::resolve::resolve_lines;

const TAGS: &[CacheTag] = &[CacheTag::Loan, CacheTag::Devices];
const RESOLVE_TAGS: &[CacheTag] = &[CacheTag::Loan, CacheTag::Devices, CacheTag::Warranty];

/// Loan slip operations.
pub struct LoanCycle<'e, S: Store> {
    engine: &'e Engine<S>,
}

impl<'e, S: Store> LoanCycle<'e, S> {
    pub(crate) fn new(engine: &'e Engine<S>) -> Self {
        Self { engine }
    }

    /// Lend `devices` to `borrower_id`. Every device must be AVAILABLE.
    pub async fn create(
        &self,
        ctx: &mut OperationContext<'_>,
        borrower_id: UserId,
        loaner_id: UserId,
        devices: &[DeviceId],
    ) -> Result<LoanSlip, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self
            .create_in(&mut tx, ctx, borrower_id, loaner_id, devices)
            .await;
        self.engine.finish(tx, result, TAGS).await
    }

    async fn create_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        borrower_id: UserId,
        loaner_id: UserId,
        devices: &[DeviceId],
    ) -> Result<LoanSlip, CycleError> {
        for (role, user) in [("borrower", borrower_id), ("loaner", loaner_id)] {
            if !tx.user_exists(user).await? {
                return Err(CycleError::Validation(format!("{role} {user} does not exist")));
            }
        }
        DeviceStateStore::new(&mut *tx)
            .require(devices, DeviceStatus::Available)
            .await?;

        let code = self
            .engine
            .sequencer()
            .next(&mut *tx, DocumentKind::LoanSlip, ctx.now)
            .await?;
        let slip = LoanSlip::open(code, borrower_id, loaner_id, devices, ctx.actor, ctx.now)?;
        tx.insert_loan_slip(&slip).await?;
        for device in devices {
            DeviceStateStore::new(&mut *tx)
                .transition(*device, Some(DeviceStatus::Available), DeviceStatus::OnLoan, ctx.now)
                .await?;
        }
        ctx.record_change(serde_json::Value::Null, snapshot(&slip));
        tracing::info!(slip = %slip.code, devices = devices.len(), "loan slip created");
        Ok(slip)
    }

    /// Resolve lines of the slip directly, without a return slip.
    pub async fn return_devices(
        &self,
        ctx: &mut OperationContext<'_>,
        id: LoanSlipId,
        items: &[ResolveItem],
    ) -> Result<Resolved<LoanSlip>, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self.return_in(&mut tx, ctx, id, items).await;
        self.engine.finish(tx, result, RESOLVE_TAGS).await
    }

    async fn return_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        id: LoanSlipId,
        items: &[ResolveItem],
    ) -> Result<Resolved<LoanSlip>, CycleError> {
        let mut slip = load(tx, id).await?;
        if !slip.status.accepts_returns() {
            return Err(CycleError::Conflict(format!(
                "loan slip {} is {}",
                slip.code, slip.status
            )));
        }
        let before = snapshot(&slip);
        let warranties = resolve_lines(
            &mut *tx,
            self.engine.sequencer(),
            ctx,
            &mut slip,
            items,
            WarrantySource::LoanSlip(id),
            ctx.now,
        )
        .await?;
        tx.update_loan_slip(&mut slip).await?;
        ctx.record_change(before, snapshot(&slip));
        tracing::info!(
            slip = %slip.code,
            status = %slip.status,
            resolved = items.len(),
            warranties = warranties.len(),
            "loan slip lines resolved"
        );
        Ok(Resolved {
            document: slip,
            warranties,
        })
    }

    /// Cancel a BORROWING slip; every device goes back to AVAILABLE.
    pub async fn cancel(
        &self,
        ctx: &mut OperationContext<'_>,
        id: LoanSlipId,
    ) -> Result<LoanSlip, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self.cancel_in(&mut tx, ctx, id).await;
        self.engine.finish(tx, result, TAGS).await
    }

    async fn cancel_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        id: LoanSlipId,
    ) -> Result<LoanSlip, CycleError> {
        let mut slip = load(tx, id).await?;
        let before = snapshot(&slip);
        slip.cancel(ctx.now)?;
        for device in slip.borrowed_devices() {
            DeviceStateStore::new(&mut *tx)
                .transition(device, Some(DeviceStatus::OnLoan), DeviceStatus::Available, ctx.now)
                .await?;
        }
        tx.update_loan_slip(&mut slip).await?;
        ctx.record_change(before, snapshot(&slip));
        tracing::info!(slip = %slip.code, "loan slip cancelled");
        Ok(slip)
    }

    /// Load a slip with its lines.
    pub async fn get(&self, id: LoanSlipId) -> Result<LoanSlip, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = load(&mut tx, id).await;
        self.engine.finish(tx, result, &[]).await
    }

    /// Slips passing `filter`, newest first.
    pub async fn list(&self, filter: &LoanSlipFilter) -> Result<Vec<LoanSlip>, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = tx.find_loan_slips(filter).await.map_err(CycleError::from);
        tracing::debug!(?filter, "loan slips listed");
        self.engine.finish(tx, result, &[]).await
    }
}

pub(crate) async fn load<T: Transaction>(tx: &mut T, id: LoanSlipId) -> Result<LoanSlip, CycleError> {
    tx.find_loan_slip(id)
        .await?
        .ok_or_else(|| CycleError::not_found("loan slip", id))
}
