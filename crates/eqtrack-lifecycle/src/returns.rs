//! # Return Cycle
//!
//! Document-backed returns against an open loan slip. A return slip records
//! which lines it resolved and how, so its cancellation can reopen exactly
//! those lines.

use eqtrack_core::{DocumentKind, LoanSlipId, ReturnSlipId, Timestamp, UserId};
use eqtrack_state::{LoanSlip, ResolveItem, ReturnSlip, WarrantySource};

use crate::audit::snapshot;
use crate::cache::CacheTag;
use crate::context::OperationContext;
use crate::engine::Engine;
use crate::error::CycleError;
use crate::loan;
use crate::outcome::{Recorded, Reverted};
use crate::ports::{Store, Transaction};
use crate::resolve::{resolve_lines, revert_lines};

const TAGS: &[CacheTag] = &[
    CacheTag::Return,
    CacheTag::Loan,
    CacheTag::Devices,
    CacheTag::Warranty,
];

/// Return slip operations.
pub struct ReturnCycle<'e, S: Store> {
    engine: &'e Engine<S>,
}

impl<'e, S: Store> ReturnCycle<'e, S> {
    pub(crate) fn new(engine: &'e Engine<S>) -> Self {
        Self { engine }
    }

    /// Record a return of `items` against loan slip `loan_slip_id`.
    /// `return_date` defaults to the operation time and is also stamped on
    /// the loan lines it resolves.
    pub async fn create(
        &self,
        ctx: &mut OperationContext<'_>,
        loan_slip_id: LoanSlipId,
        returner_id: UserId,
        return_date: Option<Timestamp>,
        items: &[ResolveItem],
    ) -> Result<Recorded<ReturnSlip, LoanSlip>, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self
            .create_in(&mut tx, ctx, loan_slip_id, returner_id, return_date, items)
            .await;
        self.engine.finish(tx, result, TAGS).await
    }

    async fn create_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        loan_slip_id: LoanSlipId,
        returner_id: UserId,
        return_date: Option<Timestamp>,
        items: &[ResolveItem],
    ) -> Result<Recorded<ReturnSlip, LoanSlip>, CycleError> {
        if !tx.user_exists(returner_id).await? {
            return Err(CycleError::Validation(format!(
                "returner {returner_id} does not exist"
            )));
        }
        let mut parent = loan::load(tx, loan_slip_id).await?;
        if !parent.status.accepts_returns() {
            return Err(CycleError::Conflict(format!(
                "loan slip {} is {}",
                parent.code, parent.status
            )));
        }

        let id = ReturnSlipId::new();
        let return_date = return_date.unwrap_or(ctx.now);
        let warranties = resolve_lines(
            &mut *tx,
            self.engine.sequencer(),
            ctx,
            &mut parent,
            items,
            WarrantySource::ReturnSlip(id),
            return_date,
        )
        .await?;

        let code = self
            .engine
            .sequencer()
            .next(&mut *tx, DocumentKind::ReturnSlip, ctx.now)
            .await?;
        let slip = ReturnSlip::record(
            id,
            code,
            loan_slip_id,
            returner_id,
            return_date,
            items,
            ctx.actor,
            ctx.now,
        )?;
        tx.insert_return_slip(&slip).await?;
        tx.update_loan_slip(&mut parent).await?;
        ctx.record_change(serde_json::Value::Null, snapshot(&slip));
        tracing::info!(
            slip = %slip.code,
            loan = %parent.code,
            loan_status = %parent.status,
            warranties = warranties.len(),
            "return slip created"
        );
        Ok(Recorded {
            document: slip,
            parent,
            warranties,
        })
    }

    /// Cancel a return slip and reopen the loan lines it resolved.
    pub async fn cancel(
        &self,
        ctx: &mut OperationContext<'_>,
        id: ReturnSlipId,
    ) -> Result<Reverted<ReturnSlip, LoanSlip>, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = self.cancel_in(&mut tx, ctx, id).await;
        self.engine.finish(tx, result, TAGS).await
    }

    async fn cancel_in(
        &self,
        tx: &mut S::Tx,
        ctx: &mut OperationContext<'_>,
        id: ReturnSlipId,
    ) -> Result<Reverted<ReturnSlip, LoanSlip>, CycleError> {
        let mut slip = load(tx, id).await?;
        let before = snapshot(&slip);
        slip.cancel(ctx.now)?;

        let mut parent = loan::load(tx, slip.loan_slip_id).await?;
        let items: Vec<ResolveItem> = slip.details.iter().map(|d| d.item.clone()).collect();
        let rejected = revert_lines(
            &mut *tx,
            ctx,
            &mut parent,
            &items,
            WarrantySource::ReturnSlip(id),
        )
        .await?;

        tx.update_loan_slip(&mut parent).await?;
        tx.update_return_slip(&mut slip).await?;
        ctx.record_change(before, snapshot(&slip));
        tracing::info!(
            slip = %slip.code,
            loan = %parent.code,
            loan_status = %parent.status,
            "return slip cancelled"
        );
        Ok(Reverted {
            document: slip,
            parent,
            rejected_warranties: rejected,
        })
    }

    /// Load a return slip with its lines.
    pub async fn get(&self, id: ReturnSlipId) -> Result<ReturnSlip, CycleError> {
        let mut tx = self.engine.begin().await?;
        let result = load(&mut tx, id).await;
        self.engine.finish(tx, result, &[]).await
    }
}

async fn load<T: Transaction>(tx: &mut T, id: ReturnSlipId) -> Result<ReturnSlip, CycleError> {
    tx.find_return_slip(id)
        .await?
        .ok_or_else(|| CycleError::not_found("return slip", id))
}
