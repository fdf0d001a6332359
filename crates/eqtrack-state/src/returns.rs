//! # Return Slip
//!
//! A return slip records one resolution step of a loan slip: which devices
//! came back, and in what condition. It has no line statuses of its own; each
//! detail mirrors the resolution applied to the loan line, which is exactly
//! what a cancellation needs to undo it.
//!
//! ```text
//! RETURNED ──▶ CANCELLED (terminal)
//! ```

use serde::{Deserialize, Serialize};

use eqtrack_core::{DetailId, DocumentCode, LoanSlipId, ReturnSlipId, Timestamp, UserId};

use crate::error::StateError;
use crate::progress::{check_distinct, ResolveItem, Versioned};

/// Status of a return slip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnSlipStatus {
    /// The return is in effect.
    Returned,
    /// The return was reverted (terminal).
    Cancelled,
}

state_names!(ReturnSlipStatus, "return slip", {
    Returned => "RETURNED",
    Cancelled => "CANCELLED",
});

/// One device recorded on a return slip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSlipDetail {
    /// Line identifier.
    pub id: DetailId,
    /// Owning return slip.
    pub return_slip_id: ReturnSlipId,
    /// The resolution applied to the loan line.
    pub item: ResolveItem,
}

/// A return slip with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSlip {
    /// Unique identifier.
    pub id: ReturnSlipId,
    /// Human-readable code.
    pub code: DocumentCode,
    /// The loan slip being returned against.
    pub loan_slip_id: LoanSlipId,
    /// Who brought the devices back.
    pub returner_id: UserId,
    /// When the devices came back.
    pub return_date: Timestamp,
    /// Status.
    pub status: ReturnSlipStatus,
    /// Author of the document.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last change.
    pub updated_at: Timestamp,
    /// Optimistic concurrency version.
    pub version: i64,
    /// Recorded lines.
    pub details: Vec<ReturnSlipDetail>,
}

impl ReturnSlip {
    /// Record a return of `items` against `loan_slip_id`.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        id: ReturnSlipId,
        code: DocumentCode,
        loan_slip_id: LoanSlipId,
        returner_id: UserId,
        return_date: Timestamp,
        items: &[ResolveItem],
        created_by: UserId,
        at: Timestamp,
    ) -> Result<Self, StateError> {
        let devices: Vec<_> = items.iter().map(|i| i.device_id).collect();
        check_distinct("return slip", &devices)?;
        Ok(Self {
            id,
            code,
            loan_slip_id,
            returner_id,
            return_date,
            status: ReturnSlipStatus::Returned,
            created_by,
            created_at: at,
            updated_at: at,
            version: 0,
            details: items
                .iter()
                .map(|item| ReturnSlipDetail {
                    id: DetailId::new(),
                    return_slip_id: id,
                    item: item.clone(),
                })
                .collect(),
        })
    }

    /// Cancel the return.
    pub fn cancel(&mut self, at: Timestamp) -> Result<(), StateError> {
        if self.status == ReturnSlipStatus::Cancelled {
            return Err(StateError::TerminalState {
                entity: "return slip",
                state: self.status.to_string(),
            });
        }
        self.status = ReturnSlipStatus::Cancelled;
        self.updated_at = at;
        Ok(())
    }
}

impl Versioned for ReturnSlip {
    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}
