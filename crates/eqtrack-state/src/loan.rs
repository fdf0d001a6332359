//! # Loan Slip State Machine
//!
//! A loan slip lends one or more devices to a borrower. Each device is a
//! line; the slip's status follows from its lines.
//!
//! ```text
//! BORROWING ──▶ PARTIAL_RETURNED ──▶ CLOSED
//!     │               ▲    │            │
//!     │               └────┼────────────┘  (return-slip cancellation)
//!     │                    ▼
//!     │                BORROWING
//!     ▼
//! CANCELLED (terminal, only from BORROWING)
//! ```
//!
//! Lines: `BORROWED ──▶ RETURNED | BROKEN`, reopened only by compensation.

use serde::{Deserialize, Serialize};

use eqtrack_core::{DetailId, DeviceId, DocumentCode, LoanSlipId, Timestamp, UserId};

use crate::error::StateError;
use crate::progress::{
    check_distinct, derive_header_status, progress_of, reopen_status, resolve_status,
    HeaderStatus, LineResolution, LineStatus, Progress, Versioned,
};

/// Status of a loan slip header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanSlipStatus {
    /// Every device is still out.
    Borrowing,
    /// Some devices are back.
    PartialReturned,
    /// Every device is back.
    Closed,
    /// Cancelled before any return (terminal).
    Cancelled,
}

state_names!(LoanSlipStatus, "loan slip", {
    Borrowing => "BORROWING",
    PartialReturned => "PARTIAL_RETURNED",
    Closed => "CLOSED",
    Cancelled => "CANCELLED",
});

impl LoanSlipStatus {
    /// Whether devices may still be returned against the slip.
    pub fn accepts_returns(&self) -> bool {
        matches!(self, Self::Borrowing | Self::PartialReturned)
    }
}

impl HeaderStatus for LoanSlipStatus {
    const ENTITY: &'static str = "loan slip";

    fn for_progress(progress: Progress) -> Self {
        match progress {
            Progress::Untouched => Self::Borrowing,
            Progress::Partial => Self::PartialReturned,
            Progress::Complete => Self::Closed,
        }
    }

    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use LoanSlipStatus::*;
        match self {
            Borrowing => matches!(next, PartialReturned | Closed | Cancelled),
            PartialReturned => matches!(next, Closed | Borrowing),
            Closed => matches!(next, PartialReturned | Borrowing),
            Cancelled => false,
        }
    }
}

/// Status of a loan slip line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanLineStatus {
    /// Device is with the borrower.
    Borrowed,
    /// Device came back working.
    Returned,
    /// Device came back broken.
    Broken,
}

state_names!(LoanLineStatus, "loan line", {
    Borrowed => "BORROWED",
    Returned => "RETURNED",
    Broken => "BROKEN",
});

impl LineStatus for LoanLineStatus {
    const OPEN: Self = Self::Borrowed;

    fn resolved(resolution: LineResolution) -> Self {
        match resolution {
            LineResolution::Returned => Self::Returned,
            LineResolution::Broken => Self::Broken,
        }
    }

    fn resolution(&self) -> Option<LineResolution> {
        match self {
            Self::Borrowed => None,
            Self::Returned => Some(LineResolution::Returned),
            Self::Broken => Some(LineResolution::Broken),
        }
    }
}

/// One device on a loan slip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanSlipDetail {
    /// Line identifier.
    pub id: DetailId,
    /// Owning slip.
    pub loan_slip_id: LoanSlipId,
    /// Lent device.
    pub device_id: DeviceId,
    /// Line status.
    pub status: LoanLineStatus,
    /// When the line was resolved.
    pub return_date: Option<Timestamp>,
    /// Note captured at resolution.
    pub note: Option<String>,
}

/// A loan slip with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanSlip {
    /// Unique identifier.
    pub id: LoanSlipId,
    /// Human-readable code.
    pub code: DocumentCode,
    /// Who receives the devices.
    pub borrower_id: UserId,
    /// Who hands the devices out.
    pub loaner_id: UserId,
    /// Aggregate status.
    pub status: LoanSlipStatus,
    /// Author of the document.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last change.
    pub updated_at: Timestamp,
    /// Optimistic concurrency version.
    pub version: i64,
    /// Lines, one per device.
    pub details: Vec<LoanSlipDetail>,
}

impl LoanSlip {
    /// Open a BORROWING slip with one BORROWED line per device.
    pub fn open(
        code: DocumentCode,
        borrower_id: UserId,
        loaner_id: UserId,
        devices: &[DeviceId],
        created_by: UserId,
        at: Timestamp,
    ) -> Result<Self, StateError> {
        check_distinct(LoanSlipStatus::ENTITY, devices)?;
        let id = LoanSlipId::new();
        let details = devices
            .iter()
            .map(|device_id| LoanSlipDetail {
                id: DetailId::new(),
                loan_slip_id: id,
                device_id: *device_id,
                status: LoanLineStatus::Borrowed,
                return_date: None,
                note: None,
            })
            .collect();
        Ok(Self {
            id,
            code,
            borrower_id,
            loaner_id,
            status: LoanSlipStatus::Borrowing,
            created_by,
            created_at: at,
            updated_at: at,
            version: 0,
            details,
        })
    }

    /// The line for `device`, if any.
    pub fn detail(&self, device: DeviceId) -> Option<&LoanSlipDetail> {
        self.details.iter().find(|d| d.device_id == device)
    }

    fn detail_mut(&mut self, device: DeviceId) -> Result<&mut LoanSlipDetail, StateError> {
        self.details
            .iter_mut()
            .find(|d| d.device_id == device)
            .ok_or(StateError::LineNotFound { device })
    }

    /// Devices whose lines are still BORROWED.
    pub fn borrowed_devices(&self) -> Vec<DeviceId> {
        self.details
            .iter()
            .filter(|d| d.status == LoanLineStatus::Borrowed)
            .map(|d| d.device_id)
            .collect()
    }

    /// Check that `devices` are distinct open lines of this slip.
    pub fn ensure_open_lines(&self, devices: &[DeviceId]) -> Result<(), StateError> {
        check_distinct(LoanSlipStatus::ENTITY, devices)?;
        for device in devices {
            let detail = self
                .detail(*device)
                .ok_or(StateError::LineNotFound { device: *device })?;
            if detail.status.is_resolved() {
                return Err(StateError::LineNotOpen {
                    device: *device,
                    status: detail.status.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Resolve the open line of `device`.
    pub fn resolve_line(
        &mut self,
        device: DeviceId,
        resolution: LineResolution,
        note: Option<String>,
        at: Timestamp,
    ) -> Result<(), StateError> {
        let detail = self.detail_mut(device)?;
        resolve_status(&mut detail.status, device, resolution)?;
        detail.return_date = Some(at);
        detail.note = note;
        Ok(())
    }

    /// Reopen a line previously resolved as `expected`.
    pub fn reopen_line(
        &mut self,
        device: DeviceId,
        expected: LineResolution,
    ) -> Result<(), StateError> {
        let detail = self.detail_mut(device)?;
        reopen_status(&mut detail.status, device, expected)?;
        detail.return_date = None;
        detail.note = None;
        Ok(())
    }

    /// Resolution mix of the lines.
    pub fn progress(&self) -> Progress {
        progress_of(self.details.iter().map(|d| d.status))
    }

    /// Recompute the aggregate status from the lines.
    pub fn refresh_status(&mut self, at: Timestamp) -> Result<LoanSlipStatus, StateError> {
        let next = derive_header_status(self.status, self.details.iter().map(|d| d.status))?;
        if next != self.status {
            self.status = next;
            self.updated_at = at;
        }
        Ok(next)
    }

    /// Cancel the slip. Only a BORROWING slip can be cancelled.
    pub fn cancel(&mut self, at: Timestamp) -> Result<(), StateError> {
        match self.status {
            LoanSlipStatus::Cancelled => Err(StateError::TerminalState {
                entity: LoanSlipStatus::ENTITY,
                state: self.status.to_string(),
            }),
            LoanSlipStatus::Borrowing => {
                self.status = LoanSlipStatus::Cancelled;
                self.updated_at = at;
                Ok(())
            }
            other => Err(StateError::InvalidTransition {
                entity: LoanSlipStatus::ENTITY,
                from: other.to_string(),
                to: LoanSlipStatus::Cancelled.to_string(),
            }),
        }
    }
}

impl Versioned for LoanSlip {
    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
