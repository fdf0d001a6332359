//! # Maintenance State Machines
//!
//! Internal repair dispatch and repair completion.
//!
//! ## Maintenance slip
//!
//! ```text
//! SENDING ──▶ PARTIAL_RETURNED ──▶ CLOSED
//!    │             ▲     │            │
//!    │             └─────┼────────────┘  (maintenance-return cancellation)
//!    ▼                   ▼
//! CANCELLED           SENDING
//! ```
//!
//! Lines: `SENT ──▶ RETURNED | BROKEN`.
//!
//! A slip is dispatched for a single device, but lines are kept as a list so
//! maintenance returns resolve them exactly like loan lines.
//!
//! ## Maintenance-return slip
//!
//! `RETURNED ──▶ CANCELLED`, with details mirroring the applied resolutions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use eqtrack_core::{
    DetailId, DeviceId, DocumentCode, MaintenanceReturnSlipId, MaintenanceSlipId, PartnerId,
    Timestamp, UserId,
};

use crate::error::StateError;
use crate::progress::{
    check_distinct, derive_header_status, progress_of, reopen_status, resolve_status,
    HeaderStatus, LineResolution, LineStatus, Progress, ResolveItem, Versioned,
};

// ─── Maintenance slip ────────────────────────────────────────────────

/// Status of a maintenance slip header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceSlipStatus {
    /// Devices are at the repair partner.
    Sending,
    /// Some devices are back.
    PartialReturned,
    /// Every device is back.
    Closed,
    /// Dispatch cancelled (terminal).
    Cancelled,
}

state_names!(MaintenanceSlipStatus, "maintenance slip", {
    Sending => "SENDING",
    PartialReturned => "PARTIAL_RETURNED",
    Closed => "CLOSED",
    Cancelled => "CANCELLED",
});

impl MaintenanceSlipStatus {
    /// Whether repaired devices may still be returned against the slip.
    pub fn accepts_returns(&self) -> bool {
        matches!(self, Self::Sending | Self::PartialReturned)
    }
}

impl HeaderStatus for MaintenanceSlipStatus {
    const ENTITY: &'static str = "maintenance slip";

    fn for_progress(progress: Progress) -> Self {
        match progress {
            Progress::Untouched => Self::Sending,
            Progress::Partial => Self::PartialReturned,
            Progress::Complete => Self::Closed,
        }
    }

    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use MaintenanceSlipStatus::*;
        match self {
            Sending => matches!(next, PartialReturned | Closed | Cancelled),
            PartialReturned => matches!(next, Closed | Sending),
            Closed => matches!(next, PartialReturned | Sending),
            Cancelled => false,
        }
    }
}

/// Status of a maintenance slip line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceLineStatus {
    /// Device is at the repair partner.
    Sent,
    /// Device came back repaired.
    Returned,
    /// Device came back beyond repair.
    Broken,
}

state_names!(MaintenanceLineStatus, "maintenance line", {
    Sent => "SENT",
    Returned => "RETURNED",
    Broken => "BROKEN",
});

impl LineStatus for MaintenanceLineStatus {
    const OPEN: Self = Self::Sent;

    fn resolved(resolution: LineResolution) -> Self {
        match resolution {
            LineResolution::Returned => Self::Returned,
            LineResolution::Broken => Self::Broken,
        }
    }

    fn resolution(&self) -> Option<LineResolution> {
        match self {
            Self::Sent => None,
            Self::Returned => Some(LineResolution::Returned),
            Self::Broken => Some(LineResolution::Broken),
        }
    }
}

/// One device on a maintenance slip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceSlipDetail {
    /// Line identifier.
    pub id: DetailId,
    /// Owning slip.
    pub maintenance_slip_id: MaintenanceSlipId,
    /// Dispatched device.
    pub device_id: DeviceId,
    /// Line status.
    pub status: MaintenanceLineStatus,
    /// When the line was resolved.
    pub return_date: Option<Timestamp>,
    /// Note captured at resolution.
    pub note: Option<String>,
}

/// A maintenance dispatch slip with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceSlip {
    /// Unique identifier.
    pub id: MaintenanceSlipId,
    /// Human-readable code.
    pub code: DocumentCode,
    /// Repair partner, if the repair is outsourced.
    pub partner_id: Option<PartnerId>,
    /// Why the device is sent.
    pub reason: String,
    /// Requested dispatch date.
    pub request_date: NaiveDate,
    /// Aggregate status.
    pub status: MaintenanceSlipStatus,
    /// Author of the document.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last change.
    pub updated_at: Timestamp,
    /// Optimistic concurrency version.
    pub version: i64,
    /// Lines.
    pub details: Vec<MaintenanceSlipDetail>,
}

impl MaintenanceSlip {
    /// Dispatch `device` in a new SENDING slip.
    pub fn dispatch(
        code: DocumentCode,
        device: DeviceId,
        partner_id: Option<PartnerId>,
        reason: impl Into<String>,
        request_date: NaiveDate,
        created_by: UserId,
        at: Timestamp,
    ) -> Self {
        let id = MaintenanceSlipId::new();
        Self {
            id,
            code,
            partner_id,
            reason: reason.into(),
            request_date,
            status: MaintenanceSlipStatus::Sending,
            created_by,
            created_at: at,
            updated_at: at,
            version: 0,
            details: vec![MaintenanceSlipDetail {
                id: DetailId::new(),
                maintenance_slip_id: id,
                device_id: device,
                status: MaintenanceLineStatus::Sent,
                return_date: None,
                note: None,
            }],
        }
    }

    /// The line for `device`, if any.
    pub fn detail(&self, device: DeviceId) -> Option<&MaintenanceSlipDetail> {
        self.details.iter().find(|d| d.device_id == device)
    }

    fn detail_mut(&mut self, device: DeviceId) -> Result<&mut MaintenanceSlipDetail, StateError> {
        self.details
            .iter_mut()
            .find(|d| d.device_id == device)
            .ok_or(StateError::LineNotFound { device })
    }

    /// Devices whose lines are still SENT.
    pub fn sent_devices(&self) -> Vec<DeviceId> {
        self.details
            .iter()
            .filter(|d| d.status == MaintenanceLineStatus::Sent)
            .map(|d| d.device_id)
            .collect()
    }

    /// Check that `devices` are distinct open lines of this slip.
    pub fn ensure_open_lines(&self, devices: &[DeviceId]) -> Result<(), StateError> {
        check_distinct(MaintenanceSlipStatus::ENTITY, devices)?;
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
    pub fn refresh_status(&mut self, at: Timestamp) -> Result<MaintenanceSlipStatus, StateError> {
        let next = derive_header_status(self.status, self.details.iter().map(|d| d.status))?;
        if next != self.status {
            self.status = next;
            self.updated_at = at;
        }
        Ok(next)
    }

    /// Cancel the dispatch. Only a SENDING slip can be cancelled.
    pub fn cancel(&mut self, at: Timestamp) -> Result<(), StateError> {
        match self.status {
            MaintenanceSlipStatus::Cancelled => Err(StateError::TerminalState {
                entity: MaintenanceSlipStatus::ENTITY,
                state: self.status.to_string(),
            }),
            MaintenanceSlipStatus::Sending => {
                self.status = MaintenanceSlipStatus::Cancelled;
                self.updated_at = at;
                Ok(())
            }
            other => Err(StateError::InvalidTransition {
                entity: MaintenanceSlipStatus::ENTITY,
                from: other.to_string(),
                to: MaintenanceSlipStatus::Cancelled.to_string(),
            }),
        }
    }
}

impl Versioned for MaintenanceSlip {
    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ─── Maintenance-return slip ─────────────────────────────────────────

/// Status of a maintenance-return slip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceReturnSlipStatus {
    /// The return is in effect.
    Returned,
    /// The return was reverted (terminal).
    Cancelled,
}

state_names!(MaintenanceReturnSlipStatus, "maintenance return slip", {
    Returned => "RETURNED",
    Cancelled => "CANCELLED",
});

/// One device recorded on a maintenance-return slip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReturnSlipDetail {
    /// Line identifier.
    pub id: DetailId,
    /// Owning return slip.
    pub maintenance_return_slip_id: MaintenanceReturnSlipId,
    /// The resolution applied to the maintenance line.
    pub item: ResolveItem,
}

/// A maintenance-return slip with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReturnSlip {
    /// Unique identifier.
    pub id: MaintenanceReturnSlipId,
    /// Human-readable code.
    pub code: DocumentCode,
    /// The dispatch slip being resolved.
    pub maintenance_slip_id: MaintenanceSlipId,
    /// Status.
    pub status: MaintenanceReturnSlipStatus,
    /// Author of the document.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last change.
    pub updated_at: Timestamp,
    /// Optimistic concurrency version.
    pub version: i64,
    /// Recorded lines.
    pub details: Vec<MaintenanceReturnSlipDetail>,
}

impl MaintenanceReturnSlip {
    /// Record a repair return of `items` against `maintenance_slip_id`.
    pub fn record(
        id: MaintenanceReturnSlipId,
        code: DocumentCode,
        maintenance_slip_id: MaintenanceSlipId,
        items: &[ResolveItem],
        created_by: UserId,
        at: Timestamp,
    ) -> Result<Self, StateError> {
        let devices: Vec<_> = items.iter().map(|i| i.device_id).collect();
        check_distinct("maintenance return slip", &devices)?;
        Ok(Self {
            id,
            code,
            maintenance_slip_id,
            status: MaintenanceReturnSlipStatus::Returned,
            created_by,
            created_at: at,
            updated_at: at,
            version: 0,
            details: items
                .iter()
                .map(|item| MaintenanceReturnSlipDetail {
                    id: DetailId::new(),
                    maintenance_return_slip_id: id,
                    item: item.clone(),
                })
                .collect(),
        })
    }

    /// Cancel the return.
    pub fn cancel(&mut self, at: Timestamp) -> Result<(), StateError> {
        if self.status == MaintenanceReturnSlipStatus::Cancelled {
            return Err(StateError::TerminalState {
                entity: "maintenance return slip",
                state: self.status.to_string(),
            });
        }
        self.status = MaintenanceReturnSlipStatus::Cancelled;
        self.updated_at = at;
        Ok(())
    }
}

impl Versioned for MaintenanceReturnSlip {
    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}
