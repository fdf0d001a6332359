//! # Warranty State Machine
//!
//! ```text
//! PENDING ──▶ PROCESSING ──▶ COMPLETED
//!    │            │
//!    └────────────┴────────▶ REJECTED
//! ```
//!
//! A warranty is opened either directly by an operator or automatically when
//! a document line is resolved as BROKEN. The device status observed when the
//! warranty was opened is stored, and a rejection restores it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use eqtrack_core::{
    CoreError, DeviceId, DocumentCode, LoanSlipId, MaintenanceReturnSlipId, ReturnSlipId,
    Timestamp, UserId, WarrantyId,
};

use crate::device::DeviceStatus;
use crate::error::StateError;
use crate::progress::Versioned;

const ENTITY: &str = "warranty";

/// Status of a warranty request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarrantyStatus {
    /// Requested, not yet handed to the manufacturer.
    Pending,
    /// With the manufacturer.
    Processing,
    /// Serviced (terminal).
    Completed,
    /// Refused or withdrawn (terminal).
    Rejected,
}

state_names!(WarrantyStatus, "warranty", {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Rejected => "REJECTED",
});

impl WarrantyStatus {
    /// Statuses that count against the one-open-warranty-per-device rule.
    pub const OPEN: [WarrantyStatus; 2] = [Self::Pending, Self::Processing];

    /// Whether the warranty is still open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Whether the warranty reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// Transition table.
    pub fn can_transition_to(&self, next: WarrantyStatus) -> bool {
        use WarrantyStatus::*;
        match self {
            Pending => matches!(next, Processing | Rejected),
            Processing => matches!(next, Completed | Rejected),
            Completed | Rejected => false,
        }
    }
}

/// What opened a warranty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarrantySource {
    /// An operator request.
    Direct,
    /// A BROKEN resolution recorded directly on a loan slip.
    LoanSlip(LoanSlipId),
    /// A BROKEN resolution recorded by a return slip.
    ReturnSlip(ReturnSlipId),
    /// A BROKEN resolution recorded by a maintenance-return slip.
    MaintenanceReturnSlip(MaintenanceReturnSlipId),
}

impl WarrantySource {
    /// Persisted discriminator.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Direct => "DIRECT",
            Self::LoanSlip(_) => "LOAN_SLIP",
            Self::ReturnSlip(_) => "RETURN_SLIP",
            Self::MaintenanceReturnSlip(_) => "MAINTENANCE_RETURN_SLIP",
        }
    }

    /// The source document, if any.
    pub fn document_id(&self) -> Option<Uuid> {
        match self {
            Self::Direct => None,
            Self::LoanSlip(id) => Some(id.0),
            Self::ReturnSlip(id) => Some(id.0),
            Self::MaintenanceReturnSlip(id) => Some(id.0),
        }
    }

    /// Rebuild a source from its persisted columns.
    pub fn from_parts(kind: &str, document_id: Option<Uuid>) -> Result<Self, CoreError> {
        let unknown = || CoreError::UnknownState {
            kind: "warranty source",
            value: format!("{kind}:{document_id:?}"),
        };
        match (kind, document_id) {
            ("DIRECT", None) => Ok(Self::Direct),
            ("LOAN_SLIP", Some(id)) => Ok(Self::LoanSlip(id.into())),
            ("RETURN_SLIP", Some(id)) => Ok(Self::ReturnSlip(id.into())),
            ("MAINTENANCE_RETURN_SLIP", Some(id)) => Ok(Self::MaintenanceReturnSlip(id.into())),
            _ => Err(unknown()),
        }
    }
}

/// A warranty request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warranty {
    /// Unique identifier.
    pub id: WarrantyId,
    /// Human-readable code.
    pub code: DocumentCode,
    /// The device under warranty.
    pub device_id: DeviceId,
    /// Why service is requested.
    pub reason: String,
    /// Business date of the request.
    pub request_date: NaiveDate,
    /// Status.
    pub status: WarrantyStatus,
    /// Device status when the warranty was opened.
    pub prior_device_status: DeviceStatus,
    /// What opened the warranty.
    pub source: WarrantySource,
    /// Author of the request.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last change.
    pub updated_at: Timestamp,
    /// Optimistic concurrency version.
    pub version: i64,
}

impl Warranty {
    /// Open a PENDING warranty.
    #[allow(clippy::too_many_arguments)]
    pub fn request(
        code: DocumentCode,
        device_id: DeviceId,
        reason: impl Into<String>,
        request_date: NaiveDate,
        prior_device_status: DeviceStatus,
        source: WarrantySource,
        created_by: UserId,
        at: Timestamp,
    ) -> Self {
        Self {
            id: WarrantyId::new(),
            code,
            device_id,
            reason: reason.into(),
            request_date,
            status: WarrantyStatus::Pending,
            prior_device_status,
            source,
            created_by,
            created_at: at,
            updated_at: at,
            version: 0,
        }
    }

    fn transition(&mut self, next: WarrantyStatus, at: Timestamp) -> Result<(), StateError> {
        if self.status.is_terminal() {
            return Err(StateError::TerminalState {
                entity: ENTITY,
                state: self.status.to_string(),
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                entity: ENTITY,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// PENDING → PROCESSING.
    pub fn assign(&mut self, at: Timestamp) -> Result<(), StateError> {
        self.transition(WarrantyStatus::Processing, at)
    }

    /// PROCESSING → COMPLETED.
    pub fn complete(&mut self, at: Timestamp) -> Result<(), StateError> {
        self.transition(WarrantyStatus::Completed, at)
    }

    /// PENDING | PROCESSING → REJECTED. Returns the device status to restore.
    pub fn reject(&mut self, at: Timestamp) -> Result<DeviceStatus, StateError> {
        self.transition(WarrantyStatus::Rejected, at)?;
        Ok(self.prior_device_status)
    }
}

impl Versioned for Warranty {
    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eqtrack_core::DocumentKind;

    fn warranty(prior: DeviceStatus, source: WarrantySource) -> Warranty {
        let day = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        Warranty::request(
            DocumentCode::format(DocumentKind::Warranty, day, 1),
            DeviceId::new(),
            "dead pixel",
            day,
            prior,
            source,
            UserId::new(),
            Timestamp::now(),
        )
    }

    // ── Transitions ──────────────────────────────────────────────────

    #[test]
    fn test_happy_path() {
        let mut w = warranty(DeviceStatus::Available, WarrantySource::Direct);
        assert!(w.status.is_open());
        w.assign(Timestamp::now()).unwrap();
        assert_eq!(w.status, WarrantyStatus::Processing);
        w.complete(Timestamp::now()).unwrap();
        assert_eq!(w.status, WarrantyStatus::Completed);
        assert!(w.status.is_terminal());
    }

    #[test]
    fn test_cannot_complete_pending() {
        let mut w = warranty(DeviceStatus::Available, WarrantySource::Direct);
        let err = w.complete(Timestamp::now()).unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
        assert_eq!(w.status, WarrantyStatus::Pending);
    }

    #[test]
    fn test_reject_returns_prior_status() {
        let mut w = warranty(DeviceStatus::Broken, WarrantySource::LoanSlip(LoanSlipId::new()));
        w.assign(Timestamp::now()).unwrap();
        assert_eq!(w.reject(Timestamp::now()).unwrap(), DeviceStatus::Broken);
    }

    #[test]
    fn test_terminal_rejects_everything() {
        let mut w = warranty(DeviceStatus::Available, WarrantySource::Direct);
        w.reject(Timestamp::now()).unwrap();
        for result in [
            w.assign(Timestamp::now()),
            w.complete(Timestamp::now()),
            w.reject(Timestamp::now()).map(|_| ()),
        ] {
            assert!(matches!(result, Err(StateError::TerminalState { .. })));
        }
    }

    // ── Source ───────────────────────────────────────────────────────

    #[test]
    fn test_source_parts_roundtrip() {
        let sources = [
            WarrantySource::Direct,
            WarrantySource::LoanSlip(LoanSlipId::new()),
            WarrantySource::ReturnSlip(ReturnSlipId::new()),
            WarrantySource::MaintenanceReturnSlip(MaintenanceReturnSlipId::new()),
        ];
        for source in sources {
            let rebuilt = WarrantySource::from_parts(source.kind_str(), source.document_id()).unwrap();
            assert_eq!(rebuilt, source);
        }
        assert!(WarrantySource::from_parts("DIRECT", Some(Uuid::nil())).is_err());
        assert!(WarrantySource::from_parts("RETURN_SLIP", None).is_err());
    }

    #[test]
    fn test_source_serialization() {
        let id = ReturnSlipId::new();
        let json = serde_json::to_value(WarrantySource::ReturnSlip(id)).unwrap();
        assert_eq!(json["kind"], "RETURN_SLIP");
        assert_eq!(json["id"], id.0.to_string());
    }
}
