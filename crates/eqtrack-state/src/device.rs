//! # Device Status State Machine
//!
//! The single authoritative status of a physical device.
//!
//! ```text
//!              ┌──────────▶ ON_LOAN ─────────┐
//!              │                             ▼
//! AVAILABLE ───┼──────────▶ MAINTENANCE ──▶ AVAILABLE | BROKEN
//!              │
//!              └──────────▶ UNDER_WARRANTY ─▶ AVAILABLE | BROKEN
//!
//! BROKEN ──▶ UNDER_WARRANTY | AVAILABLE
//! BROKEN ──▶ ON_LOAN | MAINTENANCE      (compensation of a BROKEN resolution)
//! ```
//!
//! Which document may move a device, and from which state, is decided by the
//! lifecycle engine. This module only rejects moves that are never legal.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use eqtrack_core::{DeviceId, Timestamp};

use crate::error::StateError;
use crate::progress::Versioned;

/// Lifecycle status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    /// In stock and free to dispatch.
    Available,
    /// Lent to an external borrower.
    OnLoan,
    /// Dispatched for internal repair.
    Maintenance,
    /// With the manufacturer under a warranty request.
    UnderWarranty,
    /// Reported broken.
    Broken,
}

state_names!(DeviceStatus, "device", {
    Available => "AVAILABLE",
    OnLoan => "ON_LOAN",
    Maintenance => "MAINTENANCE",
    UnderWarranty => "UNDER_WARRANTY",
    Broken => "BROKEN",
});

impl DeviceStatus {
    /// Transition table. Self-transitions are not listed.
    pub fn can_transition_to(&self, next: DeviceStatus) -> bool {
        use DeviceStatus::*;
        match self {
            Available => matches!(next, OnLoan | Maintenance | UnderWarranty | Broken),
            OnLoan => matches!(next, Available | Broken),
            Maintenance => matches!(next, Available | Broken),
            UnderWarranty => matches!(next, Available | Broken),
            Broken => matches!(next, UnderWarranty | Available | OnLoan | Maintenance),
        }
    }

    /// Whether a document currently holds the device.
    pub fn is_held(&self) -> bool {
        matches!(self, Self::OnLoan | Self::Maintenance | Self::UnderWarranty)
    }
}

/// A tracked device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique identifier.
    pub id: DeviceId,
    /// Display name.
    pub name: String,
    /// Manufacturer serial number.
    pub serial_number: Option<String>,
    /// Current status.
    pub status: DeviceStatus,
    /// Last day covered by the manufacturer warranty, if known.
    pub warranty_expiration_date: Option<NaiveDate>,
    /// Optimistic concurrency version.
    pub version: i64,
    /// When the device was registered.
    pub created_at: Timestamp,
    /// Last status change.
    pub updated_at: Timestamp,
    /// Soft-delete marker set by reference-data management.
    pub deleted_at: Option<Timestamp>,
}

impl Device {
    /// Register a new AVAILABLE device.
    pub fn new(name: impl Into<String>, warranty_expiration_date: Option<NaiveDate>) -> Self {
        let now = Timestamp::now();
        Self {
            id: DeviceId::new(),
            name: name.into(),
            serial_number: None,
            status: DeviceStatus::Available,
            warranty_expiration_date,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Attach a serial number.
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    /// Whether reference-data management removed this device.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether a warranty request dated `request_date` is within coverage.
    /// A device without a recorded expiry date is not limited.
    pub fn warranty_covers(&self, request_date: NaiveDate) -> bool {
        self.warranty_expiration_date
            .map_or(true, |expiry| request_date <= expiry)
    }

    /// Move to `next`, returning the previous status.
    pub fn apply_status(
        &mut self,
        next: DeviceStatus,
        at: Timestamp,
    ) -> Result<DeviceStatus, StateError> {
        let previous = self.status;
        if previous == next {
            return Ok(previous);
        }
        if !previous.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                entity: "device",
                from: previous.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(previous)
    }
}

impl Versioned for Device {
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

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_device_is_available() {
        let device = Device::new("Projector", None).with_serial("SN-1");
        assert_eq!(device.status, DeviceStatus::Available);
        assert_eq!(device.serial_number.as_deref(), Some("SN-1"));
        assert!(!device.is_deleted());
    }

    #[test]
    fn test_loan_and_return() {
        let mut device = Device::new("Laptop", None);
        let prev = device.apply_status(DeviceStatus::OnLoan, Timestamp::now()).unwrap();
        assert_eq!(prev, DeviceStatus::Available);
        device.apply_status(DeviceStatus::Available, Timestamp::now()).unwrap();
        assert_eq!(device.status, DeviceStatus::Available);
    }

    #[test]
    fn test_cannot_loan_from_maintenance() {
        let mut device = Device::new("Laptop", None);
        device.apply_status(DeviceStatus::Maintenance, Timestamp::now()).unwrap();
        let err = device.apply_status(DeviceStatus::OnLoan, Timestamp::now()).unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { entity: "device", .. }));
        assert_eq!(device.status, DeviceStatus::Maintenance);
    }

    #[test]
    fn test_self_transition_is_noop() {
        let mut device = Device::new("Laptop", None);
        let before = device.updated_at;
        device.apply_status(DeviceStatus::Available, before.plus_days(1)).unwrap();
        assert_eq!(device.updated_at, before);
    }

    #[test]
    fn test_warranty_coverage_boundary() {
        let device = Device::new("Camera", Some(date(2026, 6, 30)));
        assert!(device.warranty_covers(date(2026, 6, 30)));
        assert!(!device.warranty_covers(date(2026, 7, 1)));
        assert!(Device::new("Camera", None).warranty_covers(date(2099, 1, 1)));
    }

    #[test]
    fn test_status_names_roundtrip() {
        for status in DeviceStatus::ALL {
            assert_eq!(status.as_str().parse::<DeviceStatus>().unwrap(), *status);
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("LOST".parse::<DeviceStatus>().is_err());
    }

    #[test]
    fn test_no_self_loops_in_table() {
        for status in DeviceStatus::ALL {
            assert!(!status.can_transition_to(*status));
        }
    }
}
