//! # Device State Store
//!
//! The only path through which the cycles change a device's status. Every
//! move is checked against the device transition table, version-checked on
//! write, and scoped to the caller's transaction.

use std::collections::HashSet;

use eqtrack_core::{DeviceId, Timestamp};
use eqtrack_state::{Device, DeviceStatus};

use crate::error::CycleError;
use crate::ports::Transaction;

/// Device status operations inside one transaction.
pub struct DeviceStateStore<'t, T: Transaction> {
    tx: &'t mut T,
}

impl<'t, T: Transaction> DeviceStateStore<'t, T> {
    /// Borrow `tx` for device operations.
    pub fn new(tx: &'t mut T) -> Self {
        Self { tx }
    }

    /// Load a live device. Missing and soft-deleted devices are `NotFound`.
    pub async fn load(&mut self, id: DeviceId) -> Result<Device, CycleError> {
        match self.tx.find_device(id).await? {
            Some(device) if !device.is_deleted() => Ok(device),
            _ => Err(CycleError::not_found("device", id)),
        }
    }

    /// Move `id` to `next`.
    ///
    /// With `expected` set, the current status must match it
    /// (`PreconditionFailed` otherwise). A move to the current status is a
    /// no-op. A move outside the transition table is a `Conflict`.
    pub async fn transition(
        &mut self,
        id: DeviceId,
        expected: Option<DeviceStatus>,
        next: DeviceStatus,
        at: Timestamp,
    ) -> Result<Device, CycleError> {
        let mut device = self.load(id).await?;
        if let Some(expected) = expected {
            if device.status != expected {
                return Err(CycleError::PreconditionFailed(format!(
                    "{id} is {}, expected {expected}",
                    device.status
                )));
            }
        }
        if device.status == next {
            return Ok(device);
        }
        let previous = device.apply_status(next, at)?;
        self.tx.update_device(&mut device).await?;
        tracing::debug!(device = %id, from = %previous, to = %next, "device transitioned");
        Ok(device)
    }

    /// Load every device in `ids` and require each to be in `status`.
    ///
    /// Empty or repeated ids, missing devices and devices in another status
    /// are all `Validation` errors. Nothing is written.
    pub async fn require(
        &mut self,
        ids: &[DeviceId],
        status: DeviceStatus,
    ) -> Result<Vec<Device>, CycleError> {
        if ids.is_empty() {
            return Err(CycleError::Validation("no devices given".into()));
        }
        let mut seen = HashSet::with_capacity(ids.len());
        let mut devices = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                return Err(CycleError::Validation(format!("{id} appears more than once")));
            }
            let device = match self.load(*id).await {
                Ok(device) => device,
                Err(CycleError::NotFound { .. }) => {
                    return Err(CycleError::Validation(format!("{id} does not exist")))
                }
                Err(other) => return Err(other),
            };
            if device.status != status {
                return Err(CycleError::Validation(format!(
                    "{id} is {}, expected {status}",
                    device.status
                )));
            }
            devices.push(device);
        }
        Ok(devices)
    }
}
