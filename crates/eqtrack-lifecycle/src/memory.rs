//! # In-Memory Store
//!
//! A [`Store`] for tests, demos and single-process deployments without a
//! database.
//!
//! ## Transactions
//!
//! `begin` clones the committed tables into a private snapshot. Reads and
//! writes go to the snapshot; every written row remembers the version it
//! had when first written. `commit` takes the table lock, checks that no
//! written row changed since (first committer wins), re-checks the
//! one-open-warranty rule, and copies the written rows back. `rollback`
//! drops the snapshot.
//!
//! Sequences are not transactional: `next_sequence` increments a shared
//! counter immediately, so a rolled-back operation leaves a gap but never
//! a duplicate.
//!
//! ## Fail points
//!
//! [`MemoryStore::fail_nth`] arms a one-shot failure on the n-th call of a
//! write path, for atomicity tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use eqtrack_core::{
    DeviceId, LoanSlipId, MaintenanceReturnSlipId, MaintenanceSlipId, PartnerId, ReturnSlipId,
    Timestamp, UserId, WarrantyId,
};
use eqtrack_state::{
    Device, LoanSlip, MaintenanceReturnSlip, MaintenanceSlip, ReturnSlip, Versioned, Warranty,
};

use crate::ports::{
    LoanSlipFilter, MaintenanceSlipFilter, Store, StoreError, Transaction, WarrantyFilter,
};

/// Write paths that can be armed to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `update_device`.
    DeviceUpdate,
    /// Any `insert_*` of a document header.
    HeaderInsert,
    /// Any `update_*` of a document header.
    HeaderUpdate,
    /// `insert_warranty`.
    WarrantyInsert,
    /// `update_warranty`.
    WarrantyUpdate,
    /// `commit`, before anything is checked.
    Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Device(DeviceId),
    LoanSlip(LoanSlipId),
    ReturnSlip(ReturnSlipId),
    MaintenanceSlip(MaintenanceSlipId),
    MaintenanceReturnSlip(MaintenanceReturnSlipId),
    Warranty(WarrantyId),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashSet<UserId>,
    partners: HashSet<PartnerId>,
    devices: HashMap<DeviceId, Device>,
    loan_slips: HashMap<LoanSlipId, LoanSlip>,
    return_slips: HashMap<ReturnSlipId, ReturnSlip>,
    maintenance_slips: HashMap<MaintenanceSlipId, MaintenanceSlip>,
    maintenance_return_slips: HashMap<MaintenanceReturnSlipId, MaintenanceReturnSlip>,
    warranties: HashMap<WarrantyId, Warranty>,
}

impl Tables {
    fn version_of(&self, key: RowKey) -> Option<i64> {
        match key {
            RowKey::Device(id) => self.devices.get(&id).map(Versioned::version),
            RowKey::LoanSlip(id) => self.loan_slips.get(&id).map(Versioned::version),
            RowKey::ReturnSlip(id) => self.return_slips.get(&id).map(Versioned::version),
            RowKey::MaintenanceSlip(id) => self.maintenance_slips.get(&id).map(Versioned::version),
            RowKey::MaintenanceReturnSlip(id) => {
                self.maintenance_return_slips.get(&id).map(Versioned::version)
            }
            RowKey::Warranty(id) => self.warranties.get(&id).map(Versioned::version),
        }
    }

    fn copy_row(&mut self, from: &Tables, key: RowKey) {
        fn copy<K, V>(to: &mut HashMap<K, V>, from: &HashMap<K, V>, id: K)
        where
            K: std::hash::Hash + Eq + Copy,
            V: Clone,
        {
            if let Some(row) = from.get(&id) {
                to.insert(id, row.clone());
            }
        }
        match key {
            RowKey::Device(id) => copy(&mut self.devices, &from.devices, id),
            RowKey::LoanSlip(id) => copy(&mut self.loan_slips, &from.loan_slips, id),
            RowKey::ReturnSlip(id) => copy(&mut self.return_slips, &from.return_slips, id),
            RowKey::MaintenanceSlip(id) => {
                copy(&mut self.maintenance_slips, &from.maintenance_slips, id)
            }
            RowKey::MaintenanceReturnSlip(id) => copy(
                &mut self.maintenance_return_slips,
                &from.maintenance_return_slips,
                id,
            ),
            RowKey::Warranty(id) => copy(&mut self.warranties, &from.warranties, id),
        }
    }

    fn open_warranty_conflict(&self, warranty: &Warranty) -> bool {
        warranty.status.is_open()
            && self.warranties.values().any(|other| {
                other.id != warranty.id
                    && other.device_id == warranty.device_id
                    && other.status.is_open()
            })
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    sequences: Mutex<HashMap<String, u32>>,
    fail_points: Mutex<HashMap<FailPoint, usize>>,
}

impl Shared {
    fn hit(&self, point: FailPoint) -> Result<(), StoreError> {
        let mut armed = self.fail_points.lock();
        if let Some(remaining) = armed.get_mut(&point) {
            *remaining -= 1;
            if *remaining == 0 {
                armed.remove(&point);
                return Err(StoreError::Backend(format!("injected failure at {point:?}")));
            }
        }
        Ok(())
    }
}

/// Shared-state in-memory backend. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user.
    pub fn add_user(&self) -> UserId {
        let id = UserId::new();
        self.shared.tables.lock().users.insert(id);
        id
    }

    /// Register a repair partner.
    pub fn add_partner(&self) -> PartnerId {
        let id = PartnerId::new();
        self.shared.tables.lock().partners.insert(id);
        id
    }

    /// Register a device as given.
    pub fn add_device(&self, device: Device) -> DeviceId {
        let id = device.id;
        self.shared.tables.lock().devices.insert(id, device);
        id
    }

    /// Soft-delete a device, as reference-data management would.
    pub fn soft_delete_device(&self, id: DeviceId) {
        if let Some(device) = self.shared.tables.lock().devices.get_mut(&id) {
            device.deleted_at = Some(Timestamp::now());
            device.version += 1;
        }
    }

    /// Committed state of a device.
    pub fn device(&self, id: DeviceId) -> Option<Device> {
        self.shared.tables.lock().devices.get(&id).cloned()
    }

    /// Committed warranties of a device.
    pub fn warranties_of(&self, id: DeviceId) -> Vec<Warranty> {
        let tables = self.shared.tables.lock();
        let mut found: Vec<Warranty> = tables
            .warranties
            .values()
            .filter(|w| w.device_id == id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.code.cmp(&b.code));
        found
    }

    /// Fail the `n`-th subsequent call of `point` (1 = the next one).
    pub fn fail_nth(&self, point: FailPoint, n: usize) {
        if n > 0 {
            self.shared.fail_points.lock().insert(point, n);
        }
    }

    /// Fail the next call of `point`.
    pub fn fail_once(&self, point: FailPoint) {
        self.fail_nth(point, 1);
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        let snapshot = self.shared.tables.lock().clone();
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            snapshot,
            written: HashMap::new(),
        })
    }
}

/// A snapshot transaction over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    snapshot: Tables,
    /// Row → version when first written (`None` for inserts).
    written: HashMap<RowKey, Option<i64>>,
}

impl MemoryTransaction {
    fn note_insert(&mut self, key: RowKey) -> Result<(), StoreError> {
        if self.snapshot.version_of(key).is_some() {
            return Err(StoreError::Duplicate {
                entity: entity_of(key),
                detail: format!("{key:?} already exists"),
            });
        }
        self.written.entry(key).or_insert(None);
        Ok(())
    }

    /// Check `row` against the snapshot and bump its version.
    fn note_update<V: Versioned>(
        &mut self,
        key: RowKey,
        row: &mut V,
        id: impl std::fmt::Display,
    ) -> Result<(), StoreError> {
        let entity = entity_of(key);
        match self.snapshot.version_of(key) {
            None => Err(StoreError::Missing {
                entity,
                id: id.to_string(),
            }),
            Some(current) if current != row.version() => Err(StoreError::Conflict {
                entity,
                id: id.to_string(),
            }),
            Some(current) => {
                self.written.entry(key).or_insert(Some(current));
                row.set_version(current + 1);
                Ok(())
            }
        }
    }
}

fn entity_of(key: RowKey) -> &'static str {
    match key {
        RowKey::Device(_) => "device",
        RowKey::LoanSlip(_) => "loan slip",
        RowKey::ReturnSlip(_) => "return slip",
        RowKey::MaintenanceSlip(_) => "maintenance slip",
        RowKey::MaintenanceReturnSlip(_) => "maintenance return slip",
        RowKey::Warranty(_) => "warranty",
    }
}

fn newest_first<T, F>(mut rows: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (Timestamp, String),
{
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}

impl Transaction for MemoryTransaction {
    async fn user_exists(&mut self, id: UserId) -> Result<bool, StoreError> {
        Ok(self.snapshot.users.contains(&id))
    }

    async fn partner_exists(&mut self, id: PartnerId) -> Result<bool, StoreError> {
        Ok(self.snapshot.partners.contains(&id))
    }

    async fn find_device(&mut self, id: DeviceId) -> Result<Option<Device>, StoreError> {
        Ok(self.snapshot.devices.get(&id).cloned())
    }

    async fn update_device(&mut self, device: &mut Device) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::DeviceUpdate)?;
        self.note_update(RowKey::Device(device.id), device, device.id)?;
        self.snapshot.devices.insert(device.id, device.clone());
        Ok(())
    }

    async fn insert_loan_slip(&mut self, slip: &LoanSlip) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::HeaderInsert)?;
        self.note_insert(RowKey::LoanSlip(slip.id))?;
        self.snapshot.loan_slips.insert(slip.id, slip.clone());
        Ok(())
    }

    async fn find_loan_slip(&mut self, id: LoanSlipId) -> Result<Option<LoanSlip>, StoreError> {
        Ok(self.snapshot.loan_slips.get(&id).cloned())
    }

    async fn update_loan_slip(&mut self, slip: &mut LoanSlip) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::HeaderUpdate)?;
        self.note_update(RowKey::LoanSlip(slip.id), slip, slip.id)?;
        self.snapshot.loan_slips.insert(slip.id, slip.clone());
        Ok(())
    }

    async fn find_loan_slips(
        &mut self,
        filter: &LoanSlipFilter,
    ) -> Result<Vec<LoanSlip>, StoreError> {
        let rows = self
            .snapshot
            .loan_slips
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        Ok(newest_first(rows, |s: &LoanSlip| {
            (s.created_at, s.code.to_string())
        }))
    }

    async fn insert_return_slip(&mut self, slip: &ReturnSlip) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::HeaderInsert)?;
        self.note_insert(RowKey::ReturnSlip(slip.id))?;
        self.snapshot.return_slips.insert(slip.id, slip.clone());
        Ok(())
    }

    async fn find_return_slip(
        &mut self,
        id: ReturnSlipId,
    ) -> Result<Option<ReturnSlip>, StoreError> {
        Ok(self.snapshot.return_slips.get(&id).cloned())
    }

    async fn update_return_slip(&mut self, slip: &mut ReturnSlip) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::HeaderUpdate)?;
        self.note_update(RowKey::ReturnSlip(slip.id), slip, slip.id)?;
        self.snapshot.return_slips.insert(slip.id, slip.clone());
        Ok(())
    }

    async fn insert_maintenance_slip(&mut self, slip: &MaintenanceSlip) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::HeaderInsert)?;
        self.note_insert(RowKey::MaintenanceSlip(slip.id))?;
        self.snapshot.maintenance_slips.insert(slip.id, slip.clone());
        Ok(())
    }

    async fn find_maintenance_slip(
        &mut self,
        id: MaintenanceSlipId,
    ) -> Result<Option<MaintenanceSlip>, StoreError> {
        Ok(self.snapshot.maintenance_slips.get(&id).cloned())
    }

    async fn update_maintenance_slip(
        &mut self,
        slip: &mut MaintenanceSlip,
    ) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::HeaderUpdate)?;
        self.note_update(RowKey::MaintenanceSlip(slip.id), slip, slip.id)?;
        self.snapshot.maintenance_slips.insert(slip.id, slip.clone());
        Ok(())
    }

    async fn find_maintenance_slips(
        &mut self,
        filter: &MaintenanceSlipFilter,
    ) -> Result<Vec<MaintenanceSlip>, StoreError> {
        let rows = self
            .snapshot
            .maintenance_slips
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        Ok(newest_first(rows, |s: &MaintenanceSlip| {
            (s.created_at, s.code.to_string())
        }))
    }

    async fn insert_maintenance_return_slip(
        &mut self,
        slip: &MaintenanceReturnSlip,
    ) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::HeaderInsert)?;
        self.note_insert(RowKey::MaintenanceReturnSlip(slip.id))?;
        self.snapshot
            .maintenance_return_slips
            .insert(slip.id, slip.clone());
        Ok(())
    }

    async fn find_maintenance_return_slip(
        &mut self,
        id: MaintenanceReturnSlipId,
    ) -> Result<Option<MaintenanceReturnSlip>, StoreError> {
        Ok(self.snapshot.maintenance_return_slips.get(&id).cloned())
    }

    async fn update_maintenance_return_slip(
        &mut self,
        slip: &mut MaintenanceReturnSlip,
    ) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::HeaderUpdate)?;
        self.note_update(RowKey::MaintenanceReturnSlip(slip.id), slip, slip.id)?;
        self.snapshot
            .maintenance_return_slips
            .insert(slip.id, slip.clone());
        Ok(())
    }

    async fn insert_warranty(&mut self, warranty: &Warranty) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::WarrantyInsert)?;
        if self.snapshot.open_warranty_conflict(warranty) {
            return Err(StoreError::Duplicate {
                entity: "warranty",
                detail: format!("{} already has an open warranty", warranty.device_id),
            });
        }
        self.note_insert(RowKey::Warranty(warranty.id))?;
        self.snapshot.warranties.insert(warranty.id, warranty.clone());
        Ok(())
    }

    async fn find_warranty(&mut self, id: WarrantyId) -> Result<Option<Warranty>, StoreError> {
        Ok(self.snapshot.warranties.get(&id).cloned())
    }

    async fn update_warranty(&mut self, warranty: &mut Warranty) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::WarrantyUpdate)?;
        self.note_update(RowKey::Warranty(warranty.id), warranty, warranty.id)?;
        self.snapshot.warranties.insert(warranty.id, warranty.clone());
        Ok(())
    }

    async fn find_warranties(
        &mut self,
        filter: &WarrantyFilter,
    ) -> Result<Vec<Warranty>, StoreError> {
        let rows = self
            .snapshot
            .warranties
            .values()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect();
        Ok(newest_first(rows, |w: &Warranty| {
            (w.created_at, w.code.to_string())
        }))
    }

    async fn next_sequence(&mut self, key: &str) -> Result<u32, StoreError> {
        let mut sequences = self.shared.sequences.lock();
        let counter = sequences.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.shared.hit(FailPoint::Commit)?;
        // Let transactions polled concurrently reach this point before the
        // first one publishes.
        tokio::task::yield_now().await;

        let mut tables = self.shared.tables.lock();
        for (key, base) in &self.written {
            if tables.version_of(*key) != *base {
                return Err(StoreError::Conflict {
                    entity: entity_of(*key),
                    id: format!("{key:?}"),
                });
            }
        }
        for key in self.written.keys() {
            if let RowKey::Warranty(id) = key {
                let conflict = self
                    .snapshot
                    .warranties
                    .get(id)
                    .is_some_and(|w| tables.open_warranty_conflict(w));
                if conflict {
                    return Err(StoreError::Duplicate {
                        entity: "warranty",
                        detail: format!("{key:?} would be a second open warranty"),
                    });
                }
            }
        }
        for key in self.written.keys() {
            tables.copy_row(&self.snapshot, *key);
        }
        tracing::debug!(rows = self.written.len(), "memory transaction committed");
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        tracing::debug!(rows = self.written.len(), "memory transaction rolled back");
        Ok(())
    }
}
