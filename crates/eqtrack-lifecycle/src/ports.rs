//! # Persistence Boundary
//!
//! The lifecycle engine talks to storage only through [`Store`] and
//! [`Transaction`]. A transaction is a unit of work: every read and write of
//! one cycle operation goes through the same transaction, which is then
//! either committed or rolled back as a whole.
//!
//! Documents are persisted as aggregates. `insert_*` writes a header with all
//! of its lines, `update_*` rewrites the header and every line, and `find_*`
//! returns the header with its lines loaded.
//!
//! ## Versions
//!
//! Devices, headers and warranties carry a `version`. An `update_*` call
//! succeeds only if the stored version equals the one on the value passed in;
//! on success the stored version and the value's version are both bumped.
//! Otherwise the call fails with [`StoreError::Conflict`].

use thiserror::Error;

use eqtrack_core::{
    DeviceId, LoanSlipId, MaintenanceReturnSlipId, MaintenanceSlipId, PartnerId, ReturnSlipId,
    UserId, WarrantyId,
};
use eqtrack_state::{
    Device, LoanSlip, LoanSlipStatus, MaintenanceReturnSlip, MaintenanceSlip,
    MaintenanceSlipStatus, ReturnSlip, Warranty,
};

/// Errors raised by a persistence backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The row changed since it was read.
    #[error("{entity} {id} was modified concurrently")]
    Conflict {
        /// Entity kind.
        entity: &'static str,
        /// Rendered identifier.
        id: String,
    },

    /// A uniqueness rule was violated.
    #[error("duplicate {entity}: {detail}")]
    Duplicate {
        /// Entity kind.
        entity: &'static str,
        /// Backend detail.
        detail: String,
    },

    /// An update addressed a row that does not exist.
    #[error("{entity} {id} is missing")]
    Missing {
        /// Entity kind.
        entity: &'static str,
        /// Rendered identifier.
        id: String,
    },

    /// A stored value could not be decoded.
    #[error("corrupt {entity} row: {detail}")]
    Corrupt {
        /// Entity kind.
        entity: &'static str,
        /// What failed to decode.
        detail: String,
    },

    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// Filter for [`Transaction::find_loan_slips`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanSlipFilter {
    /// Only slips in this status.
    pub status: Option<LoanSlipStatus>,
    /// Only slips lent to this borrower.
    pub borrower_id: Option<UserId>,
}

impl LoanSlipFilter {
    /// Whether `slip` passes the filter.
    pub fn matches(&self, slip: &LoanSlip) -> bool {
        self.status.map_or(true, |s| slip.status == s)
            && self.borrower_id.map_or(true, |b| slip.borrower_id == b)
    }
}

/// Filter for [`Transaction::find_maintenance_slips`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceSlipFilter {
    /// Only slips in this status.
    pub status: Option<MaintenanceSlipStatus>,
    /// Only slips sent to this partner.
    pub partner_id: Option<PartnerId>,
}

impl MaintenanceSlipFilter {
    /// Whether `slip` passes the filter.
    pub fn matches(&self, slip: &MaintenanceSlip) -> bool {
        self.status.map_or(true, |s| slip.status == s)
            && self.partner_id.map_or(true, |p| slip.partner_id == Some(p))
    }
}

/// Filter for [`Transaction::find_warranties`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarrantyFilter {
    /// Only warranties for this device.
    pub device_id: Option<DeviceId>,
    /// Only PENDING and PROCESSING warranties.
    pub open_only: bool,
}

impl WarrantyFilter {
    /// Open warranties of one device.
    pub fn open_for(device_id: DeviceId) -> Self {
        Self {
            device_id: Some(device_id),
            open_only: true,
        }
    }

    /// Whether `warranty` passes the filter.
    pub fn matches(&self, warranty: &Warranty) -> bool {
        self.device_id.map_or(true, |d| warranty.device_id == d)
            && (!self.open_only || warranty.status.is_open())
    }
}

/// A transactional persistence backend.
#[allow(async_fn_in_trait)]
pub trait Store {
    /// The transaction type handed out by [`Store::begin`].
    type Tx: Transaction;

    /// Open a transaction.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// One unit of work against a [`Store`].
#[allow(async_fn_in_trait)]
pub trait Transaction {
    // ── Reference data ───────────────────────────────────────────────

    /// Whether a user exists.
    async fn user_exists(&mut self, id: UserId) -> Result<bool, StoreError>;

    /// Whether a repair partner exists.
    async fn partner_exists(&mut self, id: PartnerId) -> Result<bool, StoreError>;

    // ── Devices ──────────────────────────────────────────────────────

    /// Load a device, soft-deleted ones included.
    async fn find_device(&mut self, id: DeviceId) -> Result<Option<Device>, StoreError>;

    /// Write a device's status. Version-checked.
    async fn update_device(&mut self, device: &mut Device) -> Result<(), StoreError>;

    // ── Loan slips ───────────────────────────────────────────────────

    /// Insert a loan slip with its lines.
    async fn insert_loan_slip(&mut self, slip: &LoanSlip) -> Result<(), StoreError>;

    /// Load a loan slip with its lines.
    async fn find_loan_slip(&mut self, id: LoanSlipId) -> Result<Option<LoanSlip>, StoreError>;

    /// Rewrite a loan slip and its lines. Version-checked.
    async fn update_loan_slip(&mut self, slip: &mut LoanSlip) -> Result<(), StoreError>;

    /// Loan slips passing `filter`, newest first.
    async fn find_loan_slips(&mut self, filter: &LoanSlipFilter)
        -> Result<Vec<LoanSlip>, StoreError>;

    // ── Return slips ─────────────────────────────────────────────────

    /// Insert a return slip with its lines.
    async fn insert_return_slip(&mut self, slip: &ReturnSlip) -> Result<(), StoreError>;

    /// Load a return slip with its lines.
    async fn find_return_slip(&mut self, id: ReturnSlipId)
        -> Result<Option<ReturnSlip>, StoreError>;

    /// Rewrite a return slip header. Version-checked.
    async fn update_return_slip(&mut self, slip: &mut ReturnSlip) -> Result<(), StoreError>;

    // ── Maintenance ──────────────────────────────────────────────────

    /// Insert a maintenance slip with its lines.
    async fn insert_maintenance_slip(&mut self, slip: &MaintenanceSlip)
        -> Result<(), StoreError>;

    /// Load a maintenance slip with its lines.
    async fn find_maintenance_slip(
        &mut self,
        id: MaintenanceSlipId,
    ) -> Result<Option<MaintenanceSlip>, StoreError>;

    /// Rewrite a maintenance slip and its lines. Version-checked.
    async fn update_maintenance_slip(
        &mut self,
        slip: &mut MaintenanceSlip,
    ) -> Result<(), StoreError>;

    /// Maintenance slips passing `filter`, newest first.
    async fn find_maintenance_slips(
        &mut self,
        filter: &MaintenanceSlipFilter,
    ) -> Result<Vec<MaintenanceSlip>, StoreError>;

    /// Insert a maintenance-return slip with its lines.
    async fn insert_maintenance_return_slip(
        &mut self,
        slip: &MaintenanceReturnSlip,
    ) -> Result<(), StoreError>;

    /// Load a maintenance-return slip with its lines.
    async fn find_maintenance_return_slip(
        &mut self,
        id: MaintenanceReturnSlipId,
    ) -> Result<Option<MaintenanceReturnSlip>, StoreError>;

    /// Rewrite a maintenance-return slip header. Version-checked.
    async fn update_maintenance_return_slip(
        &mut self,
        slip: &mut MaintenanceReturnSlip,
    ) -> Result<(), StoreError>;

    // ── Warranties ───────────────────────────────────────────────────

    /// Insert a warranty. Fails with `Duplicate` if the device already has
    /// an open warranty.
    async fn insert_warranty(&mut self, warranty: &Warranty) -> Result<(), StoreError>;

    /// Load a warranty.
    async fn find_warranty(&mut self, id: WarrantyId) -> Result<Option<Warranty>, StoreError>;

    /// Rewrite a warranty. Version-checked.
    async fn update_warranty(&mut self, warranty: &mut Warranty) -> Result<(), StoreError>;

    /// Warranties passing `filter`, newest first.
    async fn find_warranties(&mut self, filter: &WarrantyFilter)
        -> Result<Vec<Warranty>, StoreError>;

    // ── Sequences ────────────────────────────────────────────────────

    /// Atomically increment and return the counter for `key`, starting at 1.
    async fn next_sequence(&mut self, key: &str) -> Result<u32, StoreError>;

    // ── Completion ───────────────────────────────────────────────────

    /// Make every write of this transaction durable.
    async fn commit(self) -> Result<(), StoreError>;

    /// Discard every write of this transaction.
    async fn rollback(self) -> Result<(), StoreError>;
}
