//! # eqtrack-state: Lifecycle State Machines
//!
//! Pure, persistence-free state machines for every record the lifecycle core
//! moves. Each entity owns its status enum and an exhaustive transition table;
//! nothing here touches storage or knows about transactions.
//!
//! ## State Machines
//!
//! - **Device** (`device.rs`): AVAILABLE / ON_LOAN / MAINTENANCE /
//!   UNDER_WARRANTY / BROKEN.
//!
//! - **Loan slip** (`loan.rs`): BORROWING → PARTIAL_RETURNED → CLOSED, or
//!   CANCELLED. Lines go BORROWED → RETURNED | BROKEN.
//!
//! - **Return slip** (`returns.rs`): RETURNED → CANCELLED.
//!
//! - **Maintenance** (`maintenance.rs`): SENDING → PARTIAL_RETURNED → CLOSED,
//!   or CANCELLED; lines SENT → RETURNED | BROKEN. Maintenance-return slips
//!   mirror return slips.
//!
//! - **Warranty** (`warranty.rs`): PENDING → PROCESSING → COMPLETED, or
//!   REJECTED from either open state.
//!
//! ## Aggregate Status
//!
//! A header's status is never set directly by callers once lines exist.
//! [`progress::derive_header_status`] computes it from the mix of resolved and
//! open lines, and rejects recomputation on a cancelled header.

#[macro_use]
mod names;

pub mod device;
pub mod error;
pub mod loan;
pub mod maintenance;
pub mod progress;
pub mod returns;
pub mod warranty;

pub use device::{Device, DeviceStatus};
pub use error::StateError;
pub use loan::{LoanLineStatus, LoanSlip, LoanSlipDetail, LoanSlipStatus};
pub use maintenance::{
    MaintenanceLineStatus, MaintenanceReturnSlip, MaintenanceReturnSlipDetail,
    MaintenanceReturnSlipStatus, MaintenanceSlip, MaintenanceSlipDetail, MaintenanceSlipStatus,
};
pub use progress::{
    check_distinct, derive_header_status, progress_of, HeaderStatus, LineResolution, LineStatus,
    Progress, ResolveItem, Versioned,
};
pub use returns::{ReturnSlip, ReturnSlipDetail, ReturnSlipStatus};
pub use warranty::{Warranty, WarrantySource, WarrantyStatus};
