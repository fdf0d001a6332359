//! # eqtrack-core: Foundational Types
//!
//! The leaf of the eqtrack crate graph. Defines the primitives every other
//! crate builds on:
//!
//! 1. **Typed identifiers.** `DeviceId`, `LoanSlipId`, `WarrantyId`, ... are
//!    distinct newtypes over UUIDs, so a loan slip id cannot be passed where a
//!    maintenance slip id is expected.
//!
//! 2. **UTC-only timestamps.** [`Timestamp`] is always UTC, seconds precision.
//!    Calendar-day questions (code sequencing) are answered explicitly in a
//!    caller-supplied offset.
//!
//! 3. **Document codes.** [`DocumentCode`] renders the human-readable
//!    `PREFIX_DDMMYY_NNN` code of a document header. The counter itself lives
//!    behind the persistence boundary.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `eqtrack-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod code;
pub mod error;
pub mod identity;
pub mod temporal;

pub use code::{DocumentCode, DocumentKind};
pub use error::CoreError;
pub use identity::{
    DetailId, DeviceId, LoanSlipId, MaintenanceReturnSlipId, MaintenanceSlipId, PartnerId,
    ReturnSlipId, UserId, WarrantyId,
};
pub use temporal::{offset_from_minutes, Timestamp};
