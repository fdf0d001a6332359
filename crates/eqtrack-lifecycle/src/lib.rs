//! # eqtrack-lifecycle: Lifecycle Orchestration
//!
//! Moves devices and documents through their lifecycles, one transaction per
//! operation. The state machines of `eqtrack-state` decide what is legal;
//! this crate decides what has to change together and makes it happen
//! atomically through the [`Store`] boundary.
//!
//! ## Cycles
//!
//! | Facade | Documents | Device moves |
//! |---|---|---|
//! | [`LoanCycle`] | loan slip | AVAILABLE ⇄ ON_LOAN, ON_LOAN → BROKEN |
//! | [`ReturnCycle`] | return slip | ON_LOAN → AVAILABLE \| BROKEN, and back on cancel |
//! | [`MaintenanceCycle`] | maintenance slip, maintenance-return slip | AVAILABLE ⇄ MAINTENANCE, MAINTENANCE → BROKEN |
//! | [`WarrantyCycle`] | warranty | → UNDER_WARRANTY → AVAILABLE, or back to the prior status |
//!
//! ## Operation shape
//!
//! Every mutation validates first, writes second, and commits last. After
//! the commit the engine emits one cache-invalidation signal per affected
//! resource family; a failed signal is logged and does not fail the
//! operation. Any error before the commit rolls the whole transaction back.
//!
//! ## Backends
//!
//! [`MemoryStore`] lives here. The Postgres backend lives in `eqtrack-db`.

pub mod audit;
pub mod cache;
pub mod config;
pub mod context;
pub mod device;
pub mod engine;
pub mod error;
pub mod loan;
pub mod maintenance;
pub mod memory;
pub mod outcome;
pub mod ports;
pub mod returns;
pub mod sequencer;
pub mod warranty;

mod resolve;

pub use audit::{AuditContext, AuditRecorder, NoopAudit};
pub use cache::{CacheError, CacheInvalidator, CacheTag, RecordingInvalidator, TracingInvalidator};
pub use config::{ConfigError, EngineConfig};
pub use context::OperationContext;
pub use device::DeviceStateStore;
pub use engine::Engine;
pub use error::CycleError;
pub use loan::LoanCycle;
pub use maintenance::MaintenanceCycle;
pub use memory::{FailPoint, MemoryStore, MemoryTransaction};
pub use outcome::{Recorded, Resolved, Reverted};
pub use ports::{
    LoanSlipFilter, MaintenanceSlipFilter, Store, StoreError, Transaction, WarrantyFilter,
};
pub use returns::ReturnCycle;
pub use sequencer::CodeSequencer;
pub use warranty::WarrantyCycle;
