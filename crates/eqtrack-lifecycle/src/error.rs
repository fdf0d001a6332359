//! # Lifecycle Errors
//!
//! Every cycle operation returns [`CycleError`]. State-machine and store
//! errors are classified on the way in:
//!
//! | Source | Variant |
//! |---|---|
//! | header transition / terminal state | `Conflict` |
//! | line not found / not open / duplicate / empty | `Validation` |
//! | stale version or serialization failure | `Conflict` |
//! | unique-index violation | `Validation` |
//! | anything else from the store | `Store` |

use thiserror::Error;

use eqtrack_state::StateError;

use crate::ports::StoreError;

/// Errors returned by lifecycle operations.
#[derive(Error, Debug)]
pub enum CycleError {
    /// The addressed record does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Rendered identifier.
        id: String,
    },

    /// The request is malformed or references unusable records.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The record's current state forbids the operation, or a concurrent
    /// writer got there first.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A device was not in the status the operation expected.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The persistence backend failed.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl CycleError {
    /// Build a `NotFound` for any displayable id.
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short variant name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Store(_) => "store",
        }
    }
}

impl From<StateError> for CycleError {
    fn from(err: StateError) -> Self {
        if err.is_header_level() {
            Self::Conflict(err.to_string())
        } else {
            Self::Validation(err.to_string())
        }
    }
}

impl From<StoreError> for CycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => Self::Conflict(err.to_string()),
            StoreError::Duplicate { .. } => Self::Validation(err.to_string()),
            other => Self::Store(other),
        }
    }
}
