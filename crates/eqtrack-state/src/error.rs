//! # State Machine Errors
//!
//! Carry the current state and the rejected target so the lifecycle engine
//! can classify them: header-level failures become conflicts, line-level
//! failures become validation errors.

use thiserror::Error;

use eqtrack_core::DeviceId;

/// Errors raised by the lifecycle state machines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The transition is not in the entity's transition table.
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        /// Entity kind (e.g. "loan slip").
        entity: &'static str,
        /// Current state.
        from: String,
        /// Rejected target state.
        to: String,
    },

    /// The entity is in a terminal state.
    #[error("{entity} is in terminal state {state}")]
    TerminalState {
        /// Entity kind.
        entity: &'static str,
        /// The terminal state.
        state: String,
    },

    /// No line on the document references the device.
    #[error("{device} is not a line of this document")]
    LineNotFound {
        /// The unknown device.
        device: DeviceId,
    },

    /// The line exists but is already resolved.
    #[error("line for {device} is {status}, not open")]
    LineNotOpen {
        /// The device of the line.
        device: DeviceId,
        /// The line's current status.
        status: String,
    },

    /// The line is not in the resolution a compensation expects.
    #[error("line for {device} is {status}, expected {expected}")]
    LineMismatch {
        /// The device of the line.
        device: DeviceId,
        /// The line's current status.
        status: String,
        /// The status the compensation expected.
        expected: String,
    },

    /// The same device appears twice in one request.
    #[error("{device} appears more than once")]
    DuplicateLine {
        /// The repeated device.
        device: DeviceId,
    },

    /// A document must reference at least one device.
    #[error("{entity} must reference at least one device")]
    EmptyDocument {
        /// Entity kind.
        entity: &'static str,
    },
}

impl StateError {
    /// Whether the error concerns a header's own state rather than its lines.
    pub fn is_header_level(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. } | Self::TerminalState { .. })
    }
}
