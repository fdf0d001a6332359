//! # Core Error Type
//!
//! Parsing and construction failures for the foundational types. Business
//! errors live with the state machines (`eqtrack-state`) and the lifecycle
//! engine (`eqtrack-lifecycle`).

use thiserror::Error;

/// Errors raised while constructing or parsing core types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A timestamp string could not be parsed, or was not UTC.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// An identifier string was not a UUID.
    #[error("invalid {kind} identifier {value:?}")]
    InvalidIdentifier {
        /// Identifier namespace (e.g. "device").
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A persisted or user-supplied status name is not known.
    #[error("unknown {kind} state {value:?}")]
    UnknownState {
        /// Which state machine the name was parsed for.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A document code does not follow `PREFIX_DDMMYY_NNN`.
    #[error("invalid document code {0:?}")]
    InvalidCode(String),

    /// A UTC offset is outside the representable range.
    #[error("utc offset of {minutes} minutes is out of range")]
    InvalidOffset {
        /// The rejected offset.
        minutes: i32,
    },
}
