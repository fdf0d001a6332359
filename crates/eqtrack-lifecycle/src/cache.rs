//! Cache-invalidation signal.
//!
//! Emitted after a successful commit, once per affected resource family.
//! Failures are logged and never undo the committed operation.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource families whose cached views an operation may have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTag {
    /// Loan slips.
    Loan,
    /// Device list and details.
    Devices,
    /// Maintenance slips and maintenance-return slips.
    Maintenance,
    /// Warranty requests.
    Warranty,
    /// Return slips.
    Return,
}

impl CacheTag {
    /// Tag name as sent to the cache.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loan => "loan",
            Self::Devices => "devices",
            Self::Maintenance => "maintenance",
            Self::Warranty => "warranty",
            Self::Return => "return",
        }
    }
}

impl std::fmt::Display for CacheTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalidation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to invalidate {tag}: {reason}")]
pub struct CacheError {
    /// The tag that could not be invalidated.
    pub tag: CacheTag,
    /// Backend detail.
    pub reason: String,
}

/// Receives invalidation signals.
pub trait CacheInvalidator: Send + Sync {
    /// Invalidate every cached view tagged `tag`.
    fn invalidate(&self, tag: CacheTag) -> Result<(), CacheError>;
}

/// Logs the signal and does nothing else. Default for deployments without a
/// shared cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInvalidator;

impl CacheInvalidator for TracingInvalidator {
    fn invalidate(&self, tag: CacheTag) -> Result<(), CacheError> {
        tracing::debug!(tag = %tag, "cache invalidated");
        Ok(())
    }
}

/// Records every signal. Optionally fails every call.
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    tags: Mutex<Vec<CacheTag>>,
    fail: bool,
}

impl RecordingInvalidator {
    /// A recorder whose calls succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose calls are recorded, then fail.
    pub fn failing() -> Self {
        Self {
            tags: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Tags received so far, in order.
    pub fn tags(&self) -> Vec<CacheTag> {
        self.tags.lock().clone()
    }

    /// Forget recorded tags.
    pub fn clear(&self) {
        self.tags.lock().clear();
    }
}

impl CacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, tag: CacheTag) -> Result<(), CacheError> {
        self.tags.lock().push(tag);
        if self.fail {
            return Err(CacheError {
                tag,
                reason: "cache unavailable".into(),
            });
        }
        Ok(())
    }
}
