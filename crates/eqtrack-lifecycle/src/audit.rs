//! Audit snapshot hook.
//!
//! Each operation receives an [`AuditContext`] through its
//! [`OperationContext`](crate::OperationContext). Once an operation's writes
//! have all succeeded the engine calls `set_before` with the primary record
//! as loaded (`null` for creations), then `set_after` with the record as
//! written. A failed operation emits neither.
//! Persisting and diffing the snapshots is the caller's business.

use serde::Serialize;
use serde_json::Value;

/// Receives before/after snapshots of audited mutations.
pub trait AuditContext: Send {
    /// Snapshot of the record before the mutation.
    fn set_before(&mut self, snapshot: Value);

    /// Snapshot of the record after the mutation.
    fn set_after(&mut self, snapshot: Value);
}

/// Discards snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAudit;

impl AuditContext for NoopAudit {
    fn set_before(&mut self, _snapshot: Value) {}

    fn set_after(&mut self, _snapshot: Value) {}
}

/// Keeps every snapshot in memory.
#[derive(Debug, Default, Clone)]
pub struct AuditRecorder {
    /// `set_before` calls, in order.
    pub before: Vec<Value>,
    /// `set_after` calls, in order.
    pub after: Vec<Value>,
}

impl AuditRecorder {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditContext for AuditRecorder {
    fn set_before(&mut self, snapshot: Value) {
        self.before.push(snapshot);
    }

    fn set_after(&mut self, snapshot: Value) {
        self.after.push(snapshot);
    }
}

/// Serialize a record for the audit hook. Serialization of the lifecycle
/// types cannot fail; a failure yields `null` rather than aborting.
pub(crate) fn snapshot<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
