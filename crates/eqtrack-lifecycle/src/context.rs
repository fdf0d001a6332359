//! Per-operation context.

use eqtrack_core::{Timestamp, UserId};
use serde_json::Value;

use crate::audit::AuditContext;

/// Who performs an operation, when, and where its audit snapshots go.
///
/// One context is built per request and passed explicitly; the engine keeps
/// no ambient request state.
pub struct OperationContext<'a> {
    /// The acting user, recorded as `created_by` on new documents.
    pub actor: UserId,
    /// The operation's clock reading. Every timestamp written by the
    /// operation uses it.
    pub now: Timestamp,
    /// Audit snapshot sink.
    pub audit: &'a mut dyn AuditContext,
}

impl<'a> OperationContext<'a> {
    /// A context for `actor` at the current time.
    pub fn new(actor: UserId, audit: &'a mut dyn AuditContext) -> Self {
        Self {
            actor,
            now: Timestamp::now(),
            audit,
        }
    }

    /// Pin the operation clock.
    pub fn at(mut self, now: Timestamp) -> Self {
        self.now = now;
        self
    }

    /// Hand one before/after pair to the audit sink. Called once, after
    /// every write of the operation succeeded.
    pub fn record_change(&mut self, before: Value, after: Value) {
        self.audit.set_before(before);
        self.audit.set_after(after);
    }
}

impl std::fmt::Debug for OperationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("actor", &self.actor)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}
