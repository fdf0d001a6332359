//! Results of resolve operations.

use serde::Serialize;

use eqtrack_state::Warranty;

/// A document after line resolution, with the warranties the resolution
/// opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved<T> {
    /// The written document.
    pub document: T,
    /// PENDING warranties opened for devices resolved as BROKEN.
    pub warranties: Vec<Warranty>,
}

/// A resolving document after cancellation, with the parent it reopened
/// and the warranties it rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reverted<T, P> {
    /// The cancelled document.
    pub document: T,
    /// The parent slip, reopened.
    pub parent: P,
    /// Warranties rejected by the compensation.
    pub rejected_warranties: Vec<Warranty>,
}

/// A resolving document with the parent it resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recorded<T, P> {
    /// The new document.
    pub document: T,
    /// The parent slip after resolution.
    pub parent: P,
    /// PENDING warranties opened for devices resolved as BROKEN.
    pub warranties: Vec<Warranty>,
}
