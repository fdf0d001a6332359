//! # Aggregate Progress
//!
//! A document header's status is a function of its lines. Lines are either
//! open (BORROWED / SENT) or resolved (RETURNED / BROKEN); the header is
//! untouched, partially resolved, or complete accordingly.
//!
//! ```text
//! no line resolved    ──▶ Untouched ──▶ BORROWING / SENDING
//! some lines resolved ──▶ Partial   ──▶ PARTIAL_RETURNED
//! all lines resolved  ──▶ Complete  ──▶ CLOSED
//! ```
//!
//! Each cycle plugs its own enums in through [`LineStatus`] and
//! [`HeaderStatus`], so the derivation is written once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use eqtrack_core::DeviceId;

use crate::error::StateError;

/// How an open line was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineResolution {
    /// The device came back in working order.
    Returned,
    /// The device came back broken.
    Broken,
}

state_names!(LineResolution, "line resolution", {
    Returned => "RETURNED",
    Broken => "BROKEN",
});

/// One device to resolve within a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveItem {
    /// Device whose open line is resolved.
    pub device_id: DeviceId,
    /// Target resolution.
    pub resolution: LineResolution,
    /// Free-text note stored on the line.
    pub note: Option<String>,
}

impl ResolveItem {
    /// A RETURNED item without a note.
    pub fn returned(device_id: DeviceId) -> Self {
        Self {
            device_id,
            resolution: LineResolution::Returned,
            note: None,
        }
    }

    /// A BROKEN item with a note.
    pub fn broken(device_id: DeviceId, note: impl Into<String>) -> Self {
        Self {
            device_id,
            resolution: LineResolution::Broken,
            note: Some(note.into()),
        }
    }
}

/// Resolution mix of a document's lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Progress {
    /// No line resolved.
    Untouched,
    /// Some, not all, lines resolved.
    Partial,
    /// Every line resolved.
    Complete,
}

/// A per-cycle line status enum.
pub trait LineStatus: Copy + Eq + std::fmt::Display {
    /// The open (unresolved) status.
    const OPEN: Self;

    /// The status a line takes for `resolution`.
    fn resolved(resolution: LineResolution) -> Self;

    /// The resolution this status represents, if resolved.
    fn resolution(&self) -> Option<LineResolution>;

    /// Whether the line is terminal for its cycle.
    fn is_resolved(&self) -> bool {
        self.resolution().is_some()
    }
}

/// A per-cycle header status enum driven by line progress.
pub trait HeaderStatus: Copy + Eq + std::fmt::Display {
    /// Entity name used in errors.
    const ENTITY: &'static str;

    /// The status corresponding to a progress value.
    fn for_progress(progress: Progress) -> Self;

    /// Whether the header was cancelled.
    fn is_cancelled(&self) -> bool;

    /// Transition table.
    fn can_transition_to(&self, next: Self) -> bool;
}

/// Versioned rows take part in optimistic concurrency control.
pub trait Versioned {
    /// The version read from storage.
    fn version(&self) -> i64;

    /// Overwrite the version after a successful write.
    fn set_version(&mut self, version: i64);
}

/// Compute the progress of a set of lines. An empty set is `Untouched`.
pub fn progress_of<I, L>(lines: I) -> Progress
where
    I: IntoIterator<Item = L>,
    L: LineStatus,
{
    let (mut total, mut resolved) = (0usize, 0usize);
    for line in lines {
        total += 1;
        if line.is_resolved() {
            resolved += 1;
        }
    }
    match resolved {
        0 => Progress::Untouched,
        n if n == total => Progress::Complete,
        _ => Progress::Partial,
    }
}

/// Derive a header's status from its lines.
///
/// A cancelled header is terminal. Any other header moves to the status its
/// progress dictates, provided the move is in the header's transition table.
pub fn derive_header_status<H, I, L>(current: H, lines: I) -> Result<H, StateError>
where
    H: HeaderStatus,
    I: IntoIterator<Item = L>,
    L: LineStatus,
{
    if current.is_cancelled() {
        return Err(StateError::TerminalState {
            entity: H::ENTITY,
            state: current.to_string(),
        });
    }
    let next = H::for_progress(progress_of(lines));
    if next != current && !current.can_transition_to(next) {
        return Err(StateError::InvalidTransition {
            entity: H::ENTITY,
            from: current.to_string(),
            to: next.to_string(),
        });
    }
    Ok(next)
}

/// Reject empty device lists and repeated devices.
pub fn check_distinct(entity: &'static str, devices: &[DeviceId]) -> Result<(), StateError> {
    if devices.is_empty() {
        return Err(StateError::EmptyDocument { entity });
    }
    let mut seen = HashSet::with_capacity(devices.len());
    for device in devices {
        if !seen.insert(*device) {
            return Err(StateError::DuplicateLine { device: *device });
        }
    }
    Ok(())
}

/// Move an open line to its resolved status.
pub(crate) fn resolve_status<L: LineStatus>(
    status: &mut L,
    device: DeviceId,
    resolution: LineResolution,
) -> Result<(), StateError> {
    if *status != L::OPEN {
        return Err(StateError::LineNotOpen {
            device,
            status: status.to_string(),
        });
    }
    *status = L::resolved(resolution);
    Ok(())
}

/// Move a resolved line back to open. The line must carry `expected`.
pub(crate) fn reopen_status<L: LineStatus>(
    status: &mut L,
    device: DeviceId,
    expected: LineResolution,
) -> Result<(), StateError> {
    if status.resolution() != Some(expected) {
        return Err(StateError::LineMismatch {
            device,
            status: status.to_string(),
            expected: expected.to_string(),
        });
    }
    *status = L::OPEN;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::{LoanLineStatus, LoanSlipStatus};
    use crate::maintenance::{MaintenanceLineStatus, MaintenanceSlipStatus};
    use proptest::prelude::*;

    fn loan_line() -> impl Strategy<Value = LoanLineStatus> {
        prop_oneof![
            Just(LoanLineStatus::Borrowed),
            Just(LoanLineStatus::Returned),
            Just(LoanLineStatus::Broken),
        ]
    }

    #[test]
    fn test_empty_is_untouched() {
        assert_eq!(progress_of(Vec::<LoanLineStatus>::new()), Progress::Untouched);
    }

    #[test]
    fn test_mixed_is_partial() {
        let lines = [LoanLineStatus::Returned, LoanLineStatus::Borrowed];
        assert_eq!(progress_of(lines), Progress::Partial);
    }

    #[test]
    fn test_broken_counts_as_resolved() {
        let lines = [MaintenanceLineStatus::Broken, MaintenanceLineStatus::Returned];
        assert_eq!(progress_of(lines), Progress::Complete);
    }

    #[test]
    fn test_cancelled_header_is_terminal() {
        let err = derive_header_status(LoanSlipStatus::Cancelled, [LoanLineStatus::Returned])
            .unwrap_err();
        assert!(matches!(err, StateError::TerminalState { .. }));
        assert!(err.is_header_level());
    }

    #[test]
    fn test_closed_reopens_to_partial() {
        let next = derive_header_status(
            MaintenanceSlipStatus::Closed,
            [MaintenanceLineStatus::Sent, MaintenanceLineStatus::Broken],
        )
        .unwrap();
        assert_eq!(next, MaintenanceSlipStatus::PartialReturned);
    }

    #[test]
    fn test_resolve_twice_rejected() {
        let device = DeviceId::new();
        let mut status = LoanLineStatus::Borrowed;
        resolve_status(&mut status, device, LineResolution::Broken).unwrap();
        assert_eq!(status, LoanLineStatus::Broken);
        let err = resolve_status(&mut status, device, LineResolution::Returned).unwrap_err();
        assert!(matches!(err, StateError::LineNotOpen { .. }));
    }

    #[test]
    fn test_reopen_requires_matching_resolution() {
        let device = DeviceId::new();
        let mut status = LoanLineStatus::Returned;
        let err = reopen_status(&mut status, device, LineResolution::Broken).unwrap_err();
        assert!(matches!(err, StateError::LineMismatch { .. }));
        reopen_status(&mut status, device, LineResolution::Returned).unwrap();
        assert_eq!(status, LoanLineStatus::Borrowed);
    }

    #[test]
    fn test_check_distinct() {
        let a = DeviceId::new();
        assert!(matches!(
            check_distinct("loan slip", &[]),
            Err(StateError::EmptyDocument { .. })
        ));
        assert!(matches!(
            check_distinct("loan slip", &[a, a]),
            Err(StateError::DuplicateLine { .. })
        ));
        assert!(check_distinct("loan slip", &[a, DeviceId::new()]).is_ok());
    }

    proptest! {
        #[test]
        fn closed_iff_every_line_resolved(lines in proptest::collection::vec(loan_line(), 1..12)) {
            let status = derive_header_status(LoanSlipStatus::Borrowing, lines.clone()).unwrap();
            let resolved = lines.iter().filter(|l| l.is_resolved()).count();
            prop_assert_eq!(status == LoanSlipStatus::Closed, resolved == lines.len());
            prop_assert_eq!(
                status == LoanSlipStatus::PartialReturned,
                resolved > 0 && resolved < lines.len()
            );
            prop_assert_eq!(status == LoanSlipStatus::Borrowing, resolved == 0);
        }

        #[test]
        fn derivation_is_order_independent(lines in proptest::collection::vec(loan_line(), 1..12)) {
            let mut reversed = lines.clone();
            reversed.reverse();
            prop_assert_eq!(progress_of(lines), progress_of(reversed));
        }
    }
}
