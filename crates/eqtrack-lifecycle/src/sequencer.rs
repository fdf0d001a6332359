//! Document code generation.
//!
//! Codes are allocated from a store-side counter keyed by prefix and
//! calendar day, inside the caller's transaction, before the header is
//! inserted.

use chrono::{FixedOffset, NaiveDate};

use eqtrack_core::{DocumentCode, DocumentKind, Timestamp};

use crate::error::CycleError;
use crate::ports::Transaction;

/// Allocates `PREFIX_DDMMYY_NNN` codes.
#[derive(Debug, Clone, Copy)]
pub struct CodeSequencer {
    offset: FixedOffset,
}

impl CodeSequencer {
    /// A sequencer dating codes at `offset`.
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// The calendar day `at` falls on at the configured offset.
    pub fn business_date(&self, at: Timestamp) -> NaiveDate {
        at.date_in(self.offset)
    }

    /// Allocate the next code of `kind` for the day of `at`.
    pub async fn next<T: Transaction>(
        &self,
        tx: &mut T,
        kind: DocumentKind,
        at: Timestamp,
    ) -> Result<DocumentCode, CycleError> {
        let day = self.business_date(at);
        let key = DocumentCode::sequence_key(kind, day);
        let sequence = tx.next_sequence(&key).await?;
        Ok(DocumentCode::format(kind, day, sequence))
    }
}
