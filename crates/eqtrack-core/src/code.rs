//! # Document Codes
//!
//! Every document header carries a human-readable code generated once at
//! creation: `PREFIX_DDMMYY_SEQ`, where SEQ counts the documents of that kind
//! created on the same calendar day. SEQ is zero-padded to the kind's width
//! and widens past it instead of wrapping.
//!
//! This module only formats and parses codes. Allocating SEQ atomically is
//! the persistence layer's job (a counter row keyed by [`DocumentCode::sequence_key`]).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The document families that receive generated codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    /// Loan slip (lending to a borrower).
    LoanSlip,
    /// Return slip recorded against a loan slip.
    ReturnSlip,
    /// Maintenance dispatch slip.
    MaintenanceSlip,
    /// Maintenance completion slip.
    MaintenanceReturnSlip,
    /// Warranty request.
    Warranty,
}

impl DocumentKind {
    /// All kinds, in declaration order.
    pub const ALL: [DocumentKind; 5] = [
        Self::LoanSlip,
        Self::ReturnSlip,
        Self::MaintenanceSlip,
        Self::MaintenanceReturnSlip,
        Self::Warranty,
    ];

    /// Code prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::LoanSlip => "LS",
            Self::ReturnSlip => "RS",
            Self::MaintenanceSlip => "MS",
            Self::MaintenanceReturnSlip => "MRS",
            Self::Warranty => "WR",
        }
    }

    /// Minimum number of digits in the sequence part.
    pub fn sequence_width(&self) -> usize {
        match self {
            Self::Warranty => 2,
            Self::LoanSlip
            | Self::ReturnSlip
            | Self::MaintenanceSlip
            | Self::MaintenanceReturnSlip => 3,
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A generated, immutable document code such as `LS_150126_007`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentCode(String);

impl DocumentCode {
    /// Render the code for the `sequence`-th document of `kind` on `day`.
    pub fn format(kind: DocumentKind, day: NaiveDate, sequence: u32) -> Self {
        Self(format!(
            "{}_{}_{:0width$}",
            kind.prefix(),
            day.format("%d%m%y"),
            sequence,
            width = kind.sequence_width()
        ))
    }

    /// Counter key shared by every code of `kind` on `day`.
    pub fn sequence_key(kind: DocumentKind, day: NaiveDate) -> String {
        format!("{}_{}", kind.prefix(), day.format("%d%m%y"))
    }

    /// Parse and validate a stored code.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidCode(s.to_string());
        let mut parts = s.split('_');
        let (prefix, day, seq) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(d), Some(n), None) => (p, d, n),
            _ => return Err(invalid()),
        };
        let kind = DocumentKind::from_prefix(prefix).ok_or_else(invalid)?;
        NaiveDate::parse_from_str(day, "%d%m%y").map_err(|_| invalid())?;
        if seq.len() < kind.sequence_width() || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        Ok(Self(s.to_string()))
    }

    /// The document kind encoded in the prefix.
    pub fn kind(&self) -> Option<DocumentKind> {
        self.0.split('_').next().and_then(DocumentKind::from_prefix)
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
