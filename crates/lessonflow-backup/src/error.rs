//! Conversion errors and the anomalies patched along the way.

use serde::Serialize;
use thiserror::Error;

/// A conversion failure. Any of these aborts the whole conversion.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("malformed legacy XML at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("invalid {field} value {value:?} in page {page}")]
    InvalidField {
        page: u64,
        field: &'static str,
        value: String,
    },

    #[error("backup integrity: {0}")]
    Integrity(String),

    #[error("failed to write converted backup: {0}")]
    Write(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A historical data-format quirk found and patched during conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LegacyFormatAnomaly {
    #[error("page {page}: obsolete type code {from} mapped to {to}")]
    ObsoleteTypeCode { page: u64, from: u32, to: u32 },

    #[error("page {page}: legacy cloze encoding in answer {answer}")]
    LegacyClozeEncoding { page: u64, answer: u64 },

    #[error("page {page}: matching page with {answers} answers had its jump slots moved")]
    MatchingJumpSlots { page: u64, answers: usize },

    #[error("page {page}: unknown type code {code} kept as is")]
    UnknownTypeCode { page: u64, code: u32 },
}

impl LegacyFormatAnomaly {
    pub fn page(&self) -> u64 {
        match self {
            LegacyFormatAnomaly::ObsoleteTypeCode { page, .. }
            | LegacyFormatAnomaly::LegacyClozeEncoding { page, .. }
            | LegacyFormatAnomaly::MatchingJumpSlots { page, .. }
            | LegacyFormatAnomaly::UnknownTypeCode { page, .. } => *page,
        }
    }
}
