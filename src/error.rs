//! Typed errors for the text parser and field conversion.
//!
//! Call-level operations ([`convert`](crate::io::writer::convert),
//! [`for_each`](crate::io::reader::for_each)) return [`anyhow::Result`] and wrap
//! these with path context; the parser itself reports them as-is so callers can
//! match on the failure.

use std::io;

/// Failure while pulling lines out of a text source.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Reading from the underlying source failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A single line does not fit in the parser's buffer.
    ///
    /// The parser never truncates a line and never grows its buffer; raise
    /// [`ParserConfig::buffer_capacity`](crate::parser::ParserConfig) instead.
    #[error("line {line} exceeds the parser buffer capacity of {capacity} bytes")]
    LineTooLong { line: u64, capacity: usize },
}

/// Failure while extracting one field from the current row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// The row has no more fields.
    #[error("no more fields in row")]
    Missing,

    /// The field text cannot be converted to the requested type.
    #[error("cannot parse {text:?} as {expected}")]
    Invalid { expected: &'static str, text: String },
}

impl FieldError {
    pub(crate) fn invalid(expected: &'static str, raw: &[u8]) -> Self {
        Self::Invalid {
            expected,
            text: String::from_utf8_lossy(raw).into_owned(),
        }
    }
}
