#![forbid(unsafe_code)]
//! Error types for ext2-audit.
//!
//! # Error Taxonomy
//!
//! ext2-audit uses a two-layer error model:
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Parsing | `ParseError` | `e2a-types` | Byte windows too short for the record being decoded |
//! | Runtime | `AuditError` | `e2a-error` (this crate) | Fatal conditions that abort an audit pass |
//!
//! Everything else an audit discovers is a *finding*, not an error: findings
//! are collected by `e2a-check` and never short-circuit the rule catalog.
//!
//! ## Mapping Policy: ParseError → AuditError
//!
//! `e2a-error` is independent of `e2a-types` and `e2a-ondisk`. The conversion
//! lives in `e2a-check`, which depends on both.
//!
//! | ParseError Variant | AuditError Variant |
//! |--------------------|--------------------|
//! | `InsufficientData` | `Truncated { offset, needed, available }` |
//! | `InvalidField` | `Truncated` when the field is an offset, otherwise `Config` |
//! | `IntegerConversion` | `Truncated` |
//!
//! ## Design Constraints
//!
//! - `e2a-error` MUST NOT depend on `e2a-types` or `e2a-ondisk`.
//! - All string payloads are owned.

use thiserror::Error;

/// Fatal error for an audit pass.
///
/// Any of these aborts the pass before a report is produced.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The image could not be opened or read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image is shorter than the configured size.
    #[error("image too short: expected at least {expected} bytes, found {actual}")]
    ShortImage { expected: u64, actual: u64 },

    /// A read fell outside the image (or a record window was short).
    #[error("truncated read: {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// The audit configuration is malformed or names an unknown rule.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AuditError {
    /// Short stable label used in logs and the CLI's JSON error output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::ShortImage { .. } => "short_image",
            Self::Truncated { .. } => "truncated",
            Self::Config(_) => "config",
        }
    }
}

/// Result alias using `AuditError`.
pub type Result<T> = std::result::Result<T, AuditError>;
