//! Finding taxonomy and the collector rules report into.

use crate::catalog::Rule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Severity ────────────────────────────────────────────────────────────────

/// Severity of a finding. Any `Error` fails the audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

// ── Kinds ───────────────────────────────────────────────────────────────────

/// Category of a recoverable finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// A field or structure differs from its required value.
    StructuralMismatch,
    /// A record or pointer reaches outside its container.
    BoundaryViolation,
    /// A record length is not 4-byte aligned.
    AlignmentViolation,
    /// An expected-zero region holds non-zero bytes.
    ZeroingViolation,
    /// Two independently stored structures disagree.
    ConsistencyViolation,
    /// The external checker was unavailable or objected.
    Oracle,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StructuralMismatch => write!(f, "structural_mismatch"),
            Self::BoundaryViolation => write!(f, "boundary_violation"),
            Self::AlignmentViolation => write!(f, "alignment_violation"),
            Self::ZeroingViolation => write!(f, "zeroing_violation"),
            Self::ConsistencyViolation => write!(f, "consistency_violation"),
            Self::Oracle => write!(f, "oracle"),
        }
    }
}

// ── Findings ────────────────────────────────────────────────────────────────

/// Where in the image a finding points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Absolute byte offset into the image.
    pub offset: u64,
    /// Structure and field, e.g. `superblock.magic` or `inode 12.links_count`.
    pub what: String,
}

impl Location {
    #[must_use]
    pub fn new(offset: u64, what: impl Into<String>) -> Self {
        Self {
            offset,
            what: what.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:#x}", self.what, self.offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub rule: &'static str,
    pub kind: FindingKind,
    pub location: Location,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} at {}: expected {}, found {}",
            self.severity, self.rule, self.kind, self.location, self.expected, self.actual
        )
    }
}

// ── Collector ───────────────────────────────────────────────────────────────

/// Collects findings, resolving each rule's severity against overrides.
#[derive(Debug)]
pub struct FindingSink<'c> {
    overrides: &'c BTreeMap<String, Severity>,
    findings: Vec<Finding>,
}

impl<'c> FindingSink<'c> {
    #[must_use]
    pub fn new(overrides: &'c BTreeMap<String, Severity>) -> Self {
        Self {
            overrides,
            findings: Vec::new(),
        }
    }

    #[must_use]
    pub fn severity_for(&self, rule: &Rule) -> Severity {
        self.overrides
            .get(rule.id)
            .copied()
            .unwrap_or(rule.severity)
    }

    pub fn report(
        &mut self,
        rule: &Rule,
        location: Location,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) {
        self.findings.push(Finding {
            severity: self.severity_for(rule),
            rule: rule.id,
            kind: rule.kind,
            location,
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    /// Report when `actual != expected`.
    pub fn expect_eq<T: PartialEq + fmt::Display>(
        &mut self,
        rule: &Rule,
        location: impl FnOnce() -> Location,
        expected: T,
        actual: T,
    ) {
        if expected != actual {
            self.report(rule, location(), expected, actual);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.findings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    #[must_use]
    pub fn into_findings(self) -> Vec<Finding> {
        self.findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    #[test]
    fn overrides_change_severity() {
        let mut overrides = BTreeMap::new();
        overrides.insert("sb.reserved_zero".to_owned(), Severity::Error);
        let mut sink = FindingSink::new(&overrides);
        sink.report(
            &catalog::SB_RESERVED_ZERO,
            Location::new(1108, "superblock[84..104]"),
            "all zero",
            "byte 0x01 at 84",
        );
        sink.expect_eq(
            &catalog::SB_MAGIC,
            || Location::new(1080, "superblock.magic"),
            0xEF53_u16,
            0xEF53_u16,
        );
        assert_eq!(sink.len(), 1);
        let findings = sink.into_findings();
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[0].kind, FindingKind::ZeroingViolation);
    }

    #[test]
    fn display_is_stable() {
        let finding = Finding {
            severity: Severity::Error,
            rule: "sb.magic",
            kind: FindingKind::StructuralMismatch,
            location: Location::new(1080, "superblock.magic"),
            expected: "0xef53".into(),
            actual: "0x0000".into(),
        };
        assert_eq!(
            finding.to_string(),
            "ERROR [sb.magic] structural_mismatch at superblock.magic @ 0x438: expected 0xef53, found 0x0000"
        );
        assert!(Severity::Error > Severity::Warning);
    }
}
