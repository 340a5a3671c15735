//! Report aggregation: ordering, counts, verdict and rendering.

use crate::catalog;
use crate::finding::{Finding, Severity};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    #[must_use]
    pub fn is_pass(self) -> bool {
        self == Self::Pass
    }

    /// Process exit status: 0 on pass, 1 on fail.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::Fail => 1,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Outcome of one audit pass.
///
/// Findings are ordered by catalog position, then by byte offset; the order
/// within one rule and offset is the order rules reported them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub errors: usize,
    pub warnings: usize,
    pub verdict: Verdict,
}

impl Report {
    #[must_use]
    pub fn from_findings(mut findings: Vec<Finding>) -> Self {
        findings.sort_by(|a, b| {
            catalog::order_of(a.rule)
                .cmp(&catalog::order_of(b.rule))
                .then(a.location.offset.cmp(&b.location.offset))
        });
        let errors = findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .count();
        let warnings = findings.len() - errors;
        let verdict = if errors == 0 {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        Self {
            findings,
            errors,
            warnings,
            verdict,
        }
    }

    /// Merge findings produced after the pass (e.g. by the oracle).
    #[must_use]
    pub fn with_findings(self, more: Vec<Finding>) -> Self {
        let mut findings = self.findings;
        findings.extend(more);
        Self::from_findings(findings)
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            writeln!(f, "{finding}")?;
        }
        write!(
            f,
            "{} error(s), {} warning(s): {}",
            self.errors, self.warnings, self.verdict
        )
    }
}
