//! Optional external cross-check with `e2fsck -f -n`.
//!
//! The oracle never aborts a pass: an absent checker is a warning and a
//! non-zero exit is an error finding carrying the checker's first lines.

use crate::catalog;
use crate::finding::{Finding, FindingSink, Location, Severity};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

pub const DEFAULT_PROGRAM: &str = "e2fsck";

/// Lines of checker output kept in an `oracle.reported` finding.
const EXCERPT_LINES: usize = 4;

pub fn run_oracle(image: &Path, overrides: &BTreeMap<String, Severity>) -> Vec<Finding> {
    run_oracle_with(DEFAULT_PROGRAM, image, overrides)
}

pub fn run_oracle_with(
    program: &str,
    image: &Path,
    overrides: &BTreeMap<String, Severity>,
) -> Vec<Finding> {
    let mut sink = FindingSink::new(overrides);
    let location = || Location::new(0, "image");

    let output = match Command::new(program).arg("-f").arg("-n").arg(image).output() {
        Ok(output) => output,
        Err(err) => {
            let why = if err.kind() == ErrorKind::NotFound {
                format!("{program} not found")
            } else {
                format!("{program} failed to start: {err}")
            };
            warn!(program, %err, "external checker unavailable");
            sink.report(
                &catalog::ORACLE_UNAVAILABLE,
                location(),
                format!("{program} runnable"),
                why,
            );
            return sink.into_findings();
        }
    };

    if output.status.success() {
        debug!(program, "external checker accepted image");
        return sink.into_findings();
    }

    let status = output
        .status
        .code()
        .map_or_else(|| "killed by signal".to_owned(), |code| format!("exit {code}"));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let excerpt: Vec<&str> = stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(EXCERPT_LINES)
        .collect();
    let actual = if excerpt.is_empty() {
        status.clone()
    } else {
        format!("{status}: {}", excerpt.join(" | "))
    };
    debug!(program, %status, "external checker objected");
    sink.report(&catalog::ORACLE_REPORTED, location(), "exit 0", actual);
    sink.into_findings()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_a_warning() {
        let findings = run_oracle_with(
            "e2a-no-such-checker",
            Path::new("/tmp/image.img"),
            &BTreeMap::new(),
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "oracle.unavailable");
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].actual, "e2a-no-such-checker not found");
    }

    #[test]
    fn unavailable_severity_can_be_raised() {
        let mut overrides = BTreeMap::new();
        overrides.insert("oracle.unavailable".to_owned(), Severity::Error);
        let findings = run_oracle_with("e2a-no-such-checker", Path::new("x"), &overrides);
        assert_eq!(findings[0].severity, Severity::Error);
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_decides() {
        let none = BTreeMap::new();
        assert!(run_oracle_with("true", Path::new("x"), &none).is_empty());

        let findings = run_oracle_with("false", Path::new("x"), &none);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "oracle.reported");
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[0].actual, "exit 1");
    }
}
