#![forbid(unsafe_code)]
//! Invariant checker and report aggregator.
//!
//! An audit pass snapshots nothing itself: it takes an [`Image`] already in
//! memory, builds an [`AuditContext`] (decoded records, bitmaps, inode slots
//! and the directory tree), runs every rule family into a [`FindingSink`]
//! and folds the findings into a [`Report`].
//!
//! Fatal conditions (short image, unreadable structure, bad configuration)
//! abort the pass with an [`AuditError`]. Everything else is a finding.

pub mod catalog;
pub mod config;
pub mod context;
pub mod finding;
pub mod oracle;
pub mod report;
pub mod rules;

#[cfg(test)]
mod testutil;

pub use catalog::{CATALOG, Rule};
pub use config::{AuditConfig, Permissions, TopologyEntry};
pub use context::AuditContext;
pub use finding::{Finding, FindingKind, FindingSink, Location, Severity};
pub use report::{Report, Verdict};

use e2a_block::Image;
use e2a_error::{AuditError, Result};
use e2a_ondisk::Superblock;
use e2a_types::{BlockSize, EXT2_SUPERBLOCK_OFFSET, EXT2_SUPERBLOCK_SIZE, ParseError};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

// ── Error mapping ───────────────────────────────────────────────────────────

/// Convert a decode failure inside a window starting at `base` into the
/// fatal audit error, with the offset made absolute.
#[must_use]
pub fn parse_to_audit_error(err: &ParseError, base: u64) -> AuditError {
    match err {
        ParseError::InsufficientData {
            needed,
            offset,
            actual,
        } => AuditError::Truncated {
            offset: base + *offset as u64,
            needed: *needed as u64,
            available: *actual as u64,
        },
        ParseError::InvalidField { field, .. } if field.contains("offset") => {
            AuditError::Truncated {
                offset: base,
                needed: 0,
                available: 0,
            }
        }
        ParseError::InvalidField { field, reason } => {
            AuditError::Config(format!("{field}: {reason}"))
        }
        ParseError::IntegerConversion { .. } => AuditError::Truncated {
            offset: base,
            needed: 0,
            available: 0,
        },
    }
}

// ── Passes ──────────────────────────────────────────────────────────────────

/// Run every rule against `image`, judging timestamps relative to `now`.
pub fn audit(image: &Image, config: &AuditConfig, now: u64) -> Result<Report> {
    config.validate()?;
    let ctx = AuditContext::build(image, config, now).inspect_err(|err| {
        warn!(kind = err.kind(), %err, "audit aborted");
    })?;
    let mut sink = FindingSink::new(&config.severity_overrides);
    rules::run_all(&ctx, &mut sink);
    let report = Report::from_findings(sink.into_findings());
    info!(
        errors = report.errors,
        warnings = report.warnings,
        verdict = %report.verdict,
        "audit pass complete"
    );
    Ok(report)
}

#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Snapshot the configured prefix of `path`, addressed at the block size the
/// superblock declares (1024 when that is unusable).
pub fn open_image(path: &Path, config: &AuditConfig) -> Result<Image> {
    let image = Image::open(path, config.image_size)?;
    let sb_bytes = image.read_bytes(EXT2_SUPERBLOCK_OFFSET as u64, EXT2_SUPERBLOCK_SIZE)?;
    let block_size = Superblock::parse(sb_bytes)
        .ok()
        .and_then(|sb| sb.block_size().ok())
        .unwrap_or(BlockSize::MIN);
    Ok(image.with_block_size(block_size))
}

/// Open, audit at `now` and (when configured) cross-check one image file.
pub fn audit_path(path: &Path, config: &AuditConfig, now: u64) -> Result<Report> {
    config.validate()?;
    let image = open_image(path, config)?;
    let report = audit(&image, config, now)?;
    if !config.oracle {
        return Ok(report);
    }
    let extra = oracle::run_oracle(path, &config.severity_overrides);
    Ok(report.with_findings(extra))
}
