//! `time.*` rules: timestamps are set and not in the future.

use super::{inode_field_location, sb_location};
use crate::catalog::{self, Rule};
use crate::context::AuditContext;
use crate::finding::{FindingSink, Location};
use e2a_ondisk::records::{I_ATIME, I_CTIME, I_MTIME, SB_LASTCHECK, SB_WTIME};
use tracing::debug;

pub fn check(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let before = sink.len();
    let latest = ctx.now.saturating_add(ctx.config.timestamp_skew_secs);

    for (field, value) in [(&SB_WTIME, ctx.sb.wtime), (&SB_LASTCHECK, ctx.sb.lastcheck)] {
        judge(
            sink,
            [&catalog::TIME_SUPERBLOCK_UNSET, &catalog::TIME_SUPERBLOCK],
            || sb_location(field),
            value,
            latest,
        );
    }

    for slot in ctx.inodes.iter().filter(|slot| ctx.is_live(slot.ino)) {
        let inode = &slot.inode;
        for (field, value) in [
            (&I_ATIME, inode.atime),
            (&I_CTIME, inode.ctime),
            (&I_MTIME, inode.mtime),
        ] {
            judge(
                sink,
                [&catalog::TIME_INODE, &catalog::TIME_INODE],
                || inode_field_location(slot, field),
                value,
                latest,
            );
        }
    }
    debug!(findings = sink.len() - before, latest, "timestamp rules done");
}

/// Reports a zero `value` under the first rule and a future one under the second.
fn judge(
    sink: &mut FindingSink<'_>,
    [unset, future]: [&Rule; 2],
    location: impl FnOnce() -> Location,
    value: u32,
    latest: u64,
) {
    if value == 0 {
        sink.report(unset, location(), "a set timestamp", 0);
    } else if u64::from(value) > latest {
        sink.report(future, location(), format!("<= {latest}"), value);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::AuditConfig;
    use crate::finding::Severity;
    use crate::testutil::{NOW, audit_bytes, audit_bytes_with, fired, put_u32, reference_bytes};

    #[test]
    fn future_times_are_warnings() {
        let mut bytes = reference_bytes();
        put_u32(&mut bytes, 1024 + 48, 1_900_000_000);
        put_u32(&mut bytes, 5120 + 11 * 128 + 16, 1_900_000_000);
        let report = audit_bytes(bytes);
        let sb = fired(&report, "time.superblock");
        assert_eq!(sb.len(), 1);
        assert_eq!(sb[0].severity, Severity::Warning);
        let inode = fired(&report, "time.inode");
        assert_eq!(inode.len(), 1);
        assert_eq!(inode[0].location.what, "inode 12.mtime");
        assert!(report.verdict.is_pass());
    }

    #[test]
    fn unset_superblock_times_fail() {
        let mut bytes = reference_bytes();
        put_u32(&mut bytes, 1024 + 48, 0);
        put_u32(&mut bytes, 1024 + 64, 0);
        let report = audit_bytes(bytes);
        let unset = fired(&report, "time.superblock_unset");
        assert_eq!(unset.len(), 2);
        assert_eq!(unset[0].severity, Severity::Error);
        assert_eq!(unset[0].location.what, "superblock.wtime");
        assert_eq!(unset[1].location.what, "superblock.lastcheck");
        assert!(fired(&report, "time.superblock").is_empty());
        assert!(!report.verdict.is_pass());
    }

    #[test]
    fn unset_inode_times_are_warnings() {
        let mut bytes = reference_bytes();
        put_u32(&mut bytes, 5120 + 11 * 128 + 8, 0);
        let report = audit_bytes(bytes);
        let inode = fired(&report, "time.inode");
        assert_eq!(inode.len(), 1);
        assert_eq!(inode[0].location.what, "inode 12.atime");
        assert!(report.verdict.is_pass());
    }

    #[test]
    fn skew_allows_slightly_future_times() {
        let mut bytes = reference_bytes();
        let future = u32::try_from(NOW + 100).unwrap();
        put_u32(&mut bytes, 1024 + 64, future);
        assert!(fired(&audit_bytes(bytes.clone()), "time.superblock").is_empty());

        let config = AuditConfig {
            timestamp_skew_secs: 0,
            ..AuditConfig::default()
        };
        assert_eq!(fired(&audit_bytes_with(bytes, &config), "time.superblock").len(), 1);
    }

    #[test]
    fn unused_inodes_are_not_judged() {
        let mut bytes = reference_bytes();
        put_u32(&mut bytes, 5120 + 19 * 128 + 8, u32::MAX);
        let report = audit_bytes(bytes);
        assert!(fired(&report, "time.inode").is_empty());
    }
}
