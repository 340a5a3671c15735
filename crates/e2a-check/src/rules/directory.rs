//! `dir.*` rules: record framing, the `.`/`..` convention, what entries
//! name, and the path topology.

use crate::catalog::{self, Rule};
use crate::context::{AuditContext, DirNode, NamedEntry};
use crate::finding::{FindingSink, Location};
use e2a_ondisk::{DirEntry, DirViolation};
use e2a_types::InodeNumber;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub fn check(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let before = sink.len();
    for dir in &ctx.dirs {
        check_framing(dir, sink);
        check_dots(dir, sink);
        check_duplicates(dir, sink);
    }
    check_entries(ctx, sink);
    check_hard_links(ctx, sink);
    check_topology(ctx, sink);
    debug!(
        dirs = ctx.dirs.len(),
        findings = sink.len() - before,
        "directory rules done"
    );
}

fn violation_rule(violation: &DirViolation) -> &'static Rule {
    match violation {
        DirViolation::ZeroRecordLength { .. } => &catalog::DIR_REC_LEN_ZERO,
        DirViolation::TruncatedHeader { .. } => &catalog::DIR_TRUNCATED_HEADER,
        DirViolation::BoundaryViolation { .. } => &catalog::DIR_BOUNDARY,
        DirViolation::AlignmentViolation { .. } => &catalog::DIR_ALIGNMENT,
        DirViolation::RecordTooShort { .. } => &catalog::DIR_RECORD_SHORT,
        DirViolation::NameOverflow { .. } => &catalog::DIR_NAME_OVERFLOW,
        DirViolation::ZeroInodeMidBlock { .. } => &catalog::DIR_ZERO_INODE,
        DirViolation::UnfilledDirectoryBlock { .. } => &catalog::DIR_UNFILLED,
    }
}

fn check_framing(dir: &DirNode, sink: &mut FindingSink<'_>) {
    for block in &dir.blocks {
        for violation in &block.walk.violations {
            let rule = violation_rule(violation);
            sink.report(
                rule,
                Location::new(
                    block.offset + violation.offset() as u64,
                    format!("dir {} block {}", dir.path, block.block),
                ),
                rule.summary,
                violation,
            );
        }
    }
}

fn describe(entry: Option<&DirEntry>) -> String {
    entry.map_or_else(
        || "no entry".to_owned(),
        |e| format!("{:?} -> {}", e.name_str(), e.inode),
    )
}

fn check_dots(dir: &DirNode, sink: &mut FindingSink<'_>) {
    // A directory without blocks is reported by inode.dir_size.
    let Some(first) = dir.blocks.first() else {
        return;
    };
    let entries = &first.walk.entries;
    let location = |entry: Option<&DirEntry>| {
        Location::new(
            first.offset + entry.map_or(0, |e| e.offset) as u64,
            format!("dir {} block {}", dir.path, first.block),
        )
    };

    let dot = entries.first();
    if !dot.is_some_and(|e| e.is_dot() && e.offset == 0 && e.inode == dir.ino.0) {
        sink.report(
            &catalog::DIR_DOT_ENTRIES,
            location(dot),
            format!("\".\" -> {} at offset 0", dir.ino),
            describe(dot),
        );
    }
    let dotdot = entries.get(1);
    if !dotdot.is_some_and(|e| e.is_dotdot() && e.inode == dir.parent.0) {
        sink.report(
            &catalog::DIR_DOT_ENTRIES,
            location(dotdot),
            format!("\"..\" -> {} second", dir.parent),
            describe(dotdot),
        );
    }
}

fn check_duplicates(dir: &DirNode, sink: &mut FindingSink<'_>) {
    let mut seen = BTreeSet::new();
    for block in &dir.blocks {
        for entry in &block.walk.entries {
            if !seen.insert(entry.name.as_slice()) {
                sink.report(
                    &catalog::DIR_DUPLICATE_NAME,
                    Location::new(
                        block.offset + entry.offset as u64,
                        format!("dir {} block {}", dir.path, block.block),
                    ),
                    "a unique name",
                    format!("second {:?}", entry.name_str()),
                );
            }
        }
    }
}

fn entry_location(named: &NamedEntry) -> Location {
    Location::new(
        named.offset,
        format!("dirent {:?} in inode {}", named.entry.name_str(), named.dir),
    )
}

fn check_entries(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    for named in &ctx.entries {
        let entry = &named.entry;
        if entry.inode > ctx.sb.inodes_count {
            sink.report(
                &catalog::DIR_INODE_RANGE,
                entry_location(named),
                format!("1..={}", ctx.sb.inodes_count),
                entry.inode,
            );
            continue;
        }
        let Some(slot) = ctx
            .slot(InodeNumber(entry.inode))
            .filter(|slot| slot.is_occupied())
        else {
            sink.report(
                &catalog::DIR_DANGLING,
                entry_location(named),
                "an in-use inode",
                format!("inode {} is zero", entry.inode),
            );
            continue;
        };
        if entry.file_type == 0 {
            continue;
        }
        if let Some(kind) = slot.inode.kind() {
            sink.expect_eq(
                &catalog::DIR_FILE_TYPE,
                || entry_location(named),
                kind.dir_file_type(),
                entry.file_type,
            );
        }
    }
}

/// Directories take exactly one name besides `.` and `..`; the root takes none.
fn check_hard_links(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let mut names: BTreeMap<u32, Vec<&NamedEntry>> = BTreeMap::new();
    for named in ctx.entries.iter().filter(|n| !n.is_dot_or_dotdot()) {
        names.entry(named.entry.inode).or_default().push(named);
    }
    for (ino, named) in names {
        let ino = InodeNumber(ino);
        if !ctx.slot(ino).is_some_and(|slot| slot.inode.is_dir()) {
            continue;
        }
        let allowed = usize::from(ino != InodeNumber::ROOT);
        if named.len() > allowed {
            sink.report(
                &catalog::DIR_HARD_LINKED_DIR,
                entry_location(named[allowed]),
                format!("{allowed} name(s) for directory inode {ino}"),
                named.len(),
            );
        }
    }
}

fn check_topology(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let mut by_path: BTreeMap<&str, &NamedEntry> = BTreeMap::new();
    for named in ctx.entries.iter().filter(|n| !n.is_dot_or_dotdot()) {
        by_path.entry(named.path.as_str()).or_insert(named);
    }
    let root_offset = ctx
        .dirs
        .first()
        .and_then(|dir| dir.blocks.first())
        .map_or(0, |block| block.offset);

    for want in &ctx.config.topology {
        let (ino, location) = if want.path == "/" {
            (
                InodeNumber::ROOT,
                Location::new(root_offset, "path /"),
            )
        } else if let Some(named) = by_path.get(want.path.as_str()) {
            (InodeNumber(named.entry.inode), entry_location(named))
        } else {
            sink.report(
                &catalog::DIR_TOPOLOGY,
                Location::new(root_offset, format!("path {}", want.path)),
                format!("{} -> inode {} ({})", want.path, want.inode, want.kind),
                "missing",
            );
            continue;
        };

        if ino.0 != want.inode {
            sink.report(
                &catalog::DIR_TOPOLOGY,
                location,
                format!("{} -> inode {}", want.path, want.inode),
                format!("inode {ino}"),
            );
            continue;
        }
        let kind = ctx.slot(ino).and_then(|slot| slot.inode.kind());
        if kind != Some(want.kind) {
            sink.report(
                &catalog::DIR_TOPOLOGY,
                location,
                format!("{} is a {}", want.path, want.kind),
                kind.map_or_else(|| "no valid type".to_owned(), |k| k.to_string()),
            );
        }
    }

    if ctx.config.strict_topology {
        for (path, named) in by_path {
            if ctx.config.topology_entry(path).is_none() {
                sink.report(
                    &catalog::DIR_UNEXPECTED_ENTRY,
                    entry_location(named),
                    "only configured paths",
                    format!("{path} -> inode {}", named.entry.inode),
                );
            }
        }
    }
}
