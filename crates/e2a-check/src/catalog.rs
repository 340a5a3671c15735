//! The fixed rule catalog.
//!
//! Each rule has a stable id, a finding kind and a default severity. The
//! order of [`CATALOG`] is the order findings appear in a report.

use crate::finding::{FindingKind, Severity};
use serde::Serialize;

use FindingKind::{
    AlignmentViolation, BoundaryViolation, ConsistencyViolation, Oracle, StructuralMismatch,
    ZeroingViolation,
};
use Severity::{Error, Warning};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub id: &'static str,
    pub kind: FindingKind,
    pub severity: Severity,
    pub summary: &'static str,
}

const fn rule(
    id: &'static str,
    kind: FindingKind,
    severity: Severity,
    summary: &'static str,
) -> Rule {
    Rule {
        id,
        kind,
        severity,
        summary,
    }
}

// ── Image ───────────────────────────────────────────────────────────────────

pub const IMAGE_SIZE: Rule = rule(
    "image.size",
    StructuralMismatch,
    Error,
    "image length matches the configured size and blocks_count",
);

// ── Superblock ──────────────────────────────────────────────────────────────

pub const SB_MAGIC: Rule = rule("sb.magic", StructuralMismatch, Error, "magic is 0xEF53");
pub const SB_INODES_COUNT: Rule = rule(
    "sb.inodes_count",
    StructuralMismatch,
    Error,
    "inodes_count matches configuration",
);
pub const SB_BLOCKS_COUNT: Rule = rule(
    "sb.blocks_count",
    StructuralMismatch,
    Error,
    "blocks_count matches configuration",
);
pub const SB_R_BLOCKS_COUNT: Rule = rule(
    "sb.r_blocks_count",
    StructuralMismatch,
    Error,
    "no blocks reserved for the superuser",
);
pub const SB_FIRST_DATA_BLOCK: Rule = rule(
    "sb.first_data_block",
    StructuralMismatch,
    Error,
    "first_data_block is 1 for 1024-byte blocks, else 0",
);
pub const SB_LOG_BLOCK_SIZE: Rule = rule(
    "sb.log_block_size",
    StructuralMismatch,
    Error,
    "log_block_size is 0 (1024-byte blocks)",
);
pub const SB_LOG_FRAG_SIZE: Rule = rule(
    "sb.log_frag_size",
    StructuralMismatch,
    Error,
    "fragment size equals block size",
);
pub const SB_GROUP_GEOMETRY: Rule = rule(
    "sb.group_geometry",
    StructuralMismatch,
    Error,
    "a single group spans every block and inode",
);
pub const SB_MAX_MNT_COUNT: Rule = rule(
    "sb.max_mnt_count",
    StructuralMismatch,
    Error,
    "max_mnt_count matches configuration (-1 disables)",
);
pub const SB_CHECKINTERVAL: Rule = rule(
    "sb.checkinterval",
    StructuralMismatch,
    Error,
    "checkinterval matches configuration",
);
pub const SB_STATE: Rule = rule("sb.state", StructuralMismatch, Error, "state is clean (1)");
pub const SB_ERRORS: Rule = rule(
    "sb.errors",
    StructuralMismatch,
    Error,
    "errors policy matches configuration",
);
pub const SB_REV_LEVEL: Rule = rule(
    "sb.rev_level",
    StructuralMismatch,
    Error,
    "revision 0 (fixed 128-byte inodes)",
);
pub const SB_VOLUME_NAME: Rule = rule(
    "sb.volume_name",
    StructuralMismatch,
    Error,
    "volume name matches configuration and is NUL padded",
);
pub const SB_UUID: Rule = rule("sb.uuid", StructuralMismatch, Error, "UUID matches configuration");
pub const SB_RESERVED_ZERO: Rule = rule(
    "sb.reserved_zero",
    ZeroingViolation,
    Warning,
    "reserved superblock ranges are zero",
);

// ── Group descriptor ────────────────────────────────────────────────────────

pub const GD_LOCATION: Rule = rule(
    "gd.location",
    StructuralMismatch,
    Error,
    "bitmaps and inode table sit right after the descriptor table",
);
pub const GD_RESERVED_ZERO: Rule = rule(
    "gd.reserved_zero",
    ZeroingViolation,
    Warning,
    "descriptor padding and the rest of the table block are zero",
);

// ── Bitmaps ─────────────────────────────────────────────────────────────────

pub const BITMAP_BLOCK_UNOWNED: Rule = rule(
    "bitmap.block_unowned",
    ConsistencyViolation,
    Error,
    "every marked block is owned by a live structure",
);
pub const BITMAP_BLOCK_UNMARKED: Rule = rule(
    "bitmap.block_unmarked",
    ConsistencyViolation,
    Error,
    "every owned block is marked in the block bitmap",
);
pub const BITMAP_BLOCK_SHARED: Rule = rule(
    "bitmap.block_shared",
    ConsistencyViolation,
    Error,
    "no block is owned twice",
);
pub const BITMAP_INODE_UNOCCUPIED: Rule = rule(
    "bitmap.inode_unoccupied",
    ConsistencyViolation,
    Error,
    "every marked non-reserved inode is occupied",
);
pub const BITMAP_INODE_UNMARKED: Rule = rule(
    "bitmap.inode_unmarked",
    ConsistencyViolation,
    Error,
    "reserved, occupied and referenced inodes are marked",
);
pub const BITMAP_TAIL_ZERO: Rule = rule(
    "bitmap.tail_zero",
    ZeroingViolation,
    Error,
    "bits past the declared count are zero",
);

// ── Counts ──────────────────────────────────────────────────────────────────

pub const COUNT_FREE_BLOCKS: Rule = rule(
    "count.free_blocks",
    ConsistencyViolation,
    Error,
    "free block counts agree with the block bitmap",
);
pub const COUNT_FREE_INODES: Rule = rule(
    "count.free_inodes",
    ConsistencyViolation,
    Error,
    "free inode counts agree with the inode bitmap",
);
pub const COUNT_USED_DIRS: Rule = rule(
    "count.used_dirs",
    ConsistencyViolation,
    Error,
    "used_dirs_count equals the number of directory inodes",
);

// ── Inodes ──────────────────────────────────────────────────────────────────

pub const INODE_TYPE: Rule = rule(
    "inode.type",
    StructuralMismatch,
    Error,
    "live inodes carry a known type; the root is a directory",
);
pub const INODE_PERMISSIONS: Rule = rule(
    "inode.permissions",
    StructuralMismatch,
    Error,
    "permission bits match configuration for the inode's kind",
);
pub const INODE_OWNER: Rule = rule(
    "inode.owner",
    StructuralMismatch,
    Error,
    "uid and gid match configuration",
);
pub const INODE_LINKS: Rule = rule(
    "inode.links",
    ConsistencyViolation,
    Error,
    "links_count equals the directory entries naming the inode",
);
pub const INODE_DIR_SIZE: Rule = rule(
    "inode.dir_size",
    StructuralMismatch,
    Error,
    "directory size and sector count match its blocks",
);
pub const INODE_FILE_SIZE: Rule = rule(
    "inode.file_size",
    StructuralMismatch,
    Error,
    "file size, pointer count and sector count agree",
);
pub const INODE_FAST_SYMLINK: Rule = rule(
    "inode.fast_symlink",
    StructuralMismatch,
    Error,
    "fast symlinks hold their target inline with zero blocks",
);
pub const INODE_BLOCK_RANGE: Rule = rule(
    "inode.block_range",
    BoundaryViolation,
    Error,
    "direct pointers name data blocks inside the filesystem",
);
pub const INODE_INDIRECT: Rule = rule(
    "inode.indirect",
    StructuralMismatch,
    Error,
    "indirect pointers are unused",
);
pub const INODE_LIVE_FIELDS: Rule = rule(
    "inode.live_fields",
    ZeroingViolation,
    Error,
    "dtime, flags, ACLs and faddr are zero on live inodes",
);
pub const INODE_OSD_ZERO: Rule = rule(
    "inode.osd_zero",
    ZeroingViolation,
    Error,
    "OS-dependent reserved fields are zero",
);
pub const INODE_UNREFERENCED_ZERO: Rule = rule(
    "inode.unreferenced_zero",
    ZeroingViolation,
    Error,
    "inodes no entry names are entirely zero",
);
pub const INODE_RESERVED_UNUSED: Rule = rule(
    "inode.reserved_unused",
    ZeroingViolation,
    Error,
    "reserved inodes other than the root are zero",
);
pub const INODE_DATA_SLACK: Rule = rule(
    "inode.data_slack",
    ZeroingViolation,
    Warning,
    "bytes past end of file in its last block are zero",
);
pub const INODE_CONTENT: Rule = rule(
    "inode.content",
    StructuralMismatch,
    Error,
    "file data and symlink targets match configuration",
);

// ── Directories ─────────────────────────────────────────────────────────────

pub const DIR_REC_LEN_ZERO: Rule = rule(
    "dir.rec_len_zero",
    BoundaryViolation,
    Error,
    "no record has rec_len 0",
);
pub const DIR_TRUNCATED_HEADER: Rule = rule(
    "dir.truncated_header",
    BoundaryViolation,
    Error,
    "every record header fits in the block",
);
pub const DIR_BOUNDARY: Rule = rule(
    "dir.boundary",
    BoundaryViolation,
    Error,
    "records never cross the block end",
);
pub const DIR_ALIGNMENT: Rule = rule(
    "dir.alignment",
    AlignmentViolation,
    Error,
    "rec_len is a multiple of 4",
);
pub const DIR_RECORD_SHORT: Rule = rule(
    "dir.record_short",
    StructuralMismatch,
    Error,
    "rec_len covers at least the 8-byte header",
);
pub const DIR_NAME_OVERFLOW: Rule = rule(
    "dir.name_overflow",
    BoundaryViolation,
    Error,
    "names fit inside their record",
);
pub const DIR_ZERO_INODE: Rule = rule(
    "dir.zero_inode",
    StructuralMismatch,
    Error,
    "inode 0 appears only as block-end padding",
);
pub const DIR_UNFILLED: Rule = rule(
    "dir.unfilled",
    BoundaryViolation,
    Error,
    "records tile the block exactly",
);
pub const DIR_DOT_ENTRIES: Rule = rule(
    "dir.dot_entries",
    StructuralMismatch,
    Error,
    "\".\" and \"..\" lead each directory and name self and parent",
);
pub const DIR_FILE_TYPE: Rule = rule(
    "dir.file_type",
    ConsistencyViolation,
    Error,
    "a non-zero file-type byte matches the inode's type",
);
pub const DIR_INODE_RANGE: Rule = rule(
    "dir.inode_range",
    BoundaryViolation,
    Error,
    "entries name inodes within inodes_count",
);
pub const DIR_DANGLING: Rule = rule(
    "dir.dangling",
    ConsistencyViolation,
    Error,
    "entries name occupied inodes",
);
pub const DIR_DUPLICATE_NAME: Rule = rule(
    "dir.duplicate_name",
    StructuralMismatch,
    Error,
    "names are unique within a directory",
);
pub const DIR_HARD_LINKED_DIR: Rule = rule(
    "dir.hard_linked_dir",
    ConsistencyViolation,
    Error,
    "a directory has exactly one parent entry",
);
pub const DIR_TOPOLOGY: Rule = rule(
    "dir.topology",
    StructuralMismatch,
    Error,
    "configured paths exist with the expected inode and kind",
);
pub const DIR_UNEXPECTED_ENTRY: Rule = rule(
    "dir.unexpected_entry",
    StructuralMismatch,
    Error,
    "no paths beyond the configured topology",
);

// ── Timestamps ──────────────────────────────────────────────────────────────

pub const TIME_SUPERBLOCK_UNSET: Rule = rule(
    "time.superblock_unset",
    StructuralMismatch,
    Error,
    "wtime and lastcheck are set",
);
pub const TIME_SUPERBLOCK: Rule = rule(
    "time.superblock",
    StructuralMismatch,
    Warning,
    "wtime and lastcheck are not in the future",
);
pub const TIME_INODE: Rule = rule(
    "time.inode",
    StructuralMismatch,
    Warning,
    "live inode times are set and not in the future",
);

// ── Oracle ──────────────────────────────────────────────────────────────────

pub const ORACLE_UNAVAILABLE: Rule = rule(
    "oracle.unavailable",
    Oracle,
    Warning,
    "the external checker could be run",
);
pub const ORACLE_REPORTED: Rule = rule(
    "oracle.reported",
    Oracle,
    Error,
    "the external checker accepts the image",
);

/// Every rule in report order.
pub static CATALOG: &[Rule] = &[
    IMAGE_SIZE,
    SB_MAGIC,
    SB_INODES_COUNT,
    SB_BLOCKS_COUNT,
    SB_R_BLOCKS_COUNT,
    SB_FIRST_DATA_BLOCK,
    SB_LOG_BLOCK_SIZE,
    SB_LOG_FRAG_SIZE,
    SB_GROUP_GEOMETRY,
    SB_MAX_MNT_COUNT,
    SB_CHECKINTERVAL,
    SB_STATE,
    SB_ERRORS,
    SB_REV_LEVEL,
    SB_VOLUME_NAME,
    SB_UUID,
    SB_RESERVED_ZERO,
    GD_LOCATION,
    GD_RESERVED_ZERO,
    BITMAP_BLOCK_UNOWNED,
    BITMAP_BLOCK_UNMARKED,
    BITMAP_BLOCK_SHARED,
    BITMAP_INODE_UNOCCUPIED,
    BITMAP_INODE_UNMARKED,
    BITMAP_TAIL_ZERO,
    COUNT_FREE_BLOCKS,
    COUNT_FREE_INODES,
    COUNT_USED_DIRS,
    INODE_TYPE,
    INODE_PERMISSIONS,
    INODE_OWNER,
    INODE_LINKS,
    INODE_DIR_SIZE,
    INODE_FILE_SIZE,
    INODE_FAST_SYMLINK,
    INODE_BLOCK_RANGE,
    INODE_INDIRECT,
    INODE_LIVE_FIELDS,
    INODE_OSD_ZERO,
    INODE_UNREFERENCED_ZERO,
    INODE_RESERVED_UNUSED,
    INODE_DATA_SLACK,
    INODE_CONTENT,
    DIR_REC_LEN_ZERO,
    DIR_TRUNCATED_HEADER,
    DIR_BOUNDARY,
    DIR_ALIGNMENT,
    DIR_RECORD_SHORT,
    DIR_NAME_OVERFLOW,
    DIR_ZERO_INODE,
    DIR_UNFILLED,
    DIR_DOT_ENTRIES,
    DIR_FILE_TYPE,
    DIR_INODE_RANGE,
    DIR_DANGLING,
    DIR_DUPLICATE_NAME,
    DIR_HARD_LINKED_DIR,
    DIR_TOPOLOGY,
    DIR_UNEXPECTED_ENTRY,
    TIME_SUPERBLOCK_UNSET,
    TIME_SUPERBLOCK,
    TIME_INODE,
    ORACLE_UNAVAILABLE,
    ORACLE_REPORTED,
];

#[must_use]
pub fn lookup(id: &str) -> Option<&'static Rule> {
    CATALOG.iter().find(|rule| rule.id == id)
}

/// Position of `id` in report order; unknown ids sort last.
#[must_use]
pub fn order_of(id: &str) -> usize {
    CATALOG
        .iter()
        .position(|rule| rule.id == id)
        .unwrap_or(CATALOG.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn ids_are_unique_and_namespaced() {
        let ids: BTreeSet<&str> = CATALOG.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), CATALOG.len());
        for rule in CATALOG {
            let family = rule.id.split('.').next().unwrap();
            assert!(
                ["image", "sb", "gd", "bitmap", "count", "inode", "dir", "time", "oracle"]
                    .contains(&family),
                "unexpected family in {}",
                rule.id
            );
        }
    }

    #[test]
    fn default_severity_table() {
        assert_eq!(SB_RESERVED_ZERO.severity, Severity::Warning);
        assert_eq!(GD_RESERVED_ZERO.severity, Severity::Warning);
        assert_eq!(INODE_OSD_ZERO.severity, Severity::Error);
        assert_eq!(SB_MAGIC.severity, Severity::Error);
        assert_eq!(COUNT_FREE_BLOCKS.severity, Severity::Error);
        assert_eq!(TIME_INODE.severity, Severity::Warning);
        assert_eq!(TIME_SUPERBLOCK.severity, Severity::Warning);
        assert_eq!(TIME_SUPERBLOCK_UNSET.severity, Severity::Error);
        assert_eq!(INODE_RESERVED_UNUSED.severity, Severity::Error);
        assert_eq!(ORACLE_UNAVAILABLE.severity, Severity::Warning);
        assert_eq!(ORACLE_REPORTED.severity, Severity::Error);
    }

    #[test]
    fn lookup_and_order() {
        assert_eq!(lookup("sb.magic"), Some(&SB_MAGIC));
        assert_eq!(lookup("sb.nope"), None);
        assert!(order_of("sb.magic") < order_of("dir.alignment"));
        assert_eq!(order_of("unknown"), CATALOG.len());
    }
}
