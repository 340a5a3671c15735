//! `inode.*` rules.
//!
//! Every slot in the table is visited. Live inodes (the root and anything a
//! directory entry names) are checked field by field against their kind;
//! everything else must be zero.

use super::{describe_dirty, inode_field_location};
use crate::catalog::{self, Rule};
use crate::context::{AuditContext, InodeSlot};
use crate::finding::{FindingSink, Location};
use e2a_ondisk::records::{
    I_BLOCK, I_BLOCKS, I_DIR_ACL, I_DTIME, I_FADDR, I_FILE_ACL, I_FLAGS, I_GID, I_LINKS_COUNT,
    I_MODE, I_SIZE, I_UID,
};
use e2a_types::{BlockNumber, EXT2_NDIR_BLOCKS, FileKind, InodeNumber, first_nonzero};
use tracing::debug;

/// Longest data excerpt quoted in a finding.
const PREVIEW_LEN: usize = 48;

pub fn check(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let before = sink.len();
    for slot in &ctx.inodes {
        if !slot.is_occupied() && slot.ino != InodeNumber::ROOT {
            continue;
        }
        check_osd(slot, sink);
        if ctx.is_live(slot.ino) {
            check_live(ctx, slot, sink);
        } else if slot.ino.is_reserved() {
            report_dirty(slot, sink, &catalog::INODE_RESERVED_UNUSED);
        } else {
            report_dirty(slot, sink, &catalog::INODE_UNREFERENCED_ZERO);
        }
    }
    debug!(findings = sink.len() - before, "inode rules done");
}

fn report_dirty(slot: &InodeSlot<'_>, sink: &mut FindingSink<'_>, rule: &Rule) {
    let first = first_nonzero(slot.raw).unwrap_or(0);
    sink.report(
        rule,
        Location::new(slot.offset + first as u64, format!("inode {}", slot.ino)),
        "all zero",
        describe_dirty(slot.raw),
    );
}

fn check_osd(slot: &InodeSlot<'_>, sink: &mut FindingSink<'_>) {
    let Some(record) = slot.record() else {
        return;
    };
    for dirty in record.nonzero_reserved() {
        sink.report(
            &catalog::INODE_OSD_ZERO,
            Location::new(
                slot.offset + dirty.first_nonzero as u64,
                format!(
                    "inode {}[{}..{}]",
                    slot.ino, dirty.range.start, dirty.range.end
                ),
            ),
            "all zero",
            describe_dirty(&slot.raw[dirty.range.clone()]),
        );
    }
}

/// The kind directory entries (or the configured topology) say this inode is.
fn expected_kind(ctx: &AuditContext<'_>, ino: InodeNumber) -> Option<FileKind> {
    if ino == InodeNumber::ROOT {
        return Some(FileKind::Directory);
    }
    if let Some(entry) = ctx.config.topology.iter().find(|e| e.inode == ino.0) {
        return Some(entry.kind);
    }
    ctx.entries
        .iter()
        .filter(|named| named.entry.inode == ino.0 && !named.is_dot_or_dotdot())
        .find_map(|named| FileKind::from_dir_file_type(named.entry.file_type))
}

/// Configured file content or link target for this inode.
fn expected_data<'c>(
    ctx: &'c AuditContext<'_>,
    ino: InodeNumber,
    kind: FileKind,
) -> Option<&'c [u8]> {
    let entry = ctx
        .config
        .topology
        .iter()
        .find(|e| e.inode == ino.0 && e.kind == kind)?;
    match kind {
        FileKind::Regular => entry.content.as_deref().map(str::as_bytes),
        FileKind::Symlink => entry.target.as_deref().map(str::as_bytes),
        _ => None,
    }
}

fn check_live(ctx: &AuditContext<'_>, slot: &InodeSlot<'_>, sink: &mut FindingSink<'_>) {
    let inode = &slot.inode;
    let kind = inode.kind();

    match (expected_kind(ctx, slot.ino), kind) {
        (expected, None) => sink.report(
            &catalog::INODE_TYPE,
            inode_field_location(slot, &I_MODE),
            expected.map_or_else(|| "a valid file type".to_owned(), |k| k.to_string()),
            format!("mode {:#o}", inode.mode),
        ),
        (Some(expected), Some(actual)) if expected != actual => sink.report(
            &catalog::INODE_TYPE,
            inode_field_location(slot, &I_MODE),
            expected,
            actual,
        ),
        _ => {}
    }

    if let Some(perm) = kind.and_then(|k| ctx.config.permissions.for_kind(k)) {
        if inode.permissions() != perm {
            sink.report(
                &catalog::INODE_PERMISSIONS,
                inode_field_location(slot, &I_MODE),
                format!("{perm:#o}"),
                format!("{:#o}", inode.permissions()),
            );
        }
    }

    check_owner(ctx, slot, sink);

    sink.expect_eq(
        &catalog::INODE_LINKS,
        || inode_field_location(slot, &I_LINKS_COUNT),
        ctx.ref_count(slot.ino),
        u32::from(inode.links_count),
    );

    for (field, value) in [
        (&I_DTIME, inode.dtime),
        (&I_FLAGS, inode.flags),
        (&I_FILE_ACL, inode.file_acl),
        (&I_DIR_ACL, inode.dir_acl),
        (&I_FADDR, inode.faddr),
    ] {
        sink.expect_eq(
            &catalog::INODE_LIVE_FIELDS,
            || inode_field_location(slot, field),
            0,
            value,
        );
    }

    match kind {
        Some(FileKind::Directory) => check_directory(ctx, slot, sink),
        Some(FileKind::Symlink) if inode.is_fast_symlink() => {
            check_fast_symlink(slot, sink, expected_data(ctx, slot.ino, FileKind::Symlink));
        }
        Some(k @ (FileKind::Regular | FileKind::Symlink)) => {
            check_file_data(ctx, slot, sink, expected_data(ctx, slot.ino, k));
        }
        _ => {}
    }

    if !inode.is_fast_symlink() {
        check_pointers(ctx, slot, sink);
    }
}

/// Ownership, for inodes the topology names with a uid or gid.
fn check_owner(ctx: &AuditContext<'_>, slot: &InodeSlot<'_>, sink: &mut FindingSink<'_>) {
    let Some(entry) = ctx.config.topology.iter().find(|e| e.inode == slot.ino.0) else {
        return;
    };
    for (field, want, have) in [
        (&I_UID, entry.uid, slot.inode.uid),
        (&I_GID, entry.gid, slot.inode.gid),
    ] {
        if let Some(want) = want {
            sink.expect_eq(
                &catalog::INODE_OWNER,
                || inode_field_location(slot, field),
                want,
                have,
            );
        }
    }
}

fn check_directory(ctx: &AuditContext<'_>, slot: &InodeSlot<'_>, sink: &mut FindingSink<'_>) {
    let inode = &slot.inode;
    let nblocks = u32::try_from(inode.data_blocks().len()).unwrap_or(u32::MAX);
    if nblocks == 0 {
        sink.report(
            &catalog::INODE_DIR_SIZE,
            inode_field_location(slot, &I_BLOCK),
            "at least one data block",
            "none",
        );
        return;
    }
    sink.expect_eq(
        &catalog::INODE_DIR_SIZE,
        || inode_field_location(slot, &I_SIZE),
        nblocks.saturating_mul(ctx.block_size.get()),
        inode.size,
    );
    sink.expect_eq(
        &catalog::INODE_DIR_SIZE,
        || inode_field_location(slot, &I_BLOCKS),
        nblocks.saturating_mul(ctx.block_size.sectors_per_block()),
        inode.blocks,
    );
}

fn check_fast_symlink(
    slot: &InodeSlot<'_>,
    sink: &mut FindingSink<'_>,
    expected: Option<&[u8]>,
) {
    let inode = &slot.inode;
    let bytes = inode.block_bytes();
    let size = inode.size as usize;
    let (target, tail) = bytes.split_at(size);

    sink.expect_eq(
        &catalog::INODE_FAST_SYMLINK,
        || inode_field_location(slot, &I_BLOCKS),
        0,
        inode.blocks,
    );
    if size == 0 {
        sink.report(
            &catalog::INODE_FAST_SYMLINK,
            inode_field_location(slot, &I_SIZE),
            "a non-empty target",
            0,
        );
    }
    if let Some(nul) = target.iter().position(|b| *b == 0) {
        sink.report(
            &catalog::INODE_FAST_SYMLINK,
            Location::new(
                slot.offset + (I_BLOCK.offset + nul) as u64,
                slot.field_label("block"),
            ),
            format!("{size} target bytes without NUL"),
            format!("NUL at byte {nul}"),
        );
    }
    if let Some(first) = first_nonzero(tail) {
        sink.report(
            &catalog::INODE_FAST_SYMLINK,
            Location::new(
                slot.offset + (I_BLOCK.offset + size + first) as u64,
                slot.field_label("block"),
            ),
            format!("zero after the {size}-byte target"),
            describe_dirty(tail),
        );
    }
    if let Some(want) = expected {
        if target != want {
            sink.report(
                &catalog::INODE_CONTENT,
                inode_field_location(slot, &I_BLOCK),
                preview(want),
                preview(target),
            );
        }
    }
}

/// Regular files and slow symlinks: pointers, block count, data and slack.
fn check_file_data(
    ctx: &AuditContext<'_>,
    slot: &InodeSlot<'_>,
    sink: &mut FindingSink<'_>,
    expected: Option<&[u8]>,
) {
    let inode = &slot.inode;
    let bs = u64::from(ctx.block_size.get());
    let size = u64::from(inode.size);
    let needed = usize::try_from(size.div_ceil(bs)).unwrap_or(usize::MAX);
    let direct = inode.direct_blocks();
    let leading = direct.iter().take_while(|b| **b != 0).count();
    let populated = direct.iter().filter(|b| **b != 0).count();

    if needed > EXT2_NDIR_BLOCKS {
        sink.report(
            &catalog::INODE_FILE_SIZE,
            inode_field_location(slot, &I_SIZE),
            format!("at most {} bytes", EXT2_NDIR_BLOCKS as u64 * bs),
            size,
        );
    } else if leading != needed || populated != needed {
        sink.report(
            &catalog::INODE_FILE_SIZE,
            inode_field_location(slot, &I_BLOCK),
            format!("{needed} leading direct pointer(s) for {size} bytes"),
            format!("{populated} populated, {leading} leading"),
        );
    }
    sink.expect_eq(
        &catalog::INODE_FILE_SIZE,
        || inode_field_location(slot, &I_BLOCKS),
        u32::try_from(needed)
            .unwrap_or(u32::MAX)
            .saturating_mul(ctx.block_size.sectors_per_block()),
        inode.blocks,
    );

    if needed == 0 || leading < needed {
        return;
    }
    let blocks: Option<Vec<&[u8]>> = direct[..needed]
        .iter()
        .map(|b| {
            (*b < ctx.sb.blocks_count)
                .then(|| ctx.block(BlockNumber(*b)))
                .flatten()
        })
        .collect();
    let Some(blocks) = blocks else {
        return;
    };

    let in_last = usize::try_from(size - (needed as u64 - 1) * bs).unwrap_or(0);
    if let Some(last) = blocks.last() {
        let slack = &last[in_last..];
        if let Some(first) = first_nonzero(slack) {
            let block = BlockNumber(direct[needed - 1]);
            sink.report(
                &catalog::INODE_DATA_SLACK,
                Location::new(
                    ctx.block_offset(block) + (in_last + first) as u64,
                    format!("inode {} block {block}", slot.ino),
                ),
                format!("zero after byte {in_last}"),
                describe_dirty(slack),
            );
        }
    }

    if let Some(want) = expected {
        let data: Vec<u8> = blocks.concat();
        let have = &data[..usize::try_from(size).unwrap_or(data.len()).min(data.len())];
        if have != want {
            sink.report(
                &catalog::INODE_CONTENT,
                Location::new(
                    ctx.block_offset(BlockNumber(direct[0])),
                    format!("inode {} data", slot.ino),
                ),
                preview(want),
                preview(have),
            );
        }
    }
}

fn check_pointers(ctx: &AuditContext<'_>, slot: &InodeSlot<'_>, sink: &mut FindingSink<'_>) {
    let inode = &slot.inode;
    let location = |index: usize| {
        Location::new(
            slot.offset + (I_BLOCK.offset + index * 4) as u64,
            format!("inode {}.block[{index}]", slot.ino),
        )
    };

    let valid = ctx.sb.first_data_block..ctx.sb.blocks_count;
    for (index, ptr) in inode.direct_blocks().iter().enumerate() {
        if *ptr != 0 && !valid.contains(ptr) {
            sink.report(
                &catalog::INODE_BLOCK_RANGE,
                location(index),
                format!("{}..{}", valid.start, valid.end),
                ptr,
            );
        }
    }
    for (index, ptr) in inode.indirect_blocks().iter().enumerate() {
        if *ptr != 0 {
            sink.report(&catalog::INODE_INDIRECT, location(EXT2_NDIR_BLOCKS + index), 0, ptr);
        }
    }
}

/// Quoted, escaped, length-limited rendering of file bytes.
fn preview(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(PREVIEW_LEN)];
    let text = String::from_utf8_lossy(shown);
    if bytes.len() > PREVIEW_LEN {
        format!("{text:?}... ({} bytes)", bytes.len())
    } else {
        format!("{text:?}")
    }
}
