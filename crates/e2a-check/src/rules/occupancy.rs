//! `bitmap.*` and `count.*` rules: the bitmaps against what the image
//! actually uses, and the stored free counts against the bitmaps.

use super::{gd_location, sb_location};
use crate::catalog;
use crate::context::{AuditContext, BlockOwner};
use crate::finding::{FindingSink, Location};
use e2a_ondisk::Bitmap;
use e2a_ondisk::records::{
    GD_FREE_BLOCKS_COUNT, GD_FREE_INODES_COUNT, GD_USED_DIRS_COUNT, SB_FREE_BLOCKS_COUNT,
    SB_FREE_INODES_COUNT,
};
use e2a_types::{BlockNumber, InodeNumber};
use tracing::debug;

pub fn check(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let before = sink.len();
    check_block_bitmap(ctx, sink);
    check_inode_bitmap(ctx, sink);
    check_tails(ctx, sink);
    check_counts(ctx, sink);
    debug!(findings = sink.len() - before, "occupancy rules done");
}

fn bit_location(
    ctx: &AuditContext<'_>,
    bitmap: BlockNumber,
    label: &str,
    bit: usize,
) -> Location {
    Location::new(
        ctx.block_offset(bitmap) + (bit / 8) as u64,
        format!("{label} bit {bit}"),
    )
}

fn check_block_bitmap(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let limit = ctx.block_bits();
    let bitmap_block = ctx.locations.block_bitmap;

    for bit in ctx.block_bitmap.iter_set(limit) {
        let block = BlockNumber(u32::try_from(bit).unwrap_or(u32::MAX));
        if !ctx.owners.contains_key(&block) {
            sink.report(
                &catalog::BITMAP_BLOCK_UNOWNED,
                bit_location(ctx, bitmap_block, "block bitmap", bit),
                format!("clear (block {block} unused)"),
                "set",
            );
        }
    }

    for (block, owners) in &ctx.owners {
        let bit = block.0 as usize;
        if bit < limit && !ctx.block_bitmap.get(bit) {
            sink.report(
                &catalog::BITMAP_BLOCK_UNMARKED,
                bit_location(ctx, bitmap_block, "block bitmap", bit),
                format!("set (block {block} used by {})", join(owners)),
                "clear",
            );
        }
        if owners.len() > 1 {
            sink.report(
                &catalog::BITMAP_BLOCK_SHARED,
                Location::new(ctx.block_offset(*block), format!("block {block}")),
                "a single owner",
                join(owners),
            );
        }
    }
}

fn check_inode_bitmap(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let limit = ctx.inode_bits();
    let bitmap_block = ctx.locations.inode_bitmap;

    for bit in ctx.inode_bitmap.iter_set(limit) {
        let ino = InodeNumber(u32::try_from(bit + 1).unwrap_or(u32::MAX));
        if ino.is_reserved() {
            continue;
        }
        if !ctx.slot(ino).is_some_and(|slot| slot.is_occupied()) {
            sink.report(
                &catalog::BITMAP_INODE_UNOCCUPIED,
                bit_location(ctx, bitmap_block, "inode bitmap", bit),
                format!("clear (inode {ino} is zero)"),
                "set",
            );
        }
    }

    for slot in &ctx.inodes {
        let Some(bit) = slot.ino.table_index().map(|i| i as usize) else {
            continue;
        };
        if bit >= limit || ctx.inode_bitmap.get(bit) {
            continue;
        }
        // Reserved inodes are always allocated, used or not.
        let why = if slot.ino.is_reserved() {
            "reserved"
        } else if slot.is_occupied() {
            "in use"
        } else {
            continue;
        };
        sink.report(
            &catalog::BITMAP_INODE_UNMARKED,
            bit_location(ctx, bitmap_block, "inode bitmap", bit),
            format!("set (inode {} {why})", slot.ino),
            "clear",
        );
    }
}

fn check_tails(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    for (label, block, bitmap, limit) in [
        (
            "block bitmap",
            ctx.locations.block_bitmap,
            ctx.block_bitmap,
            ctx.block_bits(),
        ),
        (
            "inode bitmap",
            ctx.locations.inode_bitmap,
            ctx.inode_bitmap,
            ctx.inode_bits(),
        ),
    ] {
        check_tail(ctx, sink, label, block, &bitmap, limit);
    }
}

fn check_tail(
    ctx: &AuditContext<'_>,
    sink: &mut FindingSink<'_>,
    label: &str,
    block: BlockNumber,
    bitmap: &Bitmap<'_>,
    limit: usize,
) {
    let Some(first) = bitmap.first_set_at_or_after(limit) else {
        return;
    };
    sink.report(
        &catalog::BITMAP_TAIL_ZERO,
        bit_location(ctx, block, label, first),
        format!("bits {limit}..{} clear", bitmap.len_bits()),
        format!(
            "{} set, first at bit {first}",
            bitmap.count_set_at_or_after(limit)
        ),
    );
}

fn check_counts(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let config = ctx.config;

    let used_blocks = to_u32(ctx.block_bitmap.count_set(ctx.block_bits()));
    let free_blocks = ctx.sb.blocks_count.saturating_sub(used_blocks);
    sink.expect_eq(
        &catalog::COUNT_FREE_BLOCKS,
        || sb_location(&SB_FREE_BLOCKS_COUNT),
        free_blocks,
        ctx.sb.free_blocks_count,
    );
    sink.expect_eq(
        &catalog::COUNT_FREE_BLOCKS,
        || gd_location(ctx, &GD_FREE_BLOCKS_COUNT),
        free_blocks,
        u32::from(ctx.gd.free_blocks_count),
    );
    sink.expect_eq(
        &catalog::COUNT_FREE_BLOCKS,
        || {
            Location::new(
                ctx.block_offset(ctx.locations.block_bitmap),
                "block bitmap free bits",
            )
        },
        config.free_blocks,
        free_blocks,
    );

    let used_inodes = to_u32(ctx.inode_bitmap.count_set(ctx.inode_bits()));
    let free_inodes = ctx.sb.inodes_count.saturating_sub(used_inodes);
    sink.expect_eq(
        &catalog::COUNT_FREE_INODES,
        || sb_location(&SB_FREE_INODES_COUNT),
        free_inodes,
        ctx.sb.free_inodes_count,
    );
    sink.expect_eq(
        &catalog::COUNT_FREE_INODES,
        || gd_location(ctx, &GD_FREE_INODES_COUNT),
        free_inodes,
        u32::from(ctx.gd.free_inodes_count),
    );
    sink.expect_eq(
        &catalog::COUNT_FREE_INODES,
        || {
            Location::new(
                ctx.block_offset(ctx.locations.inode_bitmap),
                "inode bitmap free bits",
            )
        },
        config.free_inodes,
        free_inodes,
    );

    let used_dirs = ctx
        .inodes
        .iter()
        .filter(|slot| slot.is_occupied() && slot.inode.is_dir())
        .count();
    sink.expect_eq(
        &catalog::COUNT_USED_DIRS,
        || gd_location(ctx, &GD_USED_DIRS_COUNT),
        to_u32(used_dirs),
        u32::from(ctx.gd.used_dirs_count),
    );
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn join(owners: &[BlockOwner]) -> String {
    owners
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use crate::testutil::{audit_bytes, fired, put_u32, reference_bytes};

    const BLOCK_BITMAP: usize = 3 * 1024;
    const INODE_BITMAP: usize = 4 * 1024;

    #[test]
    fn reference_bitmaps_and_counts_agree() {
        let report = audit_bytes(reference_bytes());
        for finding in &report.findings {
            assert!(
                !finding.rule.starts_with("bitmap.") && !finding.rule.starts_with("count."),
                "{finding}"
            );
        }
    }

    #[test]
    fn stray_block_bit_is_unowned_and_skews_counts() {
        let mut bytes = reference_bytes();
        bytes[BLOCK_BITMAP + 3] = 0x01;
        let report = audit_bytes(bytes);
        let unowned = fired(&report, "bitmap.block_unowned");
        assert_eq!(unowned.len(), 1);
        assert_eq!(unowned[0].location.what, "block bitmap bit 24");
        assert_eq!(unowned[0].location.offset, (BLOCK_BITMAP + 3) as u64);
        // Superblock, descriptor and configuration all disagree with 999.
        assert_eq!(fired(&report, "count.free_blocks").len(), 3);
    }

    #[test]
    fn cleared_data_bit_is_unmarked() {
        let mut bytes = reference_bytes();
        bytes[BLOCK_BITMAP + 2] = 0x7F;
        let report = audit_bytes(bytes);
        let unmarked = fired(&report, "bitmap.block_unmarked");
        assert_eq!(unmarked.len(), 1);
        assert_eq!(unmarked[0].expected, "set (block 23 used by inode 12)");
    }

    #[test]
    fn shared_block_is_reported_once() {
        let mut bytes = reference_bytes();
        // Point the regular file at the root directory's block.
        put_u32(&mut bytes, 6528 + 40, 21);
        let report = audit_bytes(bytes);
        let shared = fired(&report, "bitmap.block_shared");
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].actual, "inode 2, inode 12");
        assert_eq!(fired(&report, "bitmap.block_unowned").len(), 1);
    }

    #[test]
    fn inode_bits_follow_occupancy() {
        let mut bytes = reference_bytes();
        // Drop inode 13's bit and set a bit for the empty inode 20.
        bytes[INODE_BITMAP + 1] = 0x0F;
        bytes[INODE_BITMAP + 2] = 0x08;
        let report = audit_bytes(bytes);
        let unmarked = fired(&report, "bitmap.inode_unmarked");
        assert_eq!(unmarked.len(), 1);
        assert_eq!(unmarked[0].location.what, "inode bitmap bit 12");
        let unoccupied = fired(&report, "bitmap.inode_unoccupied");
        assert_eq!(unoccupied.len(), 1);
        assert_eq!(unoccupied[0].location.what, "inode bitmap bit 19");
    }

    #[test]
    fn reserved_inode_bits_must_be_set() {
        let mut bytes = reference_bytes();
        bytes[INODE_BITMAP] = 0xFB;
        let report = audit_bytes(bytes);
        let unmarked = fired(&report, "bitmap.inode_unmarked");
        assert_eq!(unmarked.len(), 1);
        assert_eq!(unmarked[0].expected, "set (inode 3 reserved)");
    }

    #[test]
    fn padding_bits_past_the_count_are_flagged() {
        let mut bytes = reference_bytes();
        bytes[BLOCK_BITMAP + 1023] = 0x80;
        bytes[INODE_BITMAP + 16] = 0x01;
        let report = audit_bytes(bytes);
        let tails = fired(&report, "bitmap.tail_zero");
        assert_eq!(tails.len(), 2);
        assert_eq!(tails[0].location.what, "block bitmap bit 8191");
        assert_eq!(tails[1].location.what, "inode bitmap bit 128");
        assert!(fired(&report, "count.free_blocks").is_empty());
    }

    #[test]
    fn used_dirs_counts_directory_inodes() {
        let mut bytes = reference_bytes();
        bytes[2048 + 16] = 3;
        let report = audit_bytes(bytes);
        let used = fired(&report, "count.used_dirs");
        assert_eq!(used.len(), 1);
        assert_eq!(used[0].expected, "2");
        assert_eq!(used[0].actual, "3");
    }
}
