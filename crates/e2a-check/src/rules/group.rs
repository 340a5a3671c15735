//! `gd.*` rules.

use super::{describe_dirty, gd_location};
use crate::catalog;
use crate::context::AuditContext;
use crate::finding::{FindingSink, Location};
use e2a_ondisk::records::{GD_BLOCK_BITMAP, GD_INODE_BITMAP, GD_INODE_TABLE};
use e2a_types::{EXT2_GROUP_DESC_SIZE, first_nonzero};
use tracing::debug;

pub fn check(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let before = sink.len();
    let expected = ctx.expected;
    for (field, want, have) in [
        (&GD_BLOCK_BITMAP, expected.block_bitmap.0, ctx.gd.block_bitmap),
        (&GD_INODE_BITMAP, expected.inode_bitmap.0, ctx.gd.inode_bitmap),
        (&GD_INODE_TABLE, expected.inode_table.0, ctx.gd.inode_table),
    ] {
        sink.expect_eq(
            &catalog::GD_LOCATION,
            || gd_location(ctx, field),
            want,
            have,
        );
    }

    let base = ctx.block_offset(ctx.locations.group_desc);
    let raw = ctx.group_desc.raw();
    for dirty in ctx.group_desc.nonzero_reserved() {
        let window = &raw[dirty.range.clone()];
        sink.report(
            &catalog::GD_RESERVED_ZERO,
            Location::new(
                base + dirty.first_nonzero as u64,
                format!("group_desc[{}..{}]", dirty.range.start, dirty.range.end),
            ),
            "all zero",
            describe_dirty(window),
        );
    }

    let tail = &ctx.group_desc_block[EXT2_GROUP_DESC_SIZE..];
    if let Some(first) = first_nonzero(tail) {
        sink.report(
            &catalog::GD_RESERVED_ZERO,
            Location::new(
                base + (EXT2_GROUP_DESC_SIZE + first) as u64,
                format!(
                    "group descriptor table[{EXT2_GROUP_DESC_SIZE}..{}]",
                    ctx.group_desc_block.len()
                ),
            ),
            "all zero",
            describe_dirty(tail),
        );
    }
    debug!(findings = sink.len() - before, "group descriptor rules done");
}
