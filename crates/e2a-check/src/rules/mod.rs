//! Rule families. Each family is a pure function over the context; all of
//! them always run.

use crate::context::{AuditContext, InodeSlot};
use crate::finding::{FindingSink, Location};
use e2a_ondisk::FieldSpec;
use e2a_types::EXT2_SUPERBLOCK_OFFSET;

pub mod directory;
pub mod group;
pub mod inode;
pub mod occupancy;
pub mod superblock;
pub mod time;

/// Run every rule family in catalog order.
pub fn run_all(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    superblock::check(ctx, sink);
    group::check(ctx, sink);
    occupancy::check(ctx, sink);
    inode::check(ctx, sink);
    directory::check(ctx, sink);
    time::check(ctx, sink);
}

pub(crate) fn sb_location(field: &FieldSpec) -> Location {
    Location::new(
        (EXT2_SUPERBLOCK_OFFSET + field.offset) as u64,
        format!("superblock.{}", field.name),
    )
}

pub(crate) fn gd_location(ctx: &AuditContext<'_>, field: &FieldSpec) -> Location {
    Location::new(
        ctx.block_offset(ctx.locations.group_desc) + field.offset as u64,
        format!("group_desc.{}", field.name),
    )
}

pub(crate) fn inode_field_location(slot: &InodeSlot<'_>, field: &FieldSpec) -> Location {
    Location::new(slot.offset + field.offset as u64, slot.field_label(field.name))
}

/// Summary of the non-zero bytes in `bytes`.
pub(crate) fn describe_dirty(bytes: &[u8]) -> String {
    let nonzero = bytes.iter().filter(|b| **b != 0).count();
    match bytes.iter().position(|b| *b != 0) {
        Some(first) => format!(
            "{nonzero} non-zero byte(s), first {:#04x} at +{first}",
            bytes[first]
        ),
        None => "all zero".to_owned(),
    }
}
