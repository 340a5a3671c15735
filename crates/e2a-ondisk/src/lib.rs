#![forbid(unsafe_code)]
//! On-disk format decoding for single-group ext2 images.
//!
//! Pure parsing crate, no I/O. Raw byte windows become declarative field
//! records ([`field`]), typed superblock / group descriptor / inode views
//! ([`records`]), bitmap views ([`bitmap`]) and directory walks ([`dir`]).

pub mod bitmap;
pub mod dir;
pub mod field;
pub mod records;

pub use bitmap::{Bitmap, encode_bitmap};
pub use dir::{
    DirEntry, DirViolation, DirWalk, DirWalker, WalkEvent, encode_dir_block, min_rec_len,
    walk_dir_block,
};
pub use field::{DecodedRecord, DirtyRange, FieldKind, FieldSpec, FieldValue, RecordLayout};
pub use records::{
    DIR_ENTRY_HEADER_LAYOUT, GROUP_DESC_LAYOUT, GroupDesc, INODE_LAYOUT, Inode,
    SUPERBLOCK_LAYOUT, Superblock, all_layouts, format_uuid,
};

use e2a_types::{BlockNumber, BlockSize, EXT2_GOOD_OLD_INODE_SIZE, InodeNumber};

/// Blocks occupied by an inode table of `inodes_per_group` 128-byte inodes.
#[must_use]
pub fn inode_table_blocks(inodes_per_group: u32, block_size: BlockSize) -> u32 {
    let bytes = u64::from(inodes_per_group) * EXT2_GOOD_OLD_INODE_SIZE as u64;
    let blocks = bytes.div_ceil(u64::from(block_size.get()));
    u32::try_from(blocks).unwrap_or(u32::MAX)
}

/// Absolute byte offset of inode `ino` given the table's first block.
///
/// Returns `None` for inode 0.
#[must_use]
pub fn inode_location(
    ino: InodeNumber,
    inode_table: BlockNumber,
    block_size: BlockSize,
) -> Option<u64> {
    let index = u64::from(ino.table_index()?);
    Some(block_size.block_to_byte(inode_table) + index * EXT2_GOOD_OLD_INODE_SIZE as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_inode_table_geometry() {
        assert_eq!(inode_table_blocks(128, BlockSize::MIN), 16);
        assert_eq!(inode_table_blocks(129, BlockSize::MIN), 17);
        assert_eq!(inode_table_blocks(0, BlockSize::MIN), 0);
    }

    #[test]
    fn inode_offsets_in_reference_layout() {
        let table = BlockNumber(5);
        assert_eq!(inode_location(InodeNumber(1), table, BlockSize::MIN), Some(5120));
        assert_eq!(
            inode_location(InodeNumber::ROOT, table, BlockSize::MIN),
            Some(5120 + 128)
        );
        assert_eq!(
            inode_location(InodeNumber(13), table, BlockSize::MIN),
            Some(5120 + 12 * 128)
        );
        assert_eq!(inode_location(InodeNumber(0), table, BlockSize::MIN), None);
    }
}
