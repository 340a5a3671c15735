//! Decoded view of one image shared by every rule.
//!
//! Building the context is the only step that can fail: a read the image
//! cannot satisfy is fatal. Everything the rules later judge is recorded
//! here as-is, including out-of-place locations and malformed directories.

use crate::config::AuditConfig;
use crate::parse_to_audit_error;
use e2a_block::Image;
use e2a_error::Result;
use e2a_ondisk::{
    Bitmap, DecodedRecord, DirEntry, DirWalk, GROUP_DESC_LAYOUT, GroupDesc, INODE_LAYOUT, Inode,
    SUPERBLOCK_LAYOUT, Superblock, inode_location, inode_table_blocks, walk_dir_block,
};
use e2a_types::{
    BlockNumber, BlockSize, EXT2_GOOD_OLD_INODE_SIZE, EXT2_SUPERBLOCK_OFFSET,
    EXT2_SUPERBLOCK_SIZE, InodeNumber,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use tracing::debug;

/// One 128-byte inode-table slot.
#[derive(Debug, Clone)]
pub struct InodeSlot<'a> {
    pub ino: InodeNumber,
    /// Absolute byte offset of the slot.
    pub offset: u64,
    pub raw: &'a [u8],
    pub inode: Inode,
}

impl<'a> InodeSlot<'a> {
    /// Any non-zero byte marks the slot occupied.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.raw.iter().any(|b| *b != 0)
    }

    #[must_use]
    pub fn record(&self) -> Option<DecodedRecord<'a>> {
        INODE_LAYOUT.decode(self.raw).ok()
    }

    /// Location label for a field of this inode.
    #[must_use]
    pub fn field_label(&self, field: &str) -> String {
        format!("inode {}.{field}", self.ino)
    }
}

/// Who claims a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockOwner {
    Boot,
    Superblock,
    GroupDescriptors,
    BlockBitmap,
    InodeBitmap,
    InodeTable,
    Data(InodeNumber),
}

impl fmt::Display for BlockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boot => write!(f, "boot block"),
            Self::Superblock => write!(f, "superblock"),
            Self::GroupDescriptors => write!(f, "group descriptor table"),
            Self::BlockBitmap => write!(f, "block bitmap"),
            Self::InodeBitmap => write!(f, "inode bitmap"),
            Self::InodeTable => write!(f, "inode table"),
            Self::Data(ino) => write!(f, "inode {ino}"),
        }
    }
}

/// Metadata block locations actually used to read the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locations {
    pub superblock: BlockNumber,
    pub group_desc: BlockNumber,
    pub block_bitmap: BlockNumber,
    pub inode_bitmap: BlockNumber,
    pub inode_table: BlockNumber,
    pub inode_table_blocks: u32,
}

impl Locations {
    /// Where a single-group layout puts each structure.
    #[must_use]
    pub fn expected(block_size: BlockSize, inode_slots: u32) -> Self {
        let superblock = BlockNumber(
            u32::try_from(EXT2_SUPERBLOCK_OFFSET / block_size.as_usize()).unwrap_or(0),
        );
        Self {
            superblock,
            group_desc: BlockNumber(superblock.0 + 1),
            block_bitmap: BlockNumber(superblock.0 + 2),
            inode_bitmap: BlockNumber(superblock.0 + 3),
            inode_table: BlockNumber(superblock.0 + 4),
            inode_table_blocks: inode_table_blocks(inode_slots, block_size),
        }
    }
}

/// A directory block and its walk.
#[derive(Debug, Clone)]
pub struct DirBlock {
    pub block: BlockNumber,
    /// Absolute byte offset of the block.
    pub offset: u64,
    pub walk: DirWalk,
}

/// A directory reached from the root.
#[derive(Debug, Clone)]
pub struct DirNode {
    pub ino: InodeNumber,
    pub path: String,
    /// The directory whose entry led here; the root is its own parent.
    pub parent: InodeNumber,
    pub blocks: Vec<DirBlock>,
}

/// A live directory entry with its position.
#[derive(Debug, Clone)]
pub struct NamedEntry {
    pub dir: InodeNumber,
    /// Path the entry names; `.` and `..` carry their directory's path.
    pub path: String,
    /// Absolute byte offset of the record.
    pub offset: u64,
    pub entry: DirEntry,
}

impl NamedEntry {
    #[must_use]
    pub fn is_dot_or_dotdot(&self) -> bool {
        self.entry.is_dot() || self.entry.is_dotdot()
    }
}

#[derive(Debug)]
pub struct AuditContext<'a> {
    pub image: &'a Image,
    pub config: &'a AuditConfig,
    /// Seconds since the epoch the pass treats as "now".
    pub now: u64,
    pub superblock: DecodedRecord<'a>,
    pub sb: Superblock,
    /// Block size in use; 1024 when `log_block_size` is unusable.
    pub block_size: BlockSize,
    pub group_desc: DecodedRecord<'a>,
    /// The whole descriptor-table block.
    pub group_desc_block: &'a [u8],
    pub gd: GroupDesc,
    /// Where the structures belong.
    pub expected: Locations,
    /// Where they were actually read from.
    pub locations: Locations,
    pub block_bitmap: Bitmap<'a>,
    pub inode_bitmap: Bitmap<'a>,
    pub inodes: Vec<InodeSlot<'a>>,
    /// Directories in breadth-first order from the root.
    pub dirs: Vec<DirNode>,
    pub entries: Vec<NamedEntry>,
    /// Entries (including `.` and `..`) naming each inode.
    pub refs: BTreeMap<InodeNumber, u32>,
    pub owners: BTreeMap<BlockNumber, Vec<BlockOwner>>,
}

impl<'a> AuditContext<'a> {
    pub fn build(image: &'a Image, config: &'a AuditConfig, now: u64) -> Result<Self> {
        let sb_offset = EXT2_SUPERBLOCK_OFFSET as u64;
        let sb_bytes = image.read_bytes(sb_offset, EXT2_SUPERBLOCK_SIZE)?;
        let superblock = SUPERBLOCK_LAYOUT
            .decode(sb_bytes)
            .map_err(|e| parse_to_audit_error(&e, sb_offset))?;
        let sb = Superblock::parse(sb_bytes).map_err(|e| parse_to_audit_error(&e, sb_offset))?;
        let block_size = sb.block_size().unwrap_or(BlockSize::MIN);

        let inode_slots = sb.inodes_count.min(block_size.get() * 8);
        let expected = Locations::expected(block_size, inode_slots);
        let image_blocks = image.len() / u64::from(block_size.get());

        let gd_offset = block_size.block_to_byte(expected.group_desc);
        let group_desc_block = image.read_bytes(gd_offset, block_size.as_usize())?;
        let group_desc = GROUP_DESC_LAYOUT
            .decode(group_desc_block)
            .map_err(|e| parse_to_audit_error(&e, gd_offset))?;
        let gd = GroupDesc::parse(group_desc_block)
            .map_err(|e| parse_to_audit_error(&e, gd_offset))?;

        // Out-of-image pointers fall back to the expected layout so the
        // pass can continue; gd.location reports the mismatch.
        let within = |block: u32, len: u32| u64::from(block) + u64::from(len) <= image_blocks;
        let pick = |actual: u32, fallback: BlockNumber, len: u32| {
            if actual != 0 && within(actual, len) {
                BlockNumber(actual)
            } else {
                fallback
            }
        };
        let locations = Locations {
            block_bitmap: pick(gd.block_bitmap, expected.block_bitmap, 1),
            inode_bitmap: pick(gd.inode_bitmap, expected.inode_bitmap, 1),
            inode_table: pick(
                gd.inode_table,
                expected.inode_table,
                expected.inode_table_blocks,
            ),
            ..expected
        };

        let read_block = |block: BlockNumber| {
            image.read_bytes(block_size.block_to_byte(block), block_size.as_usize())
        };
        let block_bitmap = Bitmap::new(read_block(locations.block_bitmap)?);
        let inode_bitmap = Bitmap::new(read_block(locations.inode_bitmap)?);

        let mut inodes = Vec::with_capacity(inode_slots as usize);
        for n in 1..=inode_slots {
            let ino = InodeNumber(n);
            let Some(offset) = inode_location(ino, locations.inode_table, block_size) else {
                continue;
            };
            let raw = image.read_bytes(offset, EXT2_GOOD_OLD_INODE_SIZE)?;
            let inode = Inode::parse(raw).map_err(|e| parse_to_audit_error(&e, offset))?;
            inodes.push(InodeSlot {
                ino,
                offset,
                raw,
                inode,
            });
        }

        let mut ctx = Self {
            image,
            config,
            now,
            superblock,
            sb,
            block_size,
            group_desc,
            group_desc_block,
            gd,
            expected,
            locations,
            block_bitmap,
            inode_bitmap,
            inodes,
            dirs: Vec::new(),
            entries: Vec::new(),
            refs: BTreeMap::new(),
            owners: BTreeMap::new(),
        };
        ctx.walk_tree();
        ctx.collect_owners();
        debug!(
            block_size = ctx.block_size.get(),
            inodes = ctx.inodes.len(),
            dirs = ctx.dirs.len(),
            entries = ctx.entries.len(),
            "audit context built"
        );
        Ok(ctx)
    }

    #[must_use]
    pub fn slot(&self, ino: InodeNumber) -> Option<&InodeSlot<'a>> {
        let index = ino.table_index()? as usize;
        self.inodes.get(index)
    }

    /// Block contents if the block lies inside the image.
    #[must_use]
    pub fn block(&self, block: BlockNumber) -> Option<&'a [u8]> {
        self.image
            .read_bytes(
                self.block_size.block_to_byte(block),
                self.block_size.as_usize(),
            )
            .ok()
    }

    #[must_use]
    pub fn block_offset(&self, block: BlockNumber) -> u64 {
        self.block_size.block_to_byte(block)
    }

    /// Entries naming `ino`.
    #[must_use]
    pub fn ref_count(&self, ino: InodeNumber) -> u32 {
        self.refs.get(&ino).copied().unwrap_or(0)
    }

    /// The root, or any inode some directory entry names.
    #[must_use]
    pub fn is_live(&self, ino: InodeNumber) -> bool {
        ino == InodeNumber::ROOT || self.ref_count(ino) > 0
    }

    /// Bits of the block bitmap that describe real blocks.
    #[must_use]
    pub fn block_bits(&self) -> usize {
        (self.sb.blocks_count as usize).min(self.block_bitmap.len_bits())
    }

    /// Bits of the inode bitmap that describe real inodes.
    #[must_use]
    pub fn inode_bits(&self) -> usize {
        (self.sb.inodes_count as usize).min(self.inode_bitmap.len_bits())
    }

    /// Paths of every live non-dot entry, to their inode.
    #[must_use]
    pub fn paths(&self) -> BTreeMap<&str, InodeNumber> {
        let mut paths = BTreeMap::new();
        paths.insert("/", InodeNumber::ROOT);
        for named in &self.entries {
            if !named.is_dot_or_dotdot() {
                paths.entry(named.path.as_str()).or_insert(InodeNumber(named.entry.inode));
            }
        }
        paths
    }

    /// Data blocks a directory, regular file or slow symlink may hold.
    fn holds_block_pointers(inode: &Inode) -> bool {
        !inode.is_fast_symlink()
    }

    fn walk_tree(&mut self) {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([(InodeNumber::ROOT, "/".to_owned(), InodeNumber::ROOT)]);

        while let Some((ino, path, parent)) = queue.pop_front() {
            if !visited.insert(ino) {
                continue;
            }
            let Some(slot) = self.slot(ino) else {
                continue;
            };
            if !slot.inode.is_dir() {
                continue;
            }
            let pointers = slot.inode.data_blocks();

            let mut blocks = Vec::new();
            for block in pointers {
                if block.0 >= self.sb.blocks_count {
                    continue;
                }
                let Some(bytes) = self.block(block) else {
                    continue;
                };
                let offset = self.block_offset(block);
                let walk = walk_dir_block(bytes);
                for entry in &walk.entries {
                    let child = InodeNumber(entry.inode);
                    *self.refs.entry(child).or_insert(0) += 1;
                    let child_path = if entry.is_dot() || entry.is_dotdot() {
                        path.clone()
                    } else if path == "/" {
                        format!("/{}", entry.name_str())
                    } else {
                        format!("{path}/{}", entry.name_str())
                    };
                    if !(entry.is_dot() || entry.is_dotdot())
                        && !visited.contains(&child)
                        && self.slot(child).is_some_and(|s| s.inode.is_dir())
                    {
                        queue.push_back((child, child_path.clone(), ino));
                    }
                    self.entries.push(NamedEntry {
                        dir: ino,
                        path: child_path,
                        offset: offset + entry.offset as u64,
                        entry: entry.clone(),
                    });
                }
                blocks.push(DirBlock {
                    block,
                    offset,
                    walk,
                });
            }
            self.dirs.push(DirNode {
                ino,
                path,
                parent,
                blocks,
            });
        }
    }

    fn collect_owners(&mut self) {
        let loc = self.locations;
        let mut claim = |block: BlockNumber, owner: BlockOwner| {
            self.owners.entry(block).or_default().push(owner);
        };

        claim(BlockNumber(0), BlockOwner::Boot);
        if loc.superblock.0 != 0 {
            claim(loc.superblock, BlockOwner::Superblock);
        }
        claim(loc.group_desc, BlockOwner::GroupDescriptors);
        claim(loc.block_bitmap, BlockOwner::BlockBitmap);
        claim(loc.inode_bitmap, BlockOwner::InodeBitmap);
        for i in 0..loc.inode_table_blocks {
            claim(BlockNumber(loc.inode_table.0 + i), BlockOwner::InodeTable);
        }

        for slot in &self.inodes {
            if !slot.is_occupied() || !Self::holds_block_pointers(&slot.inode) {
                continue;
            }
            for block in slot.inode.data_blocks() {
                claim(block, BlockOwner::Data(slot.ino));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::reference_image;

    #[test]
    fn reference_context_layout() {
        let image = reference_image();
        let config = AuditConfig::default();
        let ctx = AuditContext::build(&image, &config, 1_800_000_000).unwrap();

        assert_eq!(ctx.block_size, BlockSize::MIN);
        assert_eq!(ctx.locations, Locations::expected(BlockSize::MIN, 128));
        assert_eq!(ctx.locations.inode_table_blocks, 16);
        assert_eq!(ctx.inodes.len(), 128);
        assert_eq!(ctx.dirs.len(), 2);
        assert_eq!(ctx.dirs[0].path, "/");
        assert_eq!(ctx.dirs[1].path, "/lost+found");
        assert_eq!(ctx.dirs[1].parent, InodeNumber::ROOT);

        assert_eq!(ctx.ref_count(InodeNumber::ROOT), 3);
        assert_eq!(ctx.ref_count(InodeNumber(11)), 2);
        assert_eq!(ctx.ref_count(InodeNumber(12)), 1);
        assert_eq!(ctx.ref_count(InodeNumber(13)), 1);
        assert!(!ctx.is_live(InodeNumber(14)));

        let paths = ctx.paths();
        assert_eq!(paths["/hello-world"], InodeNumber(12));
        assert_eq!(paths["/hello"], InodeNumber(13));
        assert_eq!(paths.len(), 4);

        assert_eq!(ctx.owners[&BlockNumber(0)], vec![BlockOwner::Boot]);
        assert_eq!(ctx.owners[&BlockNumber(1)], vec![BlockOwner::Superblock]);
        assert_eq!(ctx.owners[&BlockNumber(20)], vec![BlockOwner::InodeTable]);
        assert_eq!(
            ctx.owners[&BlockNumber(23)],
            vec![BlockOwner::Data(InodeNumber(12))]
        );
        assert_eq!(ctx.owners.len(), 24);
    }

    #[test]
    fn short_image_is_fatal() {
        let image = Image::from_bytes(vec![0_u8; 1500]);
        let config = AuditConfig::default();
        let err = AuditContext::build(&image, &config, 0).unwrap_err();
        assert!(matches!(err, e2a_error::AuditError::Truncated { .. }));
    }

    #[test]
    fn dotdot_loop_is_not_walked_twice() {
        let mut bytes = reference_image().as_bytes().to_vec();
        // Point lost+found's ".." back at itself: the walk must still stop.
        let lf = 22 * 1024 + 12;
        bytes[lf..lf + 4].copy_from_slice(&11_u32.to_le_bytes());
        let image = Image::from_bytes(bytes);
        let config = AuditConfig::default();
        let ctx = AuditContext::build(&image, &config, 0).unwrap();
        assert_eq!(ctx.dirs.len(), 2);
        assert_eq!(ctx.ref_count(InodeNumber(11)), 3);
    }
}
