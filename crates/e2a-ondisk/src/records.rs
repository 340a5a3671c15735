//! Field tables and typed views for the superblock, group descriptor, inode
//! and directory-entry header.

use crate::field::{FieldSpec, RecordLayout};
use e2a_types::{
    BlockNumber, BlockSize, EXT2_GOOD_OLD_INODE_SIZE, EXT2_GROUP_DESC_SIZE, EXT2_I_BLOCK_LEN,
    EXT2_N_BLOCKS, EXT2_NDIR_BLOCKS, EXT2_SUPERBLOCK_SIZE, FileKind, ParseError, S_IPERM,
    read_le_u32, trim_nul_padded,
};
use serde::Serialize;

// ── Superblock ──────────────────────────────────────────────────────────────

pub const SB_INODES_COUNT: FieldSpec = FieldSpec::unsigned("inodes_count", 0, 4);
pub const SB_BLOCKS_COUNT: FieldSpec = FieldSpec::unsigned("blocks_count", 4, 4);
pub const SB_R_BLOCKS_COUNT: FieldSpec = FieldSpec::unsigned("r_blocks_count", 8, 4);
pub const SB_FREE_BLOCKS_COUNT: FieldSpec = FieldSpec::unsigned("free_blocks_count", 12, 4);
pub const SB_FREE_INODES_COUNT: FieldSpec = FieldSpec::unsigned("free_inodes_count", 16, 4);
pub const SB_FIRST_DATA_BLOCK: FieldSpec = FieldSpec::unsigned("first_data_block", 20, 4);
pub const SB_LOG_BLOCK_SIZE: FieldSpec = FieldSpec::unsigned("log_block_size", 24, 4);
pub const SB_LOG_FRAG_SIZE: FieldSpec = FieldSpec::unsigned("log_frag_size", 28, 4);
pub const SB_BLOCKS_PER_GROUP: FieldSpec = FieldSpec::unsigned("blocks_per_group", 32, 4);
pub const SB_FRAGS_PER_GROUP: FieldSpec = FieldSpec::unsigned("frags_per_group", 36, 4);
pub const SB_INODES_PER_GROUP: FieldSpec = FieldSpec::unsigned("inodes_per_group", 40, 4);
pub const SB_MTIME: FieldSpec = FieldSpec::unsigned("mtime", 44, 4);
pub const SB_WTIME: FieldSpec = FieldSpec::unsigned("wtime", 48, 4);
pub const SB_MNT_COUNT: FieldSpec = FieldSpec::unsigned("mnt_count", 52, 2);
pub const SB_MAX_MNT_COUNT: FieldSpec = FieldSpec::signed("max_mnt_count", 54, 2);
pub const SB_MAGIC: FieldSpec = FieldSpec::unsigned("magic", 56, 2);
pub const SB_STATE: FieldSpec = FieldSpec::unsigned("state", 58, 2);
pub const SB_ERRORS: FieldSpec = FieldSpec::unsigned("errors", 60, 2);
pub const SB_MINOR_REV_LEVEL: FieldSpec = FieldSpec::unsigned("minor_rev_level", 62, 2);
pub const SB_LASTCHECK: FieldSpec = FieldSpec::unsigned("lastcheck", 64, 4);
pub const SB_CHECKINTERVAL: FieldSpec = FieldSpec::unsigned("checkinterval", 68, 4);
pub const SB_CREATOR_OS: FieldSpec = FieldSpec::unsigned("creator_os", 72, 4);
pub const SB_REV_LEVEL: FieldSpec = FieldSpec::unsigned("rev_level", 76, 4);
pub const SB_DEF_RESUID: FieldSpec = FieldSpec::unsigned("def_resuid", 80, 2);
pub const SB_DEF_RESGID: FieldSpec = FieldSpec::unsigned("def_resgid", 82, 2);
pub const SB_UUID: FieldSpec = FieldSpec::bytes("uuid", 104, 16);
pub const SB_VOLUME_NAME: FieldSpec = FieldSpec::bytes("volume_name", 120, 16);

static SUPERBLOCK_FIELDS: [FieldSpec; 27] = [
    SB_INODES_COUNT,
    SB_BLOCKS_COUNT,
    SB_R_BLOCKS_COUNT,
    SB_FREE_BLOCKS_COUNT,
    SB_FREE_INODES_COUNT,
    SB_FIRST_DATA_BLOCK,
    SB_LOG_BLOCK_SIZE,
    SB_LOG_FRAG_SIZE,
    SB_BLOCKS_PER_GROUP,
    SB_FRAGS_PER_GROUP,
    SB_INODES_PER_GROUP,
    SB_MTIME,
    SB_WTIME,
    SB_MNT_COUNT,
    SB_MAX_MNT_COUNT,
    SB_MAGIC,
    SB_STATE,
    SB_ERRORS,
    SB_MINOR_REV_LEVEL,
    SB_LASTCHECK,
    SB_CHECKINTERVAL,
    SB_CREATOR_OS,
    SB_REV_LEVEL,
    SB_DEF_RESUID,
    SB_DEF_RESGID,
    SB_UUID,
    SB_VOLUME_NAME,
];

pub static SUPERBLOCK_LAYOUT: RecordLayout = RecordLayout {
    name: "superblock",
    size: EXT2_SUPERBLOCK_SIZE,
    fields: &SUPERBLOCK_FIELDS,
};

/// Typed superblock, decoded through [`SUPERBLOCK_LAYOUT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Superblock {
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub r_blocks_count: u32,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub log_frag_size: u32,
    pub blocks_per_group: u32,
    pub frags_per_group: u32,
    pub inodes_per_group: u32,
    pub mtime: u32,
    pub wtime: u32,
    pub mnt_count: u16,
    pub max_mnt_count: i16,
    pub magic: u16,
    pub state: u16,
    pub errors: u16,
    pub minor_rev_level: u16,
    pub lastcheck: u32,
    pub checkinterval: u32,
    pub creator_os: u32,
    pub rev_level: u32,
    pub def_resuid: u16,
    pub def_resgid: u16,
    pub uuid: [u8; 16],
    pub volume_name: [u8; 16],
}

impl Superblock {
    /// Parse the 1024-byte superblock window (not the whole image).
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let raw = SUPERBLOCK_LAYOUT.decode(bytes)?.raw();
        Ok(Self {
            inodes_count: SB_INODES_COUNT.read_u32(raw)?,
            blocks_count: SB_BLOCKS_COUNT.read_u32(raw)?,
            r_blocks_count: SB_R_BLOCKS_COUNT.read_u32(raw)?,
            free_blocks_count: SB_FREE_BLOCKS_COUNT.read_u32(raw)?,
            free_inodes_count: SB_FREE_INODES_COUNT.read_u32(raw)?,
            first_data_block: SB_FIRST_DATA_BLOCK.read_u32(raw)?,
            log_block_size: SB_LOG_BLOCK_SIZE.read_u32(raw)?,
            log_frag_size: SB_LOG_FRAG_SIZE.read_u32(raw)?,
            blocks_per_group: SB_BLOCKS_PER_GROUP.read_u32(raw)?,
            frags_per_group: SB_FRAGS_PER_GROUP.read_u32(raw)?,
            inodes_per_group: SB_INODES_PER_GROUP.read_u32(raw)?,
            mtime: SB_MTIME.read_u32(raw)?,
            wtime: SB_WTIME.read_u32(raw)?,
            mnt_count: SB_MNT_COUNT.read_u16(raw)?,
            max_mnt_count: SB_MAX_MNT_COUNT.read_i16(raw)?,
            magic: SB_MAGIC.read_u16(raw)?,
            state: SB_STATE.read_u16(raw)?,
            errors: SB_ERRORS.read_u16(raw)?,
            minor_rev_level: SB_MINOR_REV_LEVEL.read_u16(raw)?,
            lastcheck: SB_LASTCHECK.read_u32(raw)?,
            checkinterval: SB_CHECKINTERVAL.read_u32(raw)?,
            creator_os: SB_CREATOR_OS.read_u32(raw)?,
            rev_level: SB_REV_LEVEL.read_u32(raw)?,
            def_resuid: SB_DEF_RESUID.read_u16(raw)?,
            def_resgid: SB_DEF_RESGID.read_u16(raw)?,
            uuid: SB_UUID.read_array::<16>(raw)?,
            volume_name: SB_VOLUME_NAME.read_array::<16>(raw)?,
        })
    }

    /// Block size encoded by `log_block_size`.
    pub fn block_size(&self) -> Result<BlockSize, ParseError> {
        BlockSize::from_log(self.log_block_size)
    }

    #[must_use]
    pub fn volume_name_str(&self) -> String {
        trim_nul_padded(&self.volume_name)
    }

    /// UUID in the canonical 8-4-4-4-12 form.
    #[must_use]
    pub fn uuid_string(&self) -> String {
        format_uuid(&self.uuid)
    }
}

/// Lowercase 8-4-4-4-12 rendering of a raw UUID.
#[must_use]
pub fn format_uuid(uuid: &[u8; 16]) -> String {
    let hex = hex::encode(uuid);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

// ── Group descriptor ────────────────────────────────────────────────────────

pub const GD_BLOCK_BITMAP: FieldSpec = FieldSpec::unsigned("block_bitmap", 0, 4);
pub const GD_INODE_BITMAP: FieldSpec = FieldSpec::unsigned("inode_bitmap", 4, 4);
pub const GD_INODE_TABLE: FieldSpec = FieldSpec::unsigned("inode_table", 8, 4);
pub const GD_FREE_BLOCKS_COUNT: FieldSpec = FieldSpec::unsigned("free_blocks_count", 12, 2);
pub const GD_FREE_INODES_COUNT: FieldSpec = FieldSpec::unsigned("free_inodes_count", 14, 2);
pub const GD_USED_DIRS_COUNT: FieldSpec = FieldSpec::unsigned("used_dirs_count", 16, 2);

static GROUP_DESC_FIELDS: [FieldSpec; 6] = [
    GD_BLOCK_BITMAP,
    GD_INODE_BITMAP,
    GD_INODE_TABLE,
    GD_FREE_BLOCKS_COUNT,
    GD_FREE_INODES_COUNT,
    GD_USED_DIRS_COUNT,
];

pub static GROUP_DESC_LAYOUT: RecordLayout = RecordLayout {
    name: "group_desc",
    size: EXT2_GROUP_DESC_SIZE,
    fields: &GROUP_DESC_FIELDS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupDesc {
    pub block_bitmap: u32,
    pub inode_bitmap: u32,
    pub inode_table: u32,
    pub free_blocks_count: u16,
    pub free_inodes_count: u16,
    pub used_dirs_count: u16,
}

impl GroupDesc {
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let raw = GROUP_DESC_LAYOUT.decode(bytes)?.raw();
        Ok(Self {
            block_bitmap: GD_BLOCK_BITMAP.read_u32(raw)?,
            inode_bitmap: GD_INODE_BITMAP.read_u32(raw)?,
            inode_table: GD_INODE_TABLE.read_u32(raw)?,
            free_blocks_count: GD_FREE_BLOCKS_COUNT.read_u16(raw)?,
            free_inodes_count: GD_FREE_INODES_COUNT.read_u16(raw)?,
            used_dirs_count: GD_USED_DIRS_COUNT.read_u16(raw)?,
        })
    }
}

// ── Inode ───────────────────────────────────────────────────────────────────

pub const I_MODE: FieldSpec = FieldSpec::unsigned("mode", 0, 2);
pub const I_UID: FieldSpec = FieldSpec::unsigned("uid", 2, 2);
pub const I_SIZE: FieldSpec = FieldSpec::unsigned("size", 4, 4);
pub const I_ATIME: FieldSpec = FieldSpec::unsigned("atime", 8, 4);
pub const I_CTIME: FieldSpec = FieldSpec::unsigned("ctime", 12, 4);
pub const I_MTIME: FieldSpec = FieldSpec::unsigned("mtime", 16, 4);
pub const I_DTIME: FieldSpec = FieldSpec::unsigned("dtime", 20, 4);
pub const I_GID: FieldSpec = FieldSpec::unsigned("gid", 24, 2);
pub const I_LINKS_COUNT: FieldSpec = FieldSpec::unsigned("links_count", 26, 2);
pub const I_BLOCKS: FieldSpec = FieldSpec::unsigned("blocks", 28, 4);
pub const I_FLAGS: FieldSpec = FieldSpec::unsigned("flags", 32, 4);
pub const I_BLOCK: FieldSpec = FieldSpec::bytes("block", 40, EXT2_I_BLOCK_LEN);
pub const I_GENERATION: FieldSpec = FieldSpec::unsigned("generation", 100, 4);
pub const I_FILE_ACL: FieldSpec = FieldSpec::unsigned("file_acl", 104, 4);
pub const I_DIR_ACL: FieldSpec = FieldSpec::unsigned("dir_acl", 108, 4);
pub const I_FADDR: FieldSpec = FieldSpec::unsigned("faddr", 112, 4);

static INODE_FIELDS: [FieldSpec; 16] = [
    I_MODE,
    I_UID,
    I_SIZE,
    I_ATIME,
    I_CTIME,
    I_MTIME,
    I_DTIME,
    I_GID,
    I_LINKS_COUNT,
    I_BLOCKS,
    I_FLAGS,
    I_BLOCK,
    I_GENERATION,
    I_FILE_ACL,
    I_DIR_ACL,
    I_FADDR,
];

/// Gaps are `osd1` (36..40) and `osd2` (116..128).
pub static INODE_LAYOUT: RecordLayout = RecordLayout {
    name: "inode",
    size: EXT2_GOOD_OLD_INODE_SIZE,
    fields: &INODE_FIELDS,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inode {
    pub mode: u16,
    pub uid: u16,
    pub size: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    pub gid: u16,
    pub links_count: u16,
    /// 512-byte sectors.
    pub blocks: u32,
    pub flags: u32,
    pub block: [u32; EXT2_N_BLOCKS],
    pub generation: u32,
    pub file_acl: u32,
    pub dir_acl: u32,
    pub faddr: u32,
}

impl Inode {
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let raw = INODE_LAYOUT.decode(bytes)?.raw();
        let i_block = I_BLOCK.slice(raw)?;
        let mut block = [0_u32; EXT2_N_BLOCKS];
        for (idx, slot) in block.iter_mut().enumerate() {
            *slot = read_le_u32(i_block, idx * 4)?;
        }
        Ok(Self {
            mode: I_MODE.read_u16(raw)?,
            uid: I_UID.read_u16(raw)?,
            size: I_SIZE.read_u32(raw)?,
            atime: I_ATIME.read_u32(raw)?,
            ctime: I_CTIME.read_u32(raw)?,
            mtime: I_MTIME.read_u32(raw)?,
            dtime: I_DTIME.read_u32(raw)?,
            gid: I_GID.read_u16(raw)?,
            links_count: I_LINKS_COUNT.read_u16(raw)?,
            blocks: I_BLOCKS.read_u32(raw)?,
            flags: I_FLAGS.read_u32(raw)?,
            block,
            generation: I_GENERATION.read_u32(raw)?,
            file_acl: I_FILE_ACL.read_u32(raw)?,
            dir_acl: I_DIR_ACL.read_u32(raw)?,
            faddr: I_FADDR.read_u32(raw)?,
        })
    }

    #[must_use]
    pub fn kind(&self) -> Option<FileKind> {
        FileKind::from_mode(self.mode)
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind() == Some(FileKind::Directory)
    }

    #[must_use]
    pub fn permissions(&self) -> u16 {
        self.mode & S_IPERM
    }

    /// The twelve direct pointers, zero meaning unused.
    #[must_use]
    pub fn direct_blocks(&self) -> &[u32] {
        &self.block[..EXT2_NDIR_BLOCKS]
    }

    /// Single, double and triple indirect pointers.
    #[must_use]
    pub fn indirect_blocks(&self) -> &[u32] {
        &self.block[EXT2_NDIR_BLOCKS..]
    }

    /// Non-zero direct pointers in slot order.
    #[must_use]
    pub fn data_blocks(&self) -> Vec<BlockNumber> {
        self.direct_blocks()
            .iter()
            .filter(|b| **b != 0)
            .map(|b| BlockNumber(*b))
            .collect()
    }

    /// `i_block` reinterpreted as raw bytes.
    #[must_use]
    pub fn block_bytes(&self) -> [u8; EXT2_I_BLOCK_LEN] {
        let mut out = [0_u8; EXT2_I_BLOCK_LEN];
        for (chunk, ptr) in out.chunks_exact_mut(4).zip(self.block) {
            chunk.copy_from_slice(&ptr.to_le_bytes());
        }
        out
    }

    /// A symlink whose target is stored inline in `i_block`.
    #[must_use]
    pub fn is_fast_symlink(&self) -> bool {
        self.kind() == Some(FileKind::Symlink) && (self.size as usize) < EXT2_I_BLOCK_LEN
    }

    /// Inline target bytes (`size` bytes of `i_block`) for a fast symlink.
    #[must_use]
    pub fn fast_symlink_target(&self) -> Option<Vec<u8>> {
        if !self.is_fast_symlink() {
            return None;
        }
        let bytes = self.block_bytes();
        Some(bytes[..self.size as usize].to_vec())
    }
}

// ── Directory entry header ──────────────────────────────────────────────────

pub const DE_INODE: FieldSpec = FieldSpec::unsigned("inode", 0, 4);
pub const DE_REC_LEN: FieldSpec = FieldSpec::unsigned("rec_len", 4, 2);
pub const DE_NAME_LEN: FieldSpec = FieldSpec::unsigned("name_len", 6, 1);
pub const DE_FILE_TYPE: FieldSpec = FieldSpec::unsigned("file_type", 7, 1);

static DIR_ENTRY_HEADER_FIELDS: [FieldSpec; 4] = [DE_INODE, DE_REC_LEN, DE_NAME_LEN, DE_FILE_TYPE];

/// Fixed 8-byte header; the name follows unpadded.
pub static DIR_ENTRY_HEADER_LAYOUT: RecordLayout = RecordLayout {
    name: "dir_entry_header",
    size: 8,
    fields: &DIR_ENTRY_HEADER_FIELDS,
};

/// All record layouts, in on-disk order.
#[must_use]
pub fn all_layouts() -> [&'static RecordLayout; 4] {
    [
        &SUPERBLOCK_LAYOUT,
        &GROUP_DESC_LAYOUT,
        &INODE_LAYOUT,
        &DIR_ENTRY_HEADER_LAYOUT,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2a_types::EXT2_SUPER_MAGIC;

    fn superblock_bytes() -> Vec<u8> {
        let mut sb = vec![0_u8; EXT2_SUPERBLOCK_SIZE];
        sb[0..4].copy_from_slice(&128_u32.to_le_bytes());
        sb[4..8].copy_from_slice(&1024_u32.to_le_bytes());
        sb[12..16].copy_from_slice(&1000_u32.to_le_bytes());
        sb[16..20].copy_from_slice(&115_u32.to_le_bytes());
        sb[20..24].copy_from_slice(&1_u32.to_le_bytes());
        sb[54..56].copy_from_slice(&(-1_i16).to_le_bytes());
        sb[56..58].copy_from_slice(&EXT2_SUPER_MAGIC.to_le_bytes());
        sb[104..120].copy_from_slice(&[
            0x5A, 0x1E, 0xAB, 0x1E, 0x13, 0x37, 0x13, 0x37, 0x13, 0x37, 0xC0, 0xFF, 0xEE, 0xC0,
            0xFF, 0xEE,
        ]);
        sb[120..130].copy_from_slice(b"cs111-base");
        sb
    }

    #[test]
    fn superblock_reserved_ranges_match_format() {
        assert_eq!(SUPERBLOCK_LAYOUT.reserved_ranges(), vec![84..104, 136..1024]);
        assert_eq!(GROUP_DESC_LAYOUT.reserved_ranges(), vec![18..32]);
        assert_eq!(INODE_LAYOUT.reserved_ranges(), vec![36..40, 116..128]);
        assert!(DIR_ENTRY_HEADER_LAYOUT.reserved_ranges().is_empty());
    }

    #[test]
    fn parse_superblock_fields() {
        let sb = Superblock::parse(&superblock_bytes()).unwrap();
        assert_eq!(sb.inodes_count, 128);
        assert_eq!(sb.blocks_count, 1024);
        assert_eq!(sb.free_blocks_count, 1000);
        assert_eq!(sb.free_inodes_count, 115);
        assert_eq!(sb.max_mnt_count, -1);
        assert_eq!(sb.magic, EXT2_SUPER_MAGIC);
        assert_eq!(sb.volume_name_str(), "cs111-base");
        assert_eq!(sb.uuid_string(), "5a1eab1e-1337-1337-1337-c0ffeec0ffee");
        assert_eq!(sb.block_size().unwrap().get(), 1024);
    }

    #[test]
    fn parse_superblock_short_window_fails() {
        let bytes = superblock_bytes();
        assert!(matches!(
            Superblock::parse(&bytes[..512]),
            Err(ParseError::InsufficientData { needed: 1024, .. })
        ));
    }

    #[test]
    fn decoded_record_and_typed_record_agree() {
        let bytes = superblock_bytes();
        let rec = SUPERBLOCK_LAYOUT.decode(&bytes).unwrap();
        assert_eq!(rec.get_u64("magic"), Some(u64::from(EXT2_SUPER_MAGIC)));
        assert_eq!(rec.get_i64("max_mnt_count"), Some(-1));
        assert_eq!(rec.bytes("volume_name").map(|b| &b[..10]), Some(&b"cs111-base"[..]));
    }

    #[test]
    fn parse_group_desc() {
        let mut gd = [0_u8; 32];
        gd[0..4].copy_from_slice(&3_u32.to_le_bytes());
        gd[4..8].copy_from_slice(&4_u32.to_le_bytes());
        gd[8..12].copy_from_slice(&5_u32.to_le_bytes());
        gd[12..14].copy_from_slice(&1000_u16.to_le_bytes());
        gd[14..16].copy_from_slice(&115_u16.to_le_bytes());
        gd[16..18].copy_from_slice(&2_u16.to_le_bytes());
        let gd = GroupDesc::parse(&gd).unwrap();
        assert_eq!(
            gd,
            GroupDesc {
                block_bitmap: 3,
                inode_bitmap: 4,
                inode_table: 5,
                free_blocks_count: 1000,
                free_inodes_count: 115,
                used_dirs_count: 2,
            }
        );
    }

    #[test]
    fn parse_fast_symlink_inode() {
        let mut raw = [0_u8; 128];
        raw[0..2].copy_from_slice(&0xA1A4_u16.to_le_bytes());
        raw[4..8].copy_from_slice(&11_u32.to_le_bytes());
        raw[26..28].copy_from_slice(&1_u16.to_le_bytes());
        raw[40..51].copy_from_slice(b"hello-world");
        let inode = Inode::parse(&raw).unwrap();
        assert_eq!(inode.kind(), Some(FileKind::Symlink));
        assert_eq!(inode.permissions(), 0o644);
        assert!(inode.is_fast_symlink());
        assert_eq!(inode.fast_symlink_target().unwrap(), b"hello-world");
        assert_eq!(&inode.block_bytes()[..11], b"hello-world");
        assert!(inode.block_bytes()[11..].iter().all(|b| *b == 0));
    }

    #[test]
    fn parse_directory_inode() {
        let mut raw = [0_u8; 128];
        raw[0..2].copy_from_slice(&0x41ED_u16.to_le_bytes());
        raw[4..8].copy_from_slice(&1024_u32.to_le_bytes());
        raw[26..28].copy_from_slice(&3_u16.to_le_bytes());
        raw[28..32].copy_from_slice(&2_u32.to_le_bytes());
        raw[40..44].copy_from_slice(&21_u32.to_le_bytes());
        let inode = Inode::parse(&raw).unwrap();
        assert!(inode.is_dir());
        assert_eq!(inode.permissions(), 0o755);
        assert_eq!(inode.data_blocks(), vec![BlockNumber(21)]);
        assert!(inode.indirect_blocks().iter().all(|b| *b == 0));
        assert!(!inode.is_fast_symlink());
        assert_eq!(inode.fast_symlink_target(), None);
    }
}
