#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const EXT2_SUPERBLOCK_OFFSET: usize = 1024;
pub const EXT2_SUPERBLOCK_SIZE: usize = 1024;
pub const EXT2_SUPER_MAGIC: u16 = 0xEF53;

/// Block size implied by `log_block_size == 0`.
pub const EXT2_MIN_BLOCK_SIZE: u32 = 1024;

/// Revision-0 images always use 128-byte inodes.
pub const EXT2_GOOD_OLD_INODE_SIZE: usize = 128;
pub const EXT2_GOOD_OLD_FIRST_INO: u32 = 11;
pub const EXT2_ROOT_INO: u32 = 2;
pub const EXT2_GROUP_DESC_SIZE: usize = 32;

/// Direct block pointers in `i_block`; indirect slots are not modelled.
pub const EXT2_NDIR_BLOCKS: usize = 12;
pub const EXT2_N_BLOCKS: usize = 15;
pub const EXT2_I_BLOCK_LEN: usize = EXT2_N_BLOCKS * 4;

/// A symlink whose target is shorter than this is stored inline in `i_block`.
pub const EXT2_FAST_SYMLINK_MAX: usize = EXT2_I_BLOCK_LEN;

pub const EXT2_NAME_LEN: usize = 255;
pub const EXT2_DIR_ENTRY_HEADER_LEN: usize = 8;

/// `i_blocks` is counted in 512-byte sectors.
pub const EXT2_SECTOR_SIZE: u32 = 512;

// ── Mode bits ───────────────────────────────────────────────────────────────

pub const S_IFMT: u16 = 0o170_000;
pub const S_IFSOCK: u16 = 0o140_000;
pub const S_IFLNK: u16 = 0o120_000;
pub const S_IFREG: u16 = 0o100_000;
pub const S_IFBLK: u16 = 0o060_000;
pub const S_IFDIR: u16 = 0o040_000;
pub const S_IFCHR: u16 = 0o020_000;
pub const S_IFIFO: u16 = 0o010_000;
pub const S_IPERM: u16 = 0o7_777;

// ── Directory entry file types ──────────────────────────────────────────────

pub const EXT2_FT_UNKNOWN: u8 = 0;
pub const EXT2_FT_REG_FILE: u8 = 1;
pub const EXT2_FT_DIR: u8 = 2;
pub const EXT2_FT_CHRDEV: u8 = 3;
pub const EXT2_FT_BLKDEV: u8 = 4;
pub const EXT2_FT_FIFO: u8 = 5;
pub const EXT2_FT_SOCK: u8 = 6;
pub const EXT2_FT_SYMLINK: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeNumber(pub u32);

impl InodeNumber {
    pub const ROOT: Self = Self(EXT2_ROOT_INO);

    /// Reserved inodes precede `EXT2_GOOD_OLD_FIRST_INO`. The root is one of them.
    #[must_use]
    pub fn is_reserved(self) -> bool {
        self.0 < EXT2_GOOD_OLD_FIRST_INO
    }

    /// Zero-based slot in the inode table and bit index in the inode bitmap.
    #[must_use]
    pub fn table_index(self) -> Option<u32> {
        self.0.checked_sub(1)
    }
}

/// Validated block size (power of two in 1024..=65536).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockSize(u32);

impl BlockSize {
    pub const MIN: Self = Self(EXT2_MIN_BLOCK_SIZE);

    /// Create a `BlockSize` if `value` is a power of two in [1024, 65536].
    pub fn new(value: u32) -> Result<Self, ParseError> {
        if !value.is_power_of_two() || !(1024..=65536).contains(&value) {
            return Err(ParseError::InvalidField {
                field: "block_size",
                reason: "must be power of two in 1024..=65536",
            });
        }
        Ok(Self(value))
    }

    /// Block size from the superblock's `log_block_size` (1024 << log).
    pub fn from_log(log_block_size: u32) -> Result<Self, ParseError> {
        if log_block_size > 6 {
            return Err(ParseError::InvalidField {
                field: "log_block_size",
                reason: "must be at most 6",
            });
        }
        Self::new(EXT2_MIN_BLOCK_SIZE << log_block_size)
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Convert a block number to a byte offset.
    #[must_use]
    pub fn block_to_byte(self, block: BlockNumber) -> u64 {
        u64::from(block.0) * u64::from(self.0)
    }

    /// Number of 512-byte sectors covered by one block.
    #[must_use]
    pub fn sectors_per_block(self) -> u32 {
        self.0 / EXT2_SECTOR_SIZE
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self::MIN
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, ParseError> {
    let bytes = ensure_slice(data, offset, 1)?;
    Ok(bytes[0])
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Text up to the first NUL, lossily decoded.
#[must_use]
pub fn trim_nul_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Offset (relative to `bytes`) of the first non-zero byte, if any.
#[must_use]
pub fn first_nonzero(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|b| *b != 0)
}

// ── Entity kinds ────────────────────────────────────────────────────────────

/// What an inode's type nibble or a directory entry's file-type byte names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

impl FileKind {
    /// Decode the `S_IFMT` nibble of an inode mode.
    #[must_use]
    pub fn from_mode(mode: u16) -> Option<Self> {
        match mode & S_IFMT {
            S_IFREG => Some(Self::Regular),
            S_IFDIR => Some(Self::Directory),
            S_IFLNK => Some(Self::Symlink),
            S_IFCHR => Some(Self::CharDevice),
            S_IFBLK => Some(Self::BlockDevice),
            S_IFIFO => Some(Self::Fifo),
            S_IFSOCK => Some(Self::Socket),
            _ => None,
        }
    }

    /// Decode a directory entry file-type byte. `EXT2_FT_UNKNOWN` yields `None`.
    #[must_use]
    pub fn from_dir_file_type(raw: u8) -> Option<Self> {
        match raw {
            EXT2_FT_REG_FILE => Some(Self::Regular),
            EXT2_FT_DIR => Some(Self::Directory),
            EXT2_FT_CHRDEV => Some(Self::CharDevice),
            EXT2_FT_BLKDEV => Some(Self::BlockDevice),
            EXT2_FT_FIFO => Some(Self::Fifo),
            EXT2_FT_SOCK => Some(Self::Socket),
            EXT2_FT_SYMLINK => Some(Self::Symlink),
            _ => None,
        }
    }

    #[must_use]
    pub fn mode_bits(self) -> u16 {
        match self {
            Self::Regular => S_IFREG,
            Self::Directory => S_IFDIR,
            Self::Symlink => S_IFLNK,
            Self::CharDevice => S_IFCHR,
            Self::BlockDevice => S_IFBLK,
            Self::Fifo => S_IFIFO,
            Self::Socket => S_IFSOCK,
        }
    }

    #[must_use]
    pub fn dir_file_type(self) -> u8 {
        match self {
            Self::Regular => EXT2_FT_REG_FILE,
            Self::Directory => EXT2_FT_DIR,
            Self::Symlink => EXT2_FT_SYMLINK,
            Self::CharDevice => EXT2_FT_CHRDEV,
            Self::BlockDevice => EXT2_FT_BLKDEV,
            Self::Fifo => EXT2_FT_FIFO,
            Self::Socket => EXT2_FT_SOCK,
        }
    }
}

// ── Display impls ───────────────────────────────────────────────────────────

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Regular => "regular",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::CharDevice => "char_device",
            Self::BlockDevice => "block_device",
            Self::Fifo => "fifo",
            Self::Socket => "socket",
        })
    }
}
