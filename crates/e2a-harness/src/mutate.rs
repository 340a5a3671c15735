//! Byte-level mutation of an in-memory image, addressed by record field.
//!
//! Field setters look the name up in the same layout tables the decoder
//! uses, so a test names `"links_count"` rather than an offset.

use anyhow::{Context, Result, bail};
use e2a_block::Image;
use e2a_ondisk::{
    FieldKind, GROUP_DESC_LAYOUT, GroupDesc, INODE_LAYOUT, RecordLayout, SUPERBLOCK_LAYOUT,
    inode_location,
};
use e2a_types::{BlockNumber, BlockSize, EXT2_SUPERBLOCK_OFFSET, InodeNumber};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMutator {
    bytes: Vec<u8>,
    block_size: BlockSize,
}

impl ImageMutator {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            block_size: BlockSize::MIN,
        }
    }

    pub fn reference() -> Result<Self> {
        crate::reference_bytes().map(Self::new)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn into_image(self) -> Image {
        Image::from_bytes(self.bytes)
    }

    // ── Raw writes ──────────────────────────────────────────────────────────

    pub fn put_bytes(&mut self, offset: usize, data: &[u8]) -> Result<&mut Self> {
        let end = offset
            .checked_add(data.len())
            .context("mutation offset overflow")?;
        let Some(target) = self.bytes.get_mut(offset..end) else {
            bail!(
                "mutation out of bounds: offset={offset} len={} size={}",
                data.len(),
                self.bytes.len()
            );
        };
        target.copy_from_slice(data);
        Ok(self)
    }

    pub fn put_u8(&mut self, offset: usize, value: u8) -> Result<&mut Self> {
        self.put_bytes(offset, &[value])
    }

    pub fn put_u16(&mut self, offset: usize, value: u16) -> Result<&mut Self> {
        self.put_bytes(offset, &value.to_le_bytes())
    }

    pub fn put_u32(&mut self, offset: usize, value: u32) -> Result<&mut Self> {
        self.put_bytes(offset, &value.to_le_bytes())
    }

    pub fn fill(&mut self, offset: usize, len: usize, value: u8) -> Result<&mut Self> {
        self.put_bytes(offset, &vec![value; len])
    }

    // ── Field writes ────────────────────────────────────────────────────────

    /// Store `value` little-endian in the named field of a record at `base`,
    /// truncated to the field's width. Negative values go through `as u64`.
    pub fn set_field(
        &mut self,
        layout: &RecordLayout,
        base: usize,
        name: &str,
        value: u64,
    ) -> Result<&mut Self> {
        let field = layout
            .field(name)
            .with_context(|| format!("{} has no field {name:?}", layout.name))?;
        if field.kind == FieldKind::Bytes {
            bail!("{}.{name} is a byte field; use set_bytes_field", layout.name);
        }
        let le = value.to_le_bytes();
        self.put_bytes(base + field.offset, &le[..field.width])
    }

    /// Store `data` zero-padded in a byte field.
    pub fn set_bytes_field(
        &mut self,
        layout: &RecordLayout,
        base: usize,
        name: &str,
        data: &[u8],
    ) -> Result<&mut Self> {
        let field = layout
            .field(name)
            .with_context(|| format!("{} has no field {name:?}", layout.name))?;
        if data.len() > field.width {
            bail!(
                "{}.{name} holds {} bytes, got {}",
                layout.name,
                field.width,
                data.len()
            );
        }
        let mut padded = vec![0_u8; field.width];
        padded[..data.len()].copy_from_slice(data);
        self.put_bytes(base + field.offset, &padded)
    }

    pub fn superblock(&mut self, name: &str, value: u64) -> Result<&mut Self> {
        self.set_field(&SUPERBLOCK_LAYOUT, EXT2_SUPERBLOCK_OFFSET, name, value)
    }

    pub fn group_desc(&mut self, name: &str, value: u64) -> Result<&mut Self> {
        let base = self.block_offset(self.group_desc_block());
        self.set_field(&GROUP_DESC_LAYOUT, base, name, value)
    }

    /// Set a field of inode `ino` in the table the group descriptor names.
    pub fn inode(&mut self, ino: u32, name: &str, value: u64) -> Result<&mut Self> {
        let base = self.inode_offset(ino)?;
        self.set_field(&INODE_LAYOUT, base, name, value)
    }

    /// Set `i_block[index]` of inode `ino`.
    pub fn inode_block(&mut self, ino: u32, index: usize, block: u32) -> Result<&mut Self> {
        let field = INODE_LAYOUT.field("block").context("inode has no block field")?;
        if index * 4 >= field.width {
            bail!("i_block index {index} out of range");
        }
        let base = self.inode_offset(ino)?;
        self.put_u32(base + field.offset + index * 4, block)
    }

    /// Zero all 128 bytes of inode `ino`.
    pub fn clear_inode(&mut self, ino: u32) -> Result<&mut Self> {
        let base = self.inode_offset(ino)?;
        self.fill(base, INODE_LAYOUT.size, 0)
    }

    // ── Bitmaps ─────────────────────────────────────────────────────────────

    /// Set or clear bit `bit` of the bitmap stored in `block`.
    pub fn set_bit(&mut self, block: u32, bit: usize, on: bool) -> Result<&mut Self> {
        let offset = self.block_offset(BlockNumber(block)) + bit / 8;
        let mask = 1_u8 << (bit % 8);
        let current = *self
            .bytes
            .get(offset)
            .with_context(|| format!("bitmap bit {bit} of block {block} is outside the image"))?;
        let next = if on { current | mask } else { current & !mask };
        self.put_u8(offset, next)
    }

    // ── Addressing ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn block_offset(&self, block: BlockNumber) -> usize {
        usize::try_from(self.block_size.block_to_byte(block)).unwrap_or(usize::MAX)
    }

    fn group_desc_block(&self) -> BlockNumber {
        BlockNumber(EXT2_SUPERBLOCK_OFFSET as u32 / self.block_size.get() + 1)
    }

    fn inode_offset(&self, ino: u32) -> Result<usize> {
        let gd_offset = self.block_offset(self.group_desc_block());
        let gd_bytes = self
            .bytes
            .get(gd_offset..)
            .context("group descriptor is outside the image")?;
        let gd = GroupDesc::parse(gd_bytes).context("group descriptor does not decode")?;
        let offset = inode_location(InodeNumber(ino), BlockNumber(gd.inode_table), self.block_size)
            .with_context(|| format!("inode {ino} has no table slot"))?;
        usize::try_from(offset).context("inode offset overflow")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_setters_hit_reference_offsets() {
        let mut m = ImageMutator::reference().expect("reference");
        m.superblock("magic", 0x1234)
            .and_then(|m| m.group_desc("used_dirs_count", 9))
            .and_then(|m| m.inode(12, "links_count", 7))
            .and_then(|m| m.inode_block(2, 1, 99))
            .expect("mutations");
        let bytes = m.into_bytes();
        assert_eq!(&bytes[1080..1082], &[0x34, 0x12]);
        assert_eq!(&bytes[2048 + 16..2048 + 18], &[9, 0]);
        assert_eq!(&bytes[6528 + 26..6528 + 28], &[7, 0]);
        assert_eq!(&bytes[5248 + 44..5248 + 48], &[99, 0, 0, 0]);
    }

    #[test]
    fn signed_fields_truncate_to_width() {
        let mut m = ImageMutator::reference().expect("reference");
        m.superblock("max_mnt_count", (-5_i64) as u64).expect("set");
        assert_eq!(&m.as_bytes()[1078..1080], &(-5_i16).to_le_bytes());
    }

    #[test]
    fn byte_fields_are_padded() {
        let mut m = ImageMutator::reference().expect("reference");
        m.set_bytes_field(&SUPERBLOCK_LAYOUT, 1024, "volume_name", b"x")
            .expect("set");
        assert_eq!(&m.as_bytes()[1144..1146], b"x\0");
        assert!(m.superblock("volume_name", 1).is_err());
        assert!(
            m.set_bytes_field(&SUPERBLOCK_LAYOUT, 1024, "volume_name", &[1; 17])
                .is_err()
        );
    }

    #[test]
    fn bits_and_bounds() {
        let mut m = ImageMutator::reference().expect("reference");
        m.set_bit(4, 12, false).expect("clear");
        m.set_bit(4, 20, true).expect("set");
        assert_eq!(m.as_bytes()[4096 + 1], 0x0F);
        assert_eq!(m.as_bytes()[4096 + 2], 0x10);
        assert!(m.put_u32(1_048_574, 1).is_err());
        assert!(m.inode(12, "no_such_field", 0).is_err());
        assert!(m.inode_block(12, 15, 0).is_err());
    }

    #[test]
    fn clear_inode_zeroes_the_slot() {
        let mut m = ImageMutator::reference().expect("reference");
        m.clear_inode(13).expect("clear");
        assert!(m.as_bytes()[6656..6784].iter().all(|&b| b == 0));
    }
}
