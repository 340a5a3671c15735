//! Directory-block walker.
//!
//! Walks the variable-length records of one directory block, yielding live
//! entries and framing violations in on-disk order. The walk terminates on a
//! violation that leaves the remaining framing undefined; other violations
//! are reported and the walk continues at the stated record length.

use crate::records::{DE_FILE_TYPE, DE_INODE, DE_NAME_LEN, DE_REC_LEN, DIR_ENTRY_HEADER_LAYOUT};
use e2a_types::EXT2_DIR_ENTRY_HEADER_LEN;
use serde::Serialize;

/// A live (non-zero inode) directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// Offset of the record within its block.
    pub offset: usize,
    pub inode: u32,
    pub rec_len: u16,
    pub name_len: u8,
    pub file_type: u8,
    pub name: Vec<u8>,
}

impl DirEntry {
    #[must_use]
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    #[must_use]
    pub fn is_dot(&self) -> bool {
        self.name == b"."
    }

    #[must_use]
    pub fn is_dotdot(&self) -> bool {
        self.name == b".."
    }
}

/// Smallest legal `rec_len` for a name of `name_len` bytes.
#[must_use]
pub const fn min_rec_len(name_len: usize) -> usize {
    (EXT2_DIR_ENTRY_HEADER_LEN + name_len + 3) & !3
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum DirViolation {
    /// `rec_len == 0`. At offset 0 the block is empty or corrupt.
    ZeroRecordLength { offset: usize },
    /// Fewer than eight bytes remain for a record header.
    TruncatedHeader { offset: usize, remaining: usize },
    /// The record extends past the end of the block.
    BoundaryViolation {
        offset: usize,
        rec_len: u16,
        block_size: usize,
    },
    /// `rec_len` is not a multiple of four.
    AlignmentViolation { offset: usize, rec_len: u16 },
    /// `rec_len` is non-zero but shorter than the fixed header.
    RecordTooShort { offset: usize, rec_len: u16 },
    /// The name runs past the end of its record.
    NameOverflow {
        offset: usize,
        rec_len: u16,
        name_len: u8,
    },
    /// An inode-0 record that is not the block-end padding record.
    ZeroInodeMidBlock { offset: usize, rec_len: u16 },
    /// Records stopped short of tiling the block.
    UnfilledDirectoryBlock { consumed: usize, block_size: usize },
}

impl DirViolation {
    #[must_use]
    pub fn offset(&self) -> usize {
        match self {
            Self::ZeroRecordLength { offset }
            | Self::TruncatedHeader { offset, .. }
            | Self::BoundaryViolation { offset, .. }
            | Self::AlignmentViolation { offset, .. }
            | Self::RecordTooShort { offset, .. }
            | Self::NameOverflow { offset, .. }
            | Self::ZeroInodeMidBlock { offset, .. } => *offset,
            Self::UnfilledDirectoryBlock { consumed, .. } => *consumed,
        }
    }
}

impl std::fmt::Display for DirViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroRecordLength { offset } => write!(f, "rec_len 0 at offset {offset}"),
            Self::TruncatedHeader { offset, remaining } => {
                write!(f, "only {remaining} bytes left for a header at offset {offset}")
            }
            Self::BoundaryViolation {
                offset,
                rec_len,
                block_size,
            } => write!(
                f,
                "rec_len {rec_len} at offset {offset} crosses block end {block_size}"
            ),
            Self::AlignmentViolation { offset, rec_len } => {
                write!(f, "rec_len {rec_len} at offset {offset} not a multiple of 4")
            }
            Self::RecordTooShort { offset, rec_len } => {
                write!(f, "rec_len {rec_len} at offset {offset} shorter than header")
            }
            Self::NameOverflow {
                offset,
                rec_len,
                name_len,
            } => write!(
                f,
                "name_len {name_len} at offset {offset} overflows rec_len {rec_len}"
            ),
            Self::ZeroInodeMidBlock { offset, rec_len } => write!(
                f,
                "inode 0 record (rec_len {rec_len}) at offset {offset} is not block-end padding"
            ),
            Self::UnfilledDirectoryBlock {
                consumed,
                block_size,
            } => write!(f, "records cover {consumed} of {block_size} bytes"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WalkEvent {
    Entry(DirEntry),
    Violation(DirViolation),
}

/// Iterator over one directory block (SCANNING until TERMINATED).
#[derive(Debug, Clone)]
pub struct DirWalker<'a> {
    block: &'a [u8],
    offset: usize,
    done: bool,
    unfilled_reported: bool,
    /// Events decoded from the current record, popped from the back.
    queue: Vec<WalkEvent>,
}

impl<'a> DirWalker<'a> {
    #[must_use]
    pub fn new(block: &'a [u8]) -> Self {
        Self {
            block,
            offset: 0,
            done: false,
            unfilled_reported: false,
            queue: Vec::new(),
        }
    }

    /// Bytes tiled by records so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.offset
    }

    fn terminate(&mut self, violation: DirViolation) -> Option<WalkEvent> {
        self.done = true;
        Some(WalkEvent::Violation(violation))
    }

    fn step(&mut self) -> Option<WalkEvent> {
        let block_size = self.block.len();
        let offset = self.offset;
        let remaining = block_size - offset;
        let Ok(header) = DIR_ENTRY_HEADER_LAYOUT.decode(&self.block[offset..]) else {
            return self.terminate(DirViolation::TruncatedHeader { offset, remaining });
        };
        let raw = header.raw();
        // The header window is exactly eight bytes, so these reads cannot fail.
        let inode = DE_INODE.read_u32(raw).unwrap_or(0);
        let rec_len = DE_REC_LEN.read_u16(raw).unwrap_or(0);
        let name_len = DE_NAME_LEN.read_u8(raw).unwrap_or(0);
        let file_type = DE_FILE_TYPE.read_u8(raw).unwrap_or(0);

        if rec_len == 0 {
            return self.terminate(DirViolation::ZeroRecordLength { offset });
        }
        let span = usize::from(rec_len);
        if span > remaining {
            return self.terminate(DirViolation::BoundaryViolation {
                offset,
                rec_len,
                block_size,
            });
        }
        if span < EXT2_DIR_ENTRY_HEADER_LEN {
            return self.terminate(DirViolation::RecordTooShort { offset, rec_len });
        }

        self.offset += span;
        let mut pending = Vec::new();
        if span % 4 != 0 {
            pending.push(DirViolation::AlignmentViolation { offset, rec_len });
        }

        let name_end = EXT2_DIR_ENTRY_HEADER_LEN + usize::from(name_len);
        if inode == 0 {
            if self.offset != block_size {
                pending.push(DirViolation::ZeroInodeMidBlock { offset, rec_len });
            }
        } else if name_end > span {
            pending.push(DirViolation::NameOverflow {
                offset,
                rec_len,
                name_len,
            });
        }

        let entry = (inode != 0 && name_end <= span).then(|| {
            WalkEvent::Entry(DirEntry {
                offset,
                inode,
                rec_len,
                name_len,
                file_type,
                name: self.block[offset + EXT2_DIR_ENTRY_HEADER_LEN..offset + name_end].to_vec(),
            })
        });

        // Violations on a record precede the entry it yields.
        let mut events: Vec<WalkEvent> = pending.into_iter().map(WalkEvent::Violation).collect();
        events.extend(entry);
        self.queue = events;
        self.queue.reverse();
        self.queue.pop()
    }
}

impl Iterator for DirWalker<'_> {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.queue.pop() {
            return Some(event);
        }
        loop {
            if self.done || self.offset == self.block.len() {
                if self.offset != self.block.len() && !self.unfilled_reported {
                    self.unfilled_reported = true;
                    return Some(WalkEvent::Violation(DirViolation::UnfilledDirectoryBlock {
                        consumed: self.offset,
                        block_size: self.block.len(),
                    }));
                }
                return None;
            }
            if let Some(event) = self.step() {
                return Some(event);
            }
        }
    }
}

/// Result of walking one block to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirWalk {
    pub entries: Vec<DirEntry>,
    pub violations: Vec<DirViolation>,
    /// Bytes tiled by well-formed records.
    pub consumed: usize,
}

impl DirWalk {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Walk `block` to completion.
#[must_use]
pub fn walk_dir_block(block: &[u8]) -> DirWalk {
    let mut walker = DirWalker::new(block);
    let mut walk = DirWalk::default();
    for event in walker.by_ref() {
        match event {
            WalkEvent::Entry(entry) => walk.entries.push(entry),
            WalkEvent::Violation(v) => walk.violations.push(v),
        }
    }
    walk.consumed = walker.consumed();
    walk
}

/// Lay out `(inode, name, file_type)` records so they tile a block exactly.
///
/// Each record gets its minimal `rec_len`; the last absorbs the remainder.
/// Returns `None` if the entries do not fit.
#[must_use]
pub fn encode_dir_block(entries: &[(u32, &[u8], u8)], block_size: usize) -> Option<Vec<u8>> {
    let mut block = vec![0_u8; block_size];
    let mut offset = 0_usize;
    for (idx, (inode, name, file_type)) in entries.iter().enumerate() {
        let name_len = u8::try_from(name.len()).ok()?;
        let min = min_rec_len(name.len());
        let rec_len = if idx + 1 == entries.len() {
            block_size.checked_sub(offset)?
        } else {
            min
        };
        if rec_len < min || offset + rec_len > block_size {
            return None;
        }
        let rec_len_u16 = u16::try_from(rec_len).ok()?;
        block[offset..offset + 4].copy_from_slice(&inode.to_le_bytes());
        block[offset + 4..offset + 6].copy_from_slice(&rec_len_u16.to_le_bytes());
        block[offset + 6] = name_len;
        block[offset + 7] = *file_type;
        block[offset + 8..offset + 8 + name.len()].copy_from_slice(name);
        offset += rec_len;
    }
    if entries.is_empty() {
        // A single padding record with inode 0.
        let rec_len = u16::try_from(block_size).ok()?;
        block[4..6].copy_from_slice(&rec_len.to_le_bytes());
    }
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2a_types::{EXT2_FT_DIR, EXT2_FT_REG_FILE, EXT2_FT_SYMLINK};
    use proptest::prelude::*;

    fn write_entry(block: &mut [u8], offset: usize, inode: u32, rec_len: u16, name: &[u8]) {
        block[offset..offset + 4].copy_from_slice(&inode.to_le_bytes());
        block[offset + 4..offset + 6].copy_from_slice(&rec_len.to_le_bytes());
        block[offset + 6] = u8::try_from(name.len()).unwrap();
        block[offset + 7] = EXT2_FT_REG_FILE;
        block[offset + 8..offset + 8 + name.len()].copy_from_slice(name);
    }

    fn root_block() -> Vec<u8> {
        encode_dir_block(
            &[
                (2, b".", EXT2_FT_DIR),
                (2, b"..", EXT2_FT_DIR),
                (11, b"lost+found", EXT2_FT_DIR),
                (12, b"hello-world", EXT2_FT_REG_FILE),
                (13, b"hello", EXT2_FT_SYMLINK),
            ],
            1024,
        )
        .unwrap()
    }

    #[test]
    fn reference_root_block_tiles_exactly() {
        let walk = walk_dir_block(&root_block());
        assert!(walk.is_clean(), "{:?}", walk.violations);
        assert_eq!(walk.consumed, 1024);
        let names: Vec<String> = walk.entries.iter().map(DirEntry::name_str).collect();
        assert_eq!(names, [".", "..", "lost+found", "hello-world", "hello"]);
        let inodes: Vec<u32> = walk.entries.iter().map(|e| e.inode).collect();
        assert_eq!(inodes, [2, 2, 11, 12, 13]);
        let rec_lens: Vec<u16> = walk.entries.iter().map(|e| e.rec_len).collect();
        assert_eq!(rec_lens, [12, 12, 20, 20, 960]);
        assert_eq!(rec_lens.iter().map(|r| usize::from(*r)).sum::<usize>(), 1024);
    }

    #[test]
    fn rec_len_sum_for_short_names() {
        for len in [1_usize, 2, 3, 10] {
            let name = vec![b'a'; len];
            let block =
                encode_dir_block(&[(11, &name, EXT2_FT_REG_FILE), (12, b"x", 1)], 1024).unwrap();
            let walk = walk_dir_block(&block);
            assert!(walk.is_clean());
            assert_eq!(usize::from(walk.entries[0].rec_len), min_rec_len(len));
            assert_eq!(usize::from(walk.entries[0].rec_len) % 4, 0);
            let sum: usize = walk.entries.iter().map(|e| usize::from(e.rec_len)).sum();
            assert_eq!(sum, 1024);
        }
    }

    #[test]
    fn zero_rec_len_terminates_and_reports_unfilled() {
        let mut block = vec![0_u8; 1024];
        write_entry(&mut block, 0, 2, 12, b".");
        let walk = walk_dir_block(&block);
        assert_eq!(walk.entries.len(), 1);
        assert_eq!(
            walk.violations,
            vec![
                DirViolation::ZeroRecordLength { offset: 12 },
                DirViolation::UnfilledDirectoryBlock {
                    consumed: 12,
                    block_size: 1024,
                },
            ]
        );
    }

    #[test]
    fn empty_block_is_zero_rec_len_at_start() {
        let walk = walk_dir_block(&[0_u8; 1024]);
        assert!(walk.entries.is_empty());
        assert_eq!(walk.violations[0], DirViolation::ZeroRecordLength { offset: 0 });
    }

    #[test]
    fn boundary_violation_terminates() {
        let mut block = vec![0_u8; 1024];
        write_entry(&mut block, 0, 2, 12, b".");
        write_entry(&mut block, 12, 2, 1020, b"..");
        let walk = walk_dir_block(&block);
        assert_eq!(walk.entries.len(), 1);
        assert!(matches!(
            walk.violations[0],
            DirViolation::BoundaryViolation {
                offset: 12,
                rec_len: 1020,
                block_size: 1024,
            }
        ));
        assert_eq!(walk.consumed, 12);
    }

    #[test]
    fn misaligned_rec_len_is_flagged_and_followed() {
        let mut block = vec![0_u8; 1024];
        write_entry(&mut block, 0, 2, 10, b".");
        write_entry(&mut block, 10, 2, 1014, b"..");
        let walk = walk_dir_block(&block);
        assert_eq!(walk.entries.len(), 2);
        assert_eq!(
            walk.violations,
            vec![
                DirViolation::AlignmentViolation {
                    offset: 0,
                    rec_len: 10,
                },
                DirViolation::AlignmentViolation {
                    offset: 10,
                    rec_len: 1014,
                },
            ]
        );
        assert_eq!(walk.consumed, 1024);
    }

    #[test]
    fn zero_inode_allowed_only_at_block_end() {
        let mut block = vec![0_u8; 1024];
        write_entry(&mut block, 0, 2, 12, b".");
        write_entry(&mut block, 12, 0, 12, b"gone");
        write_entry(&mut block, 24, 2, 1000, b"..");
        let walk = walk_dir_block(&block);
        assert_eq!(walk.entries.len(), 2);
        assert_eq!(
            walk.violations,
            vec![DirViolation::ZeroInodeMidBlock {
                offset: 12,
                rec_len: 12,
            }]
        );

        let mut tail = vec![0_u8; 1024];
        write_entry(&mut tail, 0, 2, 12, b".");
        write_entry(&mut tail, 12, 0, 1012, b"");
        assert!(walk_dir_block(&tail).is_clean());
    }

    #[test]
    fn name_overflow_skips_entry_but_keeps_framing() {
        let mut block = vec![0_u8; 1024];
        write_entry(&mut block, 0, 2, 12, b".");
        block[6] = 9;
        write_entry(&mut block, 12, 2, 1012, b"..");
        let walk = walk_dir_block(&block);
        assert_eq!(walk.entries.len(), 1);
        assert_eq!(walk.entries[0].name, b"..");
        assert_eq!(
            walk.violations,
            vec![DirViolation::NameOverflow {
                offset: 0,
                rec_len: 12,
                name_len: 9,
            }]
        );
    }

    #[test]
    fn short_record_and_truncated_header() {
        let mut block = vec![0_u8; 1024];
        write_entry(&mut block, 0, 2, 4, b"");
        let walk = walk_dir_block(&block);
        assert_eq!(
            walk.violations[0],
            DirViolation::RecordTooShort {
                offset: 0,
                rec_len: 4,
            }
        );

        let mut block = vec![0_u8; 16];
        write_entry(&mut block, 0, 2, 12, b".");
        let walk = walk_dir_block(&block);
        assert_eq!(
            walk.violations[0],
            DirViolation::TruncatedHeader {
                offset: 12,
                remaining: 4,
            }
        );
    }

    #[test]
    fn walker_events_are_ordered() {
        let events: Vec<WalkEvent> = DirWalker::new(&root_block()).collect();
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| matches!(e, WalkEvent::Entry(_))));
    }

    #[test]
    fn encode_rejects_overfull_block() {
        let long = vec![b'n'; 200];
        let entries: Vec<(u32, &[u8], u8)> = (0..6).map(|i| (i + 11, &long[..], 1)).collect();
        assert!(encode_dir_block(&entries, 1024).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn encoded_blocks_tile_for_any_name_lengths(
            lens in proptest::collection::vec(1_usize..=40, 1..16)
        ) {
            let names: Vec<Vec<u8>> = lens.iter().map(|len| vec![b'f'; *len]).collect();
            let entries: Vec<(u32, &[u8], u8)> = names
                .iter()
                .enumerate()
                .map(|(i, n)| (u32::try_from(i).unwrap() + 11, n.as_slice(), EXT2_FT_REG_FILE))
                .collect();
            let block = encode_dir_block(&entries, 1024).unwrap();
            let walk = walk_dir_block(&block);
            prop_assert!(walk.is_clean());
            prop_assert_eq!(walk.entries.len(), lens.len());
            let sum: usize = walk.entries.iter().map(|e| usize::from(e.rec_len)).sum();
            prop_assert_eq!(sum, 1024);
            for entry in &walk.entries {
                prop_assert_eq!(usize::from(entry.rec_len) % 4, 0);
            }
        }

        #[test]
        fn walker_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let walk = walk_dir_block(&bytes);
            prop_assert!(walk.consumed <= bytes.len());
        }
    }
}
