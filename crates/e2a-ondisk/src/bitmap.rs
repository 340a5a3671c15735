//! Occupancy bitmaps. Bits are LSB-first within each byte.

/// Read-only view over a bitmap block.
#[derive(Debug, Clone, Copy)]
pub struct Bitmap<'a> {
    bytes: &'a [u8],
}

impl<'a> Bitmap<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Total addressable bits.
    #[must_use]
    pub fn len_bits(&self) -> usize {
        self.bytes.len() * 8
    }

    /// Bit `idx`; bits past the end read as clear.
    #[must_use]
    pub fn get(&self, idx: usize) -> bool {
        self.bytes
            .get(idx / 8)
            .is_some_and(|byte| (byte >> (idx % 8)) & 1 == 1)
    }

    /// Indices of set bits below `limit`, ascending.
    pub fn iter_set(&self, limit: usize) -> impl Iterator<Item = usize> + 'a {
        let bytes = self.bytes;
        let limit = limit.min(bytes.len() * 8);
        (0..limit).filter(move |idx| (bytes[idx / 8] >> (idx % 8)) & 1 == 1)
    }

    /// Number of set bits below `limit`.
    #[must_use]
    pub fn count_set(&self, limit: usize) -> usize {
        let limit = limit.min(self.len_bits());
        let full = limit / 8;
        let mut count: usize = self.bytes[..full]
            .iter()
            .map(|b| b.count_ones() as usize)
            .sum();
        let rem = limit % 8;
        if rem > 0 {
            let mask = (1_u8 << rem) - 1;
            count += (self.bytes[full] & mask).count_ones() as usize;
        }
        count
    }

    /// First set bit at or beyond `limit` (the region past the declared count).
    #[must_use]
    pub fn first_set_at_or_after(&self, limit: usize) -> Option<usize> {
        (limit..self.len_bits()).find(|idx| self.get(*idx))
    }

    /// Number of set bits at or beyond `limit`.
    #[must_use]
    pub fn count_set_at_or_after(&self, limit: usize) -> usize {
        self.count_set(self.len_bits()) - self.count_set(limit)
    }
}

/// Encode `indices` as a bitmap of `len_bytes` bytes. Out-of-range indices are ignored.
#[must_use]
pub fn encode_bitmap(indices: impl IntoIterator<Item = usize>, len_bytes: usize) -> Vec<u8> {
    let mut out = vec![0_u8; len_bytes];
    for idx in indices {
        if let Some(byte) = out.get_mut(idx / 8) {
            *byte |= 1 << (idx % 8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn inodes_one_through_thirteen_encode_as_ff_1f() {
        // Inode n lives at bit n - 1.
        let bytes = encode_bitmap((1..=13_usize).map(|ino| ino - 1), 2);
        assert_eq!(bytes, vec![0xFF, 0x1F]);

        let decoded: Vec<usize> = Bitmap::new(&bytes).iter_set(16).map(|bit| bit + 1).collect();
        assert_eq!(decoded, (1..=13).collect::<Vec<_>>());
    }

    #[test]
    fn count_and_tail() {
        let mut bytes = vec![0_u8; 128];
        bytes[0] = 0xFF;
        bytes[1] = 0xFF;
        bytes[2] = 0xFF;
        let bitmap = Bitmap::new(&bytes);
        assert_eq!(bitmap.count_set(1024), 24);
        assert_eq!(bitmap.count_set(20), 20);
        assert_eq!(bitmap.first_set_at_or_after(1024), None);
        assert_eq!(bitmap.first_set_at_or_after(10), Some(10));
        assert_eq!(bitmap.count_set_at_or_after(20), 4);

        bytes[127] = 0x80;
        let bitmap = Bitmap::new(&bytes);
        assert_eq!(bitmap.count_set(1024), 25);
        assert_eq!(bitmap.first_set_at_or_after(128 * 8 - 1), Some(1023));
    }

    #[test]
    fn get_out_of_range_is_clear() {
        let bytes = [0xFF_u8];
        let bitmap = Bitmap::new(&bytes);
        assert!(bitmap.get(7));
        assert!(!bitmap.get(8));
        assert_eq!(bitmap.iter_set(100).count(), 8);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn encode_then_iter_yields_same_set(
            set in proptest::collection::btree_set(0_usize..1024, 0..64)
        ) {
            let bytes = encode_bitmap(set.iter().copied(), 128);
            let bitmap = Bitmap::new(&bytes);
            let decoded: Vec<usize> = bitmap.iter_set(1024).collect();
            prop_assert_eq!(decoded, set.iter().copied().collect::<Vec<_>>());
            prop_assert_eq!(bitmap.count_set(1024), set.len());
        }
    }
}
