//! Declarative field tables.
//!
//! Every on-disk record is described once as a [`RecordLayout`]: a name, a
//! size, and an ordered list of [`FieldSpec`]s. Typed records and audit rules
//! both read through these specs, so an offset lives in exactly one place.
//! Bytes not covered by any field are reserved and expected to be zero.

use e2a_types::{ParseError, ensure_slice, read_fixed, read_le_u16, read_le_u32, read_u8};
use serde::Serialize;
use std::ops::Range;

/// How a field's bytes are interpreted. All integers are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Unsigned,
    Signed,
    Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub kind: FieldKind,
}

impl FieldSpec {
    #[must_use]
    pub const fn unsigned(name: &'static str, offset: usize, width: usize) -> Self {
        Self {
            name,
            offset,
            width,
            kind: FieldKind::Unsigned,
        }
    }

    #[must_use]
    pub const fn signed(name: &'static str, offset: usize, width: usize) -> Self {
        Self {
            name,
            offset,
            width,
            kind: FieldKind::Signed,
        }
    }

    #[must_use]
    pub const fn bytes(name: &'static str, offset: usize, width: usize) -> Self {
        Self {
            name,
            offset,
            width,
            kind: FieldKind::Bytes,
        }
    }

    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.width
    }

    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    /// The field's bytes within `record`.
    pub fn slice<'a>(&self, record: &'a [u8]) -> Result<&'a [u8], ParseError> {
        ensure_slice(record, self.offset, self.width)
    }

    /// Read as an unsigned integer regardless of declared signedness.
    pub fn read_unsigned(&self, record: &[u8]) -> Result<u64, ParseError> {
        let bytes = self.slice(record)?;
        if bytes.len() > 8 {
            return Err(ParseError::IntegerConversion { field: self.name });
        }
        Ok(bytes
            .iter()
            .rev()
            .fold(0_u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    /// Read as a two's-complement integer sign-extended from `width` bytes.
    pub fn read_signed(&self, record: &[u8]) -> Result<i64, ParseError> {
        let raw = self.read_unsigned(record)?;
        let bits = u32::try_from(self.width * 8)
            .map_err(|_| ParseError::IntegerConversion { field: self.name })?;
        if bits == 0 || bits >= 64 {
            return Ok(raw.cast_signed());
        }
        let shift = 64 - bits;
        Ok((raw << shift).cast_signed() >> shift)
    }

    pub fn read_u8(&self, record: &[u8]) -> Result<u8, ParseError> {
        self.expect_width(1)?;
        read_u8(record, self.offset)
    }

    pub fn read_u16(&self, record: &[u8]) -> Result<u16, ParseError> {
        self.expect_width(2)?;
        read_le_u16(record, self.offset)
    }

    pub fn read_i16(&self, record: &[u8]) -> Result<i16, ParseError> {
        Ok(self.read_u16(record)?.cast_signed())
    }

    pub fn read_u32(&self, record: &[u8]) -> Result<u32, ParseError> {
        self.expect_width(4)?;
        read_le_u32(record, self.offset)
    }

    pub fn read_array<const N: usize>(&self, record: &[u8]) -> Result<[u8; N], ParseError> {
        self.expect_width(N)?;
        read_fixed::<N>(record, self.offset)
    }

    /// Decode according to the declared kind.
    pub fn read_value(&self, record: &[u8]) -> Result<FieldValue, ParseError> {
        Ok(match self.kind {
            FieldKind::Unsigned => FieldValue::Unsigned(self.read_unsigned(record)?),
            FieldKind::Signed => FieldValue::Signed(self.read_signed(record)?),
            FieldKind::Bytes => FieldValue::Bytes(self.slice(record)?.to_vec()),
        })
    }

    fn expect_width(&self, width: usize) -> Result<(), ParseError> {
        if self.width == width {
            Ok(())
        } else {
            Err(ParseError::InvalidField {
                field: self.name,
                reason: "field width does not match accessor",
            })
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Bytes(#[serde(serialize_with = "serialize_hex")] Vec<u8>),
}

fn serialize_hex<S: serde::Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Bytes(bytes) => f.write_str(&hex::encode(bytes)),
        }
    }
}

/// Layout of one fixed-size record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordLayout {
    pub name: &'static str,
    pub size: usize,
    pub fields: &'static [FieldSpec],
}

impl RecordLayout {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    /// Byte ranges not covered by any field, in ascending order.
    #[must_use]
    pub fn reserved_ranges(&self) -> Vec<Range<usize>> {
        let mut covered: Vec<Range<usize>> = self.fields.iter().map(FieldSpec::range).collect();
        covered.sort_by_key(|r| r.start);

        let mut gaps = Vec::new();
        let mut cursor = 0_usize;
        for range in covered {
            if range.start > cursor {
                gaps.push(cursor..range.start);
            }
            cursor = cursor.max(range.end);
        }
        if cursor < self.size {
            gaps.push(cursor..self.size);
        }
        gaps
    }

    /// Decode a record window. Fails only when `bytes` is shorter than the layout.
    pub fn decode<'a>(&'static self, bytes: &'a [u8]) -> Result<DecodedRecord<'a>, ParseError> {
        let raw = ensure_slice(bytes, 0, self.size)?;
        Ok(DecodedRecord { layout: self, raw })
    }
}

/// A record window bound to its layout. Field reads cannot fail once decoded.
#[derive(Debug, Clone, Copy)]
pub struct DecodedRecord<'a> {
    layout: &'static RecordLayout,
    raw: &'a [u8],
}

/// A reserved byte range that holds at least one non-zero byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirtyRange {
    pub range: Range<usize>,
    /// Offset within the record of the first non-zero byte.
    pub first_nonzero: usize,
    pub nonzero_bytes: usize,
}

impl<'a> DecodedRecord<'a> {
    #[must_use]
    pub fn layout(&self) -> &'static RecordLayout {
        self.layout
    }

    #[must_use]
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.layout.field(name)?.read_value(self.raw).ok()
    }

    #[must_use]
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.layout.field(name)?.read_unsigned(self.raw).ok()
    }

    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.layout.field(name)?.read_signed(self.raw).ok()
    }

    #[must_use]
    pub fn bytes(&self, name: &str) -> Option<&'a [u8]> {
        self.layout.field(name)?.slice(self.raw).ok()
    }

    /// Every field with its decoded value, in table order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static FieldSpec, FieldValue)> + '_ {
        self.layout
            .fields
            .iter()
            .filter_map(|spec| Some((spec, spec.read_value(self.raw).ok()?)))
    }

    /// Reserved ranges holding any non-zero byte.
    #[must_use]
    pub fn nonzero_reserved(&self) -> Vec<DirtyRange> {
        self.layout
            .reserved_ranges()
            .into_iter()
            .filter_map(|range| {
                let window = &self.raw[range.clone()];
                let first = window.iter().position(|b| *b != 0)?;
                Some(DirtyRange {
                    first_nonzero: range.start + first,
                    nonzero_bytes: window.iter().filter(|b| **b != 0).count(),
                    range,
                })
            })
            .collect()
    }

    #[must_use]
    pub fn is_all_zero(&self) -> bool {
        self.raw.iter().all(|b| *b == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_FIELDS: [FieldSpec; 3] = [
        FieldSpec::unsigned("a", 0, 2),
        FieldSpec::signed("b", 2, 2),
        FieldSpec::bytes("c", 8, 4),
    ];
    static TEST_LAYOUT: RecordLayout = RecordLayout {
        name: "test",
        size: 16,
        fields: &TEST_FIELDS,
    };

    #[test]
    fn reserved_ranges_are_gaps() {
        assert_eq!(TEST_LAYOUT.reserved_ranges(), vec![4..8, 12..16]);
    }

    #[test]
    fn decode_reads_fields_by_name() {
        let mut raw = [0_u8; 16];
        raw[0..2].copy_from_slice(&0xEF53_u16.to_le_bytes());
        raw[2..4].copy_from_slice(&(-1_i16).to_le_bytes());
        raw[8..12].copy_from_slice(b"abcd");

        let rec = TEST_LAYOUT.decode(&raw).unwrap();
        assert_eq!(rec.get("a"), Some(FieldValue::Unsigned(0xEF53)));
        assert_eq!(rec.get("b"), Some(FieldValue::Signed(-1)));
        assert_eq!(rec.get_u64("b"), Some(0xFFFF));
        assert_eq!(rec.bytes("c"), Some(&b"abcd"[..]));
        assert_eq!(rec.get("missing"), None);
        assert!(rec.nonzero_reserved().is_empty());
        assert_eq!(rec.fields().count(), 3);
    }

    #[test]
    fn decode_fails_only_on_short_window() {
        let raw = [0_u8; 15];
        assert!(matches!(
            TEST_LAYOUT.decode(&raw),
            Err(ParseError::InsufficientData { needed: 16, .. })
        ));
        let longer = [0_u8; 64];
        assert_eq!(TEST_LAYOUT.decode(&longer).unwrap().raw().len(), 16);
    }

    #[test]
    fn nonzero_reserved_reports_first_dirty_byte() {
        let mut raw = [0_u8; 16];
        raw[6] = 1;
        raw[14] = 2;
        raw[15] = 3;
        let rec = TEST_LAYOUT.decode(&raw).unwrap();
        let dirty = rec.nonzero_reserved();
        assert_eq!(dirty.len(), 2);
        assert_eq!(dirty[0].range, 4..8);
        assert_eq!(dirty[0].first_nonzero, 6);
        assert_eq!(dirty[1].first_nonzero, 14);
        assert_eq!(dirty[1].nonzero_bytes, 2);
    }

    #[test]
    fn typed_accessors_check_width() {
        let raw = [0xFF_u8; 16];
        assert_eq!(TEST_FIELDS[1].read_i16(&raw).unwrap(), -1);
        assert!(TEST_FIELDS[0].read_u32(&raw).is_err());
        assert_eq!(TEST_FIELDS[2].read_array::<4>(&raw).unwrap(), [0xFF; 4]);
    }

    #[test]
    fn field_value_display() {
        assert_eq!(FieldValue::Unsigned(7).to_string(), "7");
        assert_eq!(FieldValue::Signed(-1).to_string(), "-1");
        assert_eq!(FieldValue::Bytes(vec![0x5A, 0x1E]).to_string(), "5a1e");
    }
}
