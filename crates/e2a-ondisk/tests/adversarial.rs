#![forbid(unsafe_code)]

use e2a_ondisk::{
    Bitmap, GROUP_DESC_LAYOUT, GroupDesc, INODE_LAYOUT, Inode, SUPERBLOCK_LAYOUT, Superblock,
    all_layouts, walk_dir_block,
};
use e2a_types::ParseError;
use proptest::prelude::*;
use std::panic::{AssertUnwindSafe, catch_unwind};

fn assert_no_panic<T>(parser_name: &str, parser: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(parser)) {
        Ok(value) => value,
        Err(_) => panic!("parser `{parser_name}` panicked"),
    }
}

#[test]
fn every_layout_fails_only_with_insufficient_data() {
    for layout in all_layouts() {
        for len in [0, 1, layout.size / 2, layout.size - 1] {
            let bytes = vec![0xA5_u8; len];
            let err = layout.decode(&bytes).unwrap_err();
            assert!(
                matches!(err, ParseError::InsufficientData { needed, .. } if needed == layout.size),
                "{}: unexpected error {err:?}",
                layout.name
            );
        }
        let bytes = vec![0xA5_u8; layout.size];
        let record = layout.decode(&bytes).unwrap();
        assert_eq!(record.fields().count(), layout.fields.len());
    }
}

#[test]
fn all_ones_records_flag_every_reserved_range() {
    let bytes = vec![0xFF_u8; 1024];
    let sb = SUPERBLOCK_LAYOUT.decode(&bytes).unwrap();
    assert_eq!(sb.nonzero_reserved().len(), 2);
    let gd = GROUP_DESC_LAYOUT.decode(&bytes).unwrap();
    assert_eq!(gd.nonzero_reserved().len(), 1);
    let inode = INODE_LAYOUT.decode(&bytes).unwrap();
    let dirty: Vec<_> = inode.nonzero_reserved().into_iter().map(|d| d.range).collect();
    assert_eq!(dirty, vec![36..40, 116..128]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn typed_parsers_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..1100)) {
        let sb = assert_no_panic("superblock", || Superblock::parse(&bytes));
        prop_assert_eq!(sb.is_ok(), bytes.len() >= 1024);
        let gd = assert_no_panic("group_desc", || GroupDesc::parse(&bytes));
        prop_assert_eq!(gd.is_ok(), bytes.len() >= 32);
        let inode = assert_no_panic("inode", || Inode::parse(&bytes));
        prop_assert_eq!(inode.is_ok(), bytes.len() >= 128);
        if let Ok(inode) = inode {
            let _ = assert_no_panic("fast_symlink", || inode.fast_symlink_target());
        }
        if let Ok(sb) = sb {
            let _ = assert_no_panic("block_size", || sb.block_size());
        }
    }

    #[test]
    fn dir_walk_and_bitmap_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let walk = assert_no_panic("dir_walk", || walk_dir_block(&bytes));
        prop_assert!(walk.consumed <= bytes.len());
        let bitmap = Bitmap::new(&bytes);
        let limit = bytes.len() * 4;
        prop_assert_eq!(bitmap.iter_set(limit).count(), bitmap.count_set(limit));
        prop_assert_eq!(
            bitmap.count_set(limit) + bitmap.count_set_at_or_after(limit),
            bitmap.count_set(bitmap.len_bits())
        );
    }
}
