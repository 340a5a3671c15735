//! `image.*` and `sb.*` rules.

use super::{describe_dirty, sb_location};
use crate::catalog;
use crate::context::AuditContext;
use crate::finding::{FindingSink, Location};
use e2a_ondisk::format_uuid;
use e2a_ondisk::records::{
    SB_BLOCKS_COUNT, SB_BLOCKS_PER_GROUP, SB_CHECKINTERVAL, SB_ERRORS, SB_FIRST_DATA_BLOCK,
    SB_FRAGS_PER_GROUP, SB_INODES_COUNT, SB_INODES_PER_GROUP, SB_LOG_BLOCK_SIZE,
    SB_LOG_FRAG_SIZE, SB_MAGIC, SB_MAX_MNT_COUNT, SB_R_BLOCKS_COUNT, SB_REV_LEVEL, SB_STATE,
    SB_UUID, SB_VOLUME_NAME,
};
use e2a_types::{EXT2_SUPER_MAGIC, EXT2_SUPERBLOCK_OFFSET, first_nonzero};
use tracing::debug;

/// `s_state` of a cleanly unmounted filesystem.
const STATE_CLEAN: u16 = 1;

pub fn check(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let before = sink.len();
    check_image_size(ctx, sink);
    check_fields(ctx, sink);
    check_geometry(ctx, sink);
    check_identity(ctx, sink);
    check_reserved(ctx, sink);
    debug!(findings = sink.len() - before, "superblock rules done");
}

fn check_image_size(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let config = ctx.config;
    sink.expect_eq(
        &catalog::IMAGE_SIZE,
        || Location::new(0, "image length"),
        config.image_size,
        ctx.image.source_len(),
    );
    let described = u64::from(ctx.sb.blocks_count) * u64::from(ctx.block_size.get());
    if described != config.image_size {
        sink.report(
            &catalog::IMAGE_SIZE,
            sb_location(&SB_BLOCKS_COUNT),
            format!("blocks covering {} bytes", config.image_size),
            format!(
                "{} blocks of {} = {described} bytes",
                ctx.sb.blocks_count, ctx.block_size
            ),
        );
    }
}

fn check_fields(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let sb = &ctx.sb;
    let config = ctx.config;

    if sb.magic != EXT2_SUPER_MAGIC {
        sink.report(
            &catalog::SB_MAGIC,
            sb_location(&SB_MAGIC),
            format!("{EXT2_SUPER_MAGIC:#06x}"),
            format!("{:#06x}", sb.magic),
        );
    }
    sink.expect_eq(
        &catalog::SB_INODES_COUNT,
        || sb_location(&SB_INODES_COUNT),
        config.inodes_count,
        sb.inodes_count,
    );
    sink.expect_eq(
        &catalog::SB_BLOCKS_COUNT,
        || sb_location(&SB_BLOCKS_COUNT),
        config.blocks_count,
        sb.blocks_count,
    );
    sink.expect_eq(
        &catalog::SB_R_BLOCKS_COUNT,
        || sb_location(&SB_R_BLOCKS_COUNT),
        0,
        sb.r_blocks_count,
    );
    sink.expect_eq(
        &catalog::SB_FIRST_DATA_BLOCK,
        || sb_location(&SB_FIRST_DATA_BLOCK),
        ctx.locations.superblock.0,
        sb.first_data_block,
    );
    sink.expect_eq(
        &catalog::SB_LOG_BLOCK_SIZE,
        || sb_location(&SB_LOG_BLOCK_SIZE),
        0,
        sb.log_block_size,
    );
    sink.expect_eq(
        &catalog::SB_LOG_FRAG_SIZE,
        || sb_location(&SB_LOG_FRAG_SIZE),
        sb.log_block_size,
        sb.log_frag_size,
    );
    sink.expect_eq(
        &catalog::SB_MAX_MNT_COUNT,
        || sb_location(&SB_MAX_MNT_COUNT),
        config.max_mount_count,
        sb.max_mnt_count,
    );
    sink.expect_eq(
        &catalog::SB_CHECKINTERVAL,
        || sb_location(&SB_CHECKINTERVAL),
        config.check_interval,
        sb.checkinterval,
    );
    sink.expect_eq(
        &catalog::SB_STATE,
        || sb_location(&SB_STATE),
        STATE_CLEAN,
        sb.state,
    );
    sink.expect_eq(
        &catalog::SB_ERRORS,
        || sb_location(&SB_ERRORS),
        config.errors_policy,
        sb.errors,
    );
    sink.expect_eq(
        &catalog::SB_REV_LEVEL,
        || sb_location(&SB_REV_LEVEL),
        0,
        sb.rev_level,
    );
}

/// One group must span every block after `first_data_block`.
fn check_geometry(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let sb = &ctx.sb;
    let span = sb.blocks_count.saturating_sub(sb.first_data_block);
    if sb.blocks_per_group < span {
        sink.report(
            &catalog::SB_GROUP_GEOMETRY,
            sb_location(&SB_BLOCKS_PER_GROUP),
            format!(">= {span} (single group)"),
            sb.blocks_per_group,
        );
    }
    sink.expect_eq(
        &catalog::SB_GROUP_GEOMETRY,
        || sb_location(&SB_FRAGS_PER_GROUP),
        sb.blocks_per_group,
        sb.frags_per_group,
    );
    sink.expect_eq(
        &catalog::SB_GROUP_GEOMETRY,
        || sb_location(&SB_INODES_PER_GROUP),
        sb.inodes_count,
        sb.inodes_per_group,
    );
}

fn check_identity(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let sb = &ctx.sb;
    let config = ctx.config;

    let mut expected_name = [0_u8; 16];
    let name = config.volume_name.as_bytes();
    expected_name[..name.len()].copy_from_slice(name);
    if sb.volume_name != expected_name {
        sink.report(
            &catalog::SB_VOLUME_NAME,
            sb_location(&SB_VOLUME_NAME),
            format!("{:?}, NUL padded", config.volume_name),
            format!("{:?} ({})", sb.volume_name_str(), hex::encode(sb.volume_name)),
        );
    }

    // Validated before the pass; an unparsable value here means "ignore".
    if let Ok(Some(uuid)) = config.expected_uuid() {
        if sb.uuid != uuid {
            sink.report(
                &catalog::SB_UUID,
                sb_location(&SB_UUID),
                format_uuid(&uuid),
                sb.uuid_string(),
            );
        }
    }
}

fn check_reserved(ctx: &AuditContext<'_>, sink: &mut FindingSink<'_>) {
    let raw = ctx.superblock.raw();
    for dirty in ctx.superblock.nonzero_reserved() {
        let window = &raw[dirty.range.clone()];
        let first = first_nonzero(window).unwrap_or(0);
        sink.report(
            &catalog::SB_RESERVED_ZERO,
            Location::new(
                (EXT2_SUPERBLOCK_OFFSET + dirty.range.start + first) as u64,
                format!("superblock[{}..{}]", dirty.range.start, dirty.range.end),
            ),
            "all zero",
            describe_dirty(window),
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::config::AuditConfig;
    use crate::testutil::{audit_bytes, audit_bytes_with, fired, put_u16, put_u32, reference_bytes};

    const SB: usize = 1024;

    #[test]
    fn reference_superblock_is_clean() {
        let report = audit_bytes(reference_bytes());
        for finding in &report.findings {
            assert!(
                !finding.rule.starts_with("sb.") && finding.rule != "image.size",
                "{finding}"
            );
        }
    }

    #[test]
    fn bad_magic_points_at_byte_1080() {
        let mut bytes = reference_bytes();
        put_u16(&mut bytes, SB + 56, 0x1234);
        let report = audit_bytes(bytes);
        let magic = fired(&report, "sb.magic");
        assert_eq!(magic.len(), 1);
        assert_eq!(magic[0].location.offset, 1080);
        assert_eq!(magic[0].expected, "0xef53");
        assert_eq!(magic[0].actual, "0x1234");
    }

    #[test]
    fn field_mismatches_are_reported_per_field() {
        let mut bytes = reference_bytes();
        put_u32(&mut bytes, SB + 8, 5);
        put_u16(&mut bytes, SB + 58, 2);
        put_u32(&mut bytes, SB + 76, 1);
        put_u32(&mut bytes, SB + 40, 64);
        let report = audit_bytes(bytes);
        assert_eq!(fired(&report, "sb.r_blocks_count").len(), 1);
        assert_eq!(fired(&report, "sb.state").len(), 1);
        assert_eq!(fired(&report, "sb.rev_level").len(), 1);
        let geometry = fired(&report, "sb.group_geometry");
        assert_eq!(geometry.len(), 1);
        assert_eq!(geometry[0].location.what, "superblock.inodes_per_group");
    }

    #[test]
    fn volume_name_padding_must_be_zero() {
        let mut bytes = reference_bytes();
        bytes[SB + 120 + 14] = b'x';
        let report = audit_bytes(bytes);
        assert_eq!(fired(&report, "sb.volume_name").len(), 1);
    }

    #[test]
    fn uuid_mismatch_unless_ignored() {
        let mut bytes = reference_bytes();
        bytes[SB + 104] ^= 0xFF;
        let report = audit_bytes(bytes.clone());
        let uuid = fired(&report, "sb.uuid");
        assert_eq!(uuid.len(), 1);
        assert_eq!(uuid[0].expected, "5a1eab1e-1337-1337-1337-c0ffeec0ffee");

        let config = AuditConfig {
            uuid: "ignore".into(),
            ..AuditConfig::default()
        };
        assert!(fired(&audit_bytes_with(bytes, &config), "sb.uuid").is_empty());
    }

    #[test]
    fn dirty_reserved_ranges_are_warnings() {
        let mut bytes = reference_bytes();
        bytes[SB + 90] = 1;
        bytes[SB + 1000] = 7;
        let report = audit_bytes(bytes);
        let dirty = fired(&report, "sb.reserved_zero");
        assert_eq!(dirty.len(), 2);
        assert_eq!(dirty[0].location.offset, (SB + 90) as u64);
        assert_eq!(dirty[0].location.what, "superblock[84..104]");
        assert_eq!(dirty[1].location.offset, (SB + 1000) as u64);
        assert!(report.verdict.is_pass());
    }

    #[test]
    fn blocks_count_must_cover_image() {
        let mut bytes = reference_bytes();
        put_u32(&mut bytes, SB + 4, 512);
        let report = audit_bytes(bytes);
        assert_eq!(fired(&report, "image.size").len(), 1);
        assert_eq!(fired(&report, "sb.blocks_count").len(), 1);
    }
}
