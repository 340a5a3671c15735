//! Reference image and mutation helpers for unit tests.

use crate::config::AuditConfig;
use crate::finding::Finding;
use crate::{audit, report::Report};
use e2a_block::Image;
use serde::Deserialize;

pub const NOW: u64 = 1_800_000_000;

const REFERENCE_FIXTURE: &str =
    include_str!("../../../conformance/fixtures/cs111_base.json");

#[derive(Deserialize)]
struct Fixture {
    size: usize,
    writes: Vec<Write>,
}

#[derive(Deserialize)]
struct Write {
    offset: usize,
    hex: String,
}

pub fn reference_bytes() -> Vec<u8> {
    let fixture: Fixture = serde_json::from_str(REFERENCE_FIXTURE).unwrap();
    let mut bytes = vec![0_u8; fixture.size];
    for write in fixture.writes {
        let data = hex::decode(&write.hex).unwrap();
        bytes[write.offset..write.offset + data.len()].copy_from_slice(&data);
    }
    bytes
}

pub fn reference_image() -> Image {
    Image::from_bytes(reference_bytes())
}

pub fn put_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn audit_bytes_with(bytes: Vec<u8>, config: &AuditConfig) -> Report {
    audit(&Image::from_bytes(bytes), config, NOW).unwrap()
}

pub fn audit_bytes(bytes: Vec<u8>) -> Report {
    audit_bytes_with(bytes, &AuditConfig::default())
}

/// Findings for `rule`, in report order.
pub fn fired<'r>(report: &'r Report, rule: &str) -> Vec<&'r Finding> {
    report.findings.iter().filter(|f| f.rule == rule).collect()
}
