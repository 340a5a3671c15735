#![forbid(unsafe_code)]
//! Sparse JSON fixtures, the reference image and mutation helpers.

pub mod mutate;

pub use mutate::ImageMutator;

use anyhow::{Context, Result, bail};
use e2a_block::Image;
use e2a_check::{AuditConfig, Report, audit};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the reference `cs111-base` fixture.
pub const REFERENCE_FIXTURE: &str = "cs111_base.json";

/// Fixed clock for fixture audits, after every timestamp in the reference.
pub const FIXTURE_NOW: u64 = 1_800_000_000;

/// Zero runs shorter than this are folded into the surrounding write.
const MERGE_GAP: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseFixture {
    pub size: usize,
    pub writes: Vec<FixtureWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureWrite {
    pub offset: usize,
    pub hex: String,
}

impl SparseFixture {
    /// Expand into a zero-filled image with every write applied.
    pub fn materialize(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0_u8; self.size];
        for write in &self.writes {
            let payload = hex::decode(&write.hex)
                .with_context(|| format!("invalid hex at offset {}", write.offset))?;

            let end = write
                .offset
                .checked_add(payload.len())
                .context("fixture offset overflow")?;
            if end > bytes.len() {
                bail!(
                    "fixture write out of bounds: offset={} payload={} size={}",
                    write.offset,
                    payload.len(),
                    bytes.len()
                );
            }

            bytes[write.offset..end].copy_from_slice(&payload);
        }
        Ok(bytes)
    }
}

pub fn load_sparse_fixture(path: &Path) -> Result<Vec<u8>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    let fixture: SparseFixture = serde_json::from_str(&text)
        .with_context(|| format!("invalid fixture json {}", path.display()))?;
    fixture
        .materialize()
        .with_context(|| format!("bad fixture {}", path.display()))
}

/// Describe `bytes` as the non-zero runs a fixture needs to rebuild it.
#[must_use]
pub fn extract_sparse_fixture(bytes: &[u8]) -> SparseFixture {
    let mut writes = Vec::new();
    let mut pos = 0;
    while let Some(start) = bytes[pos..].iter().position(|&b| b != 0).map(|i| pos + i) {
        let mut end = start;
        loop {
            let Some(run) = bytes[end..].iter().position(|&b| b == 0) else {
                end = bytes.len();
                break;
            };
            end += run;
            let gap = bytes[end..]
                .iter()
                .position(|&b| b != 0)
                .unwrap_or(bytes.len() - end);
            if gap >= MERGE_GAP || end + gap == bytes.len() {
                break;
            }
            end += gap;
        }
        writes.push(FixtureWrite {
            offset: start,
            hex: hex::encode(&bytes[start..end]),
        });
        pos = end;
    }
    SparseFixture {
        size: bytes.len(),
        writes,
    }
}

/// Path of a fixture under `conformance/fixtures/` at the workspace root.
#[must_use]
pub fn fixture_path(name: &str) -> PathBuf {
    workspace_root()
        .join("conformance")
        .join("fixtures")
        .join(name)
}

fn workspace_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest
        .parent()
        .and_then(Path::parent)
        .map_or_else(|| manifest.to_path_buf(), Path::to_path_buf)
}

pub fn reference_bytes() -> Result<Vec<u8>> {
    load_sparse_fixture(&fixture_path(REFERENCE_FIXTURE))
}

pub fn reference_image() -> Result<Image> {
    reference_bytes().map(Image::from_bytes)
}

/// Audit a fixture with the default configuration at [`FIXTURE_NOW`].
pub fn audit_fixture(path: &Path) -> Result<Report> {
    audit_bytes(load_sparse_fixture(path)?, &AuditConfig::default())
}

pub fn audit_bytes(bytes: Vec<u8>, config: &AuditConfig) -> Result<Report> {
    let image = Image::from_bytes(bytes);
    audit(&image, config, FIXTURE_NOW).context("audit aborted")
}
