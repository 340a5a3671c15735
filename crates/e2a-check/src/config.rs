//! Audit configuration.
//!
//! Every key is optional; defaults describe the reference `cs111-base`
//! image. Configuration is loaded from JSON and validated before a pass.

use crate::catalog;
use crate::finding::Severity;
use e2a_error::{AuditError, Result};
use e2a_types::{FileKind, S_IPERM};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// UUID written by the reference image builder.
pub const REFERENCE_UUID: &str = "5a1eab1e-1337-1337-1337-c0ffeec0ffee";

/// Owner of the files the reference builder creates outside `lost+found`.
const USER_ID: u16 = 1000;

/// Sentinel accepted for `uuid` to skip the UUID check.
pub const UUID_IGNORE: &str = "ignore";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Declared image length in bytes.
    pub image_size: u64,
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub free_blocks: u32,
    pub free_inodes: u32,
    pub volume_name: String,
    /// 32 hex digits (dashes allowed) or `"ignore"`.
    pub uuid: String,
    pub max_mount_count: i16,
    pub check_interval: u32,
    /// `s_errors`: 1 continue, 2 remount read-only, 3 panic.
    pub errors_policy: u16,
    pub timestamp_skew_secs: u64,
    pub permissions: Permissions,
    pub topology: Vec<TopologyEntry>,
    /// Report paths not listed in `topology`.
    pub strict_topology: bool,
    pub severity_overrides: BTreeMap<String, Severity>,
    /// Run `e2fsck -f -n` after the built-in rules.
    pub oracle: bool,
}

/// Expected permission bits per entity kind. Accepts numbers or octal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Permissions {
    #[serde(deserialize_with = "de_mode")]
    pub directory: u16,
    #[serde(deserialize_with = "de_mode")]
    pub regular: u16,
    #[serde(deserialize_with = "de_mode")]
    pub symlink: u16,
}

impl Permissions {
    #[must_use]
    pub fn for_kind(&self, kind: FileKind) -> Option<u16> {
        match kind {
            FileKind::Directory => Some(self.directory),
            FileKind::Regular => Some(self.regular),
            FileKind::Symlink => Some(self.symlink),
            _ => None,
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            directory: 0o755,
            regular: 0o644,
            symlink: 0o644,
        }
    }
}

fn de_mode<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u16),
        Octal(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Octal(s) => {
            let digits = s.trim_start_matches("0o");
            u16::from_str_radix(digits, 8)
                .map_err(|_| serde::de::Error::custom(format!("invalid octal mode {s:?}")))
        }
    }
}

/// A path the image must contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyEntry {
    /// Absolute path, `/` for the root.
    pub path: String,
    pub inode: u32,
    pub kind: FileKind,
    /// Exact file content (regular files).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Exact link target (symlinks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Owning user id; unchecked when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u16>,
    /// Owning group id; unchecked when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u16>,
}

impl TopologyEntry {
    fn new(path: &str, inode: u32, kind: FileKind) -> Self {
        Self {
            path: path.to_owned(),
            inode,
            kind,
            content: None,
            target: None,
            uid: None,
            gid: None,
        }
    }

    fn owned_by(self, uid: u16, gid: u16) -> Self {
        Self {
            uid: Some(uid),
            gid: Some(gid),
            ..self
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            image_size: 1_048_576,
            inodes_count: 128,
            blocks_count: 1024,
            free_blocks: 1000,
            free_inodes: 115,
            volume_name: "cs111-base".to_owned(),
            uuid: REFERENCE_UUID.to_owned(),
            max_mount_count: -1,
            check_interval: 1,
            errors_policy: 1,
            timestamp_skew_secs: 300,
            permissions: Permissions::default(),
            topology: vec![
                TopologyEntry::new("/", 2, FileKind::Directory).owned_by(0, 0),
                TopologyEntry::new("/lost+found", 11, FileKind::Directory).owned_by(0, 0),
                TopologyEntry {
                    content: Some("Hello world\n".to_owned()),
                    ..TopologyEntry::new("/hello-world", 12, FileKind::Regular)
                }
                .owned_by(USER_ID, USER_ID),
                TopologyEntry {
                    target: Some("hello-world".to_owned()),
                    ..TopologyEntry::new("/hello", 13, FileKind::Symlink)
                }
                .owned_by(USER_ID, USER_ID),
            ],
            strict_topology: true,
            severity_overrides: BTreeMap::new(),
            oracle: false,
        }
    }
}

impl AuditConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|err| AuditError::Config(format!("invalid config json: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text).map_err(|err| match err {
            AuditError::Config(msg) => AuditError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Expected UUID bytes, or `None` when the check is disabled.
    pub fn expected_uuid(&self) -> Result<Option<[u8; 16]>> {
        if self.uuid.eq_ignore_ascii_case(UUID_IGNORE) {
            return Ok(None);
        }
        let digits: String = self.uuid.chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(&digits)
            .map_err(|err| AuditError::Config(format!("uuid {:?}: {err}", self.uuid)))?;
        let bytes: [u8; 16] = bytes.try_into().map_err(|_| {
            AuditError::Config(format!("uuid {:?}: expected 16 bytes", self.uuid))
        })?;
        Ok(Some(bytes))
    }

    pub fn validate(&self) -> Result<()> {
        self.expected_uuid()?;

        if let Some(id) = self
            .severity_overrides
            .keys()
            .find(|id| catalog::lookup(id).is_none())
        {
            return Err(AuditError::Config(format!(
                "severity override names unknown rule {id:?}"
            )));
        }

        for (label, mode) in [
            ("directory", self.permissions.directory),
            ("regular", self.permissions.regular),
            ("symlink", self.permissions.symlink),
        ] {
            if mode & !S_IPERM != 0 {
                return Err(AuditError::Config(format!(
                    "permissions.{label} {mode:#o} has bits outside 0o7777"
                )));
            }
        }

        if self.volume_name.len() > 16 {
            return Err(AuditError::Config(format!(
                "volume_name {:?} is longer than 16 bytes",
                self.volume_name
            )));
        }

        for entry in &self.topology {
            if !entry.path.starts_with('/') {
                return Err(AuditError::Config(format!(
                    "topology path {:?} is not absolute",
                    entry.path
                )));
            }
            if entry.inode == 0 || entry.inode > self.inodes_count {
                return Err(AuditError::Config(format!(
                    "topology path {:?} names inode {} outside 1..={}",
                    entry.path, entry.inode, self.inodes_count
                )));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn topology_entry(&self, path: &str) -> Option<&TopologyEntry> {
        self.topology.iter().find(|entry| entry.path == path)
    }
}
