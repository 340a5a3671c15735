#![forbid(unsafe_code)]
//! Read-only image accessor.
//!
//! Provides the `ByteDevice` trait, a file-backed implementation, and the
//! in-memory [`Image`] snapshot every audit rule reads from. The snapshot is
//! taken once; the underlying file handle never outlives [`Image::open`].

use e2a_error::{AuditError, Result};
use e2a_types::{BlockNumber, BlockSize};
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use tracing::{debug, warn};

/// Byte-addressed read-only device (pread semantics).
pub trait ByteDevice {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

fn checked_end(offset: u64, len: usize) -> Result<u64> {
    let len = u64::try_from(len).map_err(|_| AuditError::Truncated {
        offset,
        needed: u64::MAX,
        available: 0,
    })?;
    offset.checked_add(len).ok_or(AuditError::Truncated {
        offset,
        needed: len,
        available: 0,
    })
}

/// File-backed byte device opened read-only.
///
/// Uses `std::os::unix::fs::FileExt`, so reads do not share a seek position.
#[derive(Debug)]
pub struct FileByteDevice {
    file: File,
    len: u64,
}

impl FileByteDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = checked_end(offset, buf.len())?;
        if end > self.len {
            return Err(AuditError::Truncated {
                offset,
                needed: end - offset,
                available: self.len.saturating_sub(offset),
            });
        }
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }
}

/// Immutable in-memory snapshot of an image.
///
/// Invariant: `bytes.len()` is the declared image size; `source_len` is the
/// length of whatever the snapshot was taken from (possibly larger).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    bytes: Vec<u8>,
    source_len: u64,
    block_size: BlockSize,
}

impl Image {
    /// Open `path` read-only and snapshot its first `expected_len` bytes.
    ///
    /// The file handle is released before this returns, on success or error.
    pub fn open(path: impl AsRef<Path>, expected_len: u64) -> Result<Self> {
        let path = path.as_ref();
        let dev = FileByteDevice::open(path).inspect_err(|err| {
            warn!(path = %path.display(), %err, "failed to open image");
        })?;
        let image = Self::load(&dev, expected_len)?;
        drop(dev);
        debug!(
            path = %path.display(),
            source_len = image.source_len,
            "image snapshot taken"
        );
        Ok(image)
    }

    /// Snapshot the first `expected_len` bytes of an arbitrary device.
    pub fn load<D: ByteDevice + ?Sized>(dev: &D, expected_len: u64) -> Result<Self> {
        let actual = dev.len_bytes();
        if actual < expected_len {
            return Err(AuditError::ShortImage {
                expected: expected_len,
                actual,
            });
        }
        let len = usize::try_from(expected_len).map_err(|_| AuditError::ShortImage {
            expected: expected_len,
            actual,
        })?;
        let mut bytes = vec![0_u8; len];
        dev.read_exact_at(0, &mut bytes)?;
        Ok(Self {
            bytes,
            source_len: actual,
            block_size: BlockSize::MIN,
        })
    }

    /// Wrap bytes already in memory; the declared size is their length.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let source_len = bytes.len() as u64;
        Self {
            bytes,
            source_len,
            block_size: BlockSize::MIN,
        }
    }

    /// Address blocks at `block_size` from now on.
    #[must_use]
    pub fn with_block_size(mut self, block_size: BlockSize) -> Self {
        self.block_size = block_size;
        self
    }

    #[must_use]
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// Declared image length (bytes held in the snapshot).
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Length of the source file the snapshot was taken from.
    #[must_use]
    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Borrow `len` bytes at `offset`.
    pub fn read_bytes(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let end = checked_end(offset, len)?;
        let available = self.len().saturating_sub(offset);
        if end > self.len() {
            return Err(AuditError::Truncated {
                offset,
                needed: end - offset,
                available,
            });
        }
        // Both bounds are <= bytes.len(), which fits usize.
        let start = usize::try_from(offset).map_err(|_| AuditError::Truncated {
            offset,
            needed: end - offset,
            available,
        })?;
        Ok(&self.bytes[start..start + len])
    }

    /// Borrow one whole block.
    pub fn read_block(&self, block: BlockNumber) -> Result<&[u8]> {
        self.read_bytes(
            self.block_size.block_to_byte(block),
            self.block_size.as_usize(),
        )
    }
}

impl ByteDevice for Image {
    fn len_bytes(&self) -> u64 {
        self.len()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        buf.copy_from_slice(self.read_bytes(offset, buf.len())?);
        Ok(())
    }
}
