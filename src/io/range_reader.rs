use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;

use crate::error::IoError;

/// Trait for reading byte ranges from a file-like resource.
///
/// The TIFF parser works exclusively through this trait so it can be driven
/// from disk in production and from memory in tests.
pub trait RangeReader {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Get the total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Get a unique identifier for this resource (for logging and cache keys).
    fn identifier(&self) -> &str;

    /// Check a range against the resource size.
    fn check_range(&self, offset: u64, len: usize) -> Result<(), IoError> {
        let size = self.size();
        match offset.checked_add(len as u64) {
            Some(end) if end <= size => Ok(()),
            _ => Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size,
            }),
        }
    }
}

// =============================================================================
// FileRangeReader
// =============================================================================

/// Range reader over a local file.
///
/// The file handle lives exactly as long as the reader; dropping the reader
/// closes the file.
#[derive(Debug)]
pub struct FileRangeReader {
    file: File,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open `path` for range reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IoError::from_io(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| IoError::from_io(path, e))?
            .len();

        Ok(Self {
            file,
            size,
            identifier: path.display().to_string(),
        })
    }
}

impl RangeReader for FileRangeReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.check_range(offset, len)?;

        let mut buf = vec![0u8; len];
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(&mut buf))
            .map_err(|e| IoError::from_io(&self.identifier, e))?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// MemoryRangeReader
// =============================================================================

/// Range reader over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct MemoryRangeReader {
    data: Bytes,
    identifier: String,
}

impl MemoryRangeReader {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }
}

impl RangeReader for MemoryRangeReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.check_range(offset, len)?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
