//! Image sources: the byte-stream seam the engine consumes.
//!
//! An [`ImageSource`] supplies a stable cache key and a freshly opened,
//! seekable byte stream on demand. The engine holds sources by reference
//! only and may open many streams over its lifetime (each tile decode can
//! open its own), so implementations must be cheaply reopenable.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::SourceError;

/// A readable, seekable byte stream.
pub trait ImageStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> ImageStream for T {}

/// A reopenable byte-stream factory for one image.
///
/// Implementations must be thread-safe: several decode workers may call
/// [`ImageSource::open`] concurrently.
pub trait ImageSource: Send + Sync {
    /// A stable identifier for this image, used in cache keys and logs.
    fn key(&self) -> &str;

    /// Open a fresh stream over the image bytes.
    fn open(&self) -> Result<Box<dyn ImageStream>, SourceError>;
}

// =============================================================================
// FileImageSource
// =============================================================================

/// An image source backed by a file on disk.
pub struct FileImageSource {
    path: PathBuf,
    key: String,
}

impl FileImageSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let key = format!("file://{}", path.display());
        Self { path, key }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for FileImageSource {
    fn key(&self) -> &str {
        &self.key
    }

    fn open(&self) -> Result<Box<dyn ImageStream>, SourceError> {
        let file = File::open(&self.path).map_err(|e| SourceError::Open {
            key: self.key.clone(),
            message: e.to_string(),
        })?;
        Ok(Box::new(BufReader::new(file)))
    }
}

// =============================================================================
// BytesImageSource
// =============================================================================

/// An image source over an in-memory byte buffer.
///
/// Opens are zero-copy (`Bytes` clone). This is also the source used by
/// the test suites.
pub struct BytesImageSource {
    data: Bytes,
    key: String,
}

impl BytesImageSource {
    pub fn new(key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            key: key.into(),
        }
    }
}

impl ImageSource for BytesImageSource {
    fn key(&self) -> &str {
        &self.key
    }

    fn open(&self) -> Result<Box<dyn ImageStream>, SourceError> {
        Ok(Box::new(Cursor::new(self.data.clone())))
    }
}

// =============================================================================
// Tests
// =============================================================================
