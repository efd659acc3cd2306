//! Slide sources: where the files making up a slide come from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;
use crate::io::{LocalFileReader, MemoryReader, RangeReader};

// =============================================================================
// SlideSource Trait
// =============================================================================

/// Trait for creating range readers for the files of one slide.
///
/// A MIRAX slide spans several files (descriptor, index, data files), all
/// addressed by name relative to the slide's data directory.
#[async_trait]
pub trait SlideSource: Send + Sync {
    /// The type of range reader this source creates.
    type Reader: RangeReader + 'static;

    /// Create a range reader for a file of the slide.
    ///
    /// # Arguments
    /// * `name` - File name relative to the slide directory (e.g. `Index.dat`)
    async fn create_reader(&self, name: &str) -> Result<Self::Reader, IoError>;

    /// Identifier of the slide (for logging).
    fn identifier(&self) -> &str;
}

// =============================================================================
// Local Directory Source
// =============================================================================

/// Slide files stored in a local directory.
#[derive(Debug, Clone)]
pub struct LocalSlideSource {
    dir: PathBuf,
    identifier: String,
}

impl LocalSlideSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let identifier = dir.display().to_string();
        Self { dir, identifier }
    }

    /// The slide's data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SlideSource for LocalSlideSource {
    type Reader = LocalFileReader;

    async fn create_reader(&self, name: &str) -> Result<Self::Reader, IoError> {
        LocalFileReader::open(self.dir.join(name)).await
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// In-Memory Source
// =============================================================================

/// Slide files held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemorySlideSource {
    files: HashMap<String, Bytes>,
    identifier: String,
}

impl MemorySlideSource {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            files: HashMap::new(),
            identifier: identifier.into(),
        }
    }

    /// Add a file.
    pub fn with_file(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.files.insert(name.into(), data.into());
        self
    }
}

#[async_trait]
impl SlideSource for MemorySlideSource {
    type Reader = MemoryReader;

    async fn create_reader(&self, name: &str) -> Result<Self::Reader, IoError> {
        let data = self
            .files
            .get(name)
            .ok_or_else(|| IoError::NotFound(format!("{}/{}", self.identifier, name)))?;
        Ok(MemoryReader::new(
            data.clone(),
            format!("{}/{}", self.identifier, name),
        ))
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
