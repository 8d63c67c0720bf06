//! Raw resources read from disk

use crate::assets::{AssetError, AssetResult};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// File contents together with the path they were read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl Resource {
    /// Resource from bytes already in memory
    pub fn new(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    /// Read a resource from disk
    pub fn read(path: impl AsRef<Path>) -> AssetResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        log::trace!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(Self::new(path, bytes))
    }

    /// Path the resource was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw contents
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// File stem, used as the default asset name
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Contents as UTF-8 text
    pub fn text(&self) -> AssetResult<&str> {
        std::str::from_utf8(&self.bytes).map_err(|err| AssetError::Decode {
            name: self.name(),
            reason: err.to_string(),
        })
    }

    /// Contents parsed as a RON metadata document
    pub fn metadata<T: DeserializeOwned>(&self) -> AssetResult<T> {
        ron::from_str(self.text()?).map_err(|err| AssetError::Metadata {
            name: self.name(),
            reason: err.to_string(),
        })
    }

    /// Read a file next to this resource
    pub fn sibling(&self, file: &str) -> AssetResult<Self> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        Self::read(dir.join(file))
    }
}
