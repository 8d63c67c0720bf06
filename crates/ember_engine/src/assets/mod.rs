//! Asset handlers
//!
//! Each handler decodes one kind of resource into a render object and keeps
//! it in a name-keyed [`AssetCache`]. The render core only ever looks assets
//! up by name; the [`AssetSystem`] owns the handlers and resolves resource
//! paths against its search paths.

pub mod mesh;
pub mod resource;
pub mod shader;
pub mod skybox;
pub mod system;
pub mod texture;

pub use mesh::{FaceType, MeshHandler, MeshMetadata};
pub use resource::Resource;
pub use shader::{ShaderHandler, ShaderMetadata};
pub use skybox::{SkyboxHandler, SkyboxMetadata, CUBE_CONVERTER};
pub use system::{AssetSystem, Loader, ManifestEntry};
pub use texture::{decode_image, TextureHandler};

use crate::render::{RenderError, Renderer};
use std::collections::HashMap;
use thiserror::Error;

/// Asset errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// The name is already taken in the handler
    #[error("{handler} asset '{name}' already exists")]
    Exists {
        /// Handler name
        handler: &'static str,
        /// Asset name
        name: String,
    },

    /// No asset with the name
    #[error("{handler} asset '{name}' not found")]
    NotFound {
        /// Handler name
        handler: &'static str,
        /// Asset name
        name: String,
    },

    /// The asset is not of a kind the handler accepts
    #[error("{handler} asset '{name}' has the wrong type: {reason}")]
    InvalidType {
        /// Handler name
        handler: &'static str,
        /// Asset name
        name: String,
        /// What was wrong
        reason: String,
    },

    /// Reading a resource failed
    #[error("failed to read '{path}': {source}")]
    Io {
        /// Resource path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Resource content could not be decoded
    #[error("failed to decode '{name}': {reason}")]
    Decode {
        /// Resource name
        name: String,
        /// Decoder message
        reason: String,
    },

    /// Metadata document is malformed or inconsistent
    #[error("invalid metadata in '{name}': {reason}")]
    Metadata {
        /// Resource name
        name: String,
        /// What was wrong
        reason: String,
    },

    /// Creating the render object failed
    #[error(transparent)]
    Render(#[from] RenderError),

    /// A loader is already registered for the kind
    #[error("asset handler '{0}' already registered")]
    HandlerExists(String),

    /// No handler for the kind
    #[error("no asset handler for '{0}'")]
    UnknownHandler(String),
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// Named asset provider
pub trait AssetHandler {
    /// Shared handle handed out by [`AssetHandler::get`]
    type Asset: Clone;

    /// Handler name, also the asset kind in manifests
    fn name(&self) -> &'static str;

    /// Decode a resource, add the result and return it
    fn load(&mut self, resource: &Resource, renderer: &Renderer) -> AssetResult<Self::Asset>;

    /// Add an asset under a name; fails if the name is taken
    fn add(&mut self, name: &str, asset: Self::Asset) -> AssetResult<()>;

    /// Look up an asset by name
    fn get(&self, name: &str) -> AssetResult<Self::Asset>;
}

/// Name-keyed asset storage of one handler
#[derive(Debug)]
pub struct AssetCache<T> {
    handler: &'static str,
    items: HashMap<String, T>,
}

impl<T: Clone> AssetCache<T> {
    /// Empty cache reporting errors as `handler`
    pub fn new(handler: &'static str) -> Self {
        Self {
            handler,
            items: HashMap::new(),
        }
    }

    /// Fail with [`AssetError::Exists`] if the name is taken
    pub fn ensure_vacant(&self, name: &str) -> AssetResult<()> {
        if self.items.contains_key(name) {
            return Err(AssetError::Exists {
                handler: self.handler,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Store an asset; an existing asset is never replaced
    pub fn insert(&mut self, name: &str, item: T) -> AssetResult<()> {
        self.ensure_vacant(name)?;
        self.items.insert(name.to_string(), item);
        log::debug!("Added {} asset '{}'", self.handler, name);
        Ok(())
    }

    /// Shared handle of an asset
    pub fn get(&self, name: &str) -> AssetResult<T> {
        self.items.get(name).cloned().ok_or_else(|| AssetError::NotFound {
            handler: self.handler,
            name: name.to_string(),
        })
    }

    /// Whether the name is taken
    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Number of assets
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Asset names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.items.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Fresh scratch directory for file based tests
#[cfg(test)]
pub(crate) fn fixture_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("ember_engine_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_rejects_duplicates() {
        let mut cache = AssetCache::new("texture");
        cache.insert("bricks", 1).unwrap();
        assert!(matches!(
            cache.insert("bricks", 2),
            Err(AssetError::Exists { handler: "texture", .. })
        ));
        assert_eq!(cache.get("bricks").unwrap(), 1);
    }

    #[test]
    fn test_cache_not_found() {
        let cache: AssetCache<u32> = AssetCache::new("mesh");
        let err = cache.get("cube").unwrap_err();
        assert_eq!(err.to_string(), "mesh asset 'cube' not found");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_names_sorted() {
        let mut cache = AssetCache::new("shader");
        cache.insert("b", ()).unwrap();
        cache.insert("a", ()).unwrap();
        assert_eq!(cache.names(), ["a", "b"]);
        assert_eq!(cache.len(), 2);
    }
}
