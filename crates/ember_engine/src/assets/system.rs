//! Asset system
//!
//! Owns the built-in handlers and the resource search paths. Resources are
//! looked up relative to each search path in order; the first existing file
//! wins. Kinds other than the built-in ones are served by loaders registered
//! at runtime.

use crate::assets::{
    AssetError, AssetHandler, AssetResult, MeshHandler, Resource, ShaderHandler, SkyboxHandler, TextureHandler,
    CUBE_CONVERTER,
};
use crate::render::Renderer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Loader for an asset kind without a built-in handler
pub type Loader = Box<dyn FnMut(&Resource, &Renderer) -> AssetResult<()>>;

const BUILTIN_KINDS: [&str; 4] = ["shader", "texture", "mesh", "skybox"];

/// One entry of an asset manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Handler name
    pub kind: String,
    /// Resource path relative to the search paths
    pub path: String,
}

/// Asset handlers and resource lookup
pub struct AssetSystem {
    search_paths: Vec<PathBuf>,
    shaders: ShaderHandler,
    textures: TextureHandler,
    meshes: MeshHandler,
    skyboxes: SkyboxHandler,
    loaders: HashMap<String, Loader>,
}

impl Default for AssetSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetSystem {
    /// Asset system resolving paths against the working directory
    pub fn new() -> Self {
        Self::with_search_paths(Vec::<PathBuf>::new())
    }

    /// Asset system with the given search paths, tried in order
    pub fn with_search_paths<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self {
            search_paths: paths.into_iter().map(Into::into).collect(),
            shaders: ShaderHandler::new(),
            textures: TextureHandler::new(),
            meshes: MeshHandler::new(),
            skyboxes: SkyboxHandler::new(),
            loaders: HashMap::new(),
        }
    }

    /// Append a search path
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    /// Search paths in lookup order
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Shader handler
    pub fn shaders(&self) -> &ShaderHandler {
        &self.shaders
    }

    /// Mutable shader handler
    pub fn shaders_mut(&mut self) -> &mut ShaderHandler {
        &mut self.shaders
    }

    /// Texture handler
    pub fn textures(&self) -> &TextureHandler {
        &self.textures
    }

    /// Mutable texture handler
    pub fn textures_mut(&mut self) -> &mut TextureHandler {
        &mut self.textures
    }

    /// Mesh handler
    pub fn meshes(&self) -> &MeshHandler {
        &self.meshes
    }

    /// Mutable mesh handler
    pub fn meshes_mut(&mut self) -> &mut MeshHandler {
        &mut self.meshes
    }

    /// Skybox handler
    pub fn skyboxes(&self) -> &SkyboxHandler {
        &self.skyboxes
    }

    /// Mutable skybox handler
    pub fn skyboxes_mut(&mut self) -> &mut SkyboxHandler {
        &mut self.skyboxes
    }

    /// Register a loader for a new asset kind
    pub fn register_loader(&mut self, kind: &str, loader: Loader) -> AssetResult<()> {
        if BUILTIN_KINDS.contains(&kind) || self.loaders.contains_key(kind) {
            return Err(AssetError::HandlerExists(kind.to_string()));
        }
        self.loaders.insert(kind.to_string(), loader);
        log::debug!("Registered asset loader '{}'", kind);
        Ok(())
    }

    /// Whether assets of the kind can be loaded
    pub fn has_handler(&self, kind: &str) -> bool {
        BUILTIN_KINDS.contains(&kind) || self.loaders.contains_key(kind)
    }

    /// First search path containing `path`
    ///
    /// Absolute paths and paths that exist as given are used directly when
    /// no search path matches.
    pub fn resolve(&self, path: impl AsRef<Path>) -> AssetResult<PathBuf> {
        let path = path.as_ref();
        self.search_paths
            .iter()
            .map(|root| root.join(path))
            .find(|candidate| candidate.is_file())
            .or_else(|| path.is_file().then(|| path.to_path_buf()))
            .ok_or_else(|| AssetError::NotFound {
                handler: "resource",
                name: path.display().to_string(),
            })
    }

    /// Load one resource with the handler for `kind`
    pub fn load(&mut self, kind: &str, path: impl AsRef<Path>, renderer: &Renderer) -> AssetResult<()> {
        if !self.has_handler(kind) {
            return Err(AssetError::UnknownHandler(kind.to_string()));
        }
        let resource = Resource::read(self.resolve(path)?)?;
        log::debug!("Loading {} from {}", kind, resource.path().display());

        match kind {
            "shader" => self.shaders.load(&resource, renderer).map(drop),
            "texture" => self.textures.load(&resource, renderer).map(drop),
            "mesh" => self.meshes.load(&resource, renderer).map(drop),
            "skybox" => {
                if self.shaders.contains(CUBE_CONVERTER) {
                    self.skyboxes.set_converter(self.shaders.get(CUBE_CONVERTER)?);
                }
                self.skyboxes.load(&resource, renderer).map(drop)
            }
            other => match self.loaders.get_mut(other) {
                Some(loader) => loader(&resource, renderer),
                None => Err(AssetError::UnknownHandler(other.to_string())),
            },
        }
    }

    /// Load every entry of a RON manifest, stopping at the first failure
    ///
    /// Returns the number of loaded entries.
    pub fn load_manifest(&mut self, path: impl AsRef<Path>, renderer: &Renderer) -> AssetResult<usize> {
        let manifest = Resource::read(self.resolve(path)?)?;
        let entries: Vec<ManifestEntry> = manifest.metadata()?;
        for entry in &entries {
            self.load(&entry.kind, &entry.path, renderer)?;
        }
        log::info!("Loaded {} assets from manifest '{}'", entries.len(), manifest.name());
        Ok(entries.len())
    }
}

impl fmt::Debug for AssetSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut loaders: Vec<_> = self.loaders.keys().collect();
        loaders.sort_unstable();
        f.debug_struct("AssetSystem")
            .field("search_paths", &self.search_paths)
            .field("shaders", &self.shaders.len())
            .field("textures", &self.textures.len())
            .field("meshes", &self.meshes.len())
            .field("skyboxes", &self.skyboxes.len())
            .field("loaders", &loaders)
            .finish()
    }
}
