//! Shader asset handler
//!
//! A shader resource is a RON metadata document naming the GLSL files that
//! make up the program. The files are read next to the metadata, appended in
//! order and compiled as one source.

use crate::assets::{AssetCache, AssetHandler, AssetResult, Resource};
use crate::render::{Renderer, Shader};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Shader metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderMetadata {
    /// Asset name
    pub name: String,
    /// Whether the program supports the deferred path
    #[serde(default)]
    pub deferred: bool,
    /// Source files relative to the metadata file
    pub files: Vec<String>,
}

/// Compiles and stores shader programs
#[derive(Debug)]
pub struct ShaderHandler {
    cache: AssetCache<Rc<Shader>>,
}

impl Default for ShaderHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderHandler {
    /// Empty handler
    pub fn new() -> Self {
        Self {
            cache: AssetCache::new("shader"),
        }
    }

    /// Whether a shader with the name exists
    pub fn contains(&self, name: &str) -> bool {
        self.cache.contains(name)
    }

    /// Number of shaders
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no shader has been added
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl AssetHandler for ShaderHandler {
    type Asset = Rc<Shader>;

    fn name(&self) -> &'static str {
        "shader"
    }

    fn load(&mut self, resource: &Resource, renderer: &Renderer) -> AssetResult<Self::Asset> {
        let metadata: ShaderMetadata = resource.metadata()?;
        self.cache.ensure_vacant(&metadata.name)?;

        let mut shader = renderer.make_shader(metadata.deferred);
        shader.set_name(metadata.name.as_str());
        for file in &metadata.files {
            let source = resource.sibling(file)?;
            shader.add_data(source.text()?);
        }
        shader.compile()?;

        let shader = Rc::new(shader);
        self.add(&metadata.name, shader.clone())?;
        log::info!("Loaded shader '{}' from {} file(s)", metadata.name, metadata.files.len());
        Ok(shader)
    }

    fn add(&mut self, name: &str, asset: Self::Asset) -> AssetResult<()> {
        self.cache.insert(name, asset)
    }

    fn get(&self, name: &str) -> AssetResult<Self::Asset> {
        self.cache.get(name)
    }
}
