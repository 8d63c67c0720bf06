//! Mesh asset handler
//!
//! Mesh metadata stores indexed geometry: position, normal and uv pools plus
//! triangles whose corners index into them. Loading expands the faces into
//! the flat per-vertex arrays the render mesh uploads.

use crate::assets::{AssetCache, AssetError, AssetHandler, AssetResult, Resource};
use crate::foundation::math::{Vec2, Vec3};
use crate::render::{Allocatable, Mesh, Renderer};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Which attributes the face corners index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FaceType {
    /// Positions only
    #[default]
    V,
    /// Positions and uvs
    VT,
    /// Positions and normals
    VN,
    /// Positions, uvs and normals
    VTN,
}

impl FaceType {
    const fn uses_uvs(self) -> bool {
        matches!(self, Self::VT | Self::VTN)
    }

    const fn uses_normals(self) -> bool {
        matches!(self, Self::VN | Self::VTN)
    }
}

/// One triangle corner: `[position, uv, normal]` indices
pub type Corner = [u32; 3];

/// Mesh metadata document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshMetadata {
    /// Asset name
    pub name: String,
    /// Attributes used by the faces
    #[serde(default)]
    pub face_type: FaceType,
    /// Positions
    #[serde(default)]
    pub v: Vec<[f32; 3]>,
    /// Normals
    #[serde(default)]
    pub n: Vec<[f32; 3]>,
    /// Texture coordinates
    #[serde(default)]
    pub t: Vec<[f32; 2]>,
    /// Triangles
    #[serde(default)]
    pub f: Vec<[Corner; 3]>,
}

/// Flat per-vertex arrays of a mesh
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    /// Positions
    pub vertices: Vec<Vec3>,
    /// Normals, zero when the faces carry none
    pub normals: Vec<Vec3>,
    /// Texture coordinates, zero when the faces carry none
    pub uvs: Vec<Vec2>,
}

impl MeshMetadata {
    /// Expand the faces into flat arrays
    pub fn expand(&self) -> AssetResult<MeshData> {
        if self.f.is_empty() {
            return Err(self.invalid("mesh has no faces".to_string()));
        }

        let count = self.f.len() * 3;
        let mut data = MeshData {
            vertices: Vec::with_capacity(count),
            normals: Vec::with_capacity(count),
            uvs: Vec::with_capacity(count),
        };

        for corner in self.f.iter().flatten() {
            let [v, t, n] = *corner;
            data.vertices.push(Vec3::from(*self.lookup("v", &self.v, v)?));
            data.uvs.push(if self.face_type.uses_uvs() {
                Vec2::from(*self.lookup("t", &self.t, t)?)
            } else {
                Vec2::zeros()
            });
            data.normals.push(if self.face_type.uses_normals() {
                Vec3::from(*self.lookup("n", &self.n, n)?)
            } else {
                Vec3::zeros()
            });
        }
        Ok(data)
    }

    fn lookup<'a, T>(&self, pool: &str, items: &'a [T], index: u32) -> AssetResult<&'a T> {
        usize::try_from(index)
            .ok()
            .and_then(|index| items.get(index))
            .ok_or_else(|| self.invalid(format!("{} index {} out of range ({} entries)", pool, index, items.len())))
    }

    fn invalid(&self, reason: String) -> AssetError {
        AssetError::Metadata {
            name: self.name.clone(),
            reason,
        }
    }
}

/// Builds and stores meshes
#[derive(Debug)]
pub struct MeshHandler {
    cache: AssetCache<Rc<Mesh>>,
}

impl Default for MeshHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshHandler {
    /// Empty handler
    pub fn new() -> Self {
        Self {
            cache: AssetCache::new("mesh"),
        }
    }

    /// Whether a mesh with the name exists
    pub fn contains(&self, name: &str) -> bool {
        self.cache.contains(name)
    }

    /// Number of meshes
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no mesh has been added
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl AssetHandler for MeshHandler {
    type Asset = Rc<Mesh>;

    fn name(&self) -> &'static str {
        "mesh"
    }

    fn load(&mut self, resource: &Resource, renderer: &Renderer) -> AssetResult<Self::Asset> {
        let metadata: MeshMetadata = resource.metadata()?;
        self.cache.ensure_vacant(&metadata.name)?;
        let data = metadata.expand()?;

        let mut mesh = renderer.make_mesh();
        mesh.set_name(metadata.name.as_str());
        mesh.set_data(data.vertices, data.normals, data.uvs);
        mesh.alloc()?;

        let mesh = Rc::new(mesh);
        self.add(&metadata.name, mesh.clone())?;
        log::info!("Loaded mesh '{}' with {} faces", metadata.name, metadata.f.len());
        Ok(mesh)
    }

    fn add(&mut self, name: &str, asset: Self::Asset) -> AssetResult<()> {
        self.cache.insert(name, asset)
    }

    fn get(&self, name: &str) -> AssetResult<Self::Asset> {
        self.cache.get(name)
    }
}
