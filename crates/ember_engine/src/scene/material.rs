//! Materials
//!
//! A material is a shader plus up to [`MAX_TEXTURES`] texture slots and a
//! table of uniform values. Binding always applies the shader first, then
//! every populated texture slot on the texture unit of the same index, then
//! the uniforms, so sampler uniforms can refer to units already bound.

use crate::assets::{AssetError, AssetHandler, AssetSystem};
use crate::instance::{InstanceId, ObjectKind};
use crate::render::context::RenderContext;
use crate::render::shader::Shader;
use crate::render::texture::SharedTexture;
use crate::render::uniform::{UniformError, UniformValue};
use crate::render::{Allocatable, Bindable, Renderer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Number of texture slots
pub const MAX_TEXTURES: usize = 16;

/// Conventional texture slot assignments
pub mod slots {
    /// First G-buffer color attachment
    pub const ATTACHMENT0: u32 = 0;
    /// Second G-buffer color attachment
    pub const ATTACHMENT1: u32 = 1;
    /// Depth attachment
    pub const DEPTH: u32 = 2;
    /// Skybox radiance
    pub const ENVIRONMENT: u32 = 3;
    /// Skybox irradiance
    pub const IRRADIANCE: u32 = 4;
    /// Base color
    pub const ALBEDO: u32 = 5;
    /// Normal map
    pub const NORMAL: u32 = 6;
    /// Metallic and roughness
    pub const METALLIC: u32 = 7;
}

/// Material errors
#[derive(Error, Debug)]
pub enum MaterialError {
    /// Slot index at or beyond [`MAX_TEXTURES`]
    #[error("texture index {0} out of range")]
    TextureIndexOutOfRange(usize),

    /// Slot key is not a decimal index
    #[error("invalid texture index '{0}'")]
    InvalidTextureIndex(String),

    /// Malformed uniform encoding
    #[error(transparent)]
    Uniform(#[from] UniformError),

    /// Shader or texture lookup failed
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Malformed description document
    #[error("material description: {0}")]
    Format(String),
}

/// Result type for material operations
pub type MaterialResult<T> = Result<T, MaterialError>;

/// Serialized form of a material
///
/// ```ron
/// (
///     shader: "pbr",
///     textures: { "5": "bricks" },
///     shader_properties: { "tint": "vec3:1.000000,0.500000,0.250000" },
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialDescription {
    /// Material name
    #[serde(default)]
    pub name: String,
    /// Shader asset name
    pub shader: String,
    /// Decimal slot index to texture asset name
    #[serde(default)]
    pub textures: BTreeMap<String, String>,
    /// Uniform name to tagged uniform value
    #[serde(default)]
    pub shader_properties: BTreeMap<String, UniformValue>,
}

impl MaterialDescription {
    /// Parse a RON description
    pub fn from_ron(text: &str) -> MaterialResult<Self> {
        ron::from_str(text).map_err(|err| MaterialError::Format(err.to_string()))
    }
}

/// Shader, textures and uniforms bound together for a draw call
pub struct Material {
    context: Rc<RenderContext>,
    id: InstanceId,
    name: String,
    shader: Option<Rc<Shader>>,
    textures: [Option<SharedTexture>; MAX_TEXTURES],
    uniforms: BTreeMap<String, UniformValue>,
}

impl Material {
    /// Create an empty material
    pub fn new(renderer: &Renderer) -> Self {
        let context = renderer.context().clone();
        let id = context.issue_instance(ObjectKind::Material, "");
        Self {
            context,
            id,
            name: String::new(),
            shader: None,
            textures: Default::default(),
            uniforms: BTreeMap::new(),
        }
    }

    /// Build a material, resolving its shader and textures through the asset handlers
    pub fn build(description: &MaterialDescription, renderer: &Renderer, assets: &AssetSystem) -> MaterialResult<Self> {
        let mut material = Self::new(renderer);
        material.set_name(description.name.as_str());
        material.set_shader(Some(assets.shaders().get(&description.shader)?));

        for (key, texture) in &description.textures {
            let slot = key
                .trim()
                .parse::<usize>()
                .map_err(|_| MaterialError::InvalidTextureIndex(key.clone()))?;
            material.set_texture(slot, assets.textures().get(texture)?)?;
        }
        for (name, value) in &description.shader_properties {
            material.set_uniform(name, *value);
        }

        log::debug!(
            "Built material {} '{}' with {} textures and {} uniforms",
            material.id,
            material.name,
            description.textures.len(),
            material.uniforms.len()
        );
        Ok(material)
    }

    /// Registry ID
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Material name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename, keeping the registry record in sync
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.context.rename_instance(self.id, &self.name);
    }

    /// Assigned shader
    pub fn shader(&self) -> Option<&Rc<Shader>> {
        self.shader.as_ref()
    }

    /// Assign the shader; it stays owned by the asset cache
    pub fn set_shader(&mut self, shader: Option<Rc<Shader>>) {
        self.shader = shader;
    }

    /// Texture in a slot
    pub fn texture(&self, slot: usize) -> Option<&SharedTexture> {
        self.textures.get(slot).and_then(Option::as_ref)
    }

    /// Put a texture in a slot
    pub fn set_texture(&mut self, slot: usize, texture: SharedTexture) -> MaterialResult<()> {
        let entry = self
            .textures
            .get_mut(slot)
            .ok_or(MaterialError::TextureIndexOutOfRange(slot))?;
        *entry = Some(texture);
        Ok(())
    }

    /// Empty a slot, returning its texture
    pub fn remove_texture(&mut self, slot: usize) -> Option<SharedTexture> {
        self.textures.get_mut(slot).and_then(Option::take)
    }

    /// Stored uniform value
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    /// Every stored uniform
    pub fn uniforms(&self) -> &BTreeMap<String, UniformValue> {
        &self.uniforms
    }

    /// Store a uniform applied on every bind
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.uniforms.insert(name.to_string(), value);
    }

    /// Store a uniform given in its tagged string form
    pub fn set_uniform_str(&mut self, name: &str, encoded: &str) -> MaterialResult<()> {
        let value = encoded.parse::<UniformValue>()?;
        self.set_uniform(name, value);
        Ok(())
    }

    /// Whether the shader composes on the deferred path; `false` without a shader
    pub fn supports_deferred_path(&self) -> bool {
        self.shader.as_ref().is_some_and(|shader| shader.deferred())
    }

    fn populated(&self) -> impl Iterator<Item = (u32, &SharedTexture)> {
        self.textures
            .iter()
            .enumerate()
            .filter_map(|(slot, texture)| texture.as_ref().map(|texture| (slot as u32, texture)))
    }
}

impl Bindable for Material {
    fn bind(&self) {
        let Some(shader) = &self.shader else {
            log::warn!("Material {} '{}' bound without a shader", self.id, self.name);
            return;
        };
        shader.bind();
        for (slot, texture) in self.populated() {
            texture.borrow().activate(slot);
        }
        for (name, value) in &self.uniforms {
            shader.set_uniform(name, value);
        }
    }

    fn unbind(&self) {
        let Some(shader) = &self.shader else {
            return;
        };
        let device = self.context.device();
        for (slot, texture) in self.populated() {
            device.active_texture_unit(slot);
            texture.borrow().unbind();
        }
        device.active_texture_unit(0);
        shader.unbind();
    }

    fn reference(&self) -> u32 {
        self.shader.as_ref().map_or(0, |shader| shader.reference())
    }
}

impl Drop for Material {
    fn drop(&mut self) {
        self.context.release_instance(self.id);
    }
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Material")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shader", &self.shader.as_ref().map(|shader| shader.id()))
            .field("textures", &self.populated().map(|(slot, _)| slot).collect::<Vec<_>>())
            .field("uniforms", &self.uniforms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{IVec2, Vec3};
    use crate::render::device::mock::DeviceCall;
    use crate::render::texture::{TextureConfig, TextureFormat};

    const SHADER: &str = "#ifdef _VERTEX_\n#endif\n#ifdef _FRAGMENT_\n#endif\n";

    fn shader(renderer: &Renderer, deferred: bool) -> Rc<Shader> {
        let mut shader = renderer.make_shader(deferred);
        shader.add_data(SHADER);
        shader.alloc().unwrap();
        Rc::new(shader)
    }

    fn texture(renderer: &Renderer) -> SharedTexture {
        let texture = renderer.make_shared_texture(&TextureConfig::new_2d(IVec2::new(4, 4), TextureFormat::Rgba8));
        texture.borrow_mut().alloc().unwrap();
        texture
    }

    #[test]
    fn test_bind_order_shader_textures_uniforms() {
        let (renderer, device) = Renderer::mock();
        let mut material = Material::new(&renderer);
        material.set_shader(Some(shader(&renderer, false)));
        material.set_texture(slots::ALBEDO as usize, texture(&renderer)).unwrap();
        material.set_uniform("tint", UniformValue::Vec3(Vec3::new(1.0, 0.5, 0.25)));
        device.clear_calls();

        material.bind();
        let calls = device.calls();
        let shader_at = calls
            .iter()
            .position(|call| matches!(call, DeviceCall::UseProgram(p) if *p != 0))
            .unwrap();
        let texture_at = calls
            .iter()
            .position(|call| *call == DeviceCall::ActiveTexture(slots::ALBEDO))
            .unwrap();
        let uniform_at = calls
            .iter()
            .position(|call| matches!(call, DeviceCall::SetUniform { name, .. } if name == "tint"))
            .unwrap();
        assert!(shader_at < texture_at && texture_at < uniform_at);
        assert_eq!(device.current_program(), material.reference());

        material.unbind();
        assert_eq!(device.current_program(), 0);
    }

    #[test]
    fn test_bind_without_shader_does_nothing() {
        let (renderer, device) = Renderer::mock();
        let mut material = Material::new(&renderer);
        material.set_texture(0, texture(&renderer)).unwrap();
        device.clear_calls();

        material.bind();
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_texture_slot_range() {
        let (renderer, _) = Renderer::mock();
        let mut material = Material::new(&renderer);
        assert!(material.set_texture(MAX_TEXTURES - 1, texture(&renderer)).is_ok());
        assert!(matches!(
            material.set_texture(MAX_TEXTURES, texture(&renderer)),
            Err(MaterialError::TextureIndexOutOfRange(16))
        ));
        assert!(material.remove_texture(MAX_TEXTURES - 1).is_some());
        assert!(material.texture(MAX_TEXTURES - 1).is_none());
    }

    #[test]
    fn test_supports_deferred_path() {
        let (renderer, _) = Renderer::mock();
        let mut material = Material::new(&renderer);
        assert!(!material.supports_deferred_path());
        material.set_shader(Some(shader(&renderer, true)));
        assert!(material.supports_deferred_path());
        material.set_shader(Some(shader(&renderer, false)));
        assert!(!material.supports_deferred_path());
    }

    #[test]
    fn test_uniform_string_form() {
        let (renderer, _) = Renderer::mock();
        let mut material = Material::new(&renderer);
        material.set_uniform_str("roughness", "float:0.5").unwrap();
        assert_eq!(material.uniform("roughness"), Some(&UniformValue::Float(0.5)));
        assert!(matches!(
            material.set_uniform_str("bad", "vec:0,1,2,3"),
            Err(MaterialError::Uniform(UniformError::UnknownType(_)))
        ));
    }

    #[test]
    fn test_build_from_description() {
        let (renderer, _) = Renderer::mock();
        let mut assets = AssetSystem::new();
        assets.shaders_mut().add("pbr", shader(&renderer, true)).unwrap();
        assets.textures_mut().add("bricks", texture(&renderer)).unwrap();

        let description = MaterialDescription::from_ron(
            r#"(
                name: "wall",
                shader: "pbr",
                textures: { "5": "bricks" },
                shader_properties: { "tint": "vec3:1.000000,0.500000,0.250000" },
            )"#,
        )
        .unwrap();
        let material = Material::build(&description, &renderer, &assets).unwrap();

        assert_eq!(material.name(), "wall");
        assert!(material.texture(5).is_some());
        assert_eq!(
            material.uniform("tint"),
            Some(&UniformValue::Vec3(Vec3::new(1.0, 0.5, 0.25)))
        );
    }

    #[test]
    fn test_build_failures() {
        let (renderer, _) = Renderer::mock();
        let mut assets = AssetSystem::new();
        assets.shaders_mut().add("pbr", shader(&renderer, false)).unwrap();
        assets.textures_mut().add("bricks", texture(&renderer)).unwrap();

        let mut description = MaterialDescription {
            shader: "missing".into(),
            ..Default::default()
        };
        assert!(matches!(
            Material::build(&description, &renderer, &assets),
            Err(MaterialError::Asset(AssetError::NotFound { .. }))
        ));

        description.shader = "pbr".into();
        description.textures.insert("albedo".into(), "bricks".into());
        assert!(matches!(
            Material::build(&description, &renderer, &assets),
            Err(MaterialError::InvalidTextureIndex(_))
        ));

        description.textures.clear();
        description.textures.insert("16".into(), "bricks".into());
        assert!(matches!(
            Material::build(&description, &renderer, &assets),
            Err(MaterialError::TextureIndexOutOfRange(16))
        ));

        assert!(matches!(
            MaterialDescription::from_ron(r#"(shader: "pbr", shader_properties: { "x": "vec:0,1,2,3" })"#),
            Err(MaterialError::Format(_))
        ));
    }
}
