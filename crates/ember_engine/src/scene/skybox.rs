//! Image based lighting cubemaps

use crate::instance::{InstanceId, ObjectKind};
use crate::render::context::RenderContext;
use crate::render::texture::{SharedTexture, TextureType};
use crate::render::Renderer;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Skybox construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkyboxError {
    /// One of the maps is not a cubemap
    #[error("skybox {slot} map must be a cubemap, found {found}")]
    NotCubemap {
        /// Which map: radiance, specular or irradiance
        slot: &'static str,
        /// Actual texture type
        found: TextureType,
    },
}

/// Radiance, prefiltered specular and irradiance cubemaps
pub struct Skybox {
    context: Rc<RenderContext>,
    id: InstanceId,
    radiance: SharedTexture,
    specular: SharedTexture,
    irradiance: SharedTexture,
}

impl Skybox {
    /// Build a skybox; every map must be a [`TextureType::TextureCubemap`]
    ///
    /// The skybox holds its own handles, a rejected map stays with the caller.
    pub fn new(
        renderer: &Renderer,
        radiance: &SharedTexture,
        specular: &SharedTexture,
        irradiance: &SharedTexture,
    ) -> Result<Self, SkyboxError> {
        for (slot, texture) in [("radiance", radiance), ("specular", specular), ("irradiance", irradiance)] {
            let found = texture.borrow().kind();
            if found != TextureType::TextureCubemap {
                return Err(SkyboxError::NotCubemap { slot, found });
            }
        }

        let context = renderer.context().clone();
        let id = context.issue_instance(ObjectKind::Skybox, "skybox");
        Ok(Self {
            context,
            id,
            radiance: radiance.clone(),
            specular: specular.clone(),
            irradiance: irradiance.clone(),
        })
    }

    /// Registry ID
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Environment map drawn as the background
    pub fn radiance(&self) -> &SharedTexture {
        &self.radiance
    }

    /// Mipmapped map sampled by roughness
    pub fn specular(&self) -> &SharedTexture {
        &self.specular
    }

    /// Diffuse convolution
    pub fn irradiance(&self) -> &SharedTexture {
        &self.irradiance
    }
}

impl Drop for Skybox {
    fn drop(&mut self) {
        self.context.release_instance(self.id);
    }
}

impl fmt::Debug for Skybox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Skybox").field("id", &self.id).finish_non_exhaustive()
    }
}
