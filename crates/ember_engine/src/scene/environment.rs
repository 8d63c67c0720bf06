//! Scene lighting environment

use crate::foundation::math::Vec3;
use crate::render::shader::Shader;
use crate::scene::graph::ObjectId;
use crate::scene::material::slots;
use crate::scene::skybox::Skybox;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Where ambient light comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LightingSource {
    /// Sample the skybox irradiance map
    #[default]
    Skybox,
    /// Flat ambient color
    Color,
}

/// Ambient lighting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentLighting {
    /// Ambient source
    pub source: LightingSource,
    /// Ambient multiplier
    pub intensity: f32,
    /// Ambient color used by [`LightingSource::Color`]
    pub ambient_color: Vec3,
}

impl Default for EnvironmentLighting {
    fn default() -> Self {
        Self {
            source: LightingSource::Skybox,
            intensity: 1.0,
            ambient_color: Vec3::new(0.2, 0.2, 0.2),
        }
    }
}

/// Skybox, sun and deferred composition shader of a scene
#[derive(Debug, Default)]
pub struct Environment {
    /// Shader composing the G-buffer on the deferred path
    pub deferred_shader: Option<Rc<Shader>>,
    /// Sky and image based lighting maps
    pub skybox: Option<Rc<Skybox>>,
    /// Object carrying the main directional light
    pub sun: Option<ObjectId>,
    /// Ambient lighting
    pub lighting: EnvironmentLighting,
}

impl Environment {
    /// Empty environment with default lighting
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate the skybox maps on their material slots
    pub fn bind(&self) {
        if let Some(skybox) = &self.skybox {
            skybox.radiance().borrow().activate(slots::ENVIRONMENT);
            skybox.irradiance().borrow().activate(slots::IRRADIANCE);
        }
    }

    /// Ambient term as a color, ignoring the skybox
    pub fn ambient(&self) -> Vec3 {
        match self.lighting.source {
            LightingSource::Color => self.lighting.ambient_color * self.lighting.intensity,
            LightingSource::Skybox => Vec3::zeros(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::mock::DeviceCall;
    use crate::render::texture::{TextureConfig, TextureFormat};
    use crate::render::Renderer;
    use approx::assert_relative_eq;

    #[test]
    fn test_bind_activates_skybox_slots() {
        let (renderer, device) = Renderer::mock();
        let cubemap = || renderer.make_shared_texture(&TextureConfig::new_cubemap(8, TextureFormat::Rgba16));
        let skybox = Skybox::new(&renderer, &cubemap(), &cubemap(), &cubemap()).unwrap();
        let environment = Environment {
            skybox: Some(Rc::new(skybox)),
            ..Environment::new()
        };

        environment.bind();
        let calls = device.calls();
        assert!(calls.contains(&DeviceCall::ActiveTexture(slots::ENVIRONMENT)));
        assert!(calls.contains(&DeviceCall::ActiveTexture(slots::IRRADIANCE)));
    }

    #[test]
    fn test_color_ambient() {
        let environment = Environment {
            lighting: EnvironmentLighting {
                source: LightingSource::Color,
                intensity: 0.5,
                ambient_color: Vec3::new(1.0, 0.5, 0.0),
            },
            ..Environment::new()
        };
        assert_relative_eq!(environment.ambient(), Vec3::new(0.5, 0.25, 0.0));
        assert_relative_eq!(Environment::new().ambient(), Vec3::zeros());
    }
}
