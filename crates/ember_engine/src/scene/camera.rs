//! Camera component
//!
//! A camera renders the graph into its target framebuffer, or the window
//! when it has none. On the deferred path it renders into its G-buffer
//! instead and copies color attachment 0 onto the target afterwards.

use crate::foundation::math::{IVec2, Mat4, Vec4};
use crate::render::attachment::AttachmentLocation;
use crate::render::device::ClearFlags;
use crate::render::framebuffer::{blit_framebuffers, Framebuffer, GBuffer};
use crate::render::{Bindable, Renderer, Sizable};
use crate::scene::component::Component;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::str::FromStr;

/// Rendering path of a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RenderPath {
    /// Shade while rasterizing
    #[default]
    Forward,
    /// Rasterize into a G-buffer, shade afterwards
    Deferred,
}

impl fmt::Display for RenderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Forward => "forward",
            Self::Deferred => "deferred",
        })
    }
}

impl FromStr for RenderPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Self::Forward),
            "deferred" => Ok(Self::Deferred),
            other => Err(format!("unknown render path '{other}'")),
        }
    }
}

impl TryFrom<String> for RenderPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RenderPath> for String {
    fn from(path: RenderPath) -> Self {
        path.to_string()
    }
}

/// Serializable camera settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Clear color
    pub clear_color: Vec4,
    /// Rendering path
    pub render_path: RenderPath,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near plane
    pub near: f32,
    /// Far plane
    pub far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            render_path: RenderPath::Forward,
            fov_y: std::f32::consts::FRAC_PI_3,
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Camera attached to a game object
#[derive(Debug, Default)]
pub struct Camera {
    settings: CameraSettings,
    target: Option<Framebuffer>,
    gbuffer: Option<GBuffer>,
}

impl Camera {
    /// Forward camera rendering to the window
    pub fn new() -> Self {
        Self::default()
    }

    /// Camera with the given settings
    pub fn from_settings(settings: CameraSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Current settings
    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// Clear color
    pub fn clear_color(&self) -> Vec4 {
        self.settings.clear_color
    }

    /// Set the clear color
    pub fn set_clear_color(&mut self, color: Vec4) {
        self.settings.clear_color = color;
    }

    /// Rendering path
    pub fn render_path(&self) -> RenderPath {
        self.settings.render_path
    }

    /// Select the rendering path; deferred needs a G-buffer to take effect
    pub fn set_render_path(&mut self, path: RenderPath) {
        self.settings.render_path = path;
    }

    /// Framebuffer rendered into, `None` for the window
    pub fn target(&self) -> Option<&Framebuffer> {
        self.target.as_ref()
    }

    /// Render into a framebuffer instead of the window
    pub fn set_target(&mut self, target: Option<Framebuffer>) -> Option<Framebuffer> {
        std::mem::replace(&mut self.target, target)
    }

    /// G-buffer used on the deferred path
    pub fn gbuffer(&self) -> Option<&GBuffer> {
        self.gbuffer.as_ref()
    }

    /// Set the G-buffer used on the deferred path
    pub fn set_gbuffer(&mut self, gbuffer: Option<GBuffer>) -> Option<GBuffer> {
        std::mem::replace(&mut self.gbuffer, gbuffer)
    }

    /// Whether rendering goes through the G-buffer
    pub fn deferred(&self) -> bool {
        self.settings.render_path == RenderPath::Deferred && self.gbuffer.is_some()
    }

    /// Perspective projection for the given aspect ratio
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::new_perspective(aspect, self.settings.fov_y, self.settings.near, self.settings.far)
    }

    /// View matrix from the owning object's world matrix
    pub fn view(&self, world: &Mat4) -> Mat4 {
        world.try_inverse().unwrap_or_else(Mat4::identity)
    }

    /// Resize owned render targets
    pub fn resize(&mut self, size: IVec2) {
        if let Some(target) = &mut self.target {
            if let Err(err) = target.set_size(size) {
                log::error!("Camera target resize failed: {}", err);
            }
        }
        if let Some(gbuffer) = &mut self.gbuffer {
            if let Err(err) = gbuffer.set_size(size) {
                log::error!("Camera G-buffer resize failed: {}", err);
            }
        }
    }

    /// Bind the render target and clear it
    pub fn begin(&self, renderer: &Renderer) {
        match (&self.gbuffer, &self.target) {
            (Some(gbuffer), _) if self.deferred() => gbuffer.bind(),
            (_, Some(target)) => target.bind(),
            _ => renderer.context().bind_current_framebuffer(),
        }
        let device = renderer.context().device();
        device.clear_color(self.settings.clear_color);
        device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
    }

    /// Resolve the deferred path onto the target and release the binding
    pub fn end(&self, _renderer: &Renderer) {
        if let (Some(gbuffer), true) = (&self.gbuffer, self.deferred()) {
            gbuffer.unbind();
            if let Err(err) = blit_framebuffers(gbuffer.framebuffer(), self.target.as_ref(), AttachmentLocation::Color0) {
                log::error!("Camera G-buffer resolve failed: {}", err);
            }
        } else if let Some(target) = &self.target {
            target.unbind();
        }
    }
}

impl Component for Camera {
    fn type_name(&self) -> &'static str {
        "camera"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
