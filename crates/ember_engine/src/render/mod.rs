//! Rendering system
//!
//! Render objects ([`Shader`], [`Texture`], [`Framebuffer`], [`Mesh`] and
//! attachments) are written once against the [`GraphicsDevice`] trait and are
//! created exclusively through the [`Renderer`] factory, which registers each
//! of them with the instance registry. The device is chosen at construction:
//! the OpenGL device (feature `gl`) or the headless [`MockDevice`].
//!
//! The traits in this module split the render-object contract by capability:
//! [`Bindable`], [`Allocatable`], [`Sizable`] and [`Drawable`].

pub mod attachment;
pub mod context;
pub mod device;
pub mod framebuffer;
pub mod mesh;
pub mod renderer;
pub mod shader;
pub mod texture;
pub mod uniform;

pub use attachment::{Attachment, AttachmentConfig, AttachmentLocation, Renderbuffer};
pub use context::RenderContext;
pub use device::mock::{DeviceCall, MockDevice};
pub use device::{ClearFlags, FramebufferStatus, GraphicsDevice, NativeWindow};
pub use framebuffer::{blit_framebuffers, Framebuffer, GBuffer};
pub use mesh::Mesh;
pub use renderer::Renderer;
pub use shader::{Shader, ShaderStage};
pub use texture::{SharedTexture, Texture, TextureConfig, TextureFormat, TextureType};
pub use uniform::{UniformError, UniformValue};

use crate::foundation::math::IVec2;
use crate::instance::InstanceId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Rendering errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The requested backend is not compiled into this build
    #[error("render backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The device was used before `init`
    #[error("render device not initialized")]
    NotInitialized,

    /// A shader stage failed to compile
    #[error("shader {shader} {stage} stage compilation failed: {log}")]
    ShaderCompile {
        /// Shader instance
        shader: InstanceId,
        /// Failing stage
        stage: ShaderStage,
        /// Compiler log
        log: String,
    },

    /// A program failed to link
    #[error("program {shader} link failed: {log}")]
    ProgramLink {
        /// Shader instance
        shader: InstanceId,
        /// Linker log
        log: String,
    },

    /// Shader source contained no stage sentinels
    #[error("shader {0} has no stages")]
    NoShaderStages(InstanceId),

    /// Framebuffer completeness check failed
    #[error("validate: framebuffer {framebuffer} incomplete: {status}")]
    IncompleteFramebuffer {
        /// Framebuffer instance
        framebuffer: InstanceId,
        /// Reported status
        status: FramebufferStatus,
    },

    /// Framebuffer size is not strictly positive
    #[error("validate: framebuffer {0} has invalid size {1}x{2}")]
    InvalidFramebufferSize(InstanceId, i32, i32),

    /// Mesh upload with an empty array
    #[error("mesh {0} upload: empty data")]
    EmptyMeshData(InstanceId),

    /// Mesh upload with differing array lengths
    #[error("mesh {0} upload: asymmetric data")]
    AsymmetricMeshData(InstanceId),

    /// Any other device failure
    #[error("device error: {0}")]
    Device(String),
}

/// Which device implementation a [`Renderer`] drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// OpenGL 4.3 through `glow` (requires the `gl` feature)
    Gl,
    /// Headless device that records calls
    #[default]
    Mock,
}

/// Objects that can be made the current target of a device binding point
pub trait Bindable {
    /// Make this object current
    fn bind(&self);

    /// Release the binding
    fn unbind(&self);

    /// Backend handle, `0` when unallocated
    fn reference(&self) -> u32;
}

/// Objects owning GPU storage
pub trait Allocatable {
    /// Create or refresh the GPU storage
    fn alloc(&mut self) -> BackendResult<()>;

    /// Destroy the GPU storage; safe to call repeatedly
    fn dealloc(&mut self);

    /// Registry ID of this object
    fn id(&self) -> InstanceId;
}

/// Objects with a resizable 2D extent
pub trait Sizable {
    /// Current size in pixels
    fn size(&self) -> IVec2;

    /// Resize; non-positive sizes are ignored
    fn set_size(&mut self, size: IVec2) -> BackendResult<()>;

    /// Whether `set_size` has any effect
    fn resizable(&self) -> bool {
        true
    }
}

/// Objects that issue geometry
pub trait Drawable {
    /// Issue the draw call
    fn draw(&self);
}
