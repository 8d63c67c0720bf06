//! Graphics device abstraction
//!
//! A [`GraphicsDevice`] exposes a small state-machine API in the style of
//! OpenGL: object handles are plain `u32` values, `0` always meaning "none"
//! (or the default backbuffer for framebuffers). All methods take `&self`;
//! devices keep their own state behind interior mutability so that render
//! objects can share one device through an `Rc`.

pub mod mock;

#[cfg(feature = "gl")]
pub mod gl;

use crate::foundation::math::{IVec2, Vec4};
use crate::render::attachment::AttachmentLocation;
use crate::render::shader::ShaderStage;
use crate::render::texture::{FormatLayout, InternalFormat};
use crate::render::uniform::UniformValue;
use crate::render::BackendResult;
use bitflags::bitflags;
use std::ffi::c_void;
use std::fmt;

bitflags! {
    /// Buffers cleared by [`GraphicsDevice::clear`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Color buffers
        const COLOR = 1 << 0;
        /// Depth buffer
        const DEPTH = 1 << 1;
        /// Stencil buffer
        const STENCIL = 1 << 2;
    }
}

/// Texture binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    /// 2D texture
    Texture2D,
    /// 3D texture
    Texture3D,
    /// Whole cubemap
    Cubemap,
    /// One cubemap face, `0..6` in +X, -X, +Y, -Y, +Z, -Z order
    CubemapFace(u8),
}

impl TextureTarget {
    /// Target used to bind the texture owning this target
    pub const fn binding(self) -> Self {
        match self {
            Self::CubemapFace(_) => Self::Cubemap,
            other => other,
        }
    }
}

/// Texel filtering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
    /// Trilinear across mip levels (minification only)
    LinearMipmapLinear,
}

/// Texture coordinate wrapping mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wrap {
    /// Clamp to the edge texel
    ClampToEdge,
    /// Tile
    Repeat,
    /// Tile mirrored
    MirroredRepeat,
}

/// Filtering and wrapping state of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampling {
    /// Minification filter
    pub min_filter: Filter,
    /// Magnification filter
    pub mag_filter: Filter,
    /// Wrap on S, T and R
    pub wrap: [Wrap; 3],
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            wrap: [Wrap::ClampToEdge; 3],
        }
    }
}

/// One texture storage upload
#[derive(Debug, Clone, Copy)]
pub struct TextureUpload<'a> {
    /// Upload target; cubemaps upload each face separately
    pub target: TextureTarget,
    /// Mip level
    pub level: i32,
    /// Width and height
    pub size: IVec2,
    /// Depth for 3D textures, `1` otherwise
    pub depth: i32,
    /// Storage and upload formats
    pub layout: FormatLayout,
    /// Texel data, or `None` to only allocate storage
    pub data: Option<&'a [u8]>,
}

/// Framebuffer copy request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blit {
    /// Source framebuffer
    pub source: u32,
    /// Destination framebuffer, `0` for the backbuffer
    pub destination: u32,
    /// Color attachment read from the source
    pub location: AttachmentLocation,
    /// Source extent
    pub source_size: IVec2,
    /// Destination extent
    pub destination_size: IVec2,
    /// Filter applied when the extents differ
    pub filter: Filter,
}

/// Framebuffer completeness as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferStatus {
    /// Ready for rendering
    Complete,
    /// Attachment format combination unsupported
    Unsupported,
    /// No image attached
    MissingAttachment,
    /// An attachment is incomplete
    IncompleteAttachment,
    /// A draw buffer names a missing attachment
    MissingDrawBuffer,
    /// The read buffer names a missing attachment
    MissingReadBuffer,
    /// Any other backend status code
    Unknown(u32),
}

impl fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Unsupported => write!(f, "unsupported format"),
            Self::MissingAttachment => write!(f, "missing attachment"),
            Self::IncompleteAttachment => write!(f, "incomplete attachment"),
            Self::MissingDrawBuffer => write!(f, "missing draw buffer"),
            Self::MissingReadBuffer => write!(f, "missing read buffer"),
            Self::Unknown(code) => write!(f, "unknown error {code:#x}"),
        }
    }
}

/// Floating point vertex attribute inside an interleaved buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader attribute location
    pub location: u32,
    /// Number of `f32` components
    pub components: i32,
    /// Byte offset inside one vertex
    pub offset: i32,
}

/// Native window handed to [`GraphicsDevice::init`]
pub trait NativeWindow {
    /// Drawable size in pixels
    fn framebuffer_size(&self) -> IVec2;

    /// Resolve a graphics API entry point; windows without a context return null
    fn get_proc_address(&mut self, symbol: &str) -> *const c_void;
}

/// Backend device
pub trait GraphicsDevice {
    /// Short backend name used in logs
    fn backend_name(&self) -> &'static str;

    /// Bind the device to a native window
    fn init(&self, window: &mut dyn NativeWindow) -> BackendResult<()>;

    /// Release device-level state
    fn destroy(&self);

    /// Begin a frame
    fn begin_frame(&self);

    /// End a frame
    fn end_frame(&self);

    /// Create an empty program object
    fn create_program(&self) -> BackendResult<u32>;

    /// Compile one stage; on failure the stage object is already destroyed and
    /// the compiler log is returned
    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<u32, String>;

    /// Attach a compiled stage to a program
    fn attach_stage(&self, program: u32, stage: u32);

    /// Link a program, returning the linker log on failure
    fn link_program(&self, program: u32) -> Result<(), String>;

    /// Detach a stage from a program
    fn detach_stage(&self, program: u32, stage: u32);

    /// Destroy a stage object
    fn delete_stage(&self, stage: u32);

    /// Destroy a program object
    fn delete_program(&self, program: u32);

    /// Make a program current, `0` for none
    fn use_program(&self, program: u32);

    /// Set a uniform on the given program; unknown names are ignored
    fn set_uniform(&self, program: u32, name: &str, value: &UniformValue);

    /// Create a texture object
    fn create_texture(&self) -> BackendResult<u32>;

    /// Bind a texture, `0` to unbind
    fn bind_texture(&self, target: TextureTarget, texture: u32);

    /// Select the active texture unit
    fn active_texture_unit(&self, unit: u32);

    /// Upload storage for the texture bound at `upload.target`
    fn upload_texture(&self, upload: &TextureUpload<'_>);

    /// Apply filtering and wrapping to the texture bound at `target`
    fn set_sampling(&self, target: TextureTarget, sampling: &Sampling);

    /// Build the mip chain of the texture bound at `target`
    fn generate_mipmaps(&self, target: TextureTarget);

    /// Destroy a texture object
    fn delete_texture(&self, texture: u32);

    /// Create a renderbuffer object
    fn create_renderbuffer(&self) -> BackendResult<u32>;

    /// Allocate renderbuffer storage
    fn renderbuffer_storage(&self, renderbuffer: u32, format: InternalFormat, size: IVec2);

    /// Destroy a renderbuffer object
    fn delete_renderbuffer(&self, renderbuffer: u32);

    /// Create a framebuffer object
    fn create_framebuffer(&self) -> BackendResult<u32>;

    /// Bind a framebuffer for drawing and reading, `0` for the backbuffer
    fn bind_framebuffer(&self, framebuffer: u32);

    /// Attach a texture level to the bound framebuffer; `texture == 0` detaches
    fn attach_texture(&self, location: AttachmentLocation, target: TextureTarget, texture: u32, level: i32);

    /// Attach a renderbuffer to the bound framebuffer
    fn attach_renderbuffer(&self, location: AttachmentLocation, renderbuffer: u32);

    /// Select the draw buffers of the bound framebuffer
    fn draw_buffers(&self, locations: &[AttachmentLocation]);

    /// Completeness of the bound framebuffer
    fn framebuffer_status(&self) -> FramebufferStatus;

    /// Destroy a framebuffer object
    fn delete_framebuffer(&self, framebuffer: u32);

    /// Set the viewport origin to zero and its extent to `size`
    fn viewport(&self, size: IVec2);

    /// Set the clear color
    fn clear_color(&self, color: Vec4);

    /// Clear buffers of the bound framebuffer
    fn clear(&self, flags: ClearFlags);

    /// Toggle depth testing and depth writes
    fn set_depth_test(&self, enabled: bool);

    /// Copy a color attachment between framebuffers
    fn blit(&self, blit: &Blit) -> BackendResult<()>;

    /// Create a vertex array and its vertex buffer
    fn create_vertex_array(&self) -> BackendResult<(u32, u32)>;

    /// Upload interleaved vertex data and describe its layout
    fn upload_vertices(&self, vertex_array: u32, buffer: u32, data: &[u8], stride: i32, attributes: &[VertexAttribute]);

    /// Bind a vertex array, `0` to unbind
    fn bind_vertex_array(&self, vertex_array: u32);

    /// Draw `count` vertices of the bound vertex array as triangles
    fn draw_triangles(&self, count: i32);

    /// Destroy a vertex array and its buffer
    fn delete_vertex_array(&self, vertex_array: u32, buffer: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubemap_face_binds_cubemap() {
        assert_eq!(TextureTarget::CubemapFace(3).binding(), TextureTarget::Cubemap);
        assert_eq!(TextureTarget::Texture2D.binding(), TextureTarget::Texture2D);
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(FramebufferStatus::MissingAttachment.to_string(), "missing attachment");
        assert_eq!(FramebufferStatus::Unknown(0x10).to_string(), "unknown error 0x10");
    }

    #[test]
    fn test_default_sampling() {
        let sampling = Sampling::default();
        assert_eq!(sampling.min_filter, Filter::Linear);
        assert_eq!(sampling.wrap, [Wrap::ClampToEdge; 3]);
    }
}
