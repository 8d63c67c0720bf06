//! OpenGL 4.3 device
//!
//! Maps the [`GraphicsDevice`] API onto `glow`. Entry points are loaded from
//! the native window in [`GraphicsDevice::init`]; every call made before that
//! is ignored and every creation call fails with
//! [`RenderError::NotInitialized`].

#![allow(unsafe_code)]

use super::{
    Blit, ClearFlags, Filter, FramebufferStatus, GraphicsDevice, NativeWindow, Sampling, TextureTarget,
    TextureUpload, VertexAttribute, Wrap,
};
use crate::foundation::math::{IVec2, Vec4};
use crate::render::attachment::AttachmentLocation;
use crate::render::shader::ShaderStage;
use crate::render::texture::{ComponentType, InternalFormat, PixelFormat};
use crate::render::uniform::UniformValue;
use crate::render::{BackendResult, RenderError};
use glow::HasContext;
use std::cell::RefCell;
use std::num::NonZeroU32;

/// OpenGL device
#[derive(Default)]
pub struct GlDevice {
    gl: RefCell<Option<glow::Context>>,
}

impl std::fmt::Debug for GlDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlDevice")
            .field("initialized", &self.gl.borrow().is_some())
            .finish()
    }
}

impl GlDevice {
    /// Create a device with no context
    pub fn new() -> Self {
        Self::default()
    }

    fn with_gl<R>(&self, fallback: R, f: impl FnOnce(&glow::Context) -> R) -> R {
        match self.gl.borrow().as_ref() {
            Some(gl) => f(gl),
            None => fallback,
        }
    }

    fn create<R>(&self, f: impl FnOnce(&glow::Context) -> Result<R, String>) -> BackendResult<R> {
        match self.gl.borrow().as_ref() {
            Some(gl) => f(gl).map_err(RenderError::Device),
            None => Err(RenderError::NotInitialized),
        }
    }
}

fn handle<T>(raw: u32, wrap: fn(NonZeroU32) -> T) -> Option<T> {
    NonZeroU32::new(raw).map(wrap)
}

const fn stage_kind(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Geometry => glow::GEOMETRY_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        ShaderStage::Compute => glow::COMPUTE_SHADER,
        ShaderStage::TessControl => glow::TESS_CONTROL_SHADER,
        ShaderStage::TessEvaluation => glow::TESS_EVALUATION_SHADER,
    }
}

const fn texture_target(target: TextureTarget) -> u32 {
    match target {
        TextureTarget::Texture2D => glow::TEXTURE_2D,
        TextureTarget::Texture3D => glow::TEXTURE_3D,
        TextureTarget::Cubemap => glow::TEXTURE_CUBE_MAP,
        TextureTarget::CubemapFace(face) => glow::TEXTURE_CUBE_MAP_POSITIVE_X + face as u32,
    }
}

const fn internal_format(format: InternalFormat) -> u32 {
    match format {
        InternalFormat::R8 => glow::R8,
        InternalFormat::Rg8 => glow::RG8,
        InternalFormat::Rgb8 => glow::RGB8,
        InternalFormat::Rgba8 => glow::RGBA8,
        InternalFormat::R16F => glow::R16F,
        InternalFormat::Rg16F => glow::RG16F,
        InternalFormat::Rgb16F => glow::RGB16F,
        InternalFormat::Rgba16F => glow::RGBA16F,
        InternalFormat::Rgba16Ui => glow::RGBA16UI,
        InternalFormat::R32F => glow::R32F,
        InternalFormat::Rg32F => glow::RG32F,
        InternalFormat::Rgb32F => glow::RGB32F,
        InternalFormat::Rgba32F => glow::RGBA32F,
        InternalFormat::Rgb32Ui => glow::RGB32UI,
        InternalFormat::Rgba32Ui => glow::RGBA32UI,
        InternalFormat::Depth16 => glow::DEPTH_COMPONENT16,
        InternalFormat::Depth24 => glow::DEPTH_COMPONENT24,
        InternalFormat::Depth24Stencil8 => glow::DEPTH24_STENCIL8,
        InternalFormat::Stencil8 => glow::STENCIL_INDEX8,
    }
}

const fn pixel_format(format: PixelFormat) -> u32 {
    match format {
        PixelFormat::Red => glow::RED,
        PixelFormat::Rg => glow::RG,
        PixelFormat::Rgb => glow::RGB,
        PixelFormat::Rgba => glow::RGBA,
        PixelFormat::RgbInteger => glow::RGB_INTEGER,
        PixelFormat::RgbaInteger => glow::RGBA_INTEGER,
        PixelFormat::DepthComponent => glow::DEPTH_COMPONENT,
        PixelFormat::DepthStencil => glow::DEPTH_STENCIL,
        PixelFormat::StencilIndex => glow::STENCIL_INDEX,
    }
}

const fn component_type(component: ComponentType) -> u32 {
    match component {
        ComponentType::UnsignedByte => glow::UNSIGNED_BYTE,
        ComponentType::UnsignedShort => glow::UNSIGNED_SHORT,
        ComponentType::UnsignedInt => glow::UNSIGNED_INT,
        ComponentType::HalfFloat => glow::HALF_FLOAT,
        ComponentType::Float => glow::FLOAT,
        ComponentType::UnsignedInt24_8 => glow::UNSIGNED_INT_24_8,
    }
}

const fn attachment_point(location: AttachmentLocation) -> u32 {
    match location {
        AttachmentLocation::Color0 => glow::COLOR_ATTACHMENT0,
        AttachmentLocation::Color1 => glow::COLOR_ATTACHMENT1,
        AttachmentLocation::Color2 => glow::COLOR_ATTACHMENT2,
        AttachmentLocation::Color3 => glow::COLOR_ATTACHMENT3,
        AttachmentLocation::Depth => glow::DEPTH_ATTACHMENT,
        AttachmentLocation::Stencil => glow::STENCIL_ATTACHMENT,
        AttachmentLocation::DepthStencil => glow::DEPTH_STENCIL_ATTACHMENT,
    }
}

const fn filter(filter: Filter) -> i32 {
    (match filter {
        Filter::Nearest => glow::NEAREST,
        Filter::Linear => glow::LINEAR,
        Filter::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
    }) as i32
}

const fn wrap(wrap: Wrap) -> i32 {
    (match wrap {
        Wrap::ClampToEdge => glow::CLAMP_TO_EDGE,
        Wrap::Repeat => glow::REPEAT,
        Wrap::MirroredRepeat => glow::MIRRORED_REPEAT,
    }) as i32
}

const fn framebuffer_status(code: u32) -> FramebufferStatus {
    match code {
        glow::FRAMEBUFFER_COMPLETE => FramebufferStatus::Complete,
        glow::FRAMEBUFFER_UNSUPPORTED => FramebufferStatus::Unsupported,
        glow::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => FramebufferStatus::MissingAttachment,
        glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => FramebufferStatus::IncompleteAttachment,
        glow::FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER => FramebufferStatus::MissingDrawBuffer,
        glow::FRAMEBUFFER_INCOMPLETE_READ_BUFFER => FramebufferStatus::MissingReadBuffer,
        other => FramebufferStatus::Unknown(other),
    }
}

impl GraphicsDevice for GlDevice {
    fn backend_name(&self) -> &'static str {
        "opengl"
    }

    fn init(&self, window: &mut dyn NativeWindow) -> BackendResult<()> {
        let gl = unsafe { glow::Context::from_loader_function(|symbol| window.get_proc_address(symbol)) };
        let version = unsafe { gl.get_parameter_string(glow::VERSION) };
        if version.is_empty() {
            return Err(RenderError::Device("failed to load OpenGL entry points".to_string()));
        }
        log::info!("OpenGL {}", version);

        unsafe {
            gl.enable(glow::DEPTH_TEST);
            gl.enable(glow::TEXTURE_CUBE_MAP_SEAMLESS);
        }
        *self.gl.borrow_mut() = Some(gl);
        Ok(())
    }

    fn destroy(&self) {
        self.gl.borrow_mut().take();
    }

    fn begin_frame(&self) {
        self.with_gl((), |gl| unsafe {
            gl.depth_mask(true);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        });
    }

    fn end_frame(&self) {
        self.with_gl((), |gl| unsafe { gl.flush() });
    }

    fn create_program(&self) -> BackendResult<u32> {
        self.create(|gl| unsafe { gl.create_program() }.map(|program| program.0.get()))
    }

    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<u32, String> {
        self.with_gl(Err("device not initialized".to_string()), |gl| unsafe {
            let shader = gl.create_shader(stage_kind(stage))?;
            gl.shader_source(shader, source);
            gl.compile_shader(shader);
            if gl.get_shader_compile_status(shader) {
                Ok(shader.0.get())
            } else {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                Err(log)
            }
        })
    }

    fn attach_stage(&self, program: u32, stage: u32) {
        self.with_gl((), |gl| {
            if let (Some(program), Some(stage)) = (handle(program, glow::NativeProgram), handle(stage, glow::NativeShader)) {
                unsafe { gl.attach_shader(program, stage) };
            }
        });
    }

    fn link_program(&self, program: u32) -> Result<(), String> {
        let Some(program) = handle(program, glow::NativeProgram) else {
            return Err("invalid program".to_string());
        };
        self.with_gl(Err("device not initialized".to_string()), |gl| unsafe {
            gl.link_program(program);
            if gl.get_program_link_status(program) {
                Ok(())
            } else {
                Err(gl.get_program_info_log(program))
            }
        })
    }

    fn detach_stage(&self, program: u32, stage: u32) {
        self.with_gl((), |gl| {
            if let (Some(program), Some(stage)) = (handle(program, glow::NativeProgram), handle(stage, glow::NativeShader)) {
                unsafe { gl.detach_shader(program, stage) };
            }
        });
    }

    fn delete_stage(&self, stage: u32) {
        self.with_gl((), |gl| {
            if let Some(stage) = handle(stage, glow::NativeShader) {
                unsafe { gl.delete_shader(stage) };
            }
        });
    }

    fn delete_program(&self, program: u32) {
        self.with_gl((), |gl| {
            if let Some(program) = handle(program, glow::NativeProgram) {
                unsafe { gl.delete_program(program) };
            }
        });
    }

    fn use_program(&self, program: u32) {
        self.with_gl((), |gl| unsafe { gl.use_program(handle(program, glow::NativeProgram)) });
    }

    fn set_uniform(&self, program: u32, name: &str, value: &UniformValue) {
        let Some(program) = handle(program, glow::NativeProgram) else {
            return;
        };
        self.with_gl((), |gl| unsafe {
            let Some(location) = gl.get_uniform_location(program, name) else {
                return;
            };
            let location = Some(&location);
            match value {
                UniformValue::Bool(v) => gl.uniform_1_i32(location, i32::from(*v)),
                UniformValue::Int(v) => gl.uniform_1_i32(location, *v),
                UniformValue::Uint(v) => gl.uniform_1_u32(location, *v),
                UniformValue::Float(v) => gl.uniform_1_f32(location, *v),
                UniformValue::Vec2(_) => gl.uniform_2_f32_slice(location, value.components()),
                UniformValue::Vec3(_) => gl.uniform_3_f32_slice(location, value.components()),
                UniformValue::Vec4(_) => gl.uniform_4_f32_slice(location, value.components()),
                UniformValue::Mat2(_) => gl.uniform_matrix_2_f32_slice(location, false, value.components()),
                UniformValue::Mat3(_) => gl.uniform_matrix_3_f32_slice(location, false, value.components()),
                UniformValue::Mat4(_) => gl.uniform_matrix_4_f32_slice(location, false, value.components()),
            }
        });
    }

    fn create_texture(&self) -> BackendResult<u32> {
        self.create(|gl| unsafe { gl.create_texture() }.map(|texture| texture.0.get()))
    }

    fn bind_texture(&self, target: TextureTarget, texture: u32) {
        self.with_gl((), |gl| unsafe {
            gl.bind_texture(texture_target(target.binding()), handle(texture, glow::NativeTexture));
        });
    }

    fn active_texture_unit(&self, unit: u32) {
        self.with_gl((), |gl| unsafe { gl.active_texture(glow::TEXTURE0 + unit) });
    }

    fn upload_texture(&self, upload: &TextureUpload<'_>) {
        let internal = internal_format(upload.layout.internal) as i32;
        let format = pixel_format(upload.layout.pixel);
        let ty = component_type(upload.layout.component);
        self.with_gl((), |gl| unsafe {
            match upload.target {
                TextureTarget::Texture3D => gl.tex_image_3d(
                    glow::TEXTURE_3D,
                    upload.level,
                    internal,
                    upload.size.x,
                    upload.size.y,
                    upload.depth,
                    0,
                    format,
                    ty,
                    upload.data,
                ),
                target => gl.tex_image_2d(
                    texture_target(target),
                    upload.level,
                    internal,
                    upload.size.x,
                    upload.size.y,
                    0,
                    format,
                    ty,
                    upload.data,
                ),
            }
        });
    }

    fn set_sampling(&self, target: TextureTarget, sampling: &Sampling) {
        let target = texture_target(target.binding());
        self.with_gl((), |gl| unsafe {
            gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, filter(sampling.min_filter));
            gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, filter(sampling.mag_filter));
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrap(sampling.wrap[0]));
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrap(sampling.wrap[1]));
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_R, wrap(sampling.wrap[2]));
        });
    }

    fn generate_mipmaps(&self, target: TextureTarget) {
        self.with_gl((), |gl| unsafe { gl.generate_mipmap(texture_target(target.binding())) });
    }

    fn delete_texture(&self, texture: u32) {
        self.with_gl((), |gl| {
            if let Some(texture) = handle(texture, glow::NativeTexture) {
                unsafe { gl.delete_texture(texture) };
            }
        });
    }

    fn create_renderbuffer(&self) -> BackendResult<u32> {
        self.create(|gl| unsafe { gl.create_renderbuffer() }.map(|renderbuffer| renderbuffer.0.get()))
    }

    fn renderbuffer_storage(&self, renderbuffer: u32, format: InternalFormat, size: IVec2) {
        self.with_gl((), |gl| unsafe {
            gl.bind_renderbuffer(glow::RENDERBUFFER, handle(renderbuffer, glow::NativeRenderbuffer));
            gl.renderbuffer_storage(glow::RENDERBUFFER, internal_format(format), size.x, size.y);
            gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        });
    }

    fn delete_renderbuffer(&self, renderbuffer: u32) {
        self.with_gl((), |gl| {
            if let Some(renderbuffer) = handle(renderbuffer, glow::NativeRenderbuffer) {
                unsafe { gl.delete_renderbuffer(renderbuffer) };
            }
        });
    }

    fn create_framebuffer(&self) -> BackendResult<u32> {
        self.create(|gl| unsafe { gl.create_framebuffer() }.map(|framebuffer| framebuffer.0.get()))
    }

    fn bind_framebuffer(&self, framebuffer: u32) {
        self.with_gl((), |gl| unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, handle(framebuffer, glow::NativeFramebuffer));
        });
    }

    fn attach_texture(&self, location: AttachmentLocation, target: TextureTarget, texture: u32, level: i32) {
        self.with_gl((), |gl| unsafe {
            let texture = handle(texture, glow::NativeTexture);
            match target {
                TextureTarget::Texture3D | TextureTarget::Cubemap => {
                    gl.framebuffer_texture(glow::FRAMEBUFFER, attachment_point(location), texture, level);
                }
                target => gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    attachment_point(location),
                    texture_target(target),
                    texture,
                    level,
                ),
            }
        });
    }

    fn attach_renderbuffer(&self, location: AttachmentLocation, renderbuffer: u32) {
        self.with_gl((), |gl| unsafe {
            gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                attachment_point(location),
                glow::RENDERBUFFER,
                handle(renderbuffer, glow::NativeRenderbuffer),
            );
        });
    }

    fn draw_buffers(&self, locations: &[AttachmentLocation]) {
        let buffers: Vec<u32> = locations.iter().copied().map(attachment_point).collect();
        self.with_gl((), |gl| unsafe { gl.draw_buffers(&buffers) });
    }

    fn framebuffer_status(&self) -> FramebufferStatus {
        self.with_gl(FramebufferStatus::Unknown(0), |gl| {
            framebuffer_status(unsafe { gl.check_framebuffer_status(glow::FRAMEBUFFER) })
        })
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        self.with_gl((), |gl| {
            if let Some(framebuffer) = handle(framebuffer, glow::NativeFramebuffer) {
                unsafe { gl.delete_framebuffer(framebuffer) };
            }
        });
    }

    fn viewport(&self, size: IVec2) {
        self.with_gl((), |gl| unsafe { gl.viewport(0, 0, size.x, size.y) });
    }

    fn clear_color(&self, color: Vec4) {
        self.with_gl((), |gl| unsafe { gl.clear_color(color.x, color.y, color.z, color.w) });
    }

    fn clear(&self, flags: ClearFlags) {
        let mut mask = 0;
        if flags.contains(ClearFlags::COLOR) {
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if flags.contains(ClearFlags::DEPTH) {
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        if flags.contains(ClearFlags::STENCIL) {
            mask |= glow::STENCIL_BUFFER_BIT;
        }
        self.with_gl((), |gl| unsafe { gl.clear(mask) });
    }

    fn set_depth_test(&self, enabled: bool) {
        self.with_gl((), |gl| unsafe {
            if enabled {
                gl.enable(glow::DEPTH_TEST);
            } else {
                gl.disable(glow::DEPTH_TEST);
            }
            gl.depth_mask(enabled);
        });
    }

    fn blit(&self, blit: &Blit) -> BackendResult<()> {
        if !blit.location.is_color() {
            return Err(RenderError::Device(format!("cannot blit from {:?}", blit.location)));
        }
        let filter = match blit.filter {
            Filter::Nearest => glow::NEAREST,
            Filter::Linear | Filter::LinearMipmapLinear => glow::LINEAR,
        };
        self.create(|gl| unsafe {
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, handle(blit.source, glow::NativeFramebuffer));
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, handle(blit.destination, glow::NativeFramebuffer));
            gl.read_buffer(attachment_point(blit.location));
            gl.blit_framebuffer(
                0,
                0,
                blit.source_size.x,
                blit.source_size.y,
                0,
                0,
                blit.destination_size.x,
                blit.destination_size.y,
                glow::COLOR_BUFFER_BIT,
                filter,
            );
            Ok(())
        })
    }

    fn create_vertex_array(&self) -> BackendResult<(u32, u32)> {
        self.create(|gl| unsafe {
            let vertex_array = gl.create_vertex_array()?;
            let buffer = gl.create_buffer()?;
            Ok((vertex_array.0.get(), buffer.0.get()))
        })
    }

    fn upload_vertices(&self, vertex_array: u32, buffer: u32, data: &[u8], stride: i32, attributes: &[VertexAttribute]) {
        self.with_gl((), |gl| unsafe {
            gl.bind_vertex_array(handle(vertex_array, glow::NativeVertexArray));
            gl.bind_buffer(glow::ARRAY_BUFFER, handle(buffer, glow::NativeBuffer));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, data, glow::STATIC_DRAW);
            for attribute in attributes {
                gl.enable_vertex_attrib_array(attribute.location);
                gl.vertex_attrib_pointer_f32(
                    attribute.location,
                    attribute.components,
                    glow::FLOAT,
                    false,
                    stride,
                    attribute.offset,
                );
            }
            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        });
    }

    fn bind_vertex_array(&self, vertex_array: u32) {
        self.with_gl((), |gl| unsafe { gl.bind_vertex_array(handle(vertex_array, glow::NativeVertexArray)) });
    }

    fn draw_triangles(&self, count: i32) {
        self.with_gl((), |gl| unsafe { gl.draw_arrays(glow::TRIANGLES, 0, count) });
    }

    fn delete_vertex_array(&self, vertex_array: u32, buffer: u32) {
        self.with_gl((), |gl| unsafe {
            if let Some(buffer) = handle(buffer, glow::NativeBuffer) {
                gl.delete_buffer(buffer);
            }
            if let Some(vertex_array) = handle(vertex_array, glow::NativeVertexArray) {
                gl.delete_vertex_array(vertex_array);
            }
        });
    }
}
