//! Headless device
//!
//! [`MockDevice`] keeps just enough state to behave like a real driver for
//! the parts the engine relies on: handle allocation, the bound framebuffer
//! and viewport, texture and renderbuffer storage, and framebuffer
//! completeness. Every call is recorded as a [`DeviceCall`] so tests can
//! assert on the exact command stream.
//!
//! Shader sources are "compiled" by scanning for a line starting with
//! `#error`; such a stage fails with the rest of that line as its log.

use super::{
    Blit, ClearFlags, FramebufferStatus, GraphicsDevice, NativeWindow, Sampling, TextureTarget, TextureUpload,
    VertexAttribute,
};
use crate::foundation::math::{IVec2, Vec4};
use crate::render::attachment::AttachmentLocation;
use crate::render::shader::ShaderStage;
use crate::render::texture::{FormatLayout, InternalFormat};
use crate::render::uniform::UniformValue;
use crate::render::{BackendResult, RenderError};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum DeviceCall {
    Init(IVec2),
    Destroy,
    BeginFrame,
    EndFrame,
    CreateProgram(u32),
    CompileStage(ShaderStage),
    AttachStage { program: u32, stage: u32 },
    LinkProgram(u32),
    DetachStage { program: u32, stage: u32 },
    DeleteStage(u32),
    DeleteProgram(u32),
    UseProgram(u32),
    SetUniform { program: u32, name: String, value: UniformValue },
    CreateTexture(u32),
    BindTexture(TextureTarget, u32),
    ActiveTexture(u32),
    UploadTexture {
        target: TextureTarget,
        level: i32,
        size: IVec2,
        layout: FormatLayout,
        bytes: usize,
    },
    SetSampling(TextureTarget, Sampling),
    GenerateMipmaps(TextureTarget),
    DeleteTexture(u32),
    CreateRenderbuffer(u32),
    RenderbufferStorage { renderbuffer: u32, format: InternalFormat, size: IVec2 },
    DeleteRenderbuffer(u32),
    CreateFramebuffer(u32),
    BindFramebuffer(u32),
    AttachTexture { location: AttachmentLocation, target: TextureTarget, texture: u32, level: i32 },
    AttachRenderbuffer { location: AttachmentLocation, renderbuffer: u32 },
    DrawBuffers(Vec<AttachmentLocation>),
    FramebufferStatus,
    DeleteFramebuffer(u32),
    Viewport(IVec2),
    ClearColor(Vec4),
    Clear(ClearFlags),
    DepthTest(bool),
    Blit(Blit),
    CreateVertexArray(u32, u32),
    UploadVertices { vertex_array: u32, bytes: usize, stride: i32, attributes: Vec<VertexAttribute> },
    BindVertexArray(u32),
    DrawTriangles(i32),
    DeleteVertexArray(u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Image {
    Texture(u32),
    Renderbuffer(u32),
}

#[derive(Debug, Default)]
struct MockState {
    initialized: bool,
    next_handle: u32,
    calls: Vec<DeviceCall>,
    stages: HashMap<u32, ShaderStage>,
    programs: HashMap<u32, Vec<u32>>,
    current_program: u32,
    textures: HashSet<u32>,
    texture_storage: HashSet<u32>,
    bound_textures: HashMap<TextureTarget, u32>,
    renderbuffers: HashMap<u32, Option<IVec2>>,
    framebuffers: HashMap<u32, BTreeMap<AttachmentLocation, Image>>,
    bound_framebuffer: u32,
    viewport: IVec2,
    vertex_arrays: HashSet<u32>,
    draw_count: usize,
}

impl MockState {
    fn handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn status(&self, framebuffer: u32) -> FramebufferStatus {
        if framebuffer == 0 {
            return FramebufferStatus::Complete;
        }
        let Some(images) = self.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::Unknown(0);
        };
        if images.is_empty() {
            return FramebufferStatus::MissingAttachment;
        }
        let complete = images.values().all(|image| match image {
            Image::Texture(texture) => self.texture_storage.contains(texture),
            Image::Renderbuffer(renderbuffer) => {
                self.renderbuffers.get(renderbuffer).copied().flatten().is_some()
            }
        });
        if complete {
            FramebufferStatus::Complete
        } else {
            FramebufferStatus::IncompleteAttachment
        }
    }
}

/// Device that records calls instead of drawing
#[derive(Debug, Default)]
pub struct MockDevice {
    state: RefCell<MockState>,
    fail_framebuffers: Cell<bool>,
}

impl MockDevice {
    /// Create a device with no objects
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded calls, oldest first
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.borrow().calls.clone()
    }

    /// Forget recorded calls; object state is kept
    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Currently bound framebuffer, `0` for the backbuffer
    pub fn bound_framebuffer(&self) -> u32 {
        self.state.borrow().bound_framebuffer
    }

    /// Current viewport extent
    pub fn viewport_size(&self) -> IVec2 {
        self.state.borrow().viewport
    }

    /// Currently used program
    pub fn current_program(&self) -> u32 {
        self.state.borrow().current_program
    }

    /// Number of draw calls issued
    pub fn draw_count(&self) -> usize {
        self.state.borrow().draw_count
    }

    /// Whether [`GraphicsDevice::init`] has been called
    pub fn initialized(&self) -> bool {
        self.state.borrow().initialized
    }

    /// Number of live objects of every kind
    pub fn live_objects(&self) -> usize {
        let state = self.state.borrow();
        state.stages.len()
            + state.programs.len()
            + state.textures.len()
            + state.renderbuffers.len()
            + state.framebuffers.len()
            + state.vertex_arrays.len()
    }

    /// Make every subsequent framebuffer creation fail
    pub fn fail_framebuffer_creation(&self, fail: bool) {
        self.fail_framebuffers.set(fail);
    }

    fn record(&self, call: DeviceCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl GraphicsDevice for MockDevice {
    fn backend_name(&self) -> &'static str {
        "mock"
    }

    fn init(&self, window: &mut dyn NativeWindow) -> BackendResult<()> {
        let size = window.framebuffer_size();
        let mut state = self.state.borrow_mut();
        state.initialized = true;
        state.viewport = size;
        state.calls.push(DeviceCall::Init(size));
        Ok(())
    }

    fn destroy(&self) {
        let mut state = self.state.borrow_mut();
        state.initialized = false;
        state.calls.push(DeviceCall::Destroy);
    }

    fn begin_frame(&self) {
        self.record(DeviceCall::BeginFrame);
    }

    fn end_frame(&self) {
        self.record(DeviceCall::EndFrame);
    }

    fn create_program(&self) -> BackendResult<u32> {
        let mut state = self.state.borrow_mut();
        let program = state.handle();
        state.programs.insert(program, Vec::new());
        state.calls.push(DeviceCall::CreateProgram(program));
        Ok(program)
    }

    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<u32, String> {
        let mut state = self.state.borrow_mut();
        state.calls.push(DeviceCall::CompileStage(stage));
        if let Some(line) = source.lines().find(|line| line.trim_start().starts_with("#error")) {
            let message = line.trim_start().trim_start_matches("#error").trim();
            return Err(format!("0:1: error: {message}"));
        }
        let handle = state.handle();
        state.stages.insert(handle, stage);
        Ok(handle)
    }

    fn attach_stage(&self, program: u32, stage: u32) {
        let mut state = self.state.borrow_mut();
        if let Some(stages) = state.programs.get_mut(&program) {
            stages.push(stage);
        }
        state.calls.push(DeviceCall::AttachStage { program, stage });
    }

    fn link_program(&self, program: u32) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        state.calls.push(DeviceCall::LinkProgram(program));
        let kinds: Vec<ShaderStage> = state
            .programs
            .get(&program)
            .ok_or_else(|| format!("invalid program {program}"))?
            .iter()
            .filter_map(|stage| state.stages.get(stage).copied())
            .collect();

        if kinds.is_empty() {
            return Err("no shader stages attached".to_string());
        }
        let graphics = kinds.iter().any(|kind| *kind != ShaderStage::Compute);
        if graphics && !kinds.contains(&ShaderStage::Vertex) {
            return Err("missing vertex shader".to_string());
        }
        Ok(())
    }

    fn detach_stage(&self, program: u32, stage: u32) {
        let mut state = self.state.borrow_mut();
        if let Some(stages) = state.programs.get_mut(&program) {
            stages.retain(|attached| *attached != stage);
        }
        state.calls.push(DeviceCall::DetachStage { program, stage });
    }

    fn delete_stage(&self, stage: u32) {
        let mut state = self.state.borrow_mut();
        state.stages.remove(&stage);
        state.calls.push(DeviceCall::DeleteStage(stage));
    }

    fn delete_program(&self, program: u32) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&program);
        if state.current_program == program {
            state.current_program = 0;
        }
        state.calls.push(DeviceCall::DeleteProgram(program));
    }

    fn use_program(&self, program: u32) {
        let mut state = self.state.borrow_mut();
        state.current_program = program;
        state.calls.push(DeviceCall::UseProgram(program));
    }

    fn set_uniform(&self, program: u32, name: &str, value: &UniformValue) {
        self.record(DeviceCall::SetUniform {
            program,
            name: name.to_string(),
            value: *value,
        });
    }

    fn create_texture(&self) -> BackendResult<u32> {
        let mut state = self.state.borrow_mut();
        let texture = state.handle();
        state.textures.insert(texture);
        state.calls.push(DeviceCall::CreateTexture(texture));
        Ok(texture)
    }

    fn bind_texture(&self, target: TextureTarget, texture: u32) {
        let mut state = self.state.borrow_mut();
        state.bound_textures.insert(target.binding(), texture);
        state.calls.push(DeviceCall::BindTexture(target, texture));
    }

    fn active_texture_unit(&self, unit: u32) {
        self.record(DeviceCall::ActiveTexture(unit));
    }

    fn upload_texture(&self, upload: &TextureUpload<'_>) {
        let mut state = self.state.borrow_mut();
        if let Some(texture) = state.bound_textures.get(&upload.target.binding()).copied() {
            if texture != 0 && upload.size.x > 0 && upload.size.y > 0 {
                state.texture_storage.insert(texture);
            }
        }
        state.calls.push(DeviceCall::UploadTexture {
            target: upload.target,
            level: upload.level,
            size: upload.size,
            layout: upload.layout,
            bytes: upload.data.map_or(0, <[u8]>::len),
        });
    }

    fn set_sampling(&self, target: TextureTarget, sampling: &Sampling) {
        self.record(DeviceCall::SetSampling(target, *sampling));
    }

    fn generate_mipmaps(&self, target: TextureTarget) {
        self.record(DeviceCall::GenerateMipmaps(target));
    }

    fn delete_texture(&self, texture: u32) {
        let mut state = self.state.borrow_mut();
        state.textures.remove(&texture);
        state.texture_storage.remove(&texture);
        state.calls.push(DeviceCall::DeleteTexture(texture));
    }

    fn create_renderbuffer(&self) -> BackendResult<u32> {
        let mut state = self.state.borrow_mut();
        let renderbuffer = state.handle();
        state.renderbuffers.insert(renderbuffer, None);
        state.calls.push(DeviceCall::CreateRenderbuffer(renderbuffer));
        Ok(renderbuffer)
    }

    fn renderbuffer_storage(&self, renderbuffer: u32, format: InternalFormat, size: IVec2) {
        let mut state = self.state.borrow_mut();
        if let Some(storage) = state.renderbuffers.get_mut(&renderbuffer) {
            *storage = (size.x > 0 && size.y > 0).then_some(size);
        }
        state.calls.push(DeviceCall::RenderbufferStorage {
            renderbuffer,
            format,
            size,
        });
    }

    fn delete_renderbuffer(&self, renderbuffer: u32) {
        let mut state = self.state.borrow_mut();
        state.renderbuffers.remove(&renderbuffer);
        state.calls.push(DeviceCall::DeleteRenderbuffer(renderbuffer));
    }

    fn create_framebuffer(&self) -> BackendResult<u32> {
        if self.fail_framebuffers.get() {
            return Err(RenderError::Device("framebuffer creation failed".to_string()));
        }
        let mut state = self.state.borrow_mut();
        let framebuffer = state.handle();
        state.framebuffers.insert(framebuffer, BTreeMap::new());
        state.calls.push(DeviceCall::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn bind_framebuffer(&self, framebuffer: u32) {
        let mut state = self.state.borrow_mut();
        state.bound_framebuffer = framebuffer;
        state.calls.push(DeviceCall::BindFramebuffer(framebuffer));
    }

    fn attach_texture(&self, location: AttachmentLocation, target: TextureTarget, texture: u32, level: i32) {
        let mut state = self.state.borrow_mut();
        let bound = state.bound_framebuffer;
        if let Some(images) = state.framebuffers.get_mut(&bound) {
            if texture == 0 {
                images.remove(&location);
            } else {
                images.insert(location, Image::Texture(texture));
            }
        }
        state.calls.push(DeviceCall::AttachTexture {
            location,
            target,
            texture,
            level,
        });
    }

    fn attach_renderbuffer(&self, location: AttachmentLocation, renderbuffer: u32) {
        let mut state = self.state.borrow_mut();
        let bound = state.bound_framebuffer;
        if let Some(images) = state.framebuffers.get_mut(&bound) {
            if renderbuffer == 0 {
                images.remove(&location);
            } else {
                images.insert(location, Image::Renderbuffer(renderbuffer));
            }
        }
        state.calls.push(DeviceCall::AttachRenderbuffer { location, renderbuffer });
    }

    fn draw_buffers(&self, locations: &[AttachmentLocation]) {
        self.record(DeviceCall::DrawBuffers(locations.to_vec()));
    }

    fn framebuffer_status(&self) -> FramebufferStatus {
        let mut state = self.state.borrow_mut();
        state.calls.push(DeviceCall::FramebufferStatus);
        state.status(state.bound_framebuffer)
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        let mut state = self.state.borrow_mut();
        state.framebuffers.remove(&framebuffer);
        if state.bound_framebuffer == framebuffer {
            state.bound_framebuffer = 0;
        }
        state.calls.push(DeviceCall::DeleteFramebuffer(framebuffer));
    }

    fn viewport(&self, size: IVec2) {
        let mut state = self.state.borrow_mut();
        state.viewport = size;
        state.calls.push(DeviceCall::Viewport(size));
    }

    fn clear_color(&self, color: Vec4) {
        self.record(DeviceCall::ClearColor(color));
    }

    fn clear(&self, flags: ClearFlags) {
        self.record(DeviceCall::Clear(flags));
    }

    fn set_depth_test(&self, enabled: bool) {
        self.record(DeviceCall::DepthTest(enabled));
    }

    fn blit(&self, blit: &Blit) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(DeviceCall::Blit(*blit));
        if blit.source != 0 && !state.framebuffers.contains_key(&blit.source) {
            return Err(RenderError::Device(format!("blit from unknown framebuffer {}", blit.source)));
        }
        Ok(())
    }

    fn create_vertex_array(&self) -> BackendResult<(u32, u32)> {
        let mut state = self.state.borrow_mut();
        let vertex_array = state.handle();
        let buffer = state.handle();
        state.vertex_arrays.insert(vertex_array);
        state.calls.push(DeviceCall::CreateVertexArray(vertex_array, buffer));
        Ok((vertex_array, buffer))
    }

    fn upload_vertices(&self, vertex_array: u32, _buffer: u32, data: &[u8], stride: i32, attributes: &[VertexAttribute]) {
        self.record(DeviceCall::UploadVertices {
            vertex_array,
            bytes: data.len(),
            stride,
            attributes: attributes.to_vec(),
        });
    }

    fn bind_vertex_array(&self, vertex_array: u32) {
        self.record(DeviceCall::BindVertexArray(vertex_array));
    }

    fn draw_triangles(&self, count: i32) {
        let mut state = self.state.borrow_mut();
        state.draw_count += 1;
        state.calls.push(DeviceCall::DrawTriangles(count));
    }

    fn delete_vertex_array(&self, vertex_array: u32, buffer: u32) {
        let mut state = self.state.borrow_mut();
        state.vertex_arrays.remove(&vertex_array);
        state.calls.push(DeviceCall::DeleteVertexArray(vertex_array, buffer));
    }
}
