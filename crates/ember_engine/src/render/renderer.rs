//! Renderer factory
//!
//! The [`Renderer`] is the only way to create render objects. It picks the
//! device at construction, wraps it in a shared [`RenderContext`], and hands
//! that context to every object it makes so the instance registry sees every
//! live resource.

use crate::foundation::math::IVec2;
use crate::render::attachment::{Attachment, AttachmentConfig, AttachmentKind, AttachmentLocation, Renderbuffer};
use crate::render::context::RenderContext;
use crate::render::device::mock::MockDevice;
use crate::render::device::{GraphicsDevice, NativeWindow};
use crate::render::framebuffer::{Framebuffer, GBuffer};
use crate::render::mesh::Mesh;
use crate::render::shader::Shader;
use crate::render::texture::{SharedTexture, Texture, TextureConfig, TextureFormat};
use crate::render::{Allocatable, BackendKind, BackendResult, Bindable, Drawable, RenderError};
use crate::scene::camera::Camera;
use std::cell::RefCell;
use std::rc::Rc;

/// Resolution assumed until a window reports its own
pub const DEFAULT_RESOLUTION: (i32, i32) = (1280, 720);

/// Render object factory and frame bracket
#[derive(Debug)]
pub struct Renderer {
    context: Rc<RenderContext>,
    initialized: bool,
}

impl Renderer {
    /// Create a renderer for the requested backend
    pub fn new(kind: BackendKind) -> BackendResult<Self> {
        match kind {
            BackendKind::Mock => Ok(Self::with_device(Rc::new(MockDevice::new()))),
            #[cfg(feature = "gl")]
            BackendKind::Gl => Ok(Self::with_device(Rc::new(crate::render::device::gl::GlDevice::new()))),
            #[cfg(not(feature = "gl"))]
            BackendKind::Gl => Err(RenderError::BackendUnavailable(
                "OpenGL support requires the `gl` feature".to_string(),
            )),
        }
    }

    /// Create a renderer around an existing device
    pub fn with_device(device: Rc<dyn GraphicsDevice>) -> Self {
        let resolution = IVec2::new(DEFAULT_RESOLUTION.0, DEFAULT_RESOLUTION.1);
        log::info!("Creating renderer on the {} backend", device.backend_name());
        Self {
            context: Rc::new(RenderContext::new(device, resolution)),
            initialized: false,
        }
    }

    /// Create a renderer on a fresh mock device, returning the device for inspection
    pub fn mock() -> (Self, Rc<MockDevice>) {
        let device = Rc::new(MockDevice::new());
        (Self::with_device(device.clone()), device)
    }

    /// Shared context handed to render objects
    pub fn context(&self) -> &Rc<RenderContext> {
        &self.context
    }

    /// Name of the active backend
    pub fn backend_name(&self) -> &'static str {
        self.context.device().backend_name()
    }

    /// Whether [`Renderer::init`] succeeded
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// Bind the device to a window and adopt its resolution
    pub fn init(&mut self, window: &mut dyn NativeWindow) -> BackendResult<()> {
        self.context.device().init(window)?;
        self.context.set_resolution(window.framebuffer_size());
        self.initialized = true;
        log::info!(
            "Renderer initialized ({}, {}x{})",
            self.backend_name(),
            self.resolution().x,
            self.resolution().y
        );
        Ok(())
    }

    /// Forget every registered instance and release device state
    pub fn destroy(&mut self) {
        if !self.initialized {
            return;
        }
        let live = self.context.instances().len();
        if live > 0 {
            log::debug!("Releasing {} live render instances", live);
        }
        self.context.instances_mut().release_all();
        self.context.device().destroy();
        self.initialized = false;
    }

    /// Begin a frame
    pub fn begin(&self) {
        self.context.device().begin_frame();
    }

    /// End a frame
    pub fn end(&self) {
        self.context.device().end_frame();
    }

    /// Window resolution
    pub fn resolution(&self) -> IVec2 {
        self.context.resolution()
    }

    /// Update the window resolution
    pub fn set_resolution(&self, resolution: IVec2) {
        self.context.set_resolution(resolution);
    }

    /// Bind any render object
    pub fn bind(&self, object: &dyn Bindable) {
        object.bind();
    }

    /// Unbind any render object
    pub fn unbind(&self, object: &dyn Bindable) {
        object.unbind();
    }

    /// Draw any drawable object
    pub fn draw(&self, object: &dyn Drawable) {
        object.draw();
    }

    /// Allocate any render object
    pub fn alloc(&self, object: &mut dyn Allocatable) -> BackendResult<()> {
        object.alloc()
    }

    /// Deallocate any render object
    pub fn dealloc(&self, object: &mut dyn Allocatable) {
        object.dealloc();
    }

    /// Create an empty shader
    pub fn make_shader(&self, deferred: bool) -> Shader {
        Shader::new(self.context.clone(), deferred)
    }

    /// Create an unallocated texture
    pub fn make_texture(&self, config: &TextureConfig) -> Texture {
        Texture::new(self.context.clone(), config)
    }

    /// Create an unallocated texture behind a shared handle
    pub fn make_shared_texture(&self, config: &TextureConfig) -> SharedTexture {
        Rc::new(RefCell::new(self.make_texture(config)))
    }

    /// Create an unallocated attachment
    pub fn make_attachment(&self, config: &AttachmentConfig) -> Attachment {
        match config.kind {
            AttachmentKind::Texture => {
                let texture = self.make_shared_texture(&TextureConfig {
                    format: config.format,
                    size: config.size,
                    name: config.name.clone(),
                    ..Default::default()
                });
                Attachment::Texture {
                    texture,
                    mip_level: config.mip_level,
                }
            }
            AttachmentKind::Renderbuffer => Attachment::Renderbuffer(Renderbuffer::new(
                self.context.clone(),
                &config.name,
                config.format,
                config.size,
            )),
        }
    }

    /// Create an unallocated framebuffer without attachments
    pub fn make_framebuffer(&self, size: IVec2) -> Framebuffer {
        Framebuffer::new(self.context.clone(), size)
    }

    /// Create and allocate a G-buffer with three color attachments and the given depth
    pub fn make_gbuffer(&self, size: IVec2, depth: Attachment, hdr: bool) -> BackendResult<GBuffer> {
        let format = if hdr {
            TextureFormat::DefaultHdrColor
        } else {
            TextureFormat::DefaultColor
        };

        let mut framebuffer = self.make_framebuffer(size);
        framebuffer.set_name("gbuffer");
        let mut draw_buffers = Vec::with_capacity(GBuffer::COLOR_ATTACHMENTS);
        for index in 0..GBuffer::COLOR_ATTACHMENTS {
            let Some(location) = AttachmentLocation::color(index) else {
                break;
            };
            let color = self.make_attachment(&AttachmentConfig {
                name: format!("gbuffer color{index}"),
                format,
                size,
                ..Default::default()
            });
            framebuffer.set_attachment(location, color);
            draw_buffers.push(location);
        }
        framebuffer.set_draw_buffers(draw_buffers);

        let depth_location = match depth_format(&depth) {
            Some(TextureFormat::Depth24Stencil8) => AttachmentLocation::DepthStencil,
            Some(TextureFormat::Stencil8) => AttachmentLocation::Stencil,
            _ => AttachmentLocation::Depth,
        };
        framebuffer.set_attachment(depth_location, depth);

        let mut gbuffer = GBuffer::new(framebuffer, hdr);
        gbuffer.alloc()?;
        Ok(gbuffer)
    }

    /// Create an empty mesh
    pub fn make_mesh(&self) -> Mesh {
        Mesh::new(self.context.clone())
    }

    /// Create a forward-path camera rendering to the window
    pub fn make_camera(&self) -> Camera {
        Camera::new()
    }
}

fn depth_format(attachment: &Attachment) -> Option<TextureFormat> {
    match attachment {
        Attachment::Texture { texture, .. } => Some(texture.borrow().format()),
        Attachment::Renderbuffer(renderbuffer) => Some(renderbuffer.format()),
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::ObjectKind;
    use crate::render::device::mock::DeviceCall;

    struct FakeWindow(IVec2);

    impl NativeWindow for FakeWindow {
        fn framebuffer_size(&self) -> IVec2 {
            self.0
        }

        fn get_proc_address(&mut self, _symbol: &str) -> *const std::ffi::c_void {
            std::ptr::null()
        }
    }

    #[test]
    fn test_mock_backend_by_kind() {
        let renderer = Renderer::new(BackendKind::Mock).unwrap();
        assert_eq!(renderer.backend_name(), "mock");
    }

    #[cfg(not(feature = "gl"))]
    #[test]
    fn test_gl_unavailable_without_feature() {
        assert!(matches!(
            Renderer::new(BackendKind::Gl),
            Err(RenderError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_init_adopts_window_resolution() {
        let (mut renderer, device) = Renderer::mock();
        renderer.init(&mut FakeWindow(IVec2::new(640, 480))).unwrap();

        assert!(renderer.initialized());
        assert!(device.initialized());
        assert_eq!(renderer.resolution(), IVec2::new(640, 480));
        assert_eq!(device.viewport_size(), IVec2::new(640, 480));
    }

    #[test]
    fn test_factory_registers_every_object() {
        let (renderer, _device) = Renderer::mock();
        let shader = renderer.make_shader(false);
        let mesh = renderer.make_mesh();
        let framebuffer = renderer.make_framebuffer(IVec2::new(4, 4));

        let instances = renderer.context().instances();
        assert_eq!(instances.len(), 3);
        assert_eq!(instances.get(shader.id()).unwrap().kind, ObjectKind::Shader);
        assert_eq!(instances.get(mesh.id()).unwrap().kind, ObjectKind::Mesh);
        assert_eq!(instances.get(framebuffer.id()).unwrap().kind, ObjectKind::Framebuffer);
    }

    #[test]
    fn test_destroy_releases_all_instances() {
        let (mut renderer, device) = Renderer::mock();
        renderer.init(&mut FakeWindow(IVec2::new(8, 8))).unwrap();
        let _texture = renderer.make_texture(&TextureConfig::default());
        renderer.destroy();

        assert!(renderer.context().instances().is_empty());
        assert!(device.calls().contains(&DeviceCall::Destroy));
    }

    #[test]
    fn test_frame_bracket() {
        let (renderer, device) = Renderer::mock();
        renderer.begin();
        renderer.end();
        assert_eq!(device.calls(), vec![DeviceCall::BeginFrame, DeviceCall::EndFrame]);
    }

    #[test]
    fn test_gbuffer_with_depth_stencil_texture() {
        let (renderer, _device) = Renderer::mock();
        let depth = renderer.make_attachment(&AttachmentConfig {
            format: TextureFormat::Depth24Stencil8,
            ..Default::default()
        });
        let gbuffer = renderer.make_gbuffer(IVec2::new(16, 16), depth, false).unwrap();

        assert!(gbuffer.framebuffer().attachment(AttachmentLocation::DepthStencil).is_some());
        assert_eq!(
            gbuffer.color_texture(1).unwrap().borrow().format(),
            TextureFormat::DefaultColor
        );
    }
}
