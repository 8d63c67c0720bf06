//! Framebuffers and the framebuffer stack
//!
//! Binding a framebuffer pushes it onto the stack held by the
//! [`RenderContext`]; unbinding the top pops it and re-binds whatever is
//! below, or the default backbuffer with a viewport matching the window.
//! Nested binds therefore restore correctly:
//!
//! ```text
//! a.bind();   // [a]      viewport = a.size
//! b.bind();   // [a, b]   viewport = b.size
//! b.unbind(); // [a]      viewport = a.size
//! a.unbind(); // []       viewport = window resolution
//! ```

use crate::foundation::math::{is_positive_size, IVec2, Vec4};
use crate::instance::{InstanceId, ObjectKind};
use crate::render::attachment::{Attachment, AttachmentLocation};
use crate::render::context::{RenderContext, StackEntry};
use crate::render::device::{Blit, ClearFlags, Filter, FramebufferStatus, TextureTarget};
use crate::render::texture::{SharedTexture, Texture};
use crate::render::{Allocatable, BackendResult, Bindable, RenderError, Sizable};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Framebuffer object
pub struct Framebuffer {
    context: Rc<RenderContext>,
    id: InstanceId,
    name: String,
    size: IVec2,
    reference: u32,
    attachments: BTreeMap<AttachmentLocation, Attachment>,
    draw_buffers: Vec<AttachmentLocation>,
    clear_flags: ClearFlags,
    clear_color: Vec4,
}

impl Framebuffer {
    pub(crate) fn new(context: Rc<RenderContext>, size: IVec2) -> Self {
        let id = context.issue_instance(ObjectKind::Framebuffer, "");
        Self {
            context,
            id,
            name: String::new(),
            size,
            reference: 0,
            attachments: BTreeMap::new(),
            draw_buffers: Vec::new(),
            clear_flags: ClearFlags::COLOR | ClearFlags::DEPTH,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }

    /// Registry name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename, keeping the registry record in sync
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.context.rename_instance(self.id, &self.name);
    }

    /// Place an attachment, returning the one it replaces
    ///
    /// Takes effect on the next [`Allocatable::alloc`].
    pub fn set_attachment(&mut self, location: AttachmentLocation, attachment: Attachment) -> Option<Attachment> {
        self.attachments.insert(location, attachment)
    }

    /// Remove an attachment
    pub fn remove_attachment(&mut self, location: AttachmentLocation) -> Option<Attachment> {
        self.attachments.remove(&location)
    }

    /// Attachment at a location
    pub fn attachment(&self, location: AttachmentLocation) -> Option<&Attachment> {
        self.attachments.get(&location)
    }

    /// Texture behind a texture attachment
    pub fn texture(&self, location: AttachmentLocation) -> Option<SharedTexture> {
        self.attachment(location).and_then(Attachment::texture).cloned()
    }

    /// Select draw buffers applied on allocation
    pub fn set_draw_buffers(&mut self, locations: Vec<AttachmentLocation>) {
        self.draw_buffers = locations;
    }

    /// Selected draw buffers
    pub fn draw_buffers(&self) -> &[AttachmentLocation] {
        &self.draw_buffers
    }

    /// Buffers cleared by [`Framebuffer::clear_buffers`]
    pub fn clear_flags(&self) -> ClearFlags {
        self.clear_flags
    }

    /// Choose the buffers cleared by [`Framebuffer::clear_buffers`]
    pub fn set_clear_flags(&mut self, flags: ClearFlags) {
        self.clear_flags = flags;
    }

    /// Set the clear color
    pub fn set_clear_color(&mut self, color: Vec4) {
        self.clear_color = color;
    }

    /// Clear the selected buffers of the bound framebuffer
    pub fn clear_buffers(&self) {
        let device = self.context.device();
        device.clear_color(self.clear_color);
        device.clear(self.clear_flags);
    }

    /// Whether this framebuffer is the top of the stack
    pub fn is_bound(&self) -> bool {
        self.context
            .current_framebuffer()
            .is_some_and(|entry| entry.id == self.id)
    }

    /// Check size and completeness without changing the binding state
    pub fn validate(&self) -> BackendResult<()> {
        self.check_size()?;
        self.raw_bind();
        let result = self.check_status();
        self.context.bind_current_framebuffer();
        result
    }

    /// Render into one face of a cubemap through color attachment 0
    ///
    /// The framebuffer must be bound. Pass `None` to detach.
    pub fn attach_cubemap_face(&self, cubemap: Option<&Texture>, face: u8, level: i32) {
        let (target, reference) = match cubemap {
            Some(texture) => (TextureTarget::CubemapFace(face), texture.reference()),
            None => (TextureTarget::Texture2D, 0),
        };
        self.context
            .device()
            .attach_texture(AttachmentLocation::Color0, target, reference, level);
    }

    fn raw_bind(&self) {
        let device = self.context.device();
        device.bind_framebuffer(self.reference);
        device.viewport(self.size);
    }

    fn check_size(&self) -> BackendResult<()> {
        if is_positive_size(self.size) {
            Ok(())
        } else {
            Err(RenderError::InvalidFramebufferSize(self.id, self.size.x, self.size.y))
        }
    }

    fn check_status(&self) -> BackendResult<()> {
        self.check_size()?;
        match self.context.device().framebuffer_status() {
            FramebufferStatus::Complete => Ok(()),
            status => Err(RenderError::IncompleteFramebuffer {
                framebuffer: self.id,
                status,
            }),
        }
    }

    fn attach_all(&mut self) -> BackendResult<()> {
        for (location, attachment) in &mut self.attachments {
            attachment.prepare(self.size)?;
            attachment.attach(&self.context, *location);
        }
        if !self.draw_buffers.is_empty() {
            self.context.device().draw_buffers(&self.draw_buffers);
        }
        self.check_status()
    }
}

impl Bindable for Framebuffer {
    fn bind(&self) {
        if let Some(previous) = self.context.current_framebuffer() {
            log::trace!("Framebuffer {} covers framebuffer {}", self.id, previous.id);
        }
        self.context.push_framebuffer(StackEntry {
            id: self.id,
            reference: self.reference,
            size: self.size,
        });
        self.raw_bind();
    }

    fn unbind(&self) {
        if self.is_bound() {
            self.context.pop_framebuffer();
        } else {
            log::debug!("Unbinding framebuffer {} which is not current", self.id);
        }
        self.context.bind_current_framebuffer();
    }

    fn reference(&self) -> u32 {
        self.reference
    }
}

impl Allocatable for Framebuffer {
    fn alloc(&mut self) -> BackendResult<()> {
        if self.reference == 0 {
            self.reference = self.context.device().create_framebuffer()?;
            self.context.rereference_stacked(self.id, self.reference);
        }
        self.raw_bind();
        let result = self.attach_all();
        self.context.bind_current_framebuffer();

        if let Err(err) = &result {
            log::error!("Framebuffer {} allocation failed: {}", self.id, err);
        }
        result
    }

    fn dealloc(&mut self) {
        if self.reference == 0 {
            return;
        }
        if self.context.remove_stacked(self.id) {
            self.context.bind_current_framebuffer();
        }
        for attachment in self.attachments.values_mut() {
            if let Attachment::Renderbuffer(renderbuffer) = attachment {
                renderbuffer.dealloc();
            }
        }
        self.context.device().delete_framebuffer(self.reference);
        self.reference = 0;
    }

    fn id(&self) -> InstanceId {
        self.id
    }
}

impl Sizable for Framebuffer {
    fn size(&self) -> IVec2 {
        self.size
    }

    fn set_size(&mut self, size: IVec2) -> BackendResult<()> {
        if !is_positive_size(size) {
            return Ok(());
        }
        self.size = size;
        self.context.resize_stacked(self.id, size);
        self.alloc()
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.dealloc();
        self.context.release_instance(self.id);
    }
}

impl fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framebuffer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("reference", &self.reference)
            .field("attachments", &self.attachments.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Copy a color attachment onto another framebuffer or the backbuffer
///
/// The full source extent is scaled onto the full destination extent, with a
/// linear filter when the two differ. `dst == None` targets the window. The
/// binding that was current before the copy is restored afterwards.
pub fn blit_framebuffers(src: &Framebuffer, dst: Option<&Framebuffer>, location: AttachmentLocation) -> BackendResult<()> {
    let context = &src.context;
    let (destination, destination_size) = match dst {
        Some(framebuffer) => (framebuffer.reference, framebuffer.size),
        None => (0, context.resolution()),
    };
    let filter = if src.size == destination_size {
        Filter::Nearest
    } else {
        Filter::Linear
    };

    let result = context.device().blit(&Blit {
        source: src.reference,
        destination,
        location,
        source_size: src.size,
        destination_size,
        filter,
    });
    context.bind_current_framebuffer();
    result
}

/// Geometry buffer used by the deferred path
#[derive(Debug)]
pub struct GBuffer {
    framebuffer: Framebuffer,
    hdr: bool,
}

impl GBuffer {
    /// Number of color attachments
    pub const COLOR_ATTACHMENTS: usize = 3;

    pub(crate) const fn new(framebuffer: Framebuffer, hdr: bool) -> Self {
        Self { framebuffer, hdr }
    }

    /// Whether the color attachments use the HDR format
    pub const fn hdr(&self) -> bool {
        self.hdr
    }

    /// The underlying framebuffer
    pub const fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Mutable access to the underlying framebuffer
    pub fn framebuffer_mut(&mut self) -> &mut Framebuffer {
        &mut self.framebuffer
    }

    /// Color texture by index
    pub fn color_texture(&self, index: usize) -> Option<SharedTexture> {
        AttachmentLocation::color(index).and_then(|location| self.framebuffer.texture(location))
    }
}

impl Bindable for GBuffer {
    fn bind(&self) {
        self.framebuffer.bind();
    }

    fn unbind(&self) {
        self.framebuffer.unbind();
    }

    fn reference(&self) -> u32 {
        self.framebuffer.reference()
    }
}

impl Allocatable for GBuffer {
    fn alloc(&mut self) -> BackendResult<()> {
        self.framebuffer.alloc()
    }

    fn dealloc(&mut self) {
        self.framebuffer.dealloc();
    }

    fn id(&self) -> InstanceId {
        self.framebuffer.id()
    }
}

impl Sizable for GBuffer {
    fn size(&self) -> IVec2 {
        self.framebuffer.size()
    }

    fn set_size(&mut self, size: IVec2) -> BackendResult<()> {
        self.framebuffer.set_size(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::attachment::{AttachmentConfig, AttachmentKind};
    use crate::render::device::mock::{DeviceCall, MockDevice};
    use crate::render::texture::TextureFormat;
    use crate::render::Renderer;

    fn color_framebuffer(renderer: &Renderer, size: IVec2) -> Framebuffer {
        let mut framebuffer = renderer.make_framebuffer(size);
        let color = renderer.make_attachment(&AttachmentConfig {
            format: TextureFormat::Rgba8,
            ..Default::default()
        });
        framebuffer.set_attachment(AttachmentLocation::Color0, color);
        framebuffer.set_draw_buffers(vec![AttachmentLocation::Color0]);
        framebuffer.alloc().unwrap();
        framebuffer
    }

    fn assert_binding(device: &MockDevice, framebuffer: u32, viewport: IVec2) {
        assert_eq!(device.bound_framebuffer(), framebuffer);
        assert_eq!(device.viewport_size(), viewport);
    }

    #[test]
    fn test_nested_bind_restores_previous() {
        let (renderer, device) = Renderer::mock();
        let a = color_framebuffer(&renderer, IVec2::new(64, 64));
        let b = color_framebuffer(&renderer, IVec2::new(32, 16));

        a.bind();
        b.bind();
        assert_binding(&device, b.reference(), IVec2::new(32, 16));

        b.unbind();
        assert!(a.is_bound());
        assert_binding(&device, a.reference(), IVec2::new(64, 64));

        a.unbind();
        assert_eq!(renderer.context().framebuffer_depth(), 0);
        assert_binding(&device, 0, renderer.resolution());
    }

    #[test]
    fn test_unbind_of_covered_framebuffer_keeps_stack() {
        let (renderer, device) = Renderer::mock();
        let a = color_framebuffer(&renderer, IVec2::new(64, 64));
        let b = color_framebuffer(&renderer, IVec2::new(32, 32));
        a.bind();
        b.bind();

        a.unbind();
        assert_eq!(renderer.context().framebuffer_depth(), 2);
        assert_binding(&device, b.reference(), IVec2::new(32, 32));
    }

    #[test]
    fn test_alloc_without_attachments_fails_and_restores_binding() {
        let (renderer, device) = Renderer::mock();
        let outer = color_framebuffer(&renderer, IVec2::new(10, 10));
        outer.bind();

        let mut empty = renderer.make_framebuffer(IVec2::new(8, 8));
        let err = empty.alloc().unwrap_err();
        assert!(matches!(
            err,
            RenderError::IncompleteFramebuffer {
                status: FramebufferStatus::MissingAttachment,
                ..
            }
        ));
        assert!(err.to_string().contains("missing attachment"));
        assert_binding(&device, outer.reference(), IVec2::new(10, 10));
    }

    #[test]
    fn test_alloc_after_bind_keeps_framebuffer_current() {
        let (renderer, device) = Renderer::mock();
        let mut framebuffer = renderer.make_framebuffer(IVec2::new(12, 12));
        framebuffer.set_attachment(
            AttachmentLocation::Color0,
            renderer.make_attachment(&AttachmentConfig {
                format: TextureFormat::Rgba8,
                ..Default::default()
            }),
        );
        framebuffer.bind();
        assert_eq!(renderer.context().framebuffer_stack(), [0]);

        framebuffer.alloc().unwrap();
        assert_ne!(framebuffer.reference(), 0);
        assert_eq!(renderer.context().framebuffer_stack(), [framebuffer.reference()]);
        assert_binding(&device, framebuffer.reference(), IVec2::new(12, 12));

        framebuffer.unbind();
        assert_binding(&device, 0, renderer.resolution());
    }

    #[test]
    fn test_validate_rejects_non_positive_size_first() {
        let (renderer, device) = Renderer::mock();
        let framebuffer = renderer.make_framebuffer(IVec2::new(0, 4));
        device.clear_calls();

        assert!(matches!(framebuffer.validate(), Err(RenderError::InvalidFramebufferSize(_, 0, 4))));
        assert!(!device.calls().contains(&DeviceCall::FramebufferStatus));
    }

    #[test]
    fn test_set_size_ignores_non_positive() {
        let (renderer, _device) = Renderer::mock();
        let mut framebuffer = color_framebuffer(&renderer, IVec2::new(16, 16));
        framebuffer.set_size(IVec2::new(-1, 20)).unwrap();
        assert_eq!(framebuffer.size(), IVec2::new(16, 16));
    }

    #[test]
    fn test_set_size_resizes_attachments_and_bound_viewport() {
        let (renderer, device) = Renderer::mock();
        let mut framebuffer = color_framebuffer(&renderer, IVec2::new(16, 16));
        framebuffer.bind();
        framebuffer.set_size(IVec2::new(40, 20)).unwrap();

        let texture = framebuffer.texture(AttachmentLocation::Color0).unwrap();
        assert_eq!(texture.borrow().size(), IVec2::new(40, 20));
        assert_binding(&device, framebuffer.reference(), IVec2::new(40, 20));
    }

    #[test]
    fn test_renderbuffer_depth_attachment() {
        let (renderer, _device) = Renderer::mock();
        let mut framebuffer = renderer.make_framebuffer(IVec2::new(16, 16));
        let depth = renderer.make_attachment(&AttachmentConfig {
            kind: AttachmentKind::Renderbuffer,
            format: TextureFormat::DefaultDepth,
            ..Default::default()
        });
        framebuffer.set_attachment(AttachmentLocation::Depth, depth);
        framebuffer.alloc().unwrap();
        assert_eq!(
            framebuffer.attachment(AttachmentLocation::Depth).map(Attachment::size),
            Some(IVec2::new(16, 16))
        );
    }

    #[test]
    fn test_blit_to_window_restores_binding() {
        let (renderer, device) = Renderer::mock();
        let source = color_framebuffer(&renderer, IVec2::new(320, 240));
        let target = color_framebuffer(&renderer, IVec2::new(64, 64));
        target.bind();

        blit_framebuffers(&source, None, AttachmentLocation::Color0).unwrap();
        let blit = device
            .calls()
            .into_iter()
            .find_map(|call| match call {
                DeviceCall::Blit(blit) => Some(blit),
                _ => None,
            })
            .unwrap();

        assert_eq!(blit.destination, 0);
        assert_eq!(blit.destination_size, renderer.resolution());
        assert_eq!(blit.filter, Filter::Linear);
        assert_binding(&device, target.reference(), IVec2::new(64, 64));
    }

    #[test]
    fn test_blit_same_size_uses_nearest() {
        let (renderer, device) = Renderer::mock();
        let a = color_framebuffer(&renderer, IVec2::new(32, 32));
        let b = color_framebuffer(&renderer, IVec2::new(32, 32));
        blit_framebuffers(&a, Some(&b), AttachmentLocation::Color0).unwrap();

        assert!(device.calls().iter().any(|call| matches!(
            call,
            DeviceCall::Blit(Blit { filter: Filter::Nearest, .. })
        )));
        assert_binding(&device, 0, renderer.resolution());
    }

    #[test]
    fn test_dealloc_removes_from_stack() {
        let (renderer, device) = Renderer::mock();
        let outer = color_framebuffer(&renderer, IVec2::new(10, 10));
        let mut inner = color_framebuffer(&renderer, IVec2::new(20, 20));
        outer.bind();
        inner.bind();
        inner.dealloc();

        assert_eq!(renderer.context().framebuffer_depth(), 1);
        assert_binding(&device, outer.reference(), IVec2::new(10, 10));
    }

    #[test]
    fn test_gbuffer_layout() {
        let (renderer, _device) = Renderer::mock();
        let depth = renderer.make_attachment(&AttachmentConfig {
            kind: AttachmentKind::Renderbuffer,
            format: TextureFormat::DefaultDepth,
            ..Default::default()
        });
        let gbuffer = renderer.make_gbuffer(IVec2::new(128, 72), depth, true).unwrap();

        assert!(gbuffer.hdr());
        assert_eq!(gbuffer.framebuffer().draw_buffers().len(), GBuffer::COLOR_ATTACHMENTS);
        let albedo = gbuffer.color_texture(0).unwrap();
        assert_eq!(albedo.borrow().format(), TextureFormat::DefaultHdrColor);
        assert_eq!(albedo.borrow().size(), IVec2::new(128, 72));
        assert!(gbuffer.color_texture(3).is_none());
    }
}
