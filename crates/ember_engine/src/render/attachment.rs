//! Framebuffer attachments
//!
//! An [`Attachment`] is either a texture level or a [`Renderbuffer`]. The
//! owning framebuffer resizes and re-attaches every attachment each time it is
//! allocated.

use crate::foundation::math::{is_positive_size, IVec2};
use crate::instance::{InstanceId, ObjectKind};
use crate::render::context::RenderContext;
use crate::render::texture::{SharedTexture, TextureFormat};
use crate::render::{Allocatable, BackendResult, Bindable, Sizable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Framebuffer attachment point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttachmentLocation {
    /// Color attachment 0
    Color0,
    /// Color attachment 1
    Color1,
    /// Color attachment 2
    Color2,
    /// Color attachment 3
    Color3,
    /// Depth attachment
    Depth,
    /// Stencil attachment
    Stencil,
    /// Combined depth and stencil attachment
    DepthStencil,
}

impl AttachmentLocation {
    /// Color attachment by index
    pub const fn color(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Color0),
            1 => Some(Self::Color1),
            2 => Some(Self::Color2),
            3 => Some(Self::Color3),
            _ => None,
        }
    }

    /// Whether this is a color attachment point
    pub const fn is_color(self) -> bool {
        matches!(self, Self::Color0 | Self::Color1 | Self::Color2 | Self::Color3)
    }
}

/// What [`Renderer::make_attachment`](crate::render::Renderer::make_attachment) creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttachmentKind {
    /// A 2D texture that can be sampled later
    #[default]
    Texture,
    /// A renderbuffer that is only rendered into
    Renderbuffer,
}

/// Creation parameters of an attachment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttachmentConfig {
    /// Registry name
    pub name: String,
    /// Backing storage kind
    pub kind: AttachmentKind,
    /// Pixel format
    pub format: TextureFormat,
    /// Initial size; the framebuffer overrides it on allocation
    pub size: IVec2,
    /// Texture level rendered into
    pub mip_level: i32,
}

/// Renderbuffer storage
pub struct Renderbuffer {
    context: Rc<RenderContext>,
    id: InstanceId,
    format: TextureFormat,
    size: IVec2,
    reference: u32,
}

impl Renderbuffer {
    pub(crate) fn new(context: Rc<RenderContext>, name: &str, format: TextureFormat, size: IVec2) -> Self {
        let id = context.issue_instance(ObjectKind::Renderbuffer, name);
        Self {
            context,
            id,
            format,
            size,
            reference: 0,
        }
    }

    /// Pixel format
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    fn storage(&self) {
        if self.reference != 0 && is_positive_size(self.size) {
            self.context
                .device()
                .renderbuffer_storage(self.reference, self.format.layout().internal, self.size);
        }
    }
}

impl Bindable for Renderbuffer {
    // Renderbuffers are only ever bound implicitly when attached.
    fn bind(&self) {}

    fn unbind(&self) {}

    fn reference(&self) -> u32 {
        self.reference
    }
}

impl Allocatable for Renderbuffer {
    fn alloc(&mut self) -> BackendResult<()> {
        if self.reference == 0 {
            self.reference = self.context.device().create_renderbuffer()?;
        }
        self.storage();
        Ok(())
    }

    fn dealloc(&mut self) {
        if self.reference != 0 {
            self.context.device().delete_renderbuffer(self.reference);
            self.reference = 0;
        }
    }

    fn id(&self) -> InstanceId {
        self.id
    }
}

impl Sizable for Renderbuffer {
    fn size(&self) -> IVec2 {
        self.size
    }

    fn set_size(&mut self, size: IVec2) -> BackendResult<()> {
        if is_positive_size(size) {
            self.size = size;
            self.storage();
        }
        Ok(())
    }
}

impl Drop for Renderbuffer {
    fn drop(&mut self) {
        self.dealloc();
        self.context.release_instance(self.id);
    }
}

impl fmt::Debug for Renderbuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderbuffer")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("size", &self.size)
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

/// Storage bound to a framebuffer attachment point
#[derive(Debug)]
pub enum Attachment {
    /// A texture level
    Texture {
        /// Shared texture, readable after rendering
        texture: SharedTexture,
        /// Level rendered into
        mip_level: i32,
    },
    /// A renderbuffer owned by the attachment
    Renderbuffer(Renderbuffer),
}

impl Attachment {
    /// Attachment rendering into level 0 of a texture
    pub fn from_texture(texture: SharedTexture) -> Self {
        Self::Texture { texture, mip_level: 0 }
    }

    /// The texture, for texture attachments
    pub fn texture(&self) -> Option<&SharedTexture> {
        match self {
            Self::Texture { texture, .. } => Some(texture),
            Self::Renderbuffer(_) => None,
        }
    }

    /// Current size of the backing storage
    pub fn size(&self) -> IVec2 {
        match self {
            Self::Texture { texture, .. } => texture.borrow().size(),
            Self::Renderbuffer(renderbuffer) => renderbuffer.size(),
        }
    }

    /// Resize and make sure GPU storage exists
    pub(crate) fn prepare(&mut self, size: IVec2) -> BackendResult<()> {
        match self {
            Self::Texture { texture, .. } => {
                let mut texture = texture.borrow_mut();
                if texture.allocated() {
                    texture.set_size(size)
                } else {
                    texture.set_size(size)?;
                    texture.alloc()
                }
            }
            Self::Renderbuffer(renderbuffer) => {
                renderbuffer.set_size(size)?;
                renderbuffer.alloc()
            }
        }
    }

    /// Attach to the currently bound framebuffer
    pub(crate) fn attach(&self, context: &RenderContext, location: AttachmentLocation) {
        let device = context.device();
        match self {
            Self::Texture { texture, mip_level } => {
                let texture = texture.borrow();
                device.attach_texture(location, texture.kind().target(), texture.reference(), *mip_level);
            }
            Self::Renderbuffer(renderbuffer) => device.attach_renderbuffer(location, renderbuffer.reference()),
        }
    }
}
