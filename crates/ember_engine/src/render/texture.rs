//! Textures and the texture format table
//!
//! [`TextureFormat`] is the closed set of semantic pixel formats. Every format
//! maps to exactly one [`FormatLayout`] (storage format, upload format,
//! component type), and that layout is used for every allocation, resize and
//! re-upload. Nothing is inferred from the uploaded bytes.

use crate::foundation::math::{is_positive_size, IVec2, Vec4};
use crate::instance::{InstanceId, ObjectKind};
use crate::render::context::RenderContext;
use crate::render::device::{Filter, Sampling, TextureTarget, TextureUpload, Wrap};
use crate::render::{Allocatable, BackendResult, Bindable, Sizable};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Texture shared between materials, attachments and asset caches
pub type SharedTexture = Rc<RefCell<Texture>>;

/// Semantic pixel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureFormat {
    /// Alias of `Rgba8`
    #[default]
    DefaultColor,
    /// Alias of `Rgba16`
    DefaultHdrColor,
    /// Alias of `Depth24`
    DefaultDepth,
    /// 1 channel, 8 bit
    R8,
    /// 2 channels, 8 bit
    Rg8,
    /// 3 channels, 8 bit
    Rgb8,
    /// 4 channels, 8 bit
    Rgba8,
    /// 1 channel, 16 bit float
    R16,
    /// 2 channels, 16 bit float
    Rg16,
    /// 3 channels, 16 bit float
    Rgb16,
    /// 4 channels, 16 bit float
    Rgba16,
    /// 4 channels, 16 bit unsigned integer
    Rgba16Ui,
    /// 1 channel, 32 bit float
    R32,
    /// 2 channels, 32 bit float
    Rg32,
    /// 3 channels, 32 bit float
    Rgb32,
    /// 4 channels, 32 bit float
    Rgba32,
    /// 3 channels, 32 bit unsigned integer
    Rgb32Ui,
    /// 4 channels, 32 bit unsigned integer
    Rgba32Ui,
    /// 16 bit depth
    Depth16,
    /// 24 bit depth
    Depth24,
    /// 24 bit depth with 8 bit stencil
    Depth24Stencil8,
    /// 8 bit stencil
    Stencil8,
}

/// Device storage format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum InternalFormat {
    R8,
    Rg8,
    Rgb8,
    Rgba8,
    R16F,
    Rg16F,
    Rgb16F,
    Rgba16F,
    Rgba16Ui,
    R32F,
    Rg32F,
    Rgb32F,
    Rgba32F,
    Rgb32Ui,
    Rgba32Ui,
    Depth16,
    Depth24,
    Depth24Stencil8,
    Stencil8,
}

/// Channel layout of uploaded data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum PixelFormat {
    Red,
    Rg,
    Rgb,
    Rgba,
    RgbInteger,
    RgbaInteger,
    DepthComponent,
    DepthStencil,
    StencilIndex,
}

/// Per-component type of uploaded data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ComponentType {
    UnsignedByte,
    UnsignedShort,
    UnsignedInt,
    HalfFloat,
    Float,
    UnsignedInt24_8,
}

/// Storage format, upload format and component type of a [`TextureFormat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatLayout {
    /// Storage format
    pub internal: InternalFormat,
    /// Upload channel layout
    pub pixel: PixelFormat,
    /// Upload component type
    pub component: ComponentType,
}

impl TextureFormat {
    /// Device layout of this format
    pub const fn layout(self) -> FormatLayout {
        use ComponentType as C;
        use InternalFormat as I;
        use PixelFormat as P;

        let (internal, pixel, component) = match self {
            Self::DefaultColor | Self::Rgba8 => (I::Rgba8, P::Rgba, C::UnsignedByte),
            Self::DefaultHdrColor | Self::Rgba16 => (I::Rgba16F, P::Rgba, C::HalfFloat),
            Self::DefaultDepth | Self::Depth24 => (I::Depth24, P::DepthComponent, C::Float),
            Self::R8 => (I::R8, P::Red, C::UnsignedByte),
            Self::Rg8 => (I::Rg8, P::Rg, C::UnsignedByte),
            Self::Rgb8 => (I::Rgb8, P::Rgb, C::UnsignedByte),
            Self::R16 => (I::R16F, P::Red, C::HalfFloat),
            Self::Rg16 => (I::Rg16F, P::Rg, C::HalfFloat),
            Self::Rgb16 => (I::Rgb16F, P::Rgb, C::HalfFloat),
            Self::Rgba16Ui => (I::Rgba16Ui, P::RgbaInteger, C::UnsignedShort),
            Self::R32 => (I::R32F, P::Red, C::Float),
            Self::Rg32 => (I::Rg32F, P::Rg, C::Float),
            Self::Rgb32 => (I::Rgb32F, P::Rgb, C::Float),
            Self::Rgba32 => (I::Rgba32F, P::Rgba, C::Float),
            Self::Rgb32Ui => (I::Rgb32Ui, P::RgbInteger, C::UnsignedInt),
            Self::Rgba32Ui => (I::Rgba32Ui, P::RgbaInteger, C::UnsignedInt),
            Self::Depth16 => (I::Depth16, P::DepthComponent, C::Float),
            Self::Depth24Stencil8 => (I::Depth24Stencil8, P::DepthStencil, C::UnsignedInt24_8),
            Self::Stencil8 => (I::Stencil8, P::StencilIndex, C::UnsignedByte),
        };

        FormatLayout {
            internal,
            pixel,
            component,
        }
    }

    /// Whether the format stores depth and/or stencil
    pub const fn is_depth_or_stencil(self) -> bool {
        matches!(
            self,
            Self::DefaultDepth | Self::Depth16 | Self::Depth24 | Self::Depth24Stencil8 | Self::Stencil8
        )
    }
}

/// Texture kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureType {
    /// 2D image
    #[default]
    Texture2D,
    /// Layered 3D image
    Texture3D,
    /// Six-face cubemap
    TextureCubemap,
    /// 1x1 solid color
    TextureColor,
}

impl TextureType {
    /// Device binding target
    pub const fn target(self) -> TextureTarget {
        match self {
            Self::Texture2D | Self::TextureColor => TextureTarget::Texture2D,
            Self::Texture3D => TextureTarget::Texture3D,
            Self::TextureCubemap => TextureTarget::Cubemap,
        }
    }
}

impl fmt::Display for TextureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Texture2D => "Texture2D",
            Self::Texture3D => "Texture3D",
            Self::TextureCubemap => "TextureCubemap",
            Self::TextureColor => "TextureColor",
        };
        f.write_str(name)
    }
}

/// Creation parameters for [`Renderer::make_texture`](crate::render::Renderer::make_texture)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextureConfig {
    /// Texture kind
    pub kind: TextureType,
    /// Pixel format
    pub format: TextureFormat,
    /// Width and height
    pub size: IVec2,
    /// Depth of 3D textures
    pub layers: i32,
    /// Registry name
    pub name: String,
}

impl TextureConfig {
    /// Config for a 2D texture
    pub fn new_2d(size: IVec2, format: TextureFormat) -> Self {
        Self {
            kind: TextureType::Texture2D,
            format,
            size,
            layers: 1,
            name: String::new(),
        }
    }

    /// Config for a cubemap with square faces
    pub fn new_cubemap(face_size: i32, format: TextureFormat) -> Self {
        Self {
            kind: TextureType::TextureCubemap,
            format,
            size: IVec2::new(face_size, face_size),
            layers: 1,
            name: String::new(),
        }
    }

    /// Set the registry name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// CPU-side texel data kept for re-uploads
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TextureData {
    /// Storage only
    #[default]
    Empty,
    /// 8/16 bit or integer data as raw bytes
    Ldr(Vec<u8>),
    /// Floating point data
    Hdr(Vec<f32>),
}

impl TextureData {
    fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Empty => None,
            Self::Ldr(bytes) => Some(bytes),
            Self::Hdr(floats) => Some(bytemuck::cast_slice(floats)),
        }
    }
}

const CUBEMAP_FACES: usize = 6;

/// Texture object
pub struct Texture {
    context: Rc<RenderContext>,
    id: InstanceId,
    name: String,
    kind: TextureType,
    format: TextureFormat,
    size: IVec2,
    layers: i32,
    reference: u32,
    sampling: Sampling,
    resizable: bool,
    mip_levels: u32,
    data: Vec<TextureData>,
}

impl Texture {
    pub(crate) fn new(context: Rc<RenderContext>, config: &TextureConfig) -> Self {
        let id = context.issue_instance(ObjectKind::Texture, &config.name);
        let faces = if config.kind == TextureType::TextureCubemap { CUBEMAP_FACES } else { 1 };
        let (size, format) = if config.kind == TextureType::TextureColor {
            (IVec2::new(1, 1), TextureFormat::Rgba8)
        } else {
            (config.size, config.format)
        };

        Self {
            context,
            id,
            name: config.name.clone(),
            kind: config.kind,
            format,
            size,
            layers: config.layers.max(1),
            reference: 0,
            sampling: Sampling::default(),
            resizable: true,
            mip_levels: 1,
            data: vec![TextureData::Empty; faces],
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

    /// Texture kind
    pub fn kind(&self) -> TextureType {
        self.kind
    }

    /// Pixel format
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Device layout of the pixel format
    pub fn layout(&self) -> FormatLayout {
        self.format.layout()
    }

    /// Change the pixel format, re-uploading allocated storage
    pub fn set_format(&mut self, format: TextureFormat) {
        self.format = format;
        if self.allocated() {
            self.upload();
        }
    }

    /// Depth of 3D textures
    pub fn layers(&self) -> i32 {
        self.layers
    }

    /// Change the depth of a 3D texture, re-uploading allocated storage
    pub fn set_layers(&mut self, layers: i32) {
        if layers > 0 {
            self.layers = layers;
            if self.allocated() {
                self.upload();
            }
        }
    }

    /// Whether GPU storage exists
    pub fn allocated(&self) -> bool {
        self.reference != 0
    }

    /// Allow or forbid resizing
    pub fn set_resizable(&mut self, resizable: bool) {
        self.resizable = resizable;
    }

    /// Number of mip levels built for this texture
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Filtering and wrapping state
    pub fn sampling(&self) -> Sampling {
        self.sampling
    }

    /// Set minification and magnification filters
    pub fn set_filter(&mut self, min_filter: Filter, mag_filter: Filter) {
        self.sampling.min_filter = min_filter;
        self.sampling.mag_filter = mag_filter;
        self.apply_sampling();
    }

    /// Set wrapping on S, T and R
    pub fn set_wrap(&mut self, wrap: Wrap) {
        self.sampling.wrap = [wrap; 3];
        self.apply_sampling();
    }

    /// Store 8 bit (or integer) texel data; cubemaps receive it on face 0
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data[0] = TextureData::Ldr(data);
    }

    /// Store floating point texel data; cubemaps receive it on face 0
    pub fn set_hdr_data(&mut self, data: Vec<f32>) {
        self.data[0] = TextureData::Hdr(data);
    }

    /// Store texel data for one cubemap face; out of range faces are ignored
    pub fn set_face_data(&mut self, face: usize, data: TextureData) {
        if let Some(slot) = self.data.get_mut(face) {
            *slot = data;
        }
    }

    /// Stored texel data of a face (or of the whole texture for non-cubemaps)
    pub fn data(&self, face: usize) -> Option<&TextureData> {
        self.data.get(face)
    }

    /// Fill a color texture with one RGBA color
    pub fn set_color(&mut self, color: Vec4) {
        let texel: Vec<u8> = color
            .iter()
            .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        self.set_data(texel);
        if self.allocated() {
            self.upload();
        }
    }

    /// Bind this texture on a texture unit
    pub fn activate(&self, unit: u32) {
        let device = self.context.device();
        device.active_texture_unit(unit);
        device.bind_texture(self.kind.target(), self.reference);
    }

    /// Build the full mip chain from level 0
    pub fn generate_mipmaps(&mut self) {
        if !self.allocated() {
            return;
        }
        let target = self.kind.target();
        let device = self.context.device();
        device.bind_texture(target, self.reference);
        device.generate_mipmaps(target);
        device.bind_texture(target, 0);

        let largest = self.size.x.max(self.size.y).max(1).unsigned_abs();
        self.mip_levels = largest.ilog2() + 1;
        self.set_filter(Filter::LinearMipmapLinear, self.sampling.mag_filter);
    }

    /// Re-upload storage and stored texel data
    pub fn upload(&self) {
        let target = self.kind.target();
        let device = self.context.device();
        let layout = self.format.layout();
        device.bind_texture(target, self.reference);

        match self.kind {
            TextureType::TextureCubemap => {
                for (face, data) in self.data.iter().enumerate() {
                    device.upload_texture(&TextureUpload {
                        target: TextureTarget::CubemapFace(face as u8),
                        level: 0,
                        size: self.size,
                        depth: 1,
                        layout,
                        data: data.bytes(),
                    });
                }
            }
            TextureType::Texture3D => device.upload_texture(&TextureUpload {
                target,
                level: 0,
                size: self.size,
                depth: self.layers,
                layout,
                data: self.data[0].bytes(),
            }),
            TextureType::Texture2D | TextureType::TextureColor => device.upload_texture(&TextureUpload {
                target,
                level: 0,
                size: self.size,
                depth: 1,
                layout,
                data: self.data[0].bytes(),
            }),
        }

        device.set_sampling(target, &self.sampling);
        device.bind_texture(target, 0);
    }

    fn apply_sampling(&self) {
        if !self.allocated() {
            return;
        }
        let target = self.kind.target();
        let device = self.context.device();
        device.bind_texture(target, self.reference);
        device.set_sampling(target, &self.sampling);
        device.bind_texture(target, 0);
    }
}

impl Bindable for Texture {
    fn bind(&self) {
        self.context.device().bind_texture(self.kind.target(), self.reference);
    }

    fn unbind(&self) {
        self.context.device().bind_texture(self.kind.target(), 0);
    }

    fn reference(&self) -> u32 {
        self.reference
    }
}

impl Allocatable for Texture {
    fn alloc(&mut self) -> BackendResult<()> {
        if self.reference == 0 {
            self.reference = self.context.device().create_texture()?;
        }
        self.upload();
        log::debug!("Allocated {} {} ({})", self.kind, self.id, self.reference);
        Ok(())
    }

    fn dealloc(&mut self) {
        if self.reference != 0 {
            self.context.device().delete_texture(self.reference);
            log::debug!("Deallocated {} {}", self.kind, self.id);
            self.reference = 0;
        }
    }

    fn id(&self) -> InstanceId {
        self.id
    }
}

impl Sizable for Texture {
    fn size(&self) -> IVec2 {
        self.size
    }

    fn set_size(&mut self, size: IVec2) -> BackendResult<()> {
        if !self.resizable || !is_positive_size(size) {
            return Ok(());
        }
        self.size = size;
        if self.allocated() {
            self.upload();
        }
        Ok(())
    }

    fn resizable(&self) -> bool {
        self.resizable
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.dealloc();
        self.context.release_instance(self.id);
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("format", &self.format)
            .field("size", &self.size)
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}
