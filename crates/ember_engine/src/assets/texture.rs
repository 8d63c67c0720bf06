//! Texture asset handler
//!
//! Images are decoded with `image` and flipped vertically so that the first
//! row uploaded is the bottom of the picture. 8 bit images keep their bytes;
//! 16 bit and floating point images are converted to `f32` texels.

use crate::assets::{AssetCache, AssetError, AssetHandler, AssetResult, Resource};
use crate::foundation::math::IVec2;
use crate::render::texture::TextureData;
use crate::render::{Allocatable, Renderer, SharedTexture, Texture, TextureConfig, TextureFormat, TextureType};
use image::ColorType;
use std::cell::RefCell;
use std::rc::Rc;

/// Decode an image resource into an allocated 2D texture
pub fn decode_image(resource: &Resource, renderer: &Renderer) -> AssetResult<Texture> {
    let name = resource.name();
    let image = image::load_from_memory(resource.bytes())
        .map_err(|err| AssetError::Decode {
            name: name.clone(),
            reason: err.to_string(),
        })?
        .flipv();

    let size = match (i32::try_from(image.width()), i32::try_from(image.height())) {
        (Ok(width), Ok(height)) => IVec2::new(width, height),
        _ => {
            return Err(AssetError::Decode {
                name,
                reason: format!("image too large: {}x{}", image.width(), image.height()),
            })
        }
    };

    let color = image.color();
    let (format, data) = match color {
        ColorType::L8 => (TextureFormat::R8, TextureData::Ldr(image.into_luma8().into_raw())),
        ColorType::La8 => (TextureFormat::Rg8, TextureData::Ldr(image.into_luma_alpha8().into_raw())),
        ColorType::L16 => (TextureFormat::R32, TextureData::Hdr(image.to_luma32f().into_raw())),
        ColorType::La16 => (TextureFormat::Rg32, TextureData::Hdr(image.to_luma_alpha32f().into_raw())),
        ColorType::Rgb32F => (TextureFormat::Rgb32, TextureData::Hdr(image.into_rgb32f().into_raw())),
        ColorType::Rgb16 | ColorType::Rgba16 | ColorType::Rgba32F => {
            (TextureFormat::Rgba32, TextureData::Hdr(image.into_rgba32f().into_raw()))
        }
        _ => (TextureFormat::Rgba8, TextureData::Ldr(image.into_rgba8().into_raw())),
    };

    let mut texture = renderer.make_texture(&TextureConfig::new_2d(size, format).with_name(name.as_str()));
    texture.set_face_data(0, data);
    texture.alloc()?;
    log::debug!("Decoded '{}' ({:?}) as {}x{} {:?}", name, color, size.x, size.y, format);
    Ok(texture)
}

/// Decodes and stores 2D textures
#[derive(Debug)]
pub struct TextureHandler {
    cache: AssetCache<SharedTexture>,
}

impl Default for TextureHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureHandler {
    /// Empty handler
    pub fn new() -> Self {
        Self {
            cache: AssetCache::new("texture"),
        }
    }

    /// Whether a texture with the name exists
    pub fn contains(&self, name: &str) -> bool {
        self.cache.contains(name)
    }

    /// Number of textures
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no texture has been added
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl AssetHandler for TextureHandler {
    type Asset = SharedTexture;

    fn name(&self) -> &'static str {
        "texture"
    }

    fn load(&mut self, resource: &Resource, renderer: &Renderer) -> AssetResult<Self::Asset> {
        let name = resource.name();
        self.cache.ensure_vacant(&name)?;

        let texture = Rc::new(RefCell::new(decode_image(resource, renderer)?));
        self.add(&name, texture.clone())?;
        log::info!("Loaded texture '{}'", name);
        Ok(texture)
    }

    fn add(&mut self, name: &str, asset: Self::Asset) -> AssetResult<()> {
        let kind = asset.borrow().kind();
        if kind != TextureType::Texture2D {
            return Err(AssetError::InvalidType {
                handler: "texture",
                name: name.to_string(),
                reason: format!("expected {}, found {}", TextureType::Texture2D, kind),
            });
        }
        self.cache.insert(name, asset)
    }

    fn get(&self, name: &str) -> AssetResult<Self::Asset> {
        self.cache.get(name)
    }
}

/// PNG bytes of a small image, for tests
#[cfg(test)]
pub(crate) fn png_bytes(image: image::DynamicImage) -> Vec<u8> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    bytes.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Bindable, Sizable};
    use image::{DynamicImage, GrayImage, Rgba, RgbaImage};

    fn rgba_resource() -> Resource {
        let mut image = RgbaImage::new(2, 3);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        Resource::new("textures/bricks.png", png_bytes(DynamicImage::ImageRgba8(image)))
    }

    #[test]
    fn test_decode_rgba() {
        let (renderer, _device) = Renderer::mock();
        let texture = decode_image(&rgba_resource(), &renderer).unwrap();
        assert_eq!(texture.format(), TextureFormat::Rgba8);
        assert_eq!(texture.size(), IVec2::new(2, 3));
        assert_ne!(texture.reference(), 0);

        // Top-left red pixel ends up on the last uploaded row
        let Some(TextureData::Ldr(bytes)) = texture.data(0) else {
            panic!("expected 8 bit data");
        };
        assert_eq!(bytes.len(), 2 * 3 * 4);
        assert_eq!(&bytes[16..20], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_decode_grayscale() {
        let (renderer, _device) = Renderer::mock();
        let image = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        let resource = Resource::new("mask.png", png_bytes(image));
        let texture = decode_image(&resource, &renderer).unwrap();
        assert_eq!(texture.format(), TextureFormat::R8);
    }

    #[test]
    fn test_decode_sixteen_bit_as_float() {
        let (renderer, _device) = Renderer::mock();
        let image = DynamicImage::ImageRgba16(image::ImageBuffer::new(1, 1));
        let resource = Resource::new("height.png", png_bytes(image));
        let texture = decode_image(&resource, &renderer).unwrap();
        assert_eq!(texture.format(), TextureFormat::Rgba32);
        assert!(matches!(texture.data(0), Some(TextureData::Hdr(texels)) if texels.len() == 4));
    }

    #[test]
    fn test_decode_garbage() {
        let (renderer, _device) = Renderer::mock();
        let resource = Resource::new("junk.png", vec![1, 2, 3]);
        assert!(matches!(decode_image(&resource, &renderer), Err(AssetError::Decode { .. })));
    }

    #[test]
    fn test_load_names_by_stem() {
        let (renderer, _device) = Renderer::mock();
        let mut handler = TextureHandler::new();
        handler.load(&rgba_resource(), &renderer).unwrap();
        assert!(handler.contains("bricks"));
        assert!(matches!(
            handler.load(&rgba_resource(), &renderer),
            Err(AssetError::Exists { .. })
        ));
    }

    #[test]
    fn test_add_rejects_cubemap() {
        let (renderer, _device) = Renderer::mock();
        let cubemap = renderer.make_shared_texture(&TextureConfig::new_cubemap(4, TextureFormat::Rgba8));
        let mut handler = TextureHandler::new();
        assert!(matches!(
            handler.add("sky", cubemap),
            Err(AssetError::InvalidType { handler: "texture", .. })
        ));
        assert!(handler.is_empty());
    }
}
