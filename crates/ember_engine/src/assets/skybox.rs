//! Skybox asset handler
//!
//! A skybox resource names up to three equirectangular images. Each image is
//! projected onto the six faces of a cubemap by drawing a unit cube through
//! the [`CUBE_CONVERTER`] shader into a framebuffer, one face at a time.
//! Without a specular map the radiance map is projected again and mipmapped;
//! without an irradiance map it is projected again at
//! [`IRRADIANCE_SIZE`].

use crate::assets::{decode_image, AssetCache, AssetError, AssetHandler, AssetResult, Resource};
use crate::foundation::math::constants::HALF_PI;
use crate::foundation::math::{IVec2, Mat4, Point3, Vec3};
use crate::render::attachment::AttachmentKind;
use crate::render::{
    Allocatable, AttachmentConfig, AttachmentLocation, Bindable, Drawable, Renderer, Shader, SharedTexture,
    Sizable, Texture, TextureConfig, TextureFormat, UniformValue,
};
use crate::scene::Skybox;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Shader asset used to project images onto cubemap faces
pub const CUBE_CONVERTER: &str = "utils/cubeconv";

/// Face size of generated irradiance maps
pub const IRRADIANCE_SIZE: i32 = 32;

/// Skybox metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkyboxMetadata {
    /// Asset name
    pub name: String,
    /// Radiance image, relative to the metadata file
    pub radiance: String,
    /// Specular image; generated from radiance when absent
    #[serde(default)]
    pub specular: Option<String>,
    /// Irradiance image; generated from radiance when absent
    #[serde(default)]
    pub irradiance: Option<String>,
}

/// Projection used for every cubemap face
pub fn capture_projection() -> Mat4 {
    Mat4::new_perspective(1.0, HALF_PI, 0.1, 2.0)
}

/// View matrices of the six faces in +X, -X, +Y, -Y, +Z, -Z order
pub fn capture_views() -> [Mat4; 6] {
    let eye = Point3::origin();
    let face = |x: f32, y: f32, z: f32, up: Vec3| Mat4::look_at_rh(&eye, &Point3::new(x, y, z), &up);
    [
        face(1.0, 0.0, 0.0, Vec3::new(0.0, 1.0, 0.0)),
        face(-1.0, 0.0, 0.0, Vec3::new(0.0, 1.0, 0.0)),
        face(0.0, 1.0, 0.0, Vec3::new(0.0, 0.0, -1.0)),
        face(0.0, -1.0, 0.0, Vec3::new(0.0, 0.0, 1.0)),
        face(0.0, 0.0, 1.0, Vec3::new(0.0, 1.0, 0.0)),
        face(0.0, 0.0, -1.0, Vec3::new(0.0, 1.0, 0.0)),
    ]
}

/// Builds and stores skyboxes
#[derive(Debug)]
pub struct SkyboxHandler {
    cache: AssetCache<Rc<Skybox>>,
    converter: Option<Rc<Shader>>,
}

impl Default for SkyboxHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SkyboxHandler {
    /// Empty handler without a converter shader
    pub fn new() -> Self {
        Self {
            cache: AssetCache::new("skybox"),
            converter: None,
        }
    }

    /// Shader used for cubemap projection
    pub fn set_converter(&mut self, converter: Rc<Shader>) {
        self.converter = Some(converter);
    }

    /// Whether a converter shader is set
    pub fn has_converter(&self) -> bool {
        self.converter.is_some()
    }

    /// Whether a skybox with the name exists
    pub fn contains(&self, name: &str) -> bool {
        self.cache.contains(name)
    }

    /// Number of skyboxes
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no skybox has been added
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Project a 2D image onto a new cubemap with the given face size
    pub fn project(&self, source: &Texture, face_size: i32, renderer: &Renderer) -> AssetResult<SharedTexture> {
        let converter = self.converter.as_ref().ok_or_else(|| AssetError::NotFound {
            handler: "shader",
            name: CUBE_CONVERTER.to_string(),
        })?;

        let cubemap = renderer.make_shared_texture(
            &TextureConfig::new_cubemap(face_size, source.format()).with_name(format!("{}_cubemap", source.name())),
        );
        cubemap.borrow_mut().alloc()?;

        let size = IVec2::new(face_size, face_size);
        let mut framebuffer = renderer.make_framebuffer(size);
        framebuffer.set_name("cubeconv");
        framebuffer.set_attachment(
            AttachmentLocation::Depth,
            renderer.make_attachment(&AttachmentConfig {
                name: "cubeconv_depth".to_string(),
                kind: AttachmentKind::Renderbuffer,
                format: TextureFormat::DefaultDepth,
                size,
                mip_level: 0,
            }),
        );
        framebuffer.alloc()?;

        let mut cube = renderer.make_mesh();
        cube.set_unit_cube();
        cube.alloc()?;

        framebuffer.bind();
        converter.bind();
        source.activate(0);
        converter.set_uniform("v_projection_matrix", &UniformValue::Mat4(capture_projection()));
        {
            let target = cubemap.borrow();
            for (face, view) in (0u8..).zip(capture_views()) {
                converter.set_uniform("v_view_matrix", &UniformValue::Mat4(view));
                framebuffer.attach_cubemap_face(Some(&target), face, 0);
                framebuffer.clear_buffers();
                cube.draw();
            }
        }
        framebuffer.attach_cubemap_face(None, 0, 0);
        converter.unbind();
        framebuffer.unbind();

        log::debug!("Projected '{}' onto a {}px cubemap", source.name(), face_size);
        Ok(cubemap)
    }

    fn load_map(&self, resource: &Resource, file: &str, face_size: Option<i32>, renderer: &Renderer) -> AssetResult<SharedTexture> {
        let image = decode_image(&resource.sibling(file)?, renderer)?;
        let face_size = face_size.unwrap_or_else(|| (image.size().y / 2).max(1));
        self.project(&image, face_size, renderer)
    }
}

impl AssetHandler for SkyboxHandler {
    type Asset = Rc<Skybox>;

    fn name(&self) -> &'static str {
        "skybox"
    }

    fn load(&mut self, resource: &Resource, renderer: &Renderer) -> AssetResult<Self::Asset> {
        let metadata: SkyboxMetadata = resource.metadata()?;
        self.cache.ensure_vacant(&metadata.name)?;

        let radiance = self.load_map(resource, &metadata.radiance, None, renderer)?;

        let specular = match &metadata.specular {
            Some(file) => self.load_map(resource, file, None, renderer)?,
            None => {
                let specular = self.load_map(resource, &metadata.radiance, None, renderer)?;
                specular.borrow_mut().generate_mipmaps();
                specular
            }
        };

        let irradiance = match &metadata.irradiance {
            Some(file) => self.load_map(resource, file, None, renderer)?,
            None => self.load_map(resource, &metadata.radiance, Some(IRRADIANCE_SIZE), renderer)?,
        };

        let skybox = Skybox::new(renderer, &radiance, &specular, &irradiance).map_err(|err| AssetError::InvalidType {
            handler: "skybox",
            name: metadata.name.clone(),
            reason: err.to_string(),
        })?;

        let skybox = Rc::new(skybox);
        self.add(&metadata.name, skybox.clone())?;
        log::info!("Loaded skybox '{}'", metadata.name);
        Ok(skybox)
    }

    fn add(&mut self, name: &str, asset: Self::Asset) -> AssetResult<()> {
        self.cache.insert(name, asset)
    }

    fn get(&self, name: &str) -> AssetResult<Self::Asset> {
        self.cache.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::fixture_dir;
    use crate::assets::texture::png_bytes;
    use crate::render::{DeviceCall, TextureType};
    use approx::assert_relative_eq;
    use image::{DynamicImage, RgbaImage};

    const CONVERTER_SOURCE: &str = "#ifdef _VERTEX_\nvoid main() {}\n#endif\n#ifdef _FRAGMENT_\nvoid main() {}\n#endif\n";

    fn converter(renderer: &Renderer) -> Rc<Shader> {
        let mut shader = renderer.make_shader(false);
        shader.set_name(CUBE_CONVERTER);
        shader.add_data(CONVERTER_SOURCE);
        shader.compile().unwrap();
        Rc::new(shader)
    }

    fn write_image(dir: &std::path::Path, file: &str, width: u32, height: u32) {
        let bytes = png_bytes(DynamicImage::ImageRgba8(RgbaImage::new(width, height)));
        std::fs::write(dir.join(file), bytes).unwrap();
    }

    #[test]
    fn test_capture_views_look_down_axes() {
        let views = capture_views();
        // +X view maps the +X axis onto -Z in view space
        let forward = views[0].transform_vector(&Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(forward, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
        let forward = views[2].transform_vector(&Vec3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(forward, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_load_generates_missing_maps() {
        let (renderer, device) = Renderer::mock();
        let dir = fixture_dir("skybox_generate");
        write_image(&dir, "sky.png", 8, 4);
        std::fs::write(dir.join("sky.ron"), "(name: \"sky\", radiance: \"sky.png\")").unwrap();
        let resource = Resource::read(dir.join("sky.ron")).unwrap();

        let mut handler = SkyboxHandler::new();
        handler.set_converter(converter(&renderer));
        let skybox = handler.load(&resource, &renderer).unwrap();

        for map in [skybox.radiance(), skybox.specular(), skybox.irradiance()] {
            assert_eq!(map.borrow().kind(), TextureType::TextureCubemap);
        }
        assert_eq!(skybox.radiance().borrow().size(), IVec2::new(2, 2));
        assert_eq!(skybox.irradiance().borrow().size(), IVec2::new(IRRADIANCE_SIZE, IRRADIANCE_SIZE));
        assert!(skybox.specular().borrow().mip_levels() > 1);

        // Three projections of six faces, 36 vertices per cube
        let draws = device
            .calls()
            .iter()
            .filter(|call| **call == DeviceCall::DrawTriangles(36))
            .count();
        assert_eq!(draws, 18);
        assert_eq!(renderer.context().framebuffer_depth(), 0);
        assert!(handler.contains("sky"));
    }

    #[test]
    fn test_uses_given_maps() {
        let (renderer, _device) = Renderer::mock();
        let dir = fixture_dir("skybox_given");
        write_image(&dir, "sky.png", 8, 4);
        write_image(&dir, "spec.png", 4, 2);
        write_image(&dir, "irr.png", 16, 8);
        std::fs::write(
            dir.join("sky.ron"),
            "(name: \"sky\", radiance: \"sky.png\", specular: Some(\"spec.png\"), irradiance: Some(\"irr.png\"))",
        )
        .unwrap();
        let resource = Resource::read(dir.join("sky.ron")).unwrap();

        let mut handler = SkyboxHandler::new();
        handler.set_converter(converter(&renderer));
        let skybox = handler.load(&resource, &renderer).unwrap();
        assert_eq!(skybox.specular().borrow().size(), IVec2::new(1, 1));
        assert_eq!(skybox.irradiance().borrow().size(), IVec2::new(4, 4));
        assert_eq!(skybox.specular().borrow().mip_levels(), 1);
    }

    #[test]
    fn test_requires_converter() {
        let (renderer, _device) = Renderer::mock();
        let dir = fixture_dir("skybox_converter");
        write_image(&dir, "sky.png", 8, 4);
        std::fs::write(dir.join("sky.ron"), "(name: \"sky\", radiance: \"sky.png\")").unwrap();
        let resource = Resource::read(dir.join("sky.ron")).unwrap();

        let mut handler = SkyboxHandler::new();
        let err = handler.load(&resource, &renderer).unwrap_err();
        assert!(matches!(err, AssetError::NotFound { handler: "shader", .. }));
        assert!(handler.is_empty());
    }
}
