//! Triangle meshes
//!
//! Meshes keep positions, normals and texture coordinates in separate arrays
//! and interleave them into one vertex buffer on allocation.

use crate::foundation::math::{Vec2, Vec3};
use crate::instance::{InstanceId, ObjectKind};
use crate::render::context::RenderContext;
use crate::render::device::VertexAttribute;
use crate::render::{Allocatable, BackendResult, Bindable, Drawable, RenderError};
use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::rc::Rc;

/// Interleaved vertex as uploaded to the device
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position
    pub position: [f32; 3],
    /// Normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
}

impl Vertex {
    /// Size of one vertex in bytes
    pub const STRIDE: i32 = std::mem::size_of::<Self>() as i32;

    /// Attribute layout: position at location 0, normal at 1, uv at 2
    pub const ATTRIBUTES: [VertexAttribute; 3] = [
        VertexAttribute { location: 0, components: 3, offset: 0 },
        VertexAttribute { location: 1, components: 3, offset: 12 },
        VertexAttribute { location: 2, components: 2, offset: 24 },
    ];
}

/// Vertex geometry drawn as a triangle list
pub struct Mesh {
    context: Rc<RenderContext>,
    id: InstanceId,
    name: String,
    vertices: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    vertex_array: u32,
    buffer: u32,
    count: i32,
}

impl Mesh {
    pub(crate) fn new(context: Rc<RenderContext>) -> Self {
        let id = context.issue_instance(ObjectKind::Mesh, "");
        Self {
            context,
            id,
            name: String::new(),
            vertices: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            vertex_array: 0,
            buffer: 0,
            count: 0,
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

    /// Replace all vertex data; takes effect on the next allocation
    pub fn set_data(&mut self, vertices: Vec<Vec3>, normals: Vec<Vec3>, uvs: Vec<Vec2>) {
        self.vertices = vertices;
        self.normals = normals;
        self.uvs = uvs;
    }

    /// Positions
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Normals
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Texture coordinates
    pub fn uvs(&self) -> &[Vec2] {
        &self.uvs
    }

    /// Number of vertices uploaded by the last allocation
    pub fn vertex_count(&self) -> i32 {
        self.count
    }

    /// Fill this mesh with [`unit_cube`]
    pub fn set_unit_cube(&mut self) {
        let (vertices, normals, uvs) = unit_cube();
        self.set_data(vertices, normals, uvs);
    }

    fn interleave(&self) -> BackendResult<Vec<Vertex>> {
        if self.vertices.is_empty() || self.normals.is_empty() || self.uvs.is_empty() {
            return Err(RenderError::EmptyMeshData(self.id));
        }
        if self.vertices.len() != self.normals.len() || self.vertices.len() != self.uvs.len() {
            return Err(RenderError::AsymmetricMeshData(self.id));
        }

        Ok(self
            .vertices
            .iter()
            .zip(&self.normals)
            .zip(&self.uvs)
            .map(|((position, normal), uv)| Vertex {
                position: [position.x, position.y, position.z],
                normal: [normal.x, normal.y, normal.z],
                uv: [uv.x, uv.y],
            })
            .collect())
    }
}

impl Bindable for Mesh {
    fn bind(&self) {
        self.context.device().bind_vertex_array(self.vertex_array);
    }

    fn unbind(&self) {
        self.context.device().bind_vertex_array(0);
    }

    fn reference(&self) -> u32 {
        self.vertex_array
    }
}

impl Allocatable for Mesh {
    fn alloc(&mut self) -> BackendResult<()> {
        let vertices = self.interleave()?;
        let count = i32::try_from(vertices.len())
            .map_err(|_| RenderError::Device(format!("mesh {} has too many vertices", self.id)))?;

        let device = self.context.device();
        if self.vertex_array == 0 {
            let (vertex_array, buffer) = device.create_vertex_array()?;
            self.vertex_array = vertex_array;
            self.buffer = buffer;
        }
        device.upload_vertices(
            self.vertex_array,
            self.buffer,
            bytemuck::cast_slice(&vertices),
            Vertex::STRIDE,
            &Vertex::ATTRIBUTES,
        );
        self.count = count;
        log::debug!("Uploaded mesh {} '{}' with {} vertices", self.id, self.name, count);
        Ok(())
    }

    fn dealloc(&mut self) {
        if self.vertex_array != 0 {
            self.context.device().delete_vertex_array(self.vertex_array, self.buffer);
            self.vertex_array = 0;
            self.buffer = 0;
            self.count = 0;
        }
    }

    fn id(&self) -> InstanceId {
        self.id
    }
}

impl Drawable for Mesh {
    fn draw(&self) {
        if self.vertex_array == 0 || self.count == 0 {
            return;
        }
        let device = self.context.device();
        device.bind_vertex_array(self.vertex_array);
        device.draw_triangles(self.count);
        device.bind_vertex_array(0);
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        self.dealloc();
        self.context.release_instance(self.id);
    }
}

impl fmt::Debug for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mesh")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("vertices", &self.vertices.len())
            .field("vertex_array", &self.vertex_array)
            .finish_non_exhaustive()
    }
}

/// Thirty-six vertices of a unit cube spanning `-1..1` on every axis
pub fn unit_cube() -> (Vec<Vec3>, Vec<Vec3>, Vec<Vec2>) {
    // (normal, tangent u, tangent v) per face
    let faces = [
        (Vec3::x(), -Vec3::z(), Vec3::y()),
        (-Vec3::x(), Vec3::z(), Vec3::y()),
        (Vec3::y(), Vec3::x(), -Vec3::z()),
        (-Vec3::y(), Vec3::x(), Vec3::z()),
        (Vec3::z(), Vec3::x(), Vec3::y()),
        (-Vec3::z(), -Vec3::x(), Vec3::y()),
    ];
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut vertices = Vec::with_capacity(36);
    let mut normals = Vec::with_capacity(36);
    let mut uvs = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        for (a, b) in corners {
            vertices.push(normal + u * a + v * b);
            normals.push(normal);
            uvs.push(Vec2::new((a + 1.0) * 0.5, (b + 1.0) * 0.5));
        }
    }
    (vertices, normals, uvs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::mock::DeviceCall;
    use crate::render::Renderer;

    fn triangle() -> (Vec<Vec3>, Vec<Vec3>, Vec<Vec2>) {
        (
            vec![Vec3::zeros(), Vec3::x(), Vec3::y()],
            vec![Vec3::z(); 3],
            vec![Vec2::zeros(), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
        )
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(Vertex::STRIDE, 32);
        assert_eq!(Vertex::ATTRIBUTES[2].offset, 24);
    }

    #[test]
    fn test_upload_interleaves() {
        let (renderer, device) = Renderer::mock();
        let mut mesh = renderer.make_mesh();
        let (v, n, t) = triangle();
        mesh.set_data(v, n, t);
        mesh.alloc().unwrap();

        assert_eq!(mesh.vertex_count(), 3);
        assert!(device.calls().iter().any(|call| matches!(
            call,
            DeviceCall::UploadVertices { bytes: 96, stride: 32, .. }
        )));

        mesh.draw();
        assert!(device.calls().contains(&DeviceCall::DrawTriangles(3)));
    }

    #[test]
    fn test_empty_mesh_rejected_and_not_drawn() {
        let (renderer, device) = Renderer::mock();
        let mut mesh = renderer.make_mesh();
        assert!(matches!(mesh.alloc(), Err(RenderError::EmptyMeshData(_))));

        mesh.draw();
        assert_eq!(device.draw_count(), 0);
    }

    #[test]
    fn test_asymmetric_mesh_rejected() {
        let (renderer, _device) = Renderer::mock();
        let mut mesh = renderer.make_mesh();
        let (v, n, _) = triangle();
        mesh.set_data(v, n, vec![Vec2::zeros()]);
        assert!(matches!(mesh.alloc(), Err(RenderError::AsymmetricMeshData(_))));
    }

    #[test]
    fn test_unit_cube_faces_point_outward() {
        let (vertices, normals, uvs) = unit_cube();
        assert_eq!(vertices.len(), 36);
        assert_eq!(uvs.len(), 36);
        for (vertex, normal) in vertices.iter().zip(&normals) {
            assert!(vertex.dot(normal) > 0.0);
            assert!(vertex.iter().all(|c| c.abs() <= 1.0));
        }
    }
}
