//! Mesh renderer component

use ember_engine::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::rc::Rc;

/// Draws a mesh asset with a material
///
/// Only the asset names are stored in scene documents; the mesh and material
/// are attached when the scene loads.
#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshRenderer {
    /// Mesh asset name
    pub mesh: String,
    /// Material description name
    pub material: String,
    #[serde(skip)]
    resolved: Option<(Rc<Mesh>, Rc<Material>)>,
}

impl MeshRenderer {
    /// Type tag in scene documents
    pub const TYPE_NAME: &'static str = "mesh_renderer";

    /// Attach the loaded mesh and material
    pub fn bind_assets(&mut self, mesh: Rc<Mesh>, material: Rc<Material>) {
        self.resolved = Some((mesh, material));
    }

    /// Whether assets are attached
    pub fn resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

impl Component for MeshRenderer {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn start(&mut self, ctx: &FrameContext<'_>) -> ComponentResult {
        if self.resolved.is_none() {
            log::warn!("Mesh renderer on {:?} has no assets for '{}'", ctx.object, self.mesh);
        }
        Ok(())
    }

    fn render(&mut self, ctx: &FrameContext<'_>) -> ComponentResult {
        let Some((mesh, material)) = &self.resolved else {
            return Ok(());
        };
        material.bind();
        if let Some(shader) = material.shader() {
            shader.set_uniform("v_model_matrix", &UniformValue::Mat4(ctx.world));
        }
        mesh.draw();
        material.unbind();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
