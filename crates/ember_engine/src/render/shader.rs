//! Shader programs
//!
//! A shader keeps one GLSL source text holding any number of stages. Each stage
//! is fenced by a sentinel such as `#ifdef _VERTEX_`; compilation prepends
//! `#version 430` and the matching `#define` for every stage present, compiles
//! the stages independently, attaches them to one program and links it.

use crate::instance::{InstanceId, ObjectKind};
use crate::render::context::RenderContext;
use crate::render::uniform::UniformValue;
use crate::render::{Allocatable, BackendResult, Bindable, RenderError};
use std::fmt;
use std::rc::Rc;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Geometry stage
    Geometry,
    /// Fragment stage
    Fragment,
    /// Compute stage
    Compute,
    /// Tessellation control stage
    TessControl,
    /// Tessellation evaluation stage
    TessEvaluation,
}

impl ShaderStage {
    /// Every stage, in compilation order
    pub const ALL: [Self; 6] = [
        Self::Vertex,
        Self::Geometry,
        Self::Fragment,
        Self::Compute,
        Self::TessControl,
        Self::TessEvaluation,
    ];

    /// Preprocessor symbol selecting this stage
    pub const fn define(self) -> &'static str {
        match self {
            Self::Vertex => "_VERTEX_",
            Self::Geometry => "_GEOMETRY_",
            Self::Fragment => "_FRAGMENT_",
            Self::Compute => "_COMPUTE_",
            Self::TessControl => "_TESSCONTROL_",
            Self::TessEvaluation => "_TESSEVAL_",
        }
    }

    /// Header prepended to the source when compiling this stage
    pub fn header(self) -> String {
        format!("#version 430\n#define {}\n", self.define())
    }

    /// Whether `source` contains this stage's sentinel
    pub fn present_in(self, source: &str) -> bool {
        source.contains(&format!("#ifdef {}", self.define()))
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vertex => "VERTEX",
            Self::Geometry => "GEOMETRY",
            Self::Fragment => "FRAGMENT",
            Self::Compute => "COMPUTE",
            Self::TessControl => "TESSCONTROL",
            Self::TessEvaluation => "TESSEVAL",
        };
        f.write_str(name)
    }
}

/// Stages whose sentinels appear in `source`, in compilation order
pub fn detect_stages(source: &str) -> Vec<ShaderStage> {
    ShaderStage::ALL
        .into_iter()
        .filter(|stage| stage.present_in(source))
        .collect()
}

/// Shader program
pub struct Shader {
    context: Rc<RenderContext>,
    id: InstanceId,
    name: String,
    deferred: bool,
    source: String,
    program: u32,
    stages: Vec<(ShaderStage, u32)>,
}

impl Shader {
    pub(crate) fn new(context: Rc<RenderContext>, deferred: bool) -> Self {
        let id = context.issue_instance(ObjectKind::Shader, "");
        Self {
            context,
            id,
            name: String::new(),
            deferred,
            source: String::new(),
            program: 0,
            stages: Vec::new(),
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

    /// Whether the shader composes on the deferred path
    pub fn deferred(&self) -> bool {
        self.deferred
    }

    /// Append source text
    pub fn add_data(&mut self, source: &str) {
        self.source.push_str(source);
    }

    /// Discard all source text
    pub fn reset_data(&mut self) {
        self.source.clear();
    }

    /// Accumulated source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Stages attached to the current program
    pub fn stages(&self) -> Vec<ShaderStage> {
        self.stages.iter().map(|(stage, _)| *stage).collect()
    }

    /// Compile every present stage and link the program
    ///
    /// A previously compiled program is destroyed first. On failure the
    /// stages compiled so far stay attached until [`Allocatable::dealloc`].
    pub fn compile(&mut self) -> BackendResult<()> {
        self.dealloc();

        let stages = detect_stages(&self.source);
        if stages.is_empty() {
            return Err(RenderError::NoShaderStages(self.id));
        }

        let device = self.context.device();
        self.program = device.create_program()?;

        for stage in stages {
            let text = format!("{}{}", stage.header(), self.source);
            let handle = device.compile_stage(stage, &text).map_err(|log| RenderError::ShaderCompile {
                shader: self.id,
                stage,
                log,
            })?;
            device.attach_stage(self.program, handle);
            self.stages.push((stage, handle));
        }

        device
            .link_program(self.program)
            .map_err(|log| RenderError::ProgramLink { shader: self.id, log })?;

        log::debug!(
            "Compiled shader {} '{}' with stages {:?}",
            self.id,
            self.name,
            self.stages()
        );
        Ok(())
    }

    /// Set a uniform on this program
    pub fn set_uniform(&self, name: &str, value: &UniformValue) {
        self.context.device().set_uniform(self.program, name, value);
    }
}

impl Bindable for Shader {
    fn bind(&self) {
        self.context.device().use_program(self.program);
    }

    fn unbind(&self) {
        self.context.device().use_program(0);
    }

    fn reference(&self) -> u32 {
        self.program
    }
}

impl Allocatable for Shader {
    fn alloc(&mut self) -> BackendResult<()> {
        self.compile()
    }

    fn dealloc(&mut self) {
        let device = self.context.device();
        for (_, handle) in self.stages.drain(..) {
            device.detach_stage(self.program, handle);
            device.delete_stage(handle);
        }
        if self.program != 0 {
            device.delete_program(self.program);
            self.program = 0;
        }
    }

    fn id(&self) -> InstanceId {
        self.id
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        self.dealloc();
        self.context.release_instance(self.id);
    }
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("deferred", &self.deferred)
            .field("program", &self.program)
            .field("stages", &self.stages())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::mock::DeviceCall;
    use crate::render::Renderer;

    const VERTEX_FRAGMENT: &str = "\
#ifdef _VERTEX_
void main() { gl_Position = vec4(0.0); }
#endif
#ifdef _FRAGMENT_
out vec4 color;
void main() { color = vec4(1.0); }
#endif
";

    #[test]
    fn test_detect_stages_in_order() {
        let source = "#ifdef _FRAGMENT_\n#endif\n#ifdef _COMPUTE_\n#endif\n#ifdef _VERTEX_\n#endif\n";
        assert_eq!(
            detect_stages(source),
            vec![ShaderStage::Vertex, ShaderStage::Fragment, ShaderStage::Compute]
        );
        assert!(detect_stages("void main() {}").is_empty());
    }

    #[test]
    fn test_stage_header() {
        assert_eq!(ShaderStage::TessEvaluation.header(), "#version 430\n#define _TESSEVAL_\n");
        assert_eq!(ShaderStage::Geometry.to_string(), "GEOMETRY");
    }

    #[test]
    fn test_set_name_renames_registry_record() {
        let (renderer, _device) = Renderer::mock();
        let mut shader = renderer.make_shader(false);
        shader.set_name("pbr");
        assert_eq!(shader.name(), "pbr");
        assert_eq!(renderer.context().instances().get(shader.id()).unwrap().name, "pbr");
    }

    #[test]
    fn test_compile_vertex_fragment() {
        let (renderer, device) = Renderer::mock();
        let mut shader = renderer.make_shader(false);
        shader.add_data(VERTEX_FRAGMENT);
        shader.alloc().unwrap();

        assert_eq!(shader.stages(), vec![ShaderStage::Vertex, ShaderStage::Fragment]);
        assert_ne!(shader.reference(), 0);
        assert!(device.calls().contains(&DeviceCall::LinkProgram(shader.reference())));
    }

    #[test]
    fn test_fragment_only_compiles_one_stage_and_fails_link() {
        let (renderer, _device) = Renderer::mock();
        let mut shader = renderer.make_shader(false);
        shader.add_data("#ifdef _FRAGMENT_\nvoid main() {}\n#endif\n");

        let err = shader.compile().unwrap_err();
        assert!(matches!(err, RenderError::ProgramLink { .. }), "{err}");
        assert_eq!(shader.stages(), vec![ShaderStage::Fragment]);
    }

    #[test]
    fn test_compile_error_carries_log() {
        let (renderer, _device) = Renderer::mock();
        let mut shader = renderer.make_shader(false);
        shader.add_data("#ifdef _VERTEX_\n#error broken vertex\n#endif\n");

        match shader.compile() {
            Err(RenderError::ShaderCompile { stage, log, .. }) => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(log.contains("broken vertex"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_no_stages_is_an_error() {
        let (renderer, _device) = Renderer::mock();
        let mut shader = renderer.make_shader(false);
        shader.add_data("void main() {}");
        assert!(matches!(shader.compile(), Err(RenderError::NoShaderStages(_))));
    }

    #[test]
    fn test_dealloc_detaches_and_deletes_stages_before_program() {
        let (renderer, device) = Renderer::mock();
        let mut shader = renderer.make_shader(true);
        shader.add_data(VERTEX_FRAGMENT);
        shader.alloc().unwrap();
        let program = shader.reference();
        device.clear_calls();

        shader.dealloc();
        let calls = device.calls();
        assert_eq!(calls.len(), 5);
        assert!(matches!(calls[0], DeviceCall::DetachStage { program: p, .. } if p == program));
        assert!(matches!(calls[1], DeviceCall::DeleteStage(_)));
        assert_eq!(calls[4], DeviceCall::DeleteProgram(program));
        assert_eq!(shader.reference(), 0);
    }

    #[test]
    fn test_recompile_replaces_program() {
        let (renderer, device) = Renderer::mock();
        let mut shader = renderer.make_shader(false);
        shader.add_data(VERTEX_FRAGMENT);
        shader.alloc().unwrap();
        let first = shader.reference();
        shader.alloc().unwrap();

        assert_ne!(shader.reference(), first);
        assert!(device.calls().contains(&DeviceCall::DeleteProgram(first)));
    }

    #[test]
    fn test_reset_data() {
        let (renderer, _device) = Renderer::mock();
        let mut shader = renderer.make_shader(false);
        shader.add_data("abc");
        shader.reset_data();
        assert!(shader.source().is_empty());
    }
}
