//! Scenes
//!
//! [`Scene`] is what the [`SceneSystem`](crate::scene::SceneSystem) drives.
//! [`GraphScene`] is the standard implementation: a graph, its environment
//! and the cameras found in it, optionally populated from a scene document
//! and user hooks when loaded.

use crate::assets::{AssetHandler, AssetSystem};
use crate::render::Renderer;
use crate::scene::camera::Camera;
use crate::scene::component::Message;
use crate::scene::environment::Environment;
use crate::scene::graph::{Graph, ObjectId};
use crate::scene::marshal::{build_scene, ComponentRegistry, SceneDocument};
use crate::scene::{SceneError, SceneResult};
use std::fmt;

/// Collaborators available while a scene loads
pub struct SceneContext<'a> {
    /// Renderer creating GPU resources
    pub renderer: &'a Renderer,
    /// Asset handlers
    pub assets: &'a mut AssetSystem,
    /// Component marshalling tables
    pub components: &'a ComponentRegistry,
}

impl fmt::Debug for SceneContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneContext").finish_non_exhaustive()
    }
}

/// A named, independently loadable unit driven by the scene system
pub trait Scene {
    /// Unique scene name
    fn name(&self) -> &str;

    /// Whether `load` has completed
    fn loaded(&self) -> bool;

    /// Build the scene; called at most once successfully
    fn load(&mut self, ctx: &mut SceneContext<'_>) -> SceneResult<()>;

    /// The scene was pushed onto the active stack
    fn on_activate(&mut self) {}

    /// The scene was popped from the active stack
    fn on_deactivate(&mut self) {}

    /// Render one frame
    fn display(&mut self, renderer: &Renderer);

    /// Per-frame update
    fn update(&mut self, delta: f64);

    /// Fixed-rate update
    fn fixed_update(&mut self, delta: f64);
}

/// Hook run after the scene document is built
pub type LoadHook = Box<dyn FnMut(&mut GraphScene, &mut SceneContext<'_>) -> SceneResult<()>>;

/// Hook run on activation or deactivation
pub type TransitionHook = Box<dyn FnMut(&mut GraphScene)>;

/// Scene backed by a [`Graph`]
pub struct GraphScene {
    name: String,
    graph: Graph,
    environment: Environment,
    document: Option<SceneDocument>,
    deferred_shader: Option<String>,
    skybox: Option<String>,
    cameras: Vec<ObjectId>,
    camera_generation: Option<u64>,
    loaded: bool,
    started: bool,
    last_delta: f64,
    on_load: Option<LoadHook>,
    on_activate: Option<TransitionHook>,
    on_deactivate: Option<TransitionHook>,
}

impl GraphScene {
    /// Empty scene
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            graph: Graph::new(),
            environment: Environment::new(),
            document: None,
            deferred_shader: None,
            skybox: None,
            cameras: Vec::new(),
            camera_generation: None,
            loaded: false,
            started: false,
            last_delta: 0.0,
            on_load: None,
            on_activate: None,
            on_deactivate: None,
        }
    }

    /// Scene populated from a document when loaded
    pub fn from_document(document: SceneDocument) -> Self {
        let mut scene = Self::new(&document.name);
        scene.document = Some(document);
        scene
    }

    /// Run `hook` at the end of loading
    pub fn with_load_hook(mut self, hook: LoadHook) -> Self {
        self.on_load = Some(hook);
        self
    }

    /// Run `hook` each time the scene is pushed
    pub fn with_activate_hook(mut self, hook: TransitionHook) -> Self {
        self.on_activate = Some(hook);
        self
    }

    /// Run `hook` each time the scene is popped
    pub fn with_deactivate_hook(mut self, hook: TransitionHook) -> Self {
        self.on_deactivate = Some(hook);
        self
    }

    /// Resolve the deferred composition shader by asset name when loading
    pub fn with_deferred_shader(mut self, shader: &str) -> Self {
        self.deferred_shader = Some(shader.to_string());
        self
    }

    /// Resolve the skybox by asset name when loading
    pub fn with_skybox(mut self, skybox: &str) -> Self {
        self.skybox = Some(skybox.to_string());
        self
    }

    /// Game object tree
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable game object tree
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Lighting environment
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Mutable lighting environment
    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    /// Whether the first update has run
    pub fn started(&self) -> bool {
        self.started
    }

    /// Objects carrying an active camera, in graph order
    pub fn cameras(&mut self) -> &[ObjectId] {
        self.refresh_cameras();
        &self.cameras
    }

    fn refresh_cameras(&mut self) {
        if self.graph.dirty() {
            self.graph.update();
        }
        if self.camera_generation == Some(self.graph.generation()) {
            return;
        }
        self.cameras = self
            .graph
            .objects()
            .iter()
            .copied()
            .filter(|&id| self.graph.component::<Camera>(id).is_some())
            .collect();
        self.camera_generation = Some(self.graph.generation());
    }

    fn load_failed(&self, reason: impl fmt::Display) -> SceneError {
        SceneError::LoadFailed {
            scene: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn build(&mut self, ctx: &mut SceneContext<'_>) -> SceneResult<()> {
        if let Some(document) = &self.document {
            let mut graph = Graph::new();
            build_scene(document, &mut graph, ctx.components)?;
            self.graph = graph;
        }
        if let Some(shader) = &self.deferred_shader {
            let shader = ctx.assets.shaders().get(shader).map_err(|err| self.load_failed(err))?;
            self.environment.deferred_shader = Some(shader);
        }
        if let Some(skybox) = &self.skybox {
            let skybox = ctx.assets.skyboxes().get(skybox).map_err(|err| self.load_failed(err))?;
            self.environment.skybox = Some(skybox);
        }
        if let Some(mut hook) = self.on_load.take() {
            let result = hook(self, ctx);
            self.on_load = Some(hook);
            result?;
        }
        Ok(())
    }
}

impl Scene for GraphScene {
    fn name(&self) -> &str {
        &self.name
    }

    fn loaded(&self) -> bool {
        self.loaded
    }

    fn load(&mut self, ctx: &mut SceneContext<'_>) -> SceneResult<()> {
        if self.loaded {
            return Ok(());
        }
        if let Err(err) = self.build(ctx) {
            self.graph = Graph::new();
            self.environment = Environment::new();
            return Err(err);
        }
        self.loaded = true;
        log::info!("Loaded scene '{}'", self.name);
        Ok(())
    }

    fn on_activate(&mut self) {
        if let Some(mut hook) = self.on_activate.take() {
            hook(self);
            self.on_activate = Some(hook);
        }
    }

    fn on_deactivate(&mut self) {
        if let Some(mut hook) = self.on_deactivate.take() {
            hook(self);
            self.on_deactivate = Some(hook);
        }
    }

    fn display(&mut self, renderer: &Renderer) {
        self.refresh_cameras();
        let delta = self.last_delta;
        for index in 0..self.cameras.len() {
            let id = self.cameras[index];
            if !self.graph.active_in_hierarchy(id) {
                continue;
            }
            let Some(camera) = self.graph.component::<Camera>(id) else {
                continue;
            };
            camera.begin(renderer);
            self.environment.bind();
            self.graph.send_message(Message::Render, delta, Some(renderer));
            if let Some(camera) = self.graph.component::<Camera>(id) {
                camera.end(renderer);
            }
        }
        self.graph.send_message(Message::GuiRender, delta, Some(renderer));
    }

    fn update(&mut self, delta: f64) {
        self.last_delta = delta;
        if !self.started {
            self.graph.send_message(Message::Start, delta, None);
            self.started = true;
        }
        self.graph.send_message(Message::Update, delta, None);
        self.graph.send_message(Message::LateUpdate, delta, None);
    }

    fn fixed_update(&mut self, delta: f64) {
        self.graph.send_message(Message::FixedUpdate, delta, None);
    }
}

impl fmt::Debug for GraphScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphScene")
            .field("name", &self.name)
            .field("loaded", &self.loaded)
            .field("started", &self.started)
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}
