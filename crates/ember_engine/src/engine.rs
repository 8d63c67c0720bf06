//! Core engine implementation

use crate::{
    app::{App, QuitFlag},
    assets::{AssetError, AssetSystem},
    config::{Config, ConfigError},
    events::{EventQueue, WindowEvent},
    foundation::time::{Time, DEFAULT_FIXED_TIME},
    platform::{HeadlessWindow, Window, WindowConfig},
    render::{BackendKind, RenderError, Renderer},
    scene::{ComponentRegistry, SceneContext, SceneError, SceneResult, SceneSystem},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main engine struct
///
/// The engine owns every subsystem and the user [`App`], and drives the
/// frame loop: events, fixed updates, update, display, swap.
pub struct Engine {
    config: EngineConfig,
    window: Box<dyn Window>,
    renderer: Renderer,
    assets: AssetSystem,
    components: ComponentRegistry,
    scenes: SceneSystem,
    time: Time,
    events: EventQueue,
    quit: QuitFlag,
    app: App,
}

/// Subsystems lent to systems, hooks and scene transitions
pub struct EngineContext<'a> {
    /// Renderer
    pub renderer: &'a Renderer,
    /// Asset handlers
    pub assets: &'a mut AssetSystem,
    /// Component marshalling tables
    pub components: &'a mut ComponentRegistry,
    /// Scene stack
    pub scenes: &'a mut SceneSystem,
    /// Frame clock
    pub time: &'a Time,
    /// Should-quit flag
    pub quit: &'a QuitFlag,
}

impl EngineContext<'_> {
    /// Context for loading scenes by hand
    pub fn scene_context(&mut self) -> SceneContext<'_> {
        SceneContext {
            renderer: self.renderer,
            assets: &mut *self.assets,
            components: &*self.components,
        }
    }

    /// Load a registered scene without activating it
    pub fn load_scene(&mut self, name: &str) -> SceneResult<()> {
        let (scenes, mut ctx) = self.split();
        scenes.load(name, &mut ctx)
    }

    /// Push a scene onto the active stack
    pub fn push_scene(&mut self, name: &str) -> SceneResult<()> {
        let (scenes, mut ctx) = self.split();
        scenes.push(name, &mut ctx)
    }

    /// Replace the top of the active stack
    pub fn replace_scene(&mut self, name: &str) -> SceneResult<()> {
        let (scenes, mut ctx) = self.split();
        scenes.replace(name, &mut ctx)
    }

    /// Clear the active stack and push a scene
    pub fn purge_push_scene(&mut self, name: &str) -> SceneResult<()> {
        let (scenes, mut ctx) = self.split();
        scenes.purge_push(name, &mut ctx)
    }

    /// Pop the top scene, returning its name
    pub fn pop_scene(&mut self) -> String {
        self.scenes.pop()
    }

    /// Ask the frame loop to stop
    pub fn quit(&self) {
        self.quit.set();
    }

    fn split(&mut self) -> (&mut SceneSystem, SceneContext<'_>) {
        (
            &mut *self.scenes,
            SceneContext {
                renderer: self.renderer,
                assets: &mut *self.assets,
                components: &*self.components,
            },
        )
    }
}

impl fmt::Debug for EngineContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("active_scene", &self.scenes.active_name())
            .field("frame", &self.time.frame())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine with the configured backend and a headless window
    pub fn headless(config: EngineConfig, app: App) -> EngineResult<Self> {
        let window = Box::new(HeadlessWindow::from_config(&config.window));
        Self::new(config, window, app)
    }

    /// Create an engine with an OpenGL window
    #[cfg(feature = "gl")]
    pub fn windowed(config: EngineConfig, app: App) -> EngineResult<Self> {
        let window = crate::platform::GlfwWindow::new(&config.window).map_err(|err| EngineError::SetupFailed {
            system: "window".to_string(),
            reason: err.to_string(),
        })?;
        Self::new(config, Box::new(window), app)
    }

    /// Create an engine on the given window
    pub fn new(config: EngineConfig, window: Box<dyn Window>, app: App) -> EngineResult<Self> {
        let renderer = Renderer::new(config.renderer.backend)?;
        Ok(Self::with_renderer(config, window, renderer, app))
    }

    /// Create an engine around an existing renderer
    pub fn with_renderer(config: EngineConfig, window: Box<dyn Window>, renderer: Renderer, app: App) -> Self {
        log::info!("Creating engine ({} backend)", renderer.backend_name());
        Self {
            assets: AssetSystem::with_search_paths(&config.assets.search_paths),
            components: ComponentRegistry::with_builtins(),
            scenes: SceneSystem::new(),
            time: Time::new(config.time.fixed_time),
            events: EventQueue::new(),
            quit: QuitFlag::new(),
            config,
            window,
            renderer,
            app,
        }
    }

    /// Run setup, the frame loop and teardown
    pub fn run(&mut self) -> EngineResult<()> {
        if let Err(err) = self.setup() {
            log::error!("Engine setup failed: {}", err);
            self.scenes.remove_all();
            self.renderer.destroy();
            return Err(err);
        }

        log::info!("Starting main loop...");
        let result = self.frame_loop();
        if let Err(err) = &result {
            log::error!("Main loop stopped: {}", err);
        }

        self.teardown();
        result
    }

    /// Initialize the renderer, load the manifest and start the app
    pub fn setup(&mut self) -> EngineResult<()> {
        log::info!("Initializing engine...");
        self.renderer.init(self.window.as_native())?;

        if let Some(manifest) = self.config.assets.manifest.clone() {
            self.assets.load_manifest(&manifest, &self.renderer)?;
        }

        let (app, mut ctx) = self.split();
        app.setup(&mut ctx)
    }

    /// Stop the app, drop every scene and release the renderer
    pub fn teardown(&mut self) {
        let (app, mut ctx) = self.split();
        app.teardown(&mut ctx);
        self.scenes.remove_all();
        self.renderer.destroy();
        log::info!("Engine shutdown complete");
    }

    /// Run one frame
    pub fn frame(&mut self) -> EngineResult<()> {
        self.time.frame_start();

        self.window.poll_events(&mut self.events);
        let events: Vec<_> = self.events.drain().collect();
        for event in &events {
            self.handle_event(event);
        }

        let fixed = self.time.fixed_time();
        let mut ticks = 0;
        while ticks < self.config.time.max_frame_skip && self.time.logic_update() {
            self.scenes.on_fixed_update(fixed);
            self.time.logic_tick();
            ticks += 1;
        }

        let delta = self.time.delta_time();
        self.scenes.on_update(delta);
        let (app, mut ctx) = self.split();
        app.update(&mut ctx, delta)?;

        self.renderer.begin();
        self.scenes.on_display(&self.renderer);
        self.renderer.end();
        self.window.swap_buffers();

        self.time.frame_end();
        Ok(())
    }

    /// Whether the loop should stop before the next frame
    pub fn should_quit(&self) -> bool {
        self.quit.is_set() || self.window.should_close()
    }

    /// Shared should-quit flag, e.g. for a signal handler
    pub fn quit_flag(&self) -> QuitFlag {
        self.quit.clone()
    }

    /// Request engine shutdown
    pub fn quit(&self) {
        self.quit.set();
    }

    /// Borrow the subsystems as a context
    pub fn context(&mut self) -> EngineContext<'_> {
        self.split().1
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Renderer
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Asset system
    pub fn assets(&self) -> &AssetSystem {
        &self.assets
    }

    /// Mutable asset system
    pub fn assets_mut(&mut self) -> &mut AssetSystem {
        &mut self.assets
    }

    /// Component marshalling tables
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Mutable component marshalling tables
    pub fn components_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.components
    }

    /// Scene system
    pub fn scenes(&self) -> &SceneSystem {
        &self.scenes
    }

    /// Mutable scene system
    pub fn scenes_mut(&mut self) -> &mut SceneSystem {
        &mut self.scenes
    }

    /// Frame clock
    pub fn time(&self) -> &Time {
        &self.time
    }

    /// User app
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Mutable user app
    pub fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }

    /// Window
    pub fn window(&self) -> &dyn Window {
        self.window.as_ref()
    }

    /// Mutable window
    pub fn window_mut(&mut self) -> &mut dyn Window {
        self.window.as_mut()
    }

    fn frame_loop(&mut self) -> EngineResult<()> {
        while !self.should_quit() {
            if let Some(max) = self.config.time.max_frames {
                if self.time.frame() >= max {
                    log::info!("Reached frame limit ({})", max);
                    break;
                }
            }
            self.frame()?;
        }
        Ok(())
    }

    fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.window.set_should_close(true);
                self.quit.set();
            }
            WindowEvent::Resized(size) => {
                log::debug!("Resolution changed to {}x{}", size.x, size.y);
                self.renderer.set_resolution(*size);
            }
            _ => {}
        }
        let (app, mut ctx) = self.split();
        app.dispatch(&mut ctx, event);
    }

    fn split(&mut self) -> (&mut App, EngineContext<'_>) {
        let Self {
            renderer,
            assets,
            components,
            scenes,
            time,
            quit,
            app,
            ..
        } = self;
        (
            app,
            EngineContext {
                renderer,
                assets,
                components,
                scenes,
                time,
                quit,
            },
        )
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.renderer.backend_name())
            .field("scenes", &self.scenes)
            .field("app", &self.app)
            .field("frame", &self.time.frame())
            .finish_non_exhaustive()
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window configuration
    pub window: WindowConfig,
    /// Renderer configuration
    pub renderer: RendererConfig,
    /// Asset system configuration
    pub assets: AssetConfig,
    /// Frame loop timing
    pub time: TimeConfig,
}

impl Config for EngineConfig {}

/// Renderer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Device implementation
    pub backend: BackendKind,
    /// Use floating point G-buffer targets
    pub hdr: bool,
}

/// Asset system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Resource search paths, tried in order
    pub search_paths: Vec<String>,
    /// Manifest loaded during setup
    pub manifest: Option<String>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            search_paths: vec!["resources".to_string()],
            manifest: None,
        }
    }
}

/// Frame loop timing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Fixed logic step in seconds
    pub fixed_time: f64,
    /// Maximum fixed updates run in one frame
    pub max_frame_skip: u32,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            fixed_time: DEFAULT_FIXED_TIME,
            max_frame_skip: 5,
            max_frames: None,
        }
    }
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// A system with the name is already registered
    #[error("system '{0}' already registered")]
    SystemExists(String),

    /// No system with the name
    #[error("system '{0}' not found")]
    SystemNotFound(String),

    /// A system failed to start
    #[error("setup of '{system}' failed: {reason}")]
    SetupFailed {
        /// Failing system
        system: String,
        /// Its error
        reason: String,
    },

    /// Rendering error
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Asset system error
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Scene system error
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Application error
    #[error("application error: {0}")]
    Application(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Owned subsystems that can lend an [`EngineContext`], for tests
#[cfg(test)]
pub(crate) struct ContextParts {
    pub renderer: Renderer,
    pub device: std::rc::Rc<crate::render::MockDevice>,
    pub assets: AssetSystem,
    pub components: ComponentRegistry,
    pub scenes: SceneSystem,
    pub time: Time,
    pub quit: QuitFlag,
}

#[cfg(test)]
impl ContextParts {
    pub fn mock() -> Self {
        let (renderer, device) = Renderer::mock();
        Self {
            renderer,
            device,
            assets: AssetSystem::new(),
            components: ComponentRegistry::with_builtins(),
            scenes: SceneSystem::new(),
            time: Time::default(),
            quit: QuitFlag::new(),
        }
    }

    pub fn context(&mut self) -> EngineContext<'_> {
        EngineContext {
            renderer: &self.renderer,
            assets: &mut self.assets,
            components: &mut self.components,
            scenes: &mut self.scenes,
            time: &self.time,
            quit: &self.quit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Hook, System};
    use crate::config::ConfigFormat;
    use crate::foundation::math::IVec2;
    use crate::render::DeviceCall;
    use crate::scene::Scene;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Counters {
        fixed: Cell<u32>,
        updates: Cell<u32>,
        displays: Cell<u32>,
    }

    struct CountingScene {
        loaded: bool,
        counters: Rc<Counters>,
    }

    impl Scene for CountingScene {
        fn name(&self) -> &str {
            "counting"
        }

        fn loaded(&self) -> bool {
            self.loaded
        }

        fn load(&mut self, _ctx: &mut SceneContext<'_>) -> SceneResult<()> {
            self.loaded = true;
            Ok(())
        }

        fn display(&mut self, _renderer: &Renderer) {
            self.counters.displays.set(self.counters.displays.get() + 1);
        }

        fn update(&mut self, _delta: f64) {
            self.counters.updates.set(self.counters.updates.get() + 1);
        }

        fn fixed_update(&mut self, _delta: f64) {
            self.counters.fixed.set(self.counters.fixed.get() + 1);
        }
    }

    struct SceneLoader {
        counters: Rc<Counters>,
    }

    impl System for SceneLoader {
        fn name(&self) -> &str {
            "scene_loader"
        }

        fn setup(&mut self, ctx: &mut EngineContext<'_>) -> EngineResult<()> {
            ctx.scenes.register(Box::new(CountingScene {
                loaded: false,
                counters: self.counters.clone(),
            }))?;
            ctx.push_scene("counting")?;
            Ok(())
        }

        fn teardown(&mut self, ctx: &mut EngineContext<'_>) {
            ctx.pop_scene();
        }
    }

    fn config(frames: u64) -> EngineConfig {
        EngineConfig {
            time: TimeConfig {
                max_frames: Some(frames),
                ..TimeConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn engine(config: EngineConfig, app: App) -> (Engine, Rc<crate::render::MockDevice>) {
        let (renderer, device) = Renderer::mock();
        let window = Box::new(HeadlessWindow::new(IVec2::new(320, 240)));
        (Engine::with_renderer(config, window, renderer, app), device)
    }

    fn frames_begun(device: &crate::render::MockDevice) -> usize {
        device.calls().iter().filter(|call| **call == DeviceCall::BeginFrame).count()
    }

    #[test]
    fn test_runs_configured_frames() {
        let counters = Rc::new(Counters::default());
        let mut app = App::new();
        app.register(Box::new(SceneLoader { counters: counters.clone() })).unwrap();

        let (mut engine, device) = engine(config(3), app);
        engine.run().unwrap();

        assert_eq!(engine.time().frame(), 3);
        assert_eq!(frames_begun(&device), 3);
        assert_eq!(counters.updates.get(), 3);
        assert_eq!(counters.displays.get(), 3);
        assert_eq!(engine.scenes().active_count(), 0);
        assert_eq!(engine.scenes().count(), 0);
        assert!(!engine.renderer().initialized());
    }

    #[test]
    fn test_quit_before_first_frame() {
        let mut app = App::new();
        let quit: Hook = Box::new(|ctx: &mut EngineContext<'_>| {
            ctx.quit();
            Ok(())
        });
        app.on_post_setup(quit);

        let (mut engine, device) = engine(config(10), app);
        engine.run().unwrap();
        assert_eq!(engine.time().frame(), 0);
        assert_eq!(frames_begun(&device), 0);
    }

    #[test]
    fn test_close_event_stops_loop() {
        let (mut engine, _device) = engine(config(10), App::new());
        engine.setup().unwrap();
        let mut window = HeadlessWindow::new(IVec2::new(320, 240));
        window.inject(WindowEvent::Resized(IVec2::new(800, 600)));
        window.inject(WindowEvent::CloseRequested);
        engine.window = Box::new(window);

        engine.frame().unwrap();
        assert!(engine.should_quit());
        assert!(engine.window().should_close());
        assert_eq!(engine.renderer().resolution(), IVec2::new(800, 600));
        engine.teardown();
    }

    #[test]
    fn test_fixed_updates_are_capped() {
        let counters = Rc::new(Counters::default());
        let mut app = App::new();
        app.register(Box::new(SceneLoader { counters: counters.clone() })).unwrap();
        let config = EngineConfig {
            time: TimeConfig {
                fixed_time: 1e-9,
                max_frame_skip: 2,
                max_frames: Some(1),
            },
            ..EngineConfig::default()
        };

        let (mut engine, _device) = engine(config, app);
        std::thread::sleep(std::time::Duration::from_millis(1));
        engine.run().unwrap();
        assert_eq!(counters.fixed.get(), 2);
    }

    #[test]
    fn test_setup_failure_releases_renderer() {
        let config = EngineConfig {
            assets: AssetConfig {
                search_paths: Vec::new(),
                manifest: Some("missing_manifest.ron".to_string()),
            },
            ..config(1)
        };
        let (mut engine, _device) = engine(config, App::new());
        assert!(matches!(engine.run(), Err(EngineError::Asset(AssetError::NotFound { .. }))));
        assert!(!engine.renderer().initialized());
    }

    #[test]
    fn test_failed_post_setup_tears_down_started_systems() {
        let counters = Rc::new(Counters::default());
        let mut app = App::new();
        app.register(Box::new(SceneLoader { counters: counters.clone() })).unwrap();
        let fail: Hook =
            Box::new(|_ctx: &mut EngineContext<'_>| Err(EngineError::Application("no audio device".to_string())));
        app.on_post_setup(fail);

        let (mut engine, device) = engine(config(3), app);
        assert!(matches!(engine.run(), Err(EngineError::Application(_))));
        assert_eq!(engine.scenes().active_count(), 0);
        assert_eq!(engine.scenes().count(), 0);
        assert_eq!(counters.updates.get(), 0);
        assert_eq!(frames_begun(&device), 0);
        assert!(!engine.renderer().initialized());
    }

    #[test]
    fn test_config_round_trip() {
        let config = EngineConfig {
            renderer: RendererConfig {
                backend: BackendKind::Mock,
                hdr: true,
            },
            ..config(42)
        };
        for format in [ConfigFormat::Toml, ConfigFormat::Ron] {
            let text = config.to_string_with(format).unwrap();
            assert_eq!(EngineConfig::from_str_with(&text, format).unwrap(), config);
        }
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = EngineConfig::from_str_with("[window]\ntitle = \"demo\"\n", ConfigFormat::Toml).unwrap();
        assert_eq!(config.window.title, "demo");
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.time.max_frame_skip, 5);
        assert_eq!(config.assets.search_paths, ["resources"]);
    }
}
