//! Scene stack
//!
//! The [`SceneSystem`] owns every registered scene and a push-down stack of
//! scene names. Only the top of the stack receives display and update calls;
//! scenes below it stay loaded but dormant until they are on top again.

use crate::render::Renderer;
use crate::scene::scene::{Scene, SceneContext};
use crate::scene::{SceneError, SceneResult};
use std::collections::HashMap;
use std::fmt;

/// Registered scenes and the active stack
#[derive(Default)]
pub struct SceneSystem {
    scenes: HashMap<String, Box<dyn Scene>>,
    stack: Vec<String>,
}

impl SceneSystem {
    /// Create an empty scene system
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scene under its name
    pub fn register(&mut self, scene: Box<dyn Scene>) -> SceneResult<()> {
        let name = scene.name().to_string();
        if self.scenes.contains_key(&name) {
            return Err(SceneError::AlreadyRegistered(name));
        }
        log::debug!("Registered scene '{}'", name);
        self.scenes.insert(name, scene);
        Ok(())
    }

    /// Remove a scene, dropping it from the active stack without deactivation
    pub fn unregister(&mut self, name: &str) -> SceneResult<Box<dyn Scene>> {
        let scene = self
            .scenes
            .remove(name)
            .ok_or_else(|| SceneError::NotRegistered(name.to_string()))?;
        self.stack.retain(|entry| entry != name);
        Ok(scene)
    }

    /// Whether a scene is registered
    pub fn contains(&self, name: &str) -> bool {
        self.scenes.contains_key(name)
    }

    /// Registered scene by name
    pub fn get(&self, name: &str) -> Option<&dyn Scene> {
        self.scenes.get(name).map(|scene| scene.as_ref())
    }

    /// Mutable registered scene by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Scene + 'static)> {
        self.scenes.get_mut(name).map(|scene| scene.as_mut())
    }

    /// Load a scene; loading an already loaded scene does nothing
    pub fn load(&mut self, name: &str, ctx: &mut SceneContext<'_>) -> SceneResult<()> {
        let scene = self
            .scenes
            .get_mut(name)
            .ok_or_else(|| SceneError::NotRegistered(name.to_string()))?;
        if scene.loaded() {
            return Ok(());
        }
        scene.load(ctx)
    }

    /// Load the scene if needed, push it and activate it
    ///
    /// A failed load leaves the stack untouched.
    pub fn push(&mut self, name: &str, ctx: &mut SceneContext<'_>) -> SceneResult<()> {
        self.load(name, ctx)?;
        self.push_loaded(name)
    }

    /// Pop and deactivate the top scene, returning its name or `""` when empty
    pub fn pop(&mut self) -> String {
        let Some(name) = self.stack.pop() else {
            return String::new();
        };
        if let Some(scene) = self.scenes.get_mut(&name) {
            scene.on_deactivate();
        }
        log::debug!("Popped scene '{}'", name);
        name
    }

    /// [`pop`](Self::pop) then [`push`](Self::push)
    ///
    /// The top is deactivated even when it is `name` itself. The new scene
    /// is loaded before anything is popped, so a failure changes nothing.
    pub fn replace(&mut self, name: &str, ctx: &mut SceneContext<'_>) -> SceneResult<()> {
        self.load(name, ctx)?;
        self.pop();
        self.push_loaded(name)
    }

    /// Discard the whole stack, then push `name`
    ///
    /// Discarded scenes do not receive `on_deactivate`, unlike [`pop`](Self::pop).
    pub fn purge_push(&mut self, name: &str, ctx: &mut SceneContext<'_>) -> SceneResult<()> {
        self.load(name, ctx)?;
        self.stack.clear();
        self.push_loaded(name)
    }

    /// Scene on top of the stack
    pub fn active(&self) -> Option<&dyn Scene> {
        self.stack.last().and_then(|name| self.get(name))
    }

    /// Mutable scene on top of the stack
    pub fn active_mut(&mut self) -> Option<&mut (dyn Scene + 'static)> {
        let name = self.stack.last()?;
        self.scenes.get_mut(name).map(|scene| scene.as_mut())
    }

    /// Name of the top scene, `""` when the stack is empty
    pub fn active_name(&self) -> &str {
        self.stack.last().map_or("", String::as_str)
    }

    /// Active stack, bottom first
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Number of registered scenes
    pub fn count(&self) -> usize {
        self.scenes.len()
    }

    /// Depth of the active stack
    pub fn active_count(&self) -> usize {
        self.stack.len()
    }

    /// Drop every scene and clear the stack
    pub fn remove_all(&mut self) {
        self.stack.clear();
        self.scenes.clear();
    }

    /// Render the active scene
    pub fn on_display(&mut self, renderer: &Renderer) {
        if let Some(scene) = self.active_mut() {
            scene.display(renderer);
        }
    }

    /// Update the active scene
    pub fn on_update(&mut self, delta: f64) {
        if let Some(scene) = self.active_mut() {
            scene.update(delta);
        }
    }

    /// Fixed-rate update of the active scene
    pub fn on_fixed_update(&mut self, delta: f64) {
        if let Some(scene) = self.active_mut() {
            scene.fixed_update(delta);
        }
    }

    fn push_loaded(&mut self, name: &str) -> SceneResult<()> {
        let scene = self
            .scenes
            .get_mut(name)
            .ok_or_else(|| SceneError::NotRegistered(name.to_string()))?;
        self.stack.push(name.to_string());
        scene.on_activate();
        log::debug!("Pushed scene '{}' (depth {})", name, self.stack.len());
        Ok(())
    }
}

impl fmt::Debug for SceneSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scenes: Vec<_> = self.scenes.keys().collect();
        scenes.sort();
        f.debug_struct("SceneSystem")
            .field("scenes", &scenes)
            .field("stack", &self.stack)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetSystem;
    use crate::scene::marshal::ComponentRegistry;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct TestScene {
        name: String,
        log: Log,
        loaded: bool,
        fail_load: bool,
    }

    impl TestScene {
        fn boxed(name: &str, log: &Log) -> Box<dyn Scene> {
            Box::new(Self {
                name: name.to_string(),
                log: log.clone(),
                loaded: false,
                fail_load: false,
            })
        }

        fn record(&self, event: &str) {
            self.log.borrow_mut().push(format!("{}:{}", self.name, event));
        }
    }

    impl Scene for TestScene {
        fn name(&self) -> &str {
            &self.name
        }

        fn loaded(&self) -> bool {
            self.loaded
        }

        fn load(&mut self, _ctx: &mut SceneContext<'_>) -> SceneResult<()> {
            if self.fail_load {
                return Err(SceneError::LoadFailed {
                    scene: self.name.clone(),
                    reason: "broken".into(),
                });
            }
            self.record("load");
            self.loaded = true;
            Ok(())
        }

        fn on_activate(&mut self) {
            self.record("activate");
        }

        fn on_deactivate(&mut self) {
            self.record("deactivate");
        }

        fn display(&mut self, _renderer: &Renderer) {
            self.record("display");
        }

        fn update(&mut self, _delta: f64) {
            self.record("update");
        }

        fn fixed_update(&mut self, _delta: f64) {
            self.record("fixed");
        }
    }

    struct Fixture {
        renderer: Renderer,
        assets: AssetSystem,
        components: ComponentRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                renderer: Renderer::mock().0,
                assets: AssetSystem::new(),
                components: ComponentRegistry::new(),
            }
        }

        fn ctx(&mut self) -> SceneContext<'_> {
            SceneContext {
                renderer: &self.renderer,
                assets: &mut self.assets,
                components: &self.components,
            }
        }
    }

    fn system(log: &Log, names: &[&str]) -> SceneSystem {
        let mut system = SceneSystem::new();
        for name in names {
            system.register(TestScene::boxed(name, log)).unwrap();
        }
        system
    }

    #[test]
    fn test_register_twice_rejected() {
        let log = Log::default();
        let mut system = system(&log, &["a"]);
        assert!(matches!(
            system.register(TestScene::boxed("a", &log)),
            Err(SceneError::AlreadyRegistered(name)) if name == "a"
        ));
        assert_eq!(system.count(), 1);
    }

    #[test]
    fn test_load_unregistered_and_idempotent() {
        let log = Log::default();
        let mut fixture = Fixture::new();
        let mut system = system(&log, &["a"]);

        assert!(matches!(system.load("b", &mut fixture.ctx()), Err(SceneError::NotRegistered(_))));
        system.load("a", &mut fixture.ctx()).unwrap();
        system.load("a", &mut fixture.ctx()).unwrap();
        assert_eq!(*log.borrow(), ["a:load"]);
    }

    #[test]
    fn test_push_pop_inverse() {
        let log = Log::default();
        let mut fixture = Fixture::new();
        let mut system = system(&log, &["a", "b"]);
        system.push("b", &mut fixture.ctx()).unwrap();
        let before = system.stack().to_vec();

        system.push("a", &mut fixture.ctx()).unwrap();
        assert_eq!(system.active_name(), "a");
        assert_eq!(system.pop(), "a");
        assert_eq!(system.stack(), before.as_slice());
        assert_eq!(*log.borrow(), ["b:load", "b:activate", "a:load", "a:activate", "a:deactivate"]);
    }

    #[test]
    fn test_pop_empty() {
        let mut system = SceneSystem::new();
        assert_eq!(system.pop(), "");
        assert_eq!(system.active_name(), "");
        assert!(system.active().is_none());
    }

    #[test]
    fn test_replace_deactivates_same_top() {
        let log = Log::default();
        let mut fixture = Fixture::new();
        let mut system = system(&log, &["a"]);
        system.push("a", &mut fixture.ctx()).unwrap();
        log.borrow_mut().clear();

        system.replace("a", &mut fixture.ctx()).unwrap();
        assert_eq!(system.stack(), ["a".to_string()]);
        assert_eq!(*log.borrow(), ["a:deactivate", "a:activate"]);
    }

    #[test]
    fn test_purge_push_skips_deactivation() {
        let log = Log::default();
        let mut fixture = Fixture::new();
        let mut system = system(&log, &["a", "b", "c"]);
        system.push("a", &mut fixture.ctx()).unwrap();
        system.push("b", &mut fixture.ctx()).unwrap();
        log.borrow_mut().clear();

        system.purge_push("c", &mut fixture.ctx()).unwrap();
        assert_eq!(system.stack(), ["c".to_string()]);
        assert_eq!(system.active_name(), "c");
        // Bulk discard: neither "a" nor "b" is told it was deactivated.
        assert_eq!(*log.borrow(), ["c:load", "c:activate"]);
    }

    #[test]
    fn test_failed_push_leaves_state_unchanged() {
        let log = Log::default();
        let mut fixture = Fixture::new();
        let mut system = system(&log, &["a"]);
        system
            .register(Box::new(TestScene {
                name: "broken".into(),
                log: log.clone(),
                loaded: false,
                fail_load: true,
            }))
            .unwrap();
        system.push("a", &mut fixture.ctx()).unwrap();

        assert!(system.push("broken", &mut fixture.ctx()).is_err());
        assert!(system.replace("broken", &mut fixture.ctx()).is_err());
        assert!(system.purge_push("broken", &mut fixture.ctx()).is_err());
        assert!(system.push("missing", &mut fixture.ctx()).is_err());
        assert_eq!(system.stack(), ["a".to_string()]);
        assert!(!system.get("broken").unwrap().loaded());
    }

    #[test]
    fn test_only_top_is_driven() {
        let log = Log::default();
        let mut fixture = Fixture::new();
        let mut system = system(&log, &["world", "menu"]);
        system.push("world", &mut fixture.ctx()).unwrap();
        system.push("menu", &mut fixture.ctx()).unwrap();
        log.borrow_mut().clear();

        system.on_update(0.016);
        system.on_fixed_update(0.05);
        system.on_display(&fixture.renderer);
        assert_eq!(*log.borrow(), ["menu:update", "menu:fixed", "menu:display"]);
    }

    #[test]
    fn test_frame_calls_on_empty_stack() {
        let fixture = Fixture::new();
        let mut system = SceneSystem::new();
        system.on_update(0.016);
        system.on_display(&fixture.renderer);
        assert_eq!(system.active_count(), 0);
    }

    #[test]
    fn test_unregister_and_remove_all() {
        let log = Log::default();
        let mut fixture = Fixture::new();
        let mut system = system(&log, &["a", "b"]);
        system.push("a", &mut fixture.ctx()).unwrap();

        assert!(system.unregister("a").is_ok());
        assert_eq!(system.active_count(), 0);
        assert!(matches!(system.unregister("a"), Err(SceneError::NotRegistered(_))));

        system.remove_all();
        assert_eq!(system.count(), 0);
    }
}
