//! Application lifecycle
//!
//! An [`App`] is an ordered list of user [`System`]s plus four optional
//! hooks. Setup runs `pre_setup`, every system in registration order and
//! then `post_setup`; teardown mirrors it with the systems in reverse. A
//! failing setup stops immediately and tears down, in reverse, the systems
//! that had already started.

use crate::engine::{EngineContext, EngineError, EngineResult};
use crate::events::WindowEvent;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Should-quit flag shared with other threads
#[derive(Debug, Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    /// Flag that is not set
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the frame loop to stop after the current frame
    pub fn set(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            log::info!("Quit requested");
        }
    }

    /// Whether a quit has been requested
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// User subsystem with a setup/teardown lifecycle
pub trait System {
    /// Unique system name
    fn name(&self) -> &str;

    /// Start the system
    fn setup(&mut self, ctx: &mut EngineContext<'_>) -> EngineResult<()>;

    /// Stop the system
    fn teardown(&mut self, ctx: &mut EngineContext<'_>);

    /// Per-frame update, after the active scene
    fn update(&mut self, _ctx: &mut EngineContext<'_>, _delta: f64) -> EngineResult<()> {
        Ok(())
    }

    /// A window event was drained from the queue
    fn on_event(&mut self, _ctx: &mut EngineContext<'_>, _event: &WindowEvent) {}
}

/// Lifecycle hook
pub type Hook = Box<dyn FnMut(&mut EngineContext<'_>) -> EngineResult<()>>;

/// Ordered systems and lifecycle hooks
#[derive(Default)]
pub struct App {
    systems: Vec<Box<dyn System>>,
    started: usize,
    pre_setup: Option<Hook>,
    post_setup: Option<Hook>,
    pre_teardown: Option<Hook>,
    post_teardown: Option<Hook>,
}

impl App {
    /// App without systems or hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a system; names must be unique
    pub fn register(&mut self, system: Box<dyn System>) -> EngineResult<()> {
        if self.contains(system.name()) {
            return Err(EngineError::SystemExists(system.name().to_string()));
        }
        log::debug!("Registered system '{}'", system.name());
        self.systems.push(system);
        Ok(())
    }

    /// Builder form of [`App::register`]
    pub fn with_system(mut self, system: Box<dyn System>) -> EngineResult<Self> {
        self.register(system)?;
        Ok(self)
    }

    /// Run before any system starts
    pub fn on_pre_setup(&mut self, hook: Hook) {
        self.pre_setup = Some(hook);
    }

    /// Run after every system started
    pub fn on_post_setup(&mut self, hook: Hook) {
        self.post_setup = Some(hook);
    }

    /// Run before any system stops
    pub fn on_pre_teardown(&mut self, hook: Hook) {
        self.pre_teardown = Some(hook);
    }

    /// Run after every system stopped
    pub fn on_post_teardown(&mut self, hook: Hook) {
        self.post_teardown = Some(hook);
    }

    /// Whether a system with the name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.systems.iter().any(|system| system.name() == name)
    }

    /// System by name
    pub fn system(&self, name: &str) -> EngineResult<&dyn System> {
        self.systems
            .iter()
            .find(|system| system.name() == name)
            .map(|system| &**system)
            .ok_or_else(|| EngineError::SystemNotFound(name.to_string()))
    }

    /// Mutable system by name
    pub fn system_mut(&mut self, name: &str) -> EngineResult<&mut (dyn System + 'static)> {
        self.systems
            .iter_mut()
            .find(|system| system.name() == name)
            .map(|system| &mut **system)
            .ok_or_else(|| EngineError::SystemNotFound(name.to_string()))
    }

    /// Registered system names in order
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|system| system.name()).collect()
    }

    /// Number of systems currently started
    pub fn started(&self) -> usize {
        self.started
    }

    /// Start every system in order
    pub fn setup(&mut self, ctx: &mut EngineContext<'_>) -> EngineResult<()> {
        if let Some(hook) = self.pre_setup.as_mut() {
            if let Err(err) = hook(ctx) {
                log::error!("Pre-setup hook failed: {}", err);
                return Err(err);
            }
        }

        for index in 0..self.systems.len() {
            let system = &mut self.systems[index];
            log::debug!("Setting up system '{}'", system.name());
            if let Err(err) = system.setup(ctx) {
                let name = system.name().to_string();
                log::error!("System '{}' setup failed: {}", name, err);
                self.stop_started(ctx);
                return Err(EngineError::SetupFailed {
                    system: name,
                    reason: err.to_string(),
                });
            }
            self.started = index + 1;
        }

        if let Some(hook) = self.post_setup.as_mut() {
            if let Err(err) = hook(ctx) {
                log::error!("Post-setup hook failed: {}", err);
                self.stop_started(ctx);
                return Err(err);
            }
        }
        log::info!("App setup complete ({} systems)", self.systems.len());
        Ok(())
    }

    /// Stop every started system in reverse order
    ///
    /// Hook failures are logged; teardown always runs to the end.
    pub fn teardown(&mut self, ctx: &mut EngineContext<'_>) {
        if let Some(hook) = self.pre_teardown.as_mut() {
            if let Err(err) = hook(ctx) {
                log::error!("Pre-teardown hook failed: {}", err);
            }
        }

        self.stop_started(ctx);

        if let Some(hook) = self.post_teardown.as_mut() {
            if let Err(err) = hook(ctx) {
                log::error!("Post-teardown hook failed: {}", err);
            }
        }
    }

    /// Update started systems in order
    pub fn update(&mut self, ctx: &mut EngineContext<'_>, delta: f64) -> EngineResult<()> {
        for system in &mut self.systems[..self.started] {
            system.update(ctx, delta)?;
        }
        Ok(())
    }

    /// Forward a window event to started systems
    pub fn dispatch(&mut self, ctx: &mut EngineContext<'_>, event: &WindowEvent) {
        for system in &mut self.systems[..self.started] {
            system.on_event(ctx, event);
        }
    }

    fn stop_started(&mut self, ctx: &mut EngineContext<'_>) {
        for system in self.systems[..self.started].iter_mut().rev() {
            log::debug!("Tearing down system '{}'", system.name());
            system.teardown(ctx);
        }
        self.started = 0;
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("systems", &self.system_names())
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ContextParts;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Journal = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        fail: bool,
        journal: Journal,
    }

    impl Recorder {
        fn boxed(name: &'static str, fail: bool, journal: &Journal) -> Box<dyn System> {
            Box::new(Self {
                name,
                fail,
                journal: journal.clone(),
            })
        }
    }

    impl System for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn setup(&mut self, _ctx: &mut EngineContext<'_>) -> EngineResult<()> {
            self.journal.borrow_mut().push(format!("setup {}", self.name));
            if self.fail {
                return Err(EngineError::Application("boom".to_string()));
            }
            Ok(())
        }

        fn teardown(&mut self, _ctx: &mut EngineContext<'_>) {
            self.journal.borrow_mut().push(format!("teardown {}", self.name));
        }
    }

    fn failing_hook(label: &'static str, journal: &Journal) -> Hook {
        let journal = journal.clone();
        Box::new(move |_ctx: &mut EngineContext<'_>| {
            journal.borrow_mut().push(label.to_string());
            Err(EngineError::Application(format!("{} failed", label)))
        })
    }

    fn hook(label: &'static str, journal: &Journal) -> Hook {
        let journal = journal.clone();
        Box::new(move |_ctx: &mut EngineContext<'_>| {
            journal.borrow_mut().push(label.to_string());
            Ok(())
        })
    }

    #[test]
    fn test_quit_flag_shared() {
        let flag = QuitFlag::new();
        let remote = flag.clone();
        std::thread::spawn(move || remote.set()).join().unwrap();
        assert!(flag.is_set());
    }

    #[test]
    fn test_register_and_lookup() {
        let journal = Journal::default();
        let mut app = App::new();
        app.register(Recorder::boxed("audio", false, &journal)).unwrap();
        assert!(matches!(
            app.register(Recorder::boxed("audio", false, &journal)),
            Err(EngineError::SystemExists(name)) if name == "audio"
        ));
        assert_eq!(app.system("audio").unwrap().name(), "audio");
        assert!(matches!(app.system("input"), Err(EngineError::SystemNotFound(_))));
    }

    #[test]
    fn test_lifecycle_order() {
        let journal = Journal::default();
        let mut parts = ContextParts::mock();
        let mut app = App::new()
            .with_system(Recorder::boxed("a", false, &journal))
            .unwrap()
            .with_system(Recorder::boxed("b", false, &journal))
            .unwrap();
        app.on_pre_setup(hook("pre_setup", &journal));
        app.on_post_setup(hook("post_setup", &journal));
        app.on_pre_teardown(hook("pre_teardown", &journal));
        app.on_post_teardown(hook("post_teardown", &journal));

        app.setup(&mut parts.context()).unwrap();
        assert_eq!(app.started(), 2);
        app.teardown(&mut parts.context());
        assert_eq!(app.started(), 0);

        assert_eq!(
            *journal.borrow(),
            [
                "pre_setup",
                "setup a",
                "setup b",
                "post_setup",
                "pre_teardown",
                "teardown b",
                "teardown a",
                "post_teardown"
            ]
        );
    }

    #[test]
    fn test_failed_setup_unwinds_started_systems() {
        let journal = Journal::default();
        let mut parts = ContextParts::mock();
        let mut app = App::new();
        app.register(Recorder::boxed("a", false, &journal)).unwrap();
        app.register(Recorder::boxed("b", false, &journal)).unwrap();
        app.register(Recorder::boxed("c", true, &journal)).unwrap();
        app.register(Recorder::boxed("d", false, &journal)).unwrap();
        app.on_post_setup(hook("post_setup", &journal));

        let err = app.setup(&mut parts.context()).unwrap_err();
        assert!(matches!(err, EngineError::SetupFailed { ref system, .. } if system == "c"));
        assert_eq!(
            *journal.borrow(),
            ["setup a", "setup b", "setup c", "teardown b", "teardown a"]
        );
        assert_eq!(app.started(), 0);
    }

    #[test]
    fn test_failed_post_setup_unwinds_every_system() {
        let journal = Journal::default();
        let mut parts = ContextParts::mock();
        let mut app = App::new();
        app.register(Recorder::boxed("a", false, &journal)).unwrap();
        app.register(Recorder::boxed("b", false, &journal)).unwrap();
        app.register(Recorder::boxed("c", false, &journal)).unwrap();
        app.on_post_setup(failing_hook("post_setup", &journal));

        let err = app.setup(&mut parts.context()).unwrap_err();
        assert!(matches!(err, EngineError::Application(ref reason) if reason == "post_setup failed"));
        assert_eq!(
            *journal.borrow(),
            [
                "setup a",
                "setup b",
                "setup c",
                "post_setup",
                "teardown c",
                "teardown b",
                "teardown a"
            ]
        );
        assert_eq!(app.started(), 0);
    }

    #[test]
    fn test_failed_pre_setup_starts_nothing() {
        let journal = Journal::default();
        let mut parts = ContextParts::mock();
        let mut app = App::new();
        app.register(Recorder::boxed("a", false, &journal)).unwrap();
        app.on_pre_setup(failing_hook("pre_setup", &journal));
        app.on_post_setup(hook("post_setup", &journal));

        assert!(app.setup(&mut parts.context()).is_err());
        assert_eq!(*journal.borrow(), ["pre_setup"]);
        assert_eq!(app.started(), 0);

        // A later teardown has nothing left to stop.
        app.teardown(&mut parts.context());
        assert_eq!(*journal.borrow(), ["pre_setup"]);
    }
}
