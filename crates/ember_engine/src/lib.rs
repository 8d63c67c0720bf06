//! # Ember Engine
//!
//! A game engine scaffold built around a scene graph, a stack of loadable
//! scenes and render objects written once against a pluggable graphics
//! device.
//!
//! ## Features
//!
//! - **Scene graph**: game objects with polymorphic components and lifecycle messages
//! - **Scene stack**: push, pop, replace and purge-push of independently loaded scenes
//! - **Render objects**: shaders, textures, framebuffers, meshes and G-buffers over OpenGL or a headless mock device
//! - **Assets**: shader, texture, mesh and skybox handlers with RON metadata
//! - **Scene documents**: RON descriptions with pluggable component marshalling
//!
//! ## Quick Start
//!
//! ```rust
//! use ember_engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let config = EngineConfig {
//!         time: TimeConfig {
//!             max_frames: Some(2),
//!             ..TimeConfig::default()
//!         },
//!         ..EngineConfig::default()
//!     };
//!
//!     let mut engine = Engine::headless(config, App::new())?;
//!     engine.run()
//! }
//! ```

pub mod app;
pub mod assets;
pub mod config;
pub mod engine;
pub mod events;
pub mod foundation;
pub mod instance;
pub mod platform;
pub mod render;
pub mod scene;

pub use app::{App, QuitFlag, System};
pub use engine::{Engine, EngineConfig, EngineContext, EngineError, EngineResult};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        app::{App, Hook, QuitFlag, System},
        assets::{AssetError, AssetHandler, AssetSystem, Resource},
        config::Config,
        engine::{AssetConfig, Engine, EngineConfig, EngineContext, EngineError, EngineResult, RendererConfig, TimeConfig},
        events::{EventQueue, KeyCode, MouseButton, WindowEvent},
        foundation::{
            math::{IVec2, Mat4, Quat, Transform, Vec2, Vec3, Vec4},
            time::Time,
        },
        instance::InstanceId,
        platform::{HeadlessWindow, Window, WindowConfig},
        render::{
            Allocatable, BackendKind, Bindable, Drawable, Framebuffer, Mesh, RenderError, Renderer, Shader, Sizable,
            Texture, TextureConfig, TextureFormat, UniformValue,
        },
        scene::{
            Camera, Component, ComponentRegistry, ComponentResult, Environment, FrameContext, GameObject, Graph,
            GraphScene, Light, Material, Message, ObjectId, Scene, SceneContext, SceneDocument, SceneError,
            SceneSystem,
        },
    };
}
