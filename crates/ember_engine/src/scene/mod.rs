//! Scene management
//!
//! A [`Graph`] owns the game object tree of one scene and the flattened
//! caches rebuilt from it. A [`GraphScene`] wraps a graph together with its
//! [`Environment`] and cameras, and the [`SceneSystem`] keeps the stack of
//! active scenes and drives the top one each frame.
//!
//! ```text
//! SceneSystem ──► GraphScene ──► Graph ──► GameObject ──► Component
//!                     │
//!                     └──► Environment (skybox, sun, deferred shader)
//! ```

pub mod camera;
pub mod component;
pub mod environment;
pub mod graph;
pub mod light;
pub mod marshal;
pub mod material;
pub mod scene;
pub mod skybox;
pub mod system;

pub use camera::{Camera, CameraSettings, RenderPath};
pub use component::{Component, ComponentResult, FrameContext, Message};
pub use environment::{Environment, EnvironmentLighting, LightingSource};
pub use graph::{GameObject, Graph, ObjectId};
pub use light::{Light, LightKind};
pub use marshal::{
    build_scene, marshal_graph, ComponentDocument, ComponentRegistry, MarshalError, ObjectDocument, SceneDocument,
    TransformDocument,
};
pub use material::{slots, Material, MaterialDescription, MaterialError, MaterialResult};
pub use scene::{GraphScene, LoadHook, Scene, SceneContext, TransitionHook};
pub use skybox::{Skybox, SkyboxError};
pub use system::SceneSystem;

use thiserror::Error;

/// Structural graph errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The ID does not name a live object
    #[error("object {0:?} not found")]
    ObjectNotFound(ObjectId),

    /// The object is already part of the tree
    #[error("object '{0}' is already in the graph")]
    AlreadyPresent(String),

    /// The object exists but is not part of the tree
    #[error("object '{0}' is not in the graph")]
    NotPresent(String),

    /// Reparenting would make an object its own ancestor
    #[error("moving '{object}' under '{parent}' would create a cycle")]
    Cycle {
        /// Object being moved
        object: String,
        /// Requested parent
        parent: String,
    },
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Scene and scene system errors
#[derive(Error, Debug)]
pub enum SceneError {
    /// A scene with the same name is already registered
    #[error("'{0}' already registered")]
    AlreadyRegistered(String),

    /// No scene is registered under the name
    #[error("'{0}' not registered")]
    NotRegistered(String),

    /// The scene's load hook failed
    #[error("scene '{scene}' failed to load: {reason}")]
    LoadFailed {
        /// Scene name
        scene: String,
        /// Hook error text
        reason: String,
    },

    /// Graph error while building a scene
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Scene description error
    #[error(transparent)]
    Marshal(#[from] MarshalError),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
