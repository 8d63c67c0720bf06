//! Scene description marshalling
//!
//! Components cross the scene file boundary through function tables keyed
//! by their type tag. A marshaller turns a component into a `ron::Value`
//! payload, an unmarshaller builds a boxed component back from one.
//! [`ComponentRegistry::register_serde`] derives both for any serde type.

use crate::foundation::math::{Quat, Quaternion, Transform, Vec3};
use crate::scene::camera::{Camera, CameraSettings};
use crate::scene::component::Component;
use crate::scene::graph::{Graph, ObjectId};
use crate::scene::light::Light;
use crate::scene::SceneResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Result type for marshalling
pub type MarshalResult<T> = Result<T, MarshalError>;

/// Marshalling errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    /// A marshaller is already registered for the type
    #[error("marshaller for '{0}' already registered")]
    DuplicateMarshaller(String),

    /// No marshaller is registered for the type
    #[error("no marshaller for '{0}'")]
    NoMarshaller(String),

    /// An unmarshaller is already registered for the type
    #[error("unmarshaller for '{0}' already registered")]
    DuplicateUnmarshaller(String),

    /// No unmarshaller is registered for the type
    #[error("no unmarshaller for '{0}'")]
    NoUnmarshaller(String),

    /// A payload did not match its component type
    #[error("invalid '{kind}' payload: {reason}")]
    Payload {
        /// Component type tag
        kind: String,
        /// Decoder message
        reason: String,
    },

    /// The document text is malformed
    #[error("scene document: {0}")]
    Format(String),
}

/// Turns a component into its payload
pub type Marshaller = Box<dyn Fn(&dyn Component) -> MarshalResult<ron::Value>>;

/// Builds a component from its payload
pub type Unmarshaller = Box<dyn Fn(ron::Value) -> MarshalResult<Box<dyn Component>>>;

/// Serialize any serde value into a payload
pub fn to_value<T: Serialize>(kind: &str, value: &T) -> MarshalResult<ron::Value> {
    let text = ron::to_string(value).map_err(|err| payload_error(kind, err))?;
    ron::from_str(&text).map_err(|err| payload_error(kind, err))
}

/// Deserialize a payload into a serde value
///
/// An omitted payload decodes like an empty struct, so components whose
/// fields all have defaults can be written as `(type: "light")`.
pub fn from_value<T: DeserializeOwned>(kind: &str, value: ron::Value) -> MarshalResult<T> {
    let omitted = value == ron::Value::Unit;
    value
        .into_rust()
        .or_else(|err| {
            if omitted {
                ron::Value::Map(ron::Map::new()).into_rust()
            } else {
                Err(err)
            }
        })
        .map_err(|err| payload_error(kind, err))
}

fn payload_error(kind: &str, err: impl fmt::Display) -> MarshalError {
    MarshalError::Payload {
        kind: kind.to_string(),
        reason: err.to_string(),
    }
}

/// Marshaller and unmarshaller tables
#[derive(Default)]
pub struct ComponentRegistry {
    marshallers: HashMap<String, Marshaller>,
    unmarshallers: HashMap<String, Unmarshaller>,
}

impl ComponentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `camera` and `light` components
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let result = registry.register_builtins();
        if let Err(err) = &result {
            log::error!("Built-in component registration failed: {}", err);
        }
        debug_assert!(result.is_ok(), "built-in registration failed: {result:?}");
        registry
    }

    fn register_builtins(&mut self) -> MarshalResult<()> {
        self.register_serde::<Light>("light")?;
        self.register_marshaller(
            "camera",
            Box::new(|component: &dyn Component| {
                let camera = downcast::<Camera>("camera", component)?;
                to_value("camera", camera.settings())
            }),
        )?;
        self.register_unmarshaller(
            "camera",
            Box::new(|value: ron::Value| {
                let settings: CameraSettings = from_value("camera", value)?;
                Ok(Box::new(Camera::from_settings(settings)) as Box<dyn Component>)
            }),
        )
    }

    /// Register a marshaller; an existing one is never replaced
    pub fn register_marshaller(&mut self, kind: &str, marshaller: Marshaller) -> MarshalResult<()> {
        if self.marshallers.contains_key(kind) {
            return Err(MarshalError::DuplicateMarshaller(kind.to_string()));
        }
        self.marshallers.insert(kind.to_string(), marshaller);
        Ok(())
    }

    /// Register an unmarshaller; an existing one is never replaced
    pub fn register_unmarshaller(&mut self, kind: &str, unmarshaller: Unmarshaller) -> MarshalResult<()> {
        if self.unmarshallers.contains_key(kind) {
            return Err(MarshalError::DuplicateUnmarshaller(kind.to_string()));
        }
        self.unmarshallers.insert(kind.to_string(), unmarshaller);
        Ok(())
    }

    /// Register both directions for a component that is plain serde data
    pub fn register_serde<T>(&mut self, kind: &'static str) -> MarshalResult<()>
    where
        T: Component + Serialize + DeserializeOwned,
    {
        if self.unmarshallers.contains_key(kind) {
            return Err(MarshalError::DuplicateUnmarshaller(kind.to_string()));
        }
        self.register_marshaller(
            kind,
            Box::new(move |component: &dyn Component| to_value(kind, downcast::<T>(kind, component)?)),
        )?;
        self.register_unmarshaller(
            kind,
            Box::new(move |value: ron::Value| {
                let component: T = from_value(kind, value)?;
                Ok(Box::new(component) as Box<dyn Component>)
            }),
        )
    }

    /// Whether a marshaller exists for the type
    pub fn has_marshaller(&self, kind: &str) -> bool {
        self.marshallers.contains_key(kind)
    }

    /// Whether an unmarshaller exists for the type
    pub fn has_unmarshaller(&self, kind: &str) -> bool {
        self.unmarshallers.contains_key(kind)
    }

    /// Produce the document entry of one component
    pub fn marshal(&self, component: &dyn Component) -> MarshalResult<ComponentDocument> {
        let kind = component.type_name();
        let marshaller = self
            .marshallers
            .get(kind)
            .ok_or_else(|| MarshalError::NoMarshaller(kind.to_string()))?;
        Ok(ComponentDocument {
            kind: kind.to_string(),
            data: marshaller(component)?,
        })
    }

    /// Build a component from its document entry
    pub fn unmarshal(&self, document: &ComponentDocument) -> MarshalResult<Box<dyn Component>> {
        let unmarshaller = self
            .unmarshallers
            .get(&document.kind)
            .ok_or_else(|| MarshalError::NoUnmarshaller(document.kind.clone()))?;
        unmarshaller(document.data.clone())
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut marshallers: Vec<_> = self.marshallers.keys().collect();
        marshallers.sort();
        let mut unmarshallers: Vec<_> = self.unmarshallers.keys().collect();
        unmarshallers.sort();
        f.debug_struct("ComponentRegistry")
            .field("marshallers", &marshallers)
            .field("unmarshallers", &unmarshallers)
            .finish()
    }
}

fn downcast<'a, T: Component>(kind: &str, component: &'a dyn Component) -> MarshalResult<&'a T> {
    component.as_any().downcast_ref::<T>().ok_or_else(|| MarshalError::Payload {
        kind: kind.to_string(),
        reason: format!("component is a '{}'", component.type_name()),
    })
}

/// Scene description document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    /// Scene name
    pub name: String,
    /// Root objects in order
    #[serde(default)]
    pub objects: Vec<ObjectDocument>,
}

impl SceneDocument {
    /// Parse a RON document
    pub fn from_ron(text: &str) -> MarshalResult<Self> {
        ron::from_str(text).map_err(|err| MarshalError::Format(err.to_string()))
    }

    /// Write the document as pretty RON
    pub fn to_ron(&self) -> MarshalResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|err| MarshalError::Format(err.to_string()))
    }
}

/// One game object in a scene document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDocument {
    /// Object name
    pub name: String,
    /// Active flag
    #[serde(default = "default_active")]
    pub active: bool,
    /// Local transform
    #[serde(default)]
    pub transform: TransformDocument,
    /// Components in order
    #[serde(default)]
    pub components: Vec<ComponentDocument>,
    /// Children in order
    #[serde(default)]
    pub children: Vec<ObjectDocument>,
}

fn default_active() -> bool {
    true
}

/// Local transform as plain arrays; rotation is `[x, y, z, w]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformDocument {
    /// Translation
    pub position: [f32; 3],
    /// Rotation quaternion
    pub rotation: [f32; 4],
    /// Scale
    pub scale: [f32; 3],
}

impl Default for TransformDocument {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl From<&Transform> for TransformDocument {
    fn from(transform: &Transform) -> Self {
        let rotation = transform.rotation.quaternion().coords;
        Self {
            position: transform.position.into(),
            rotation: [rotation.x, rotation.y, rotation.z, rotation.w],
            scale: transform.scale.into(),
        }
    }
}

impl From<TransformDocument> for Transform {
    fn from(document: TransformDocument) -> Self {
        let [x, y, z, w] = document.rotation;
        Self {
            position: Vec3::from(document.position),
            rotation: Quat::from_quaternion(Quaternion::new(w, x, y, z)),
            scale: Vec3::from(document.scale),
        }
    }
}

/// One component in a scene document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDocument {
    /// Type tag resolved through the registry
    #[serde(rename = "type")]
    pub kind: String,
    /// Component payload
    #[serde(default = "empty_payload")]
    pub data: ron::Value,
}

fn empty_payload() -> ron::Value {
    ron::Value::Unit
}

/// Populate a graph from a document, returning the root objects created
///
/// Objects are added in document order. The first failing component aborts
/// the build; objects created before it stay in the graph.
pub fn build_scene(document: &SceneDocument, graph: &mut Graph, registry: &ComponentRegistry) -> SceneResult<Vec<ObjectId>> {
    let mut roots = Vec::with_capacity(document.objects.len());
    for object in &document.objects {
        roots.push(build_object(object, None, graph, registry)?);
    }
    log::debug!("Built scene '{}' with {} root objects", document.name, roots.len());
    Ok(roots)
}

fn build_object(
    document: &ObjectDocument,
    parent: Option<ObjectId>,
    graph: &mut Graph,
    registry: &ComponentRegistry,
) -> SceneResult<ObjectId> {
    let id = graph.spawn(&document.name, parent)?;
    if let Some(object) = graph.object_mut(id) {
        object.set_active(document.active);
        object.transform = document.transform.into();
    }
    for component in &document.components {
        let component = registry.unmarshal(component)?;
        graph.add_component(id, component)?;
    }
    for child in &document.children {
        build_object(child, Some(id), graph, registry)?;
    }
    Ok(id)
}

/// Describe every object reachable from the graph roots
pub fn marshal_graph(graph: &Graph, registry: &ComponentRegistry, name: &str) -> MarshalResult<SceneDocument> {
    let objects = graph
        .roots()
        .iter()
        .map(|&root| marshal_object(graph, registry, root))
        .collect::<MarshalResult<Vec<_>>>()?;
    Ok(SceneDocument {
        name: name.to_string(),
        objects,
    })
}

fn marshal_object(graph: &Graph, registry: &ComponentRegistry, id: ObjectId) -> MarshalResult<ObjectDocument> {
    let Some(object) = graph.object(id) else {
        return Err(MarshalError::Format(format!("dangling object {id:?}")));
    };
    let components = object
        .components()
        .iter()
        .map(|component| registry.marshal(component.as_ref()))
        .collect::<MarshalResult<Vec<_>>>()?;
    let children = object
        .children()
        .iter()
        .map(|&child| marshal_object(graph, registry, child))
        .collect::<MarshalResult<Vec<_>>>()?;
    Ok(ObjectDocument {
        name: object.name().to_string(),
        active: object.active(),
        transform: TransformDocument::from(&object.transform),
        components,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use crate::scene::camera::RenderPath;
    use crate::scene::light::LightKind;
    use approx::assert_relative_eq;
    use std::any::Any;

    const SCENE: &str = r#"(
        name: "level",
        objects: [
            (
                name: "sun",
                transform: (position: (0.0, 10.0, 0.0)),
                components: [
                    (type: "light", data: (kind: "directional", color: (1.0, 0.9, 0.8), intensity: 3.0)),
                ],
            ),
            (
                name: "player",
                children: [
                    (
                        name: "eye",
                        active: false,
                        components: [(type: "camera", data: (render_path: "deferred", fov_y: 1.0))],
                    ),
                ],
            ),
        ],
    )"#;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Health {
        points: u32,
    }

    impl Component for Health {
        fn type_name(&self) -> &'static str {
            "health"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_build_scene_from_document() {
        let document = SceneDocument::from_ron(SCENE).unwrap();
        let registry = ComponentRegistry::with_builtins();
        let mut graph = Graph::new();

        let roots = build_scene(&document, &mut graph, &registry).unwrap();
        assert_eq!(roots.len(), 2);

        let sun = graph.find("sun").unwrap();
        let light = graph.component::<Light>(sun).unwrap();
        assert_eq!(light.kind, LightKind::Directional);
        assert_relative_eq!(light.intensity, 3.0);
        assert_relative_eq!(graph.object(sun).unwrap().transform.position.y, 10.0);

        let eye = graph.find("eye").unwrap();
        let camera = graph.component::<Camera>(eye).unwrap();
        assert_eq!(camera.render_path(), RenderPath::Deferred);
        assert_relative_eq!(camera.settings().fov_y, 1.0);
        assert_relative_eq!(camera.settings().far, 100.0);
        assert!(!graph.object(eye).unwrap().active());
    }

    #[test]
    fn test_graph_round_trip() {
        let registry = ComponentRegistry::with_builtins();
        let mut graph = Graph::new();
        build_scene(&SceneDocument::from_ron(SCENE).unwrap(), &mut graph, &registry).unwrap();

        let document = marshal_graph(&graph, &registry, "level").unwrap();
        let mut copy = Graph::new();
        build_scene(&document, &mut copy, &registry).unwrap();

        assert_eq!(marshal_graph(&copy, &registry, "level").unwrap(), document);
        let text = document.to_ron().unwrap();
        assert_eq!(SceneDocument::from_ron(&text).unwrap(), document);
    }

    #[test]
    fn test_component_round_trip() {
        let registry = ComponentRegistry::with_builtins();
        let mut camera = Camera::new();
        camera.set_clear_color(Vec4::new(0.1, 0.2, 0.3, 1.0));
        camera.set_render_path(RenderPath::Deferred);

        let document = registry.marshal(&camera).unwrap();
        assert_eq!(document.kind, "camera");
        let restored = registry.unmarshal(&document).unwrap();
        let restored = restored.downcast_ref::<Camera>().unwrap();
        assert_eq!(restored.settings(), camera.settings());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ComponentRegistry::with_builtins();
        assert_eq!(
            registry.register_serde::<Light>("light"),
            Err(MarshalError::DuplicateUnmarshaller("light".into()))
        );
        assert!(registry.register_serde::<Health>("health").is_ok());
        assert_eq!(
            registry.register_marshaller("health", Box::new(|_: &dyn Component| Ok(ron::Value::Unit))),
            Err(MarshalError::DuplicateMarshaller("health".into()))
        );
    }

    #[test]
    fn test_builtins_registered_once() {
        let mut registry = ComponentRegistry::with_builtins();
        for kind in ["light", "camera"] {
            assert!(registry.has_marshaller(kind), "{kind}");
            assert!(registry.has_unmarshaller(kind), "{kind}");
        }
        assert!(registry.register_builtins().is_err());
    }

    #[test]
    fn test_unknown_type_not_substituted() {
        let registry = ComponentRegistry::with_builtins();
        let document = ComponentDocument {
            kind: "health".into(),
            data: ron::Value::Unit,
        };
        assert_eq!(
            registry.unmarshal(&document).err(),
            Some(MarshalError::NoUnmarshaller("health".into()))
        );
        assert_eq!(
            registry.marshal(&Health::default()).err(),
            Some(MarshalError::NoMarshaller("health".into()))
        );
    }

    #[test]
    fn test_user_component_round_trip() {
        let mut registry = ComponentRegistry::new();
        registry.register_serde::<Health>("health").unwrap();
        let document = registry.marshal(&Health { points: 7 }).unwrap();
        let restored = registry.unmarshal(&document).unwrap();
        assert_eq!(restored.downcast_ref::<Health>(), Some(&Health { points: 7 }));
    }

    #[test]
    fn test_bad_payload() {
        let registry = ComponentRegistry::with_builtins();
        let document = ComponentDocument {
            kind: "light".into(),
            data: ron::from_str(r#"(kind: "area")"#).unwrap(),
        };
        assert!(matches!(registry.unmarshal(&document), Err(MarshalError::Payload { .. })));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(SceneDocument::from_ron("(name: "), Err(MarshalError::Format(_))));
    }
}
