//! Game object tree
//!
//! Objects live in a slot map and are linked into a tree by ID. The graph
//! keeps two flattened caches (every object, every component) in depth-first
//! child-insertion order. Structural changes only mark the caches dirty;
//! [`Graph::update`] rebuilds them, and [`Graph::send_message`] does so
//! lazily before dispatching.

use crate::foundation::math::{Mat4, Transform};
use crate::render::Renderer;
use crate::scene::component::{Component, FrameContext, Message};
use crate::scene::{GraphError, GraphResult};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle of a game object inside its graph
    pub struct ObjectId;
}

/// Node of the scene tree
#[derive(Debug)]
pub struct GameObject {
    name: String,
    active: bool,
    /// Local transform relative to the parent
    pub transform: Transform,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    components: Vec<Box<dyn Component>>,
    attached: bool,
}

impl GameObject {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            active: true,
            transform: Transform::default(),
            parent: None,
            children: Vec::new(),
            components: Vec::new(),
            attached: false,
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the object
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Own active flag, ignoring ancestors
    pub fn active(&self) -> bool {
        self.active
    }

    /// Enable or disable the object and, through it, its subtree
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Parent, `None` for roots and detached objects
    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// Children in insertion order
    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// Components in insertion order
    pub fn components(&self) -> &[Box<dyn Component>] {
        &self.components
    }

    /// Whether the object is part of the tree
    pub fn attached(&self) -> bool {
        self.attached
    }

    /// First component of type `T`
    pub fn component<T: Component>(&self) -> Option<&T> {
        self.components.iter().find_map(|component| component.downcast_ref::<T>())
    }

    /// First component of type `T`, mutably
    pub fn component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|component| component.downcast_mut::<T>())
    }
}

/// Game object tree of one scene
#[derive(Debug, Default)]
pub struct Graph {
    objects: SlotMap<ObjectId, GameObject>,
    roots: Vec<ObjectId>,
    object_cache: Vec<ObjectId>,
    component_cache: Vec<(ObjectId, usize)>,
    dirty: bool,
    generation: u64,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached object; it joins the tree through [`Graph::add_object`]
    pub fn create_object(&mut self, name: &str) -> ObjectId {
        self.objects.insert(GameObject::new(name))
    }

    /// Create an object and add it under `parent` (`None` for a root)
    pub fn spawn(&mut self, name: &str, parent: Option<ObjectId>) -> GraphResult<ObjectId> {
        let id = self.create_object(name);
        if let Err(err) = self.add_object(id, parent) {
            self.objects.remove(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Insert a detached object as the last child of `parent` (`None` for a root)
    pub fn add_object(&mut self, id: ObjectId, parent: Option<ObjectId>) -> GraphResult<()> {
        let object = self.objects.get(id).ok_or(GraphError::ObjectNotFound(id))?;
        if object.attached {
            return Err(GraphError::AlreadyPresent(object.name.clone()));
        }
        if let Some(parent) = parent {
            self.require_attached(parent)?;
        }

        self.link(id, parent);
        self.set_attached(id, true);
        self.dirty = true;
        Ok(())
    }

    /// Remove an object and destroy its whole subtree
    pub fn remove_object(&mut self, id: ObjectId) -> GraphResult<()> {
        self.require_attached(id)?;
        self.unlink(id);

        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(object) = self.objects.remove(next) {
                pending.extend(object.children);
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Reparent an object and its subtree under `parent` (`None` for a root)
    pub fn move_object(&mut self, id: ObjectId, parent: Option<ObjectId>) -> GraphResult<()> {
        self.require_attached(id)?;
        if let Some(parent) = parent {
            self.require_attached(parent)?;
            if parent == id || self.is_ancestor(id, parent) {
                return Err(GraphError::Cycle {
                    object: self.objects[id].name.clone(),
                    parent: self.objects[parent].name.clone(),
                });
            }
        }

        self.unlink(id);
        self.link(id, parent);
        self.dirty = true;
        Ok(())
    }

    /// Attach a component to an object, returning its index on the object
    pub fn add_component(&mut self, id: ObjectId, component: Box<dyn Component>) -> GraphResult<usize> {
        let object = self.objects.get_mut(id).ok_or(GraphError::ObjectNotFound(id))?;
        object.components.push(component);
        self.dirty = true;
        Ok(object.components.len() - 1)
    }

    /// Object by ID
    pub fn object(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(id)
    }

    /// Object by ID, mutably
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(id)
    }

    /// First component of type `T` on an object
    pub fn component<T: Component>(&self, id: ObjectId) -> Option<&T> {
        self.objects.get(id).and_then(GameObject::component)
    }

    /// First component of type `T` on an object, mutably
    pub fn component_mut<T: Component>(&mut self, id: ObjectId) -> Option<&mut T> {
        self.objects.get_mut(id).and_then(GameObject::component_mut)
    }

    /// First attached object with the given name, in depth-first order
    pub fn find(&self, name: &str) -> Option<ObjectId> {
        let mut pending: Vec<ObjectId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = pending.pop() {
            let object = &self.objects[id];
            if object.name == name {
                return Some(id);
            }
            pending.extend(object.children.iter().rev());
        }
        None
    }

    /// Root objects in insertion order
    pub fn roots(&self) -> &[ObjectId] {
        &self.roots
    }

    /// Whether the caches are stale
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Number of cache rebuilds so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cached objects in depth-first order; stale until the next [`Graph::update`]
    pub fn objects(&self) -> &[ObjectId] {
        &self.object_cache
    }

    /// Cached `(object, component index)` pairs in dispatch order
    pub fn components(&self) -> &[(ObjectId, usize)] {
        &self.component_cache
    }

    /// Rebuild both caches from the tree and clear the dirty flag
    pub fn update(&mut self) {
        self.object_cache.clear();
        self.component_cache.clear();

        let mut pending: Vec<ObjectId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = pending.pop() {
            let object = &self.objects[id];
            self.object_cache.push(id);
            self.component_cache
                .extend((0..object.components.len()).map(|index| (id, index)));
            pending.extend(object.children.iter().rev());
        }

        self.dirty = false;
        self.generation += 1;
        log::trace!(
            "Rebuilt graph caches: {} objects, {} components",
            self.object_cache.len(),
            self.component_cache.len()
        );
    }

    /// Whether an object and all its ancestors are active
    pub fn active_in_hierarchy(&self, id: ObjectId) -> bool {
        let mut current = Some(id);
        while let Some(next) = current {
            match self.objects.get(next) {
                Some(object) if object.active => current = object.parent,
                _ => return false,
            }
        }
        true
    }

    /// Product of every transform from the root down to the object
    pub fn world_matrix(&self, id: ObjectId) -> Mat4 {
        let mut matrix = Mat4::identity();
        let mut current = Some(id);
        while let Some(next) = current {
            let Some(object) = self.objects.get(next) else {
                break;
            };
            matrix = object.transform.to_matrix() * matrix;
            current = object.parent;
        }
        matrix
    }

    /// Deliver a message to every component of every active object
    ///
    /// Delivery follows the component cache, rebuilt first if dirty.
    /// Component errors are logged and delivery continues.
    pub fn send_message(&mut self, message: Message, delta: f64, renderer: Option<&Renderer>) {
        if self.dirty {
            self.update();
        }

        for slot in 0..self.component_cache.len() {
            let (id, index) = self.component_cache[slot];
            if !self.active_in_hierarchy(id) {
                continue;
            }
            let ctx = FrameContext {
                object: id,
                world: self.world_matrix(id),
                delta,
                renderer,
            };

            let object = &mut self.objects[id];
            let Some(component) = object.components.get_mut(index) else {
                continue;
            };
            if let Err(err) = component.receive(message, &ctx) {
                log::error!(
                    "{} {} on '{}' failed: {}",
                    component.type_name(),
                    message,
                    object.name,
                    err
                );
            }
        }
    }

    fn require_attached(&self, id: ObjectId) -> GraphResult<()> {
        let object = self.objects.get(id).ok_or(GraphError::ObjectNotFound(id))?;
        if object.attached {
            Ok(())
        } else {
            Err(GraphError::NotPresent(object.name.clone()))
        }
    }

    fn is_ancestor(&self, ancestor: ObjectId, id: ObjectId) -> bool {
        let mut current = self.objects.get(id).and_then(|object| object.parent);
        while let Some(next) = current {
            if next == ancestor {
                return true;
            }
            current = self.objects.get(next).and_then(|object| object.parent);
        }
        false
    }

    fn set_attached(&mut self, id: ObjectId, attached: bool) {
        if let Some(object) = self.objects.get_mut(id) {
            object.attached = attached;
        }
    }

    fn link(&mut self, id: ObjectId, parent: Option<ObjectId>) {
        match parent {
            Some(parent) => self.objects[parent].children.push(id),
            None => self.roots.push(id),
        }
        self.objects[id].parent = parent;
    }

    fn unlink(&mut self, id: ObjectId) {
        match self.objects[id].parent.take() {
            Some(parent) => self.objects[parent].children.retain(|child| *child != id),
            None => self.roots.retain(|root| *root != id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::scene::component::ComponentResult;
    use approx::assert_relative_eq;
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        tag: &'static str,
        log: Log,
        fail: bool,
    }

    impl Recorder {
        fn boxed(tag: &'static str, log: &Log) -> Box<dyn Component> {
            Box::new(Self {
                tag,
                log: log.clone(),
                fail: false,
            })
        }
    }

    impl Component for Recorder {
        fn type_name(&self) -> &'static str {
            "recorder"
        }

        fn update(&mut self, _ctx: &FrameContext<'_>) -> ComponentResult {
            self.log.borrow_mut().push(self.tag.to_string());
            if self.fail {
                return Err("recorder failure".into());
            }
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    /// root_a { a1 { a1x }, a2 }, root_b
    fn sample() -> (Graph, [ObjectId; 5]) {
        let mut graph = Graph::new();
        let root_a = graph.spawn("root_a", None).unwrap();
        let a1 = graph.spawn("a1", Some(root_a)).unwrap();
        let a1x = graph.spawn("a1x", Some(a1)).unwrap();
        let a2 = graph.spawn("a2", Some(root_a)).unwrap();
        let root_b = graph.spawn("root_b", None).unwrap();
        (graph, [root_a, a1, a1x, a2, root_b])
    }

    fn names(graph: &Graph) -> Vec<&str> {
        graph
            .objects()
            .iter()
            .map(|id| graph.object(*id).unwrap().name())
            .collect()
    }

    #[test]
    fn test_update_is_depth_first_insertion_order() {
        let (mut graph, _) = sample();
        assert!(graph.dirty());
        graph.update();
        assert!(!graph.dirty());
        assert_eq!(names(&graph), vec!["root_a", "a1", "a1x", "a2", "root_b"]);

        let before = graph.objects().to_vec();
        graph.update();
        assert_eq!(graph.objects(), before.as_slice());
    }

    #[test]
    fn test_add_twice_fails() {
        let (mut graph, [_, a1, ..]) = sample();
        assert_eq!(graph.add_object(a1, None), Err(GraphError::AlreadyPresent("a1".to_string())));
    }

    #[test]
    fn test_add_under_detached_parent_fails() {
        let mut graph = Graph::new();
        let parent = graph.create_object("parent");
        let child = graph.create_object("child");
        assert_eq!(
            graph.add_object(child, Some(parent)),
            Err(GraphError::NotPresent("parent".to_string()))
        );
        assert!(!graph.object(child).unwrap().attached());
    }

    #[test]
    fn test_remove_cascades() {
        let (mut graph, [root_a, a1, a1x, a2, _]) = sample();
        graph.remove_object(a1).unwrap();
        graph.update();

        assert_eq!(names(&graph), vec!["root_a", "a2", "root_b"]);
        assert!(graph.object(a1x).is_none());
        assert_eq!(graph.object(root_a).unwrap().children(), &[a2]);
        assert!(matches!(graph.remove_object(a1), Err(GraphError::ObjectNotFound(_))));
    }

    #[test]
    fn test_remove_detached_fails() {
        let mut graph = Graph::new();
        let loose = graph.create_object("loose");
        assert_eq!(graph.remove_object(loose), Err(GraphError::NotPresent("loose".to_string())));
    }

    #[test]
    fn test_move_reparents_subtree() {
        let (mut graph, [_, a1, _, _, root_b]) = sample();
        graph.move_object(a1, Some(root_b)).unwrap();
        graph.update();
        assert_eq!(names(&graph), vec!["root_a", "a2", "root_b", "a1", "a1x"]);
        assert_eq!(graph.object(a1).unwrap().parent(), Some(root_b));
    }

    #[test]
    fn test_move_into_descendant_is_rejected() {
        let (mut graph, [root_a, _, a1x, ..]) = sample();
        graph.update();
        let before = graph.objects().to_vec();

        let err = graph.move_object(root_a, Some(a1x)).unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
        assert!(graph.move_object(root_a, Some(root_a)).is_err());

        assert!(!graph.dirty());
        graph.update();
        assert_eq!(graph.objects(), before.as_slice());
    }

    #[test]
    fn test_find_by_name() {
        let (graph, [_, _, a1x, ..]) = sample();
        assert_eq!(graph.find("a1x"), Some(a1x));
        assert_eq!(graph.find("missing"), None);
    }

    #[test]
    fn test_messages_follow_cache_order_and_skip_inactive() {
        let log = Log::default();
        let (mut graph, [root_a, a1, a1x, a2, root_b]) = sample();
        graph.add_component(root_b, Recorder::boxed("root_b", &log)).unwrap();
        graph.add_component(a1x, Recorder::boxed("a1x", &log)).unwrap();
        graph.add_component(a2, Recorder::boxed("a2", &log)).unwrap();
        graph.add_component(root_a, Recorder::boxed("root_a", &log)).unwrap();

        graph.send_message(Message::Update, 0.0, None);
        assert_eq!(*log.borrow(), vec!["root_a", "a1x", "a2", "root_b"]);

        log.borrow_mut().clear();
        graph.object_mut(a1).unwrap().set_active(false);
        graph.send_message(Message::Update, 0.0, None);
        assert_eq!(*log.borrow(), vec!["root_a", "a2", "root_b"]);
    }

    #[test]
    fn test_failing_component_does_not_stop_dispatch() {
        let log = Log::default();
        let mut graph = Graph::new();
        let id = graph.spawn("object", None).unwrap();
        graph
            .add_component(
                id,
                Box::new(Recorder {
                    tag: "first",
                    log: log.clone(),
                    fail: true,
                }),
            )
            .unwrap();
        graph.add_component(id, Recorder::boxed("second", &log)).unwrap();

        graph.send_message(Message::Update, 0.0, None);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_world_matrix_composes_parents() {
        let (mut graph, [root_a, a1, ..]) = sample();
        graph.object_mut(root_a).unwrap().transform.position = Vec3::new(1.0, 0.0, 0.0);
        graph.object_mut(a1).unwrap().transform.position = Vec3::new(0.0, 2.0, 0.0);

        let world = graph.world_matrix(a1);
        assert_relative_eq!(world[(0, 3)], 1.0);
        assert_relative_eq!(world[(1, 3)], 2.0);
    }
}
