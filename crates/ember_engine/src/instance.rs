//! Instance registry
//!
//! Every render-owned object (shaders, textures, framebuffers, meshes,
//! materials, skyboxes) carries an [`InstanceId`] issued here. The registry
//! keeps a non-owning record per live ID for lookup and lifetime bookkeeping;
//! the objects themselves own their GPU handles and release their ID when
//! dropped.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

/// Unique integer ID of a live render object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub i32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of a registered object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Shader program
    Shader,
    /// Texture of any type
    Texture,
    /// Renderbuffer attachment
    Renderbuffer,
    /// Framebuffer or G-buffer
    Framebuffer,
    /// Vertex geometry
    Mesh,
    /// Material
    Material,
    /// Skybox
    Skybox,
}

/// Lookup record kept for each live ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    /// Object category
    pub kind: ObjectKind,
    /// Human readable name, possibly empty
    pub name: String,
}

/// Registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    /// The object already carries a live ID
    #[error("object already assigned instance id {0}")]
    AlreadyAssigned(InstanceId),

    /// No object is registered under the ID
    #[error("instance id {0} not found")]
    NotFound(InstanceId),
}

/// Result type for registry operations
pub type InstanceResult<T> = Result<T, InstanceError>;

/// Objects that can be registered
pub trait Instanced {
    /// Currently assigned ID, if any
    fn instance_id(&self) -> Option<InstanceId>;

    /// Store the ID issued by the registry
    fn set_instance_id(&mut self, id: InstanceId);

    /// Category recorded for lookups
    fn instance_kind(&self) -> ObjectKind;

    /// Name recorded for lookups
    fn instance_name(&self) -> String {
        String::new()
    }
}

/// ID issuing table
///
/// IDs start at 1 and grow monotonically; released IDs are reissued lowest first.
#[derive(Debug)]
pub struct InstanceRegistry {
    next_id: i32,
    free: BTreeSet<i32>,
    records: HashMap<InstanceId, InstanceRecord>,
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            next_id: 1,
            free: BTreeSet::new(),
            records: HashMap::new(),
        }
    }

    /// Assign a fresh ID to `object`
    ///
    /// Fails with [`InstanceError::AlreadyAssigned`] when the object already
    /// holds an ID that is still live.
    pub fn assign(&mut self, object: &mut dyn Instanced) -> InstanceResult<InstanceId> {
        if let Some(id) = object.instance_id() {
            if self.records.contains_key(&id) {
                return Err(InstanceError::AlreadyAssigned(id));
            }
        }

        let id = self.issue(object.instance_kind(), object.instance_name());
        object.set_instance_id(id);
        Ok(id)
    }

    /// Issue an ID for a newly created object
    pub fn issue(&mut self, kind: ObjectKind, name: impl Into<String>) -> InstanceId {
        let raw = match self.free.pop_first() {
            Some(raw) => raw,
            None => {
                let raw = self.next_id;
                self.next_id += 1;
                raw
            }
        };

        let id = InstanceId(raw);
        self.records.insert(
            id,
            InstanceRecord {
                kind,
                name: name.into(),
            },
        );
        log::trace!("Assigned instance {} ({:?})", id, kind);
        id
    }

    /// Release each given ID; absent IDs are ignored
    pub fn release(&mut self, ids: &[InstanceId]) {
        for id in ids {
            if self.records.remove(id).is_some() {
                self.free.insert(id.0);
                log::trace!("Released instance {}", id);
            }
        }
    }

    /// Release every ID and reset issuing
    pub fn release_all(&mut self) {
        log::debug!("Releasing all {} instances", self.records.len());
        self.records.clear();
        self.free.clear();
        self.next_id = 1;
    }

    /// Look up the record of a live ID
    pub fn get(&self, id: InstanceId) -> InstanceResult<&InstanceRecord> {
        self.records.get(&id).ok_or(InstanceError::NotFound(id))
    }

    /// Update the recorded name of a live ID
    pub fn rename(&mut self, id: InstanceId, name: impl Into<String>) -> InstanceResult<()> {
        let record = self.records.get_mut(&id).ok_or(InstanceError::NotFound(id))?;
        record.name = name.into();
        Ok(())
    }

    /// Whether the ID is live
    pub fn contains(&self, id: InstanceId) -> bool {
        self.records.contains_key(&id)
    }

    /// Number of live IDs
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no IDs are live
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
