//! Shared render state
//!
//! A [`RenderContext`] is created by the [`Renderer`](crate::render::Renderer)
//! and handed to every render object it makes. It owns the device, the
//! instance registry and the framebuffer stack, and tracks the window
//! resolution used when the default backbuffer is restored.

use crate::foundation::math::IVec2;
use crate::instance::{InstanceId, InstanceRegistry, ObjectKind};
use crate::render::device::GraphicsDevice;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

/// A framebuffer pushed onto the binding stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEntry {
    /// Owning framebuffer instance
    pub id: InstanceId,
    /// Device handle
    pub reference: u32,
    /// Viewport restored when this entry becomes current again
    pub size: IVec2,
}

/// Device, registry and framebuffer stack shared by render objects
pub struct RenderContext {
    device: Rc<dyn GraphicsDevice>,
    instances: RefCell<InstanceRegistry>,
    framebuffers: RefCell<Vec<StackEntry>>,
    resolution: Cell<IVec2>,
}

impl RenderContext {
    /// Create a context around a device
    pub fn new(device: Rc<dyn GraphicsDevice>, resolution: IVec2) -> Self {
        Self {
            device,
            instances: RefCell::new(InstanceRegistry::new()),
            framebuffers: RefCell::new(Vec::new()),
            resolution: Cell::new(resolution),
        }
    }

    /// The device every render object talks to
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// Read access to the instance registry
    pub fn instances(&self) -> Ref<'_, InstanceRegistry> {
        self.instances.borrow()
    }

    /// Write access to the instance registry
    pub fn instances_mut(&self) -> RefMut<'_, InstanceRegistry> {
        self.instances.borrow_mut()
    }

    /// Issue an ID for a new object
    pub fn issue_instance(&self, kind: ObjectKind, name: &str) -> InstanceId {
        self.instances.borrow_mut().issue(kind, name)
    }

    /// Release an object's ID; tolerates a registry that is already borrowed
    pub fn release_instance(&self, id: InstanceId) {
        if let Ok(mut instances) = self.instances.try_borrow_mut() {
            instances.release(&[id]);
        }
    }

    /// Keep an object's registry record in step with its name
    pub fn rename_instance(&self, id: InstanceId, name: &str) {
        if let Err(err) = self.instances.borrow_mut().rename(id, name) {
            log::warn!("Could not rename instance {}: {}", id, err);
        }
    }

    /// Window resolution used for the default backbuffer
    pub fn resolution(&self) -> IVec2 {
        self.resolution.get()
    }

    /// Update the window resolution
    ///
    /// When no framebuffer is bound the viewport follows immediately.
    pub fn set_resolution(&self, resolution: IVec2) {
        self.resolution.set(resolution);
        if self.framebuffers.borrow().is_empty() {
            self.device.viewport(resolution);
        }
    }

    /// Top of the framebuffer stack
    pub fn current_framebuffer(&self) -> Option<StackEntry> {
        self.framebuffers.borrow().last().copied()
    }

    /// Number of framebuffers on the stack
    pub fn framebuffer_depth(&self) -> usize {
        self.framebuffers.borrow().len()
    }

    /// Handles of the stacked framebuffers, bottom first
    pub fn framebuffer_stack(&self) -> Vec<u32> {
        self.framebuffers.borrow().iter().map(|entry| entry.reference).collect()
    }

    /// Bind the top of the stack, or the backbuffer sized to the window
    pub fn bind_current_framebuffer(&self) {
        match self.current_framebuffer() {
            Some(entry) => {
                self.device.bind_framebuffer(entry.reference);
                self.device.viewport(entry.size);
            }
            None => {
                self.device.bind_framebuffer(0);
                self.device.viewport(self.resolution.get());
            }
        }
    }

    pub(crate) fn push_framebuffer(&self, entry: StackEntry) {
        self.framebuffers.borrow_mut().push(entry);
    }

    pub(crate) fn pop_framebuffer(&self) -> Option<StackEntry> {
        self.framebuffers.borrow_mut().pop()
    }

    pub(crate) fn resize_stacked(&self, id: InstanceId, size: IVec2) {
        for entry in self.framebuffers.borrow_mut().iter_mut().filter(|entry| entry.id == id) {
            entry.size = size;
        }
    }

    /// Point every stack entry of a framebuffer at its current device handle
    pub(crate) fn rereference_stacked(&self, id: InstanceId, reference: u32) {
        for entry in self.framebuffers.borrow_mut().iter_mut().filter(|entry| entry.id == id) {
            entry.reference = reference;
        }
    }

    /// Drop every stack entry of a framebuffer, returning whether any was removed
    pub(crate) fn remove_stacked(&self, id: InstanceId) -> bool {
        let mut framebuffers = self.framebuffers.borrow_mut();
        let before = framebuffers.len();
        framebuffers.retain(|entry| entry.id != id);
        before != framebuffers.len()
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("backend", &self.device.backend_name())
            .field("instances", &self.instances.borrow().len())
            .field("framebuffers", &self.framebuffers.borrow())
            .field("resolution", &self.resolution.get())
            .finish()
    }
}
