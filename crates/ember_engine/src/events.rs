//! Platform events
//!
//! The window layer pushes [`WindowEvent`]s into an [`EventQueue`] while it
//! polls; the engine drains the queue once at the start of every frame.

use crate::foundation::math::{IVec2, Vec2};
use std::collections::VecDeque;

/// Keyboard keys the engine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// Escape
    Escape,
    /// Enter / return
    Enter,
    /// Space bar
    Space,
    /// Tab
    Tab,
    /// Backspace
    Backspace,
    /// Arrow up
    Up,
    /// Arrow down
    Down,
    /// Arrow left
    Left,
    /// Arrow right
    Right,
    /// Printable key, upper case for letters
    Char(char),
    /// Any other key, by platform code
    Other(i32),
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Primary button
    Left,
    /// Secondary button
    Right,
    /// Wheel button
    Middle,
    /// Extra buttons, by index
    Other(u8),
}

/// Event reported by the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    /// The user asked to close the window
    CloseRequested,
    /// The drawable size changed
    Resized(IVec2),
    /// A key changed state
    Key {
        /// Key
        key: KeyCode,
        /// Pressed or repeated (true) or released (false)
        pressed: bool,
    },
    /// The cursor moved, in window coordinates
    MouseMoved(Vec2),
    /// A mouse button changed state
    MouseButton {
        /// Button
        button: MouseButton,
        /// Pressed (true) or released (false)
        pressed: bool,
    },
}

/// FIFO of pending window events
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<WindowEvent>,
}

impl EventQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn push(&mut self, event: WindowEvent) {
        log::trace!("Queued {:?}", event);
        self.events.push_back(event);
    }

    /// Remove and return every pending event, oldest first
    pub fn drain(&mut self) -> impl Iterator<Item = WindowEvent> + '_ {
        self.events.drain(..)
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no event is pending
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_in_order() {
        let mut queue = EventQueue::new();
        queue.push(WindowEvent::Resized(IVec2::new(800, 600)));
        queue.push(WindowEvent::CloseRequested);
        assert_eq!(queue.len(), 2);

        let drained: Vec<_> = queue.drain().collect();
        assert_eq!(
            drained,
            vec![WindowEvent::Resized(IVec2::new(800, 600)), WindowEvent::CloseRequested]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_partial_drain_empties_queue() {
        let mut queue = EventQueue::new();
        queue.push(WindowEvent::Key { key: KeyCode::Escape, pressed: true });
        queue.push(WindowEvent::Key { key: KeyCode::Escape, pressed: false });
        assert_eq!(queue.drain().next(), Some(WindowEvent::Key { key: KeyCode::Escape, pressed: true }));
        assert!(queue.is_empty());
    }
}
