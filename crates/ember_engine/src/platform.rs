//! Window layer
//!
//! [`Window`] is what the frame loop needs from a native window: its size,
//! the close flag, event polling, buffer swaps and the graphics loader used
//! by [`Renderer::init`](crate::render::Renderer::init).
//! [`HeadlessWindow`] has no surface and is driven entirely by the caller;
//! `GlfwWindow` opens a real OpenGL 4.3 window when the `gl` feature is on.

use crate::events::{EventQueue, WindowEvent};
use crate::foundation::math::IVec2;
use crate::render::NativeWindow;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ffi::c_void;
use thiserror::Error;

#[cfg(feature = "gl")]
pub use glfw_window::GlfwWindow;

/// Window creation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The windowing library failed to start
    #[error("window system initialization failed: {0}")]
    Init(String),

    /// The window or its context could not be created
    #[error("window creation failed")]
    CreationFailed,
}

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Title bar text
    pub title: String,
    /// Width in screen coordinates
    pub width: u32,
    /// Height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
    /// Synchronize buffer swaps with the display
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
            vsync: true,
        }
    }
}

impl WindowConfig {
    /// Requested size as a vector
    pub fn size(&self) -> IVec2 {
        IVec2::new(
            i32::try_from(self.width).unwrap_or(i32::MAX),
            i32::try_from(self.height).unwrap_or(i32::MAX),
        )
    }
}

/// Native window driven by the frame loop
pub trait Window: NativeWindow {
    /// Whether the window has been asked to close
    fn should_close(&self) -> bool;

    /// Set or clear the close flag
    fn set_should_close(&mut self, close: bool);

    /// Collect pending platform events into the queue
    fn poll_events(&mut self, queue: &mut EventQueue);

    /// Present the back buffer
    fn swap_buffers(&mut self);

    /// This window as the handle the renderer initializes against
    fn as_native(&mut self) -> &mut dyn NativeWindow;
}

/// Window without a surface
///
/// Events injected with [`HeadlessWindow::inject`] are delivered on the
/// next poll. Buffer swaps are only counted.
#[derive(Debug)]
pub struct HeadlessWindow {
    size: IVec2,
    should_close: bool,
    pending: VecDeque<WindowEvent>,
    swaps: u64,
}

impl HeadlessWindow {
    /// Headless window of the given drawable size
    pub fn new(size: IVec2) -> Self {
        Self {
            size,
            should_close: false,
            pending: VecDeque::new(),
            swaps: 0,
        }
    }

    /// Headless window sized like the config
    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.size())
    }

    /// Queue an event for the next poll
    pub fn inject(&mut self, event: WindowEvent) {
        self.pending.push_back(event);
    }

    /// Number of presented frames
    pub fn swaps(&self) -> u64 {
        self.swaps
    }
}

impl NativeWindow for HeadlessWindow {
    fn framebuffer_size(&self) -> IVec2 {
        self.size
    }

    fn get_proc_address(&mut self, _symbol: &str) -> *const c_void {
        std::ptr::null()
    }
}

impl Window for HeadlessWindow {
    fn should_close(&self) -> bool {
        self.should_close
    }

    fn set_should_close(&mut self, close: bool) {
        self.should_close = close;
    }

    fn poll_events(&mut self, queue: &mut EventQueue) {
        for event in self.pending.drain(..) {
            if let WindowEvent::Resized(size) = event {
                self.size = size;
            }
            queue.push(event);
        }
    }

    fn swap_buffers(&mut self) {
        self.swaps += 1;
    }

    fn as_native(&mut self) -> &mut dyn NativeWindow {
        self
    }
}

#[cfg(feature = "gl")]
mod glfw_window {
    use super::{PlatformError, Window, WindowConfig};
    use crate::events::{EventQueue, KeyCode, MouseButton, WindowEvent};
    use crate::foundation::math::{IVec2, Vec2};
    use crate::render::NativeWindow;
    use glfw::{Action, Context, Key, OpenGlProfileHint, SwapInterval, WindowHint, WindowMode};
    use std::ffi::c_void;

    /// GLFW window with a current OpenGL 4.3 core context
    pub struct GlfwWindow {
        glfw: glfw::Glfw,
        window: glfw::PWindow,
        events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    }

    impl GlfwWindow {
        /// Open a window and make its context current
        pub fn new(config: &WindowConfig) -> Result<Self, PlatformError> {
            let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|err| PlatformError::Init(err.to_string()))?;

            glfw.window_hint(WindowHint::ContextVersion(4, 3));
            glfw.window_hint(WindowHint::OpenGlProfile(OpenGlProfileHint::Core));
            glfw.window_hint(WindowHint::OpenGlForwardCompat(true));
            glfw.window_hint(WindowHint::Resizable(config.resizable));

            let (mut window, events) = glfw
                .create_window(config.width, config.height, &config.title, WindowMode::Windowed)
                .ok_or(PlatformError::CreationFailed)?;

            window.make_current();
            glfw.set_swap_interval(if config.vsync { SwapInterval::Sync(1) } else { SwapInterval::None });

            window.set_key_polling(true);
            window.set_close_polling(true);
            window.set_framebuffer_size_polling(true);
            window.set_cursor_pos_polling(true);
            window.set_mouse_button_polling(true);

            log::info!("Opened {}x{} window '{}'", config.width, config.height, config.title);
            Ok(Self { glfw, window, events })
        }
    }

    fn key_code(key: Key) -> KeyCode {
        match key {
            Key::Escape => KeyCode::Escape,
            Key::Enter => KeyCode::Enter,
            Key::Space => KeyCode::Space,
            Key::Tab => KeyCode::Tab,
            Key::Backspace => KeyCode::Backspace,
            Key::Up => KeyCode::Up,
            Key::Down => KeyCode::Down,
            Key::Left => KeyCode::Left,
            Key::Right => KeyCode::Right,
            other => {
                let code = other as i32;
                u8::try_from(code)
                    .ok()
                    .filter(u8::is_ascii_graphic)
                    .map_or(KeyCode::Other(code), |byte| KeyCode::Char(char::from(byte)))
            }
        }
    }

    fn mouse_button(button: glfw::MouseButton) -> MouseButton {
        match button {
            glfw::MouseButton::Button1 => MouseButton::Left,
            glfw::MouseButton::Button2 => MouseButton::Right,
            glfw::MouseButton::Button3 => MouseButton::Middle,
            other => MouseButton::Other(other as u8),
        }
    }

    fn translate(event: glfw::WindowEvent) -> Option<WindowEvent> {
        match event {
            glfw::WindowEvent::Close => Some(WindowEvent::CloseRequested),
            glfw::WindowEvent::FramebufferSize(width, height) => Some(WindowEvent::Resized(IVec2::new(width, height))),
            glfw::WindowEvent::Key(key, _, action, _) => Some(WindowEvent::Key {
                key: key_code(key),
                pressed: action != Action::Release,
            }),
            #[allow(clippy::cast_possible_truncation)]
            glfw::WindowEvent::CursorPos(x, y) => Some(WindowEvent::MouseMoved(Vec2::new(x as f32, y as f32))),
            glfw::WindowEvent::MouseButton(button, action, _) => Some(WindowEvent::MouseButton {
                button: mouse_button(button),
                pressed: action == Action::Press,
            }),
            _ => None,
        }
    }

    impl NativeWindow for GlfwWindow {
        fn framebuffer_size(&self) -> IVec2 {
            let (width, height) = self.window.get_framebuffer_size();
            IVec2::new(width, height)
        }

        fn get_proc_address(&mut self, symbol: &str) -> *const c_void {
            self.window.get_proc_address(symbol) as *const c_void
        }
    }

    impl Window for GlfwWindow {
        fn should_close(&self) -> bool {
            self.window.should_close()
        }

        fn set_should_close(&mut self, close: bool) {
            self.window.set_should_close(close);
        }

        fn poll_events(&mut self, queue: &mut EventQueue) {
            self.glfw.poll_events();
            for (_, event) in glfw::flush_messages(&self.events) {
                if let Some(event) = translate(event) {
                    queue.push(event);
                }
            }
        }

        fn swap_buffers(&mut self) {
            self.window.swap_buffers();
        }

        fn as_native(&mut self) -> &mut dyn NativeWindow {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::KeyCode;

    #[test]
    fn test_headless_delivers_injected_events() {
        let mut window = HeadlessWindow::new(IVec2::new(320, 240));
        window.inject(WindowEvent::Key { key: KeyCode::Space, pressed: true });
        window.inject(WindowEvent::Resized(IVec2::new(640, 480)));

        let mut queue = EventQueue::new();
        window.poll_events(&mut queue);
        assert_eq!(queue.len(), 2);
        assert_eq!(window.framebuffer_size(), IVec2::new(640, 480));

        window.poll_events(&mut queue);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_headless_close_and_swap() {
        let mut window = HeadlessWindow::from_config(&WindowConfig::default());
        assert_eq!(window.framebuffer_size(), IVec2::new(1280, 720));
        assert!(!window.should_close());
        window.set_should_close(true);
        assert!(window.should_close());
        window.swap_buffers();
        assert_eq!(window.swaps(), 1);
        assert!(window.get_proc_address("glClear").is_null());
    }
}
