//! Components and lifecycle messages

use crate::foundation::math::Mat4;
use crate::render::Renderer;
use crate::scene::graph::ObjectId;
use std::any::Any;
use std::error::Error;
use std::fmt;

/// Result of a component lifecycle callback
pub type ComponentResult = Result<(), Box<dyn Error>>;

/// Lifecycle message delivered by [`Graph::send_message`](crate::scene::Graph::send_message)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    /// Sent once, on the first update of a scene
    Start,
    /// Per-frame update
    Update,
    /// Sent after every component received `Update`
    LateUpdate,
    /// Fixed-rate logic update
    FixedUpdate,
    /// Draw into the bound target of the current camera
    Render,
    /// Draw overlays after every camera
    GuiRender,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Update => "update",
            Self::LateUpdate => "late update",
            Self::FixedUpdate => "fixed update",
            Self::Render => "render",
            Self::GuiRender => "gui render",
        };
        f.write_str(name)
    }
}

/// State visible to a component while it handles a message
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    /// Object owning the component
    pub object: ObjectId,
    /// World matrix of the owning object
    pub world: Mat4,
    /// Seconds since the previous frame (or the fixed step for `FixedUpdate`)
    pub delta: f64,
    /// Renderer, present for `Render` and `GuiRender`
    pub renderer: Option<&'a Renderer>,
}

impl fmt::Debug for FrameContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameContext")
            .field("object", &self.object)
            .field("delta", &self.delta)
            .field("renderer", &self.renderer.is_some())
            .finish_non_exhaustive()
    }
}

/// Behavior attached to a game object
///
/// Every callback defaults to doing nothing. Errors are logged by the graph
/// and do not stop delivery to other components.
pub trait Component: Any {
    /// Type tag used by the marshal registry
    fn type_name(&self) -> &'static str;

    /// First update of the scene
    fn start(&mut self, _ctx: &FrameContext<'_>) -> ComponentResult {
        Ok(())
    }

    /// Per-frame update
    fn update(&mut self, _ctx: &FrameContext<'_>) -> ComponentResult {
        Ok(())
    }

    /// Runs after every component was updated
    fn late_update(&mut self, _ctx: &FrameContext<'_>) -> ComponentResult {
        Ok(())
    }

    /// Fixed-rate update
    fn fixed_update(&mut self, _ctx: &FrameContext<'_>) -> ComponentResult {
        Ok(())
    }

    /// Draw
    fn render(&mut self, _ctx: &FrameContext<'_>) -> ComponentResult {
        Ok(())
    }

    /// Draw overlays
    fn gui_render(&mut self, _ctx: &FrameContext<'_>) -> ComponentResult {
        Ok(())
    }

    /// Upcast for downcasting to the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Component {
    /// Deliver one message
    pub fn receive(&mut self, message: Message, ctx: &FrameContext<'_>) -> ComponentResult {
        match message {
            Message::Start => self.start(ctx),
            Message::Update => self.update(ctx),
            Message::LateUpdate => self.late_update(ctx),
            Message::FixedUpdate => self.fixed_update(ctx),
            Message::Render => self.render(ctx),
            Message::GuiRender => self.gui_render(ctx),
        }
    }

    /// Downcast to a concrete component
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Mutably downcast to a concrete component
    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

impl fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.type_name())
    }
}
