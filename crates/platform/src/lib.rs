//! Windowing and input for the vkpbr viewer.
//!
//! - [`Window`]: a winit window exposing raw handles for surface creation
//! - [`InputState`]: accumulated mouse drag, scroll and key state

mod input;
mod window;

pub use input::{InputState, MouseButton};
pub use window::Window;

pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
pub use winit::keyboard::KeyCode;
