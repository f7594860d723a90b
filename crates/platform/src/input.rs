//! Mouse and keyboard state for camera control.

use std::collections::HashSet;

use glam::Vec2;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// Pixels per wheel line for touchpads reporting pixel deltas.
const PIXELS_PER_LINE: f32 = 40.0;

/// Input accumulated between two frames.
///
/// Drag and scroll deltas accumulate until taken, so several events per
/// frame are summed rather than the last one winning.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    cursor: Option<Vec2>,
    /// Cursor motion while the drag button is held.
    drag: Vec2,
    /// Wheel lines, positive away from the user.
    scroll: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one window event. Returns `true` if it was an input event.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.on_key_pressed(key),
                        ElementState::Released => self.on_key_released(key),
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => {
                    self.pressed_buttons.insert((*button).into());
                }
                ElementState::Released => {
                    self.pressed_buttons.remove(&(*button).into());
                }
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.on_cursor_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::CursorLeft { .. } => self.cursor = None,
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
            }
            _ => return false,
        }
        true
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_cursor_moved(&mut self, position: Vec2) {
        if let Some(previous) = self.cursor
            && self.pressed_buttons.contains(&MouseButton::Left)
        {
            self.drag += position - previous;
        }
        self.cursor = Some(position);
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// True once per press, until the next [`end_frame`](Self::end_frame).
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }
    /// Drag distance in pixels since the last call.
    pub fn take_drag(&mut self) -> Vec2 {
        std::mem::take(&mut self.drag)
    }

    /// Scroll lines since the last call.
    pub fn take_scroll(&mut self) -> f32 {
        std::mem::take(&mut self.scroll)
    }

    /// Clear per-frame edge state.
    pub fn end_frame(&mut self) {
        self.just_pressed_keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_accumulates_only_while_left_button_held() {
        let mut input = InputState::new();
        input.on_cursor_moved(Vec2::new(10.0, 10.0));
        input.on_cursor_moved(Vec2::new(20.0, 10.0));
        assert_eq!(input.take_drag(), Vec2::ZERO);

        input.pressed_buttons.insert(MouseButton::Left);
        input.on_cursor_moved(Vec2::new(25.0, 12.0));
        input.on_cursor_moved(Vec2::new(30.0, 20.0));
        assert_eq!(input.take_drag(), Vec2::new(10.0, 10.0));
        assert_eq!(input.take_drag(), Vec2::ZERO);
    }

    #[test]
    fn first_cursor_position_is_not_a_drag() {
        let mut input = InputState::new();
        input.pressed_buttons.insert(MouseButton::Left);
        input.on_cursor_moved(Vec2::new(500.0, 300.0));
        assert_eq!(input.take_drag(), Vec2::ZERO);
    }

    #[test]
    fn key_edges_clear_at_end_of_frame() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Escape);
        input.on_key_pressed(KeyCode::Escape);
        assert!(input.is_key_just_pressed(KeyCode::Escape));
        input.end_frame();
        assert!(!input.is_key_just_pressed(KeyCode::Escape));
        assert!(input.is_key_pressed(KeyCode::Escape));

        input.on_key_released(KeyCode::Escape);
        assert!(!input.is_key_pressed(KeyCode::Escape));
    }

    #[test]
    fn winit_buttons_map_to_local_buttons() {
        assert_eq!(MouseButton::from(winit::event::MouseButton::Right), MouseButton::Right);
        assert_eq!(MouseButton::from(winit::event::MouseButton::Back), MouseButton::Other);
    }
}
