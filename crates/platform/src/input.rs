//! Mouse input tracking for the UI overlay.

use std::collections::HashSet;

use winit::event::{ElementState, MouseScrollDelta, WindowEvent};

/// Lines scrolled per pixel of touchpad scroll.
const PIXELS_PER_LINE: f32 = 20.0;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Maps a winit button. Extra buttons are ignored.
    pub fn from_winit(button: winit::event::MouseButton) -> Option<Self> {
        match button {
            winit::event::MouseButton::Left => Some(MouseButton::Left),
            winit::event::MouseButton::Right => Some(MouseButton::Right),
            winit::event::MouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// Tracks the current state of the mouse.
#[derive(Debug, Default)]
pub struct InputState {
    /// Currently pressed mouse buttons
    pressed_buttons: HashSet<MouseButton>,
    /// Current mouse position in physical pixels
    mouse_position: (f32, f32),
    /// Scroll since the last `begin_frame`, in lines
    scroll_delta: (f32, f32),
}

impl InputState {
    /// Create a new input state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the beginning of each frame to clear per-frame state.
    pub fn begin_frame(&mut self) {
        self.scroll_delta = (0.0, 0.0);
    }

    /// Updates state from a window event. Other events are ignored.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = MouseButton::from_winit(*button) {
                    match state {
                        ElementState::Pressed => self.on_mouse_pressed(button),
                        ElementState::Released => self.on_mouse_released(button),
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => match delta {
                MouseScrollDelta::LineDelta(x, y) => self.on_scroll(*x, *y),
                MouseScrollDelta::PixelDelta(pos) => self.on_scroll(
                    pos.x as f32 / PIXELS_PER_LINE,
                    pos.y as f32 / PIXELS_PER_LINE,
                ),
            },
            _ => {}
        }
    }

    /// Handle a mouse button press event.
    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        self.pressed_buttons.insert(button);
    }

    /// Handle a mouse button release event.
    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Handle mouse movement.
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        self.mouse_position = (x, y);
    }

    /// Accumulates scroll until the next `begin_frame`.
    pub fn on_scroll(&mut self, delta_x: f32, delta_y: f32) {
        self.scroll_delta.0 += delta_x;
        self.scroll_delta.1 += delta_y;
    }

    /// Check if a mouse button is currently pressed.
    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    /// Get the current mouse position.
    pub fn mouse_position(&self) -> (f32, f32) {
        self.mouse_position
    }

    /// Get the scroll delta since last frame.
    pub fn scroll_delta(&self) -> (f32, f32) {
        self.scroll_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_press_and_release() {
        let mut input = InputState::new();
        input.on_mouse_pressed(MouseButton::Left);
        assert!(input.is_mouse_pressed(MouseButton::Left));
        assert!(!input.is_mouse_pressed(MouseButton::Right));

        input.on_mouse_released(MouseButton::Left);
        assert!(!input.is_mouse_pressed(MouseButton::Left));
    }

    #[test]
    fn test_scroll_accumulates_until_next_frame() {
        let mut input = InputState::new();
        input.on_scroll(0.0, 1.0);
        input.on_scroll(0.0, 2.0);
        assert_eq!(input.scroll_delta(), (0.0, 3.0));

        input.begin_frame();
        assert_eq!(input.scroll_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_position_survives_frame_boundary() {
        let mut input = InputState::new();
        input.on_mouse_moved(10.0, 20.0);
        input.begin_frame();
        assert_eq!(input.mouse_position(), (10.0, 20.0));
    }

    #[test]
    fn test_extra_buttons_are_ignored() {
        assert_eq!(
            MouseButton::from_winit(winit::event::MouseButton::Middle),
            Some(MouseButton::Middle)
        );
        assert_eq!(
            MouseButton::from_winit(winit::event::MouseButton::Back),
            None
        );
    }
}
