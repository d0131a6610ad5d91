//! Platform layer for the Baldwin engine.
//!
//! - [`Window`]: the fixed-size winit window and its Vulkan [`Surface`]
//! - [`InputState`]: mouse state fed to the UI overlay each frame

mod input;
mod window;

pub use input::{InputState, MouseButton};
pub use window::{Surface, Window};
