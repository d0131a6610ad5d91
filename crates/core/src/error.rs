//! Engine-level error types.

use thiserror::Error;

/// Errors raised outside the GPU interface: window, configuration, IO and
/// failures bubbled up from the renderer.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Renderer failures (device, swapchain, per-frame submission)
    #[error("Render error: {0}")]
    Render(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
