//! Baldwin test bed.
//!
//! Opens a window, brings up the configured rendering backend and draws until
//! the window is closed or a frame fails.
//!
//! Usage: `baldwin [config.toml]`. Without an argument, `baldwin.toml` in the
//! working directory is used when present.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use baldwin_core::{EngineConfig, Timer};
use baldwin_platform::{InputState, Window};
use baldwin_renderer::{Backend, RenderBackend};

/// Configuration file read when no path is given.
const DEFAULT_CONFIG: &str = "baldwin.toml";

struct Engine {
    config: EngineConfig,
    // Dropped before the window it presents to
    backend: Option<Backend>,
    window: Option<Window>,
    frame: u64,
    timer: Timer,
    input: InputState,
    error: Option<anyhow::Error>,
}

impl Engine {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            backend: None,
            window: None,
            frame: 0,
            timer: Timer::new(),
            input: InputState::new(),
            error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window =
            Window::from_config(event_loop, &self.config).context("failed to create window")?;

        let mut backend =
            Backend::create(&window, &self.config).context("failed to create backend")?;
        // A failed init has already torn down what it created
        backend.init().context("failed to initialize renderer")?;

        info!("{} backend running, entering main loop", backend.api());
        self.backend = Some(backend);
        self.window = Some(window);
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(());
        };

        backend.new_frame(&self.input, self.timer.tick());
        backend
            .run(self.frame)
            .with_context(|| format!("frame {} failed", self.frame))?;
        self.frame += 1;
        self.input.begin_frame();

        if let Some(window) = &self.window {
            window.request_redraw();
        }
        Ok(())
    }

    /// Records the first error, releases GPU resources and stops the loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.error.get_or_insert(err);
        self.shutdown();
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if let Some(backend) = self.backend.as_mut()
            && let Err(e) = backend.cleanup()
        {
            error!("Backend cleanup failed: {}", e);
            self.error
                .get_or_insert_with(|| anyhow::Error::new(e).context("cleanup failed"));
        }
    }
}

impl ApplicationHandler for Engine {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.error.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.input.handle_event(&event);

        if let WindowEvent::CloseRequested = event {
            info!("Close requested after {} frame(s), shutting down", self.frame);
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.error.is_some() || event_loop.exiting() {
            return;
        }
        if let Err(e) = self.frame() {
            self.fail(event_loop, e);
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

/// The configuration path: the first argument, or [`DEFAULT_CONFIG`].
fn config_path(mut args: impl Iterator<Item = String>) -> PathBuf {
    args.nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

fn run() -> Result<()> {
    let path = config_path(std::env::args());
    let config = EngineConfig::load_or_default(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    info!(
        "Starting Baldwin: {}x{}, {} requested",
        config.width, config.height, config.render_api
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut engine = Engine::new(config);
    event_loop.run_app(&mut engine)?;

    match engine.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    baldwin_core::init_logging();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Baldwin exited with an error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_config_path_defaults_to_working_directory() {
        assert_eq!(config_path(args(&["baldwin"])), PathBuf::from("baldwin.toml"));
    }

    #[test]
    fn test_config_path_from_first_argument() {
        assert_eq!(
            config_path(args(&["baldwin", "configs/triple.toml", "ignored"])),
            PathBuf::from("configs/triple.toml")
        );
    }
}
