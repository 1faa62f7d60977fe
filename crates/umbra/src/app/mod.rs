//! Application window and event loop management.

mod input;
mod render;

pub(super) use std::sync::Arc;

pub(super) use glam::Vec2;
pub(super) use pollster::FutureExt;
pub(super) use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

pub(super) use umbra_core::Options;
pub(super) use umbra_render::{Camera, FrameDriver, GpuModel, RenderEngine, RenderError};

use crate::error::{Error, Result};

/// Title prefix of the viewer window.
pub(super) const WINDOW_TITLE: &str = "umbra";

/// The viewer application state.
pub struct App {
    pub(super) options: Options,
    pub(super) model_bytes: Vec<u8>,
    pub(super) window: Option<Arc<Window>>,
    pub(super) engine: Option<RenderEngine>,
    pub(super) model: Option<GpuModel>,
    pub(super) driver: Option<FrameDriver>,
    pub(super) camera: Camera,
    /// Set when the GPU cannot run the renderer; the window then stays static.
    pub(super) fallback: Option<String>,
    /// First fatal error, returned from [`run_app`].
    pub(super) error: Option<Error>,
    // Mouse state for camera control
    pub(super) mouse_pos: Vec2,
    pub(super) left_mouse_down: bool,
    pub(super) right_mouse_down: bool,
}

impl App {
    /// Creates an application that will show `model_bytes` once the window exists.
    pub fn new(options: Options, model_bytes: Vec<u8>) -> Self {
        let camera = Camera::from_options(&options.camera, options.aspect_ratio());
        Self {
            options,
            model_bytes,
            window: None,
            engine: None,
            model: None,
            driver: None,
            camera,
            fallback: None,
            error: None,
            mouse_pos: Vec2::ZERO,
            left_mouse_down: false,
            right_mouse_down: false,
        }
    }

    /// Records a fatal error and stops the event loop.
    pub(super) fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        log::error!("{error}");
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    /// Viewport size in physical pixels.
    pub(super) fn viewport(&self) -> Vec2 {
        self.engine.as_ref().map_or(Vec2::ONE, |e| {
            Vec2::new(e.width as f32, e.height as f32)
        })
    }
}

/// Opens the viewer window and blocks until it is closed.
pub fn run_app(options: Options, model_bytes: Vec<u8>) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|e| Error::Window(e.to_string()))?;
    let mut app = App::new(options, model_bytes);

    event_loop
        .run_app(&mut app)
        .map_err(|e| Error::Window(e.to_string()))?;

    if let (Some(model), Some(_)) = (&app.model, &app.engine) {
        model.release_all();
    }
    match app.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
