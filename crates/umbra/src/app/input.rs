use super::{
    ActiveEventLoop, App, ApplicationHandler, Arc, ElementState, FutureExt, KeyCode, LogicalSize,
    MouseButton, MouseScrollDelta, PhysicalKey, RenderEngine, RenderError, Vec2, Window,
    WindowEvent, WindowId, WINDOW_TITLE,
};
use crate::error::Error;

/// Pixels of trackpad scrolling per wheel line.
const PIXELS_PER_LINE: f32 = 40.0;

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(
                self.options.window_width,
                self.options.window_height,
            ));
        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.fail(event_loop, Error::Window(e.to_string()));
                return;
            }
        };
        self.window = Some(window.clone());

        // Capability gate, before any model resource is allocated.
        match RenderEngine::new_windowed(window.clone()).block_on() {
            Ok(engine) => {
                if let Err(e) = self.start(engine) {
                    self.fail(event_loop, e);
                }
            }
            Err(RenderError::Unsupported(reason)) => self.show_fallback(&window, reason),
            Err(RenderError::AdapterCreationFailed) => {
                self.show_fallback(&window, "no GPU adapter available".into());
            }
            Err(e) => self.fail(event_loop, e.into()),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(engine) = &mut self.engine {
                    engine.resize(size.width, size.height);
                    self.camera
                        .set_aspect_ratio(engine.width as f32 / engine.height as f32);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::MouseInput { state, button, .. } => {
                let pressed = state == ElementState::Pressed;
                match button {
                    MouseButton::Left => self.left_mouse_down = pressed,
                    MouseButton::Right => self.right_mouse_down = pressed,
                    _ => {}
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let pos = Vec2::new(position.x as f32, position.y as f32);
                let delta = pos - self.mouse_pos;
                let viewport = self.viewport();
                if self.left_mouse_down {
                    self.camera.arcball_rotate(self.mouse_pos, pos, viewport);
                } else if self.right_mouse_down {
                    self.camera.pan(-delta.x / viewport.x, delta.y / viewport.y);
                }
                self.mouse_pos = pos;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
                self.camera.zoom(scroll);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.fallback.is_some() {
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}
