use super::{
    ActiveEventLoop, App, Arc, FrameDriver, GpuModel, RenderEngine, RenderError, Window,
    WINDOW_TITLE,
};
use crate::error::Result;

impl App {
    /// Loads the model onto a freshly created engine.
    pub(super) fn start(&mut self, mut engine: RenderEngine) -> Result<()> {
        let model = crate::init::load_model(&mut engine, &self.model_bytes, &self.options)?;
        let driver = FrameDriver::new(&engine, &self.options);

        self.camera
            .set_aspect_ratio(engine.width as f32 / engine.height as f32);
        if self.options.camera.fit_to_model {
            if let Some((min, max)) = model.bounds() {
                self.camera.look_at_box(min, max);
            }
        }

        self.model = Some(model);
        self.driver = Some(driver);
        self.engine = Some(engine);
        Ok(())
    }

    /// Leaves the window up without rendering, explaining why in its title.
    pub(super) fn show_fallback(&mut self, window: &Arc<Window>, reason: String) {
        log::error!("shadow rendering unavailable: {reason}");
        window.set_title(&format!("{WINDOW_TITLE} - unsupported GPU: {reason}"));
        self.fallback = Some(reason);
    }

    pub(super) fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        if self.fallback.is_some() {
            return;
        }
        let (Some(engine), Some(model), Some(driver)) =
            (&mut self.engine, &self.model, &mut self.driver)
        else {
            return;
        };

        match render_to_surface(engine, model, driver, &self.camera) {
            Ok(Some(fps)) => {
                if let Some(window) = &self.window {
                    window.set_title(&format!("{WINDOW_TITLE} - {fps:.0} fps"));
                }
            }
            Ok(None) => {}
            Err(e) => self.fail(event_loop, e.into()),
        }
    }
}

/// Renders one frame to the window surface. Returns `None` when the frame was
/// skipped because the surface had to be reconfigured.
fn render_to_surface(
    engine: &mut RenderEngine,
    model: &GpuModel,
    driver: &mut FrameDriver,
    camera: &umbra_render::Camera,
) -> std::result::Result<Option<f32>, RenderError> {
    let Some(surface) = &engine.surface else {
        return Ok(None);
    };
    let frame = match surface.get_current_texture() {
        Ok(frame) => frame,
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            let (width, height) = (engine.width, engine.height);
            engine.resize(width, height);
            return Ok(None);
        }
        Err(wgpu::SurfaceError::Timeout) => {
            log::warn!("surface timeout, skipping frame");
            return Ok(None);
        }
        Err(wgpu::SurfaceError::OutOfMemory) => {
            return Err(RenderError::ResourceExhaustion("surface texture".into()));
        }
        Err(e) => return Err(RenderError::Validation(e.to_string())),
    };

    let view = frame
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());
    let report = driver.render_frame(engine, model, camera, &view)?;
    frame.present();
    Ok(Some(report.fps))
}
