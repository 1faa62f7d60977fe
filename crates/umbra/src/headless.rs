//! Headless rendering.
//!
//! Renders a model into an offscreen RGBA8 target without opening a window.
//! Used by the integration tests and for batch captures.

use pollster::FutureExt;
use umbra_core::Options;
use umbra_render::{Camera, FrameDriver, FrameReport, GpuModel, RenderEngine};

use crate::error::{Error, Result};
use crate::init::load_model;

/// An offscreen engine with one loaded model.
pub struct HeadlessRenderer {
    engine: RenderEngine,
    driver: FrameDriver,
    model: GpuModel,
    /// Camera used by the next [`HeadlessRenderer::render`].
    pub camera: Camera,
}

impl HeadlessRenderer {
    /// Creates a `width` x `height` headless engine and loads `bytes` into it.
    pub fn new(bytes: &[u8], options: &Options, width: u32, height: u32) -> Result<Self> {
        let mut engine = RenderEngine::new_headless(width, height).block_on()?;
        let model = load_model(&mut engine, bytes, options)?;
        let driver = FrameDriver::new(&engine, options);

        let aspect = engine.width as f32 / engine.height as f32;
        let mut camera = Camera::from_options(&options.camera, aspect);
        if options.camera.fit_to_model {
            if let Some((min, max)) = model.bounds() {
                camera.look_at_box(min, max);
            }
        }

        Ok(Self {
            engine,
            driver,
            model,
            camera,
        })
    }

    /// Renders one frame and reads the colour target back as tightly packed
    /// RGBA8 rows, top row first.
    pub fn render(&mut self) -> Result<(Vec<u8>, FrameReport)> {
        let view = self
            .engine
            .headless_view()
            .ok_or_else(|| Error::Window("headless engine has no colour target".into()))?;
        let report = self
            .driver
            .render_frame(&self.engine, &self.model, &self.camera, view)?;
        let pixels = self.engine.capture_headless()?;
        Ok((pixels, report))
    }

    #[must_use]
    pub fn model(&self) -> &GpuModel {
        &self.model
    }

    /// Mutable access to the model and the queue that updates it.
    pub fn model_mut(&mut self) -> (&mut GpuModel, &wgpu::Queue) {
        (&mut self.model, &self.engine.queue)
    }

    #[must_use]
    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }
}

impl Drop for HeadlessRenderer {
    fn drop(&mut self) {
        self.model.release_all();
    }
}

/// Renders a GLB byte stream to a raw RGBA pixel buffer.
///
/// The returned buffer has `width * height * 4` bytes.
///
/// # Example
/// ```no_run
/// let bytes = std::fs::read("model.glb").unwrap();
/// let pixels = umbra::render_to_image(&bytes, &umbra::Options::default(), 800, 600).unwrap();
/// assert_eq!(pixels.len(), 800 * 600 * 4);
/// ```
pub fn render_to_image(bytes: &[u8], options: &Options, width: u32, height: u32) -> Result<Vec<u8>> {
    let mut renderer = HeadlessRenderer::new(bytes, options, width, height)?;
    let (pixels, _) = renderer.render()?;
    Ok(pixels)
}
