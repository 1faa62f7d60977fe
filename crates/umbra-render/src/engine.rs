//! The main rendering engine.

use std::sync::Arc;

use crate::error::{RenderError, RenderResult};
use crate::pipelines::{PipelineCache, SceneLayouts};
use crate::shadow_volume::VolumeGenerator;

/// Format of the shared depth/stencil attachment.
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Format of the offscreen colour target used when rendering headless.
pub const HEADLESS_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Storage buffers bound at once by the extrusion stage.
const REQUIRED_STORAGE_BUFFERS: u32 = 6;

/// Checks once, before any allocation, that the adapter can run the
/// shadow passes.
pub fn check_capabilities(adapter: &wgpu::Adapter) -> RenderResult<()> {
    let downlevel = adapter.get_downlevel_capabilities();
    if !downlevel
        .flags
        .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
    {
        return Err(RenderError::Unsupported(
            "adapter does not support compute shaders".into(),
        ));
    }
    let limits = adapter.limits();
    if limits.max_storage_buffers_per_shader_stage < REQUIRED_STORAGE_BUFFERS {
        return Err(RenderError::Unsupported(format!(
            "adapter allows {} storage buffers per stage, {REQUIRED_STORAGE_BUFFERS} are needed",
            limits.max_storage_buffers_per_shader_stage
        )));
    }
    if limits.max_compute_workgroup_size_x < 64 {
        return Err(RenderError::Unsupported(format!(
            "compute workgroups limited to {} invocations",
            limits.max_compute_workgroup_size_x
        )));
    }
    Ok(())
}

/// Runs `f` inside out-of-memory and validation error scopes, turning any
/// captured error into a [`RenderError`].
pub fn with_error_scope<T>(
    device: &wgpu::Device,
    label: &str,
    f: impl FnOnce() -> RenderResult<T>,
) -> RenderResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let result = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());
    if let Some(err) = oom {
        log::error!("{label}: {err}");
        return Err(RenderError::ResourceExhaustion(format!("{label}: {err}")));
    }
    if let Some(err) = validation {
        log::error!("{label}: {err}");
        return Err(RenderError::Validation(format!("{label}: {err}")));
    }
    result
}

/// Offscreen colour target for headless rendering.
struct ColorTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// The main rendering engine backed by wgpu.
pub struct RenderEngine {
    /// The wgpu instance.
    pub instance: wgpu::Instance,
    /// The wgpu adapter.
    pub adapter: wgpu::Adapter,
    /// The wgpu device.
    pub device: wgpu::Device,
    /// The wgpu queue.
    pub queue: wgpu::Queue,
    /// The render surface (None for headless).
    pub surface: Option<wgpu::Surface<'static>>,
    /// Surface configuration.
    pub surface_config: wgpu::SurfaceConfiguration,
    /// Depth/stencil texture shared by the ambient, stencil and lit passes.
    pub depth_texture: wgpu::Texture,
    /// Depth/stencil texture view.
    pub depth_view: wgpu::TextureView,
    /// Current viewport width.
    pub width: u32,
    /// Current viewport height.
    pub height: u32,
    /// Bind group layouts shared by every pipeline.
    pub layouts: SceneLayouts,
    /// Render pipeline cache, keyed by pass and vertex layout.
    pub pipelines: PipelineCache,
    /// Compute pipelines of the shadow-volume stage.
    pub volumes: VolumeGenerator,
    color_target: Option<ColorTarget>,
}

impl RenderEngine {
    /// Creates a new render engine drawing to a window.
    pub async fn new_windowed(window: Arc<winit::window::Window>) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;
        check_capabilities(&adapter)?;

        let (device, queue) = Self::request_device(&adapter, "umbra device").await?;

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::Unsupported("surface reports no formats".into()))?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        Self::assemble(instance, adapter, device, queue, Some(surface), surface_config)
    }

    /// Creates a new headless render engine with an offscreen colour target.
    pub async fn new_headless(width: u32, height: u32) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;
        check_capabilities(&adapter)?;

        let (device, queue) = Self::request_device(&adapter, "umbra device (headless)").await?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format: HEADLESS_COLOR_FORMAT,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let mut engine = Self::assemble(instance, adapter, device, queue, None, surface_config)?;
        engine.color_target = Some(Self::create_color_target(
            &engine.device,
            engine.width,
            engine.height,
        ));
        Ok(engine)
    }

    async fn request_device(
        adapter: &wgpu::Adapter,
        label: &str,
    ) -> RenderResult<(wgpu::Device, wgpu::Queue)> {
        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);
        Ok(adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await?)
    }

    fn assemble(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: Option<wgpu::Surface<'static>>,
        surface_config: wgpu::SurfaceConfiguration,
    ) -> RenderResult<Self> {
        let width = surface_config.width;
        let height = surface_config.height;
        let (depth_texture, depth_view) = Self::create_depth_texture(&device, width, height);

        // Fixed pipelines are fatal at setup.
        let (layouts, pipelines, volumes) = with_error_scope(&device, "pipeline setup", || {
            let layouts = SceneLayouts::new(&device);
            let pipelines = PipelineCache::new(&device, &layouts, surface_config.format);
            let volumes = VolumeGenerator::new(&device, &layouts);
            Ok((layouts, pipelines, volumes))
        })?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            surface,
            surface_config,
            depth_texture,
            depth_view,
            width,
            height,
            layouts,
            pipelines,
            volumes,
            color_target: None,
        })
    }

    /// Format of the colour attachment the scene passes draw into.
    #[must_use]
    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    /// Resizes the render target.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.width = width;
        self.height = height;
        self.surface_config.width = width;
        self.surface_config.height = height;

        if let Some(ref surface) = self.surface {
            surface.configure(&self.device, &self.surface_config);
        }

        let (depth_texture, depth_view) = Self::create_depth_texture(&self.device, width, height);
        self.depth_texture = depth_texture;
        self.depth_view = depth_view;

        if self.color_target.is_some() {
            self.color_target = Some(Self::create_color_target(&self.device, width, height));
        }
    }

    fn create_depth_texture(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth stencil texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    fn create_color_target(device: &wgpu::Device, width: u32, height: u32) -> ColorTarget {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("headless color target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HEADLESS_COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        ColorTarget { texture, view }
    }

    /// The offscreen colour view, for engines created with [`Self::new_headless`].
    #[must_use]
    pub fn headless_view(&self) -> Option<&wgpu::TextureView> {
        self.color_target.as_ref().map(|t| &t.view)
    }

    /// Blocks until all submitted GPU work has finished.
    pub fn wait_idle(&self) -> RenderResult<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|err| {
                log::error!("device poll failed: {err}");
                RenderError::Timeout
            })
    }

    /// Calculates bytes per row with proper alignment for wgpu buffer copies.
    fn aligned_bytes_per_row(width: u32) -> u32 {
        let bytes_per_pixel = 4u32; // RGBA8
        let unaligned = width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        unaligned.div_ceil(align) * align
    }

    /// Reads the headless colour target back as tightly packed RGBA8 rows.
    pub fn capture_headless(&self) -> RenderResult<Vec<u8>> {
        let target = self
            .color_target
            .as_ref()
            .ok_or_else(|| RenderError::Validation("engine has no headless target".into()))?;

        let bytes_per_row = Self::aligned_bytes_per_row(self.width);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("headless readback"),
            size: u64::from(bytes_per_row) * u64::from(self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("headless copy encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let data = read_buffer(self, &buffer)?;

        // Copy data, removing row padding
        let row_bytes = (self.width * 4) as usize;
        let mut result = Vec::with_capacity(row_bytes * self.height as usize);
        for row in 0..self.height {
            let start = (row * bytes_per_row) as usize;
            result.extend_from_slice(&data[start..start + row_bytes]);
        }
        Ok(result)
    }
}

/// Maps `buffer` for reading, waits for it, and returns a copy of its bytes.
pub(crate) fn read_buffer(engine: &RenderEngine, buffer: &wgpu::Buffer) -> RenderResult<Vec<u8>> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    engine.wait_idle()?;
    rx.recv()
        .map_err(|_| RenderError::BufferMapFailed)?
        .map_err(|_| RenderError::BufferMapFailed)?;

    let bytes = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_bytes_per_row() {
        assert_eq!(RenderEngine::aligned_bytes_per_row(64), 256);
        assert_eq!(RenderEngine::aligned_bytes_per_row(65), 512);
        assert_eq!(RenderEngine::aligned_bytes_per_row(1), 256);
    }

    #[test]
    fn test_depth_format_has_stencil() {
        assert!(DEPTH_STENCIL_FORMAT.has_stencil_aspect());
        assert!(DEPTH_STENCIL_FORMAT.has_depth_aspect());
    }
}
