//! Per-frame uniforms, submission and statistics.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use glam::Vec4;
use umbra_core::{CounterSnapshot, LightOptions, Options, PassKind};

use crate::buffer::{create_uniform_buffer, update_uniform};
use crate::camera::Camera;
use crate::engine::{read_buffer, RenderEngine};
use crate::error::RenderResult;
use crate::model::GpuModel;
use crate::passes::{FrameContext, PassScheduler, PassTargets};
use crate::shadow_volume::ShadowVolume;

/// Uniforms bound at group 0 of every pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    /// View space, w = 1.
    pub light_position: [f32; 4],
    /// RGB colour, ambient factor in w.
    pub light_color: [f32; 4],
}

impl FrameUniforms {
    #[must_use]
    pub fn new(camera: &Camera, light: &LightOptions) -> Self {
        let view = camera.view_matrix();
        let light_position = view * light.position.extend(1.0);
        Self {
            projection: camera.projection_matrix().to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            light_position: light_position.to_array(),
            light_color: light.color.extend(light.ambient).to_array(),
        }
    }
}

/// Rolling frame-rate average.
#[derive(Debug, Clone)]
pub struct FrameStats {
    window: Duration,
    frames: VecDeque<Instant>,
    log_interval: Duration,
    last_log: Option<Instant>,
}

impl FrameStats {
    #[must_use]
    pub fn new(log_interval: Duration) -> Self {
        Self {
            window: Duration::from_secs(1),
            frames: VecDeque::new(),
            log_interval,
            last_log: None,
        }
    }

    /// Records a frame finishing at `now` and returns the current average.
    pub fn record(&mut self, now: Instant) -> f32 {
        self.frames.push_back(now);
        while let Some(&oldest) = self.frames.front() {
            if now.duration_since(oldest) > self.window {
                self.frames.pop_front();
            } else {
                break;
            }
        }
        self.fps()
    }

    /// Frames per second over the window, 0 until two frames are recorded.
    #[must_use]
    pub fn fps(&self) -> f32 {
        match (self.frames.front(), self.frames.back()) {
            (Some(first), Some(last)) if self.frames.len() > 1 => {
                let span = last.duration_since(*first).as_secs_f32();
                if span > 0.0 {
                    (self.frames.len() - 1) as f32 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    /// Whether the log interval has passed since the last report.
    pub fn should_log(&mut self, now: Instant) -> bool {
        if self.log_interval.is_zero() {
            return false;
        }
        match self.last_log {
            Some(last) if now.duration_since(last) < self.log_interval => false,
            _ => {
                self.last_log = Some(now);
                true
            }
        }
    }
}

/// Counter readback of one shadow volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeReport {
    pub counter: CounterSnapshot,
    pub index_capacity: u32,
}

impl VolumeReport {
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.counter.overflowed()
    }
}

/// Outcome of one rendered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Passes in recording order.
    pub passes: Vec<PassKind>,
    pub draw_count: usize,
    /// Empty unless volume diagnostics are enabled.
    pub volumes: Vec<VolumeReport>,
    pub fps: f32,
}

/// Drives frames: updates the frame uniforms, encodes the four passes and
/// waits for the GPU before returning.
pub struct FrameDriver {
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    light: LightOptions,
    clear_color: wgpu::Color,
    diagnostics: bool,
    stats: FrameStats,
    frame_index: u64,
}

impl FrameDriver {
    #[must_use]
    pub fn new(engine: &RenderEngine, options: &Options) -> Self {
        let camera = Camera::from_options(&options.camera, options.aspect_ratio());
        let uniforms = create_uniform_buffer(
            &engine.device,
            &FrameUniforms::new(&camera, &options.light),
            Some("frame uniforms"),
        );
        let bind_group = engine.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame bind group"),
            layout: &engine.layouts.frame,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });
        Self {
            uniforms,
            bind_group,
            light: options.light,
            clear_color: clear_color(options.background_color),
            diagnostics: options.volume.diagnostics,
            stats: FrameStats::new(Duration::from_secs_f32(options.fps_log_interval.max(0.0))),
            frame_index: 0,
        }
    }

    #[must_use]
    pub fn frame_bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn set_light(&mut self, light: LightOptions) {
        self.light = light;
    }

    pub fn set_diagnostics(&mut self, enabled: bool) {
        self.diagnostics = enabled;
    }

    #[must_use]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Renders one frame of `model` into `target`.
    pub fn render_frame(
        &mut self,
        engine: &RenderEngine,
        model: &GpuModel,
        camera: &Camera,
        target: &wgpu::TextureView,
    ) -> RenderResult<FrameReport> {
        update_uniform(
            &engine.queue,
            &self.uniforms,
            &FrameUniforms::new(camera, &self.light),
        );

        let passes = model.build_frame_passes();
        let mut encoder = engine
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        let context = FrameContext {
            engine,
            frame_bind_group: &self.bind_group,
            clear_color: self.clear_color,
        };
        let targets = PassTargets {
            color: target,
            depth_stencil: &engine.depth_view,
        };
        let order = PassScheduler::encode(&mut encoder, &context, &passes, &targets)?;

        let readback = if self.diagnostics {
            copy_counters(engine, &mut encoder, model)
        } else {
            None
        };

        engine.queue.submit(std::iter::once(encoder.finish()));
        engine.wait_idle()?;

        let volumes = match readback {
            Some(buffer) => {
                let reports = read_counters(engine, &buffer, model)?;
                buffer.destroy();
                reports
            }
            None => Vec::new(),
        };

        let now = Instant::now();
        let fps = self.stats.record(now);
        if self.stats.should_log(now) {
            log::info!("{fps:.1} fps");
        }

        let report = FrameReport {
            frame_index: self.frame_index,
            passes: order,
            draw_count: passes.draw_count(),
            volumes,
            fps,
        };
        self.frame_index += 1;
        Ok(report)
    }
}

fn clear_color(c: Vec4) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(c.x),
        g: f64::from(c.y),
        b: f64::from(c.z),
        a: f64::from(c.w),
    }
}

/// Copies every volume's counter into one mappable buffer.
fn copy_counters(
    engine: &RenderEngine,
    encoder: &mut wgpu::CommandEncoder,
    model: &GpuModel,
) -> Option<wgpu::Buffer> {
    let count = model.volume_count() as u64;
    if count == 0 {
        return None;
    }
    let staging = engine.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("volume counter readback"),
        size: count * ShadowVolume::COUNTER_SIZE,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    for (i, volume) in model.volumes().enumerate() {
        encoder.copy_buffer_to_buffer(
            &volume.counter,
            0,
            &staging,
            i as u64 * ShadowVolume::COUNTER_SIZE,
            ShadowVolume::COUNTER_SIZE,
        );
    }
    Some(staging)
}

fn read_counters(
    engine: &RenderEngine,
    buffer: &wgpu::Buffer,
    model: &GpuModel,
) -> RenderResult<Vec<VolumeReport>> {
    let bytes = read_buffer(engine, buffer)?;
    let size = ShadowVolume::COUNTER_SIZE as usize;
    let reports: Vec<VolumeReport> = model
        .volumes()
        .zip(bytes.chunks_exact(size))
        .map(|(volume, chunk)| VolumeReport {
            counter: bytemuck::pod_read_unaligned(chunk),
            index_capacity: volume.capacity.indices,
        })
        .collect();
    for (i, report) in reports.iter().enumerate() {
        if report.overflowed() {
            log::warn!(
                "shadow volume {i} overflowed: {} triangles dropped ({} of {} indices claimed)",
                report.counter.dropped,
                report.counter.claimed,
                report.index_capacity
            );
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_frame_uniform_size_matches_layout() {
        assert_eq!(
            std::mem::size_of::<FrameUniforms>() as u64,
            crate::pipelines::FRAME_UNIFORM_SIZE
        );
    }

    #[test]
    fn test_light_in_view_space() {
        let mut camera = Camera::new(1.0);
        camera.position = Vec3::new(0.0, 0.0, 5.0);
        camera.target = Vec3::ZERO;
        camera.up = Vec3::Y;
        let light = LightOptions {
            position: Vec3::ZERO,
            color: Vec3::new(1.0, 0.5, 0.25),
            ambient: 0.3,
        };
        let uniforms = FrameUniforms::new(&camera, &light);
        let p = uniforms.light_position;
        assert!(p[0].abs() < 1e-5 && p[1].abs() < 1e-5);
        assert!((p[2] + 5.0).abs() < 1e-5);
        assert_eq!(p[3], 1.0);
        assert_eq!(uniforms.light_color, [1.0, 0.5, 0.25, 0.3]);
    }

    #[test]
    fn test_fps_average() {
        let mut stats = FrameStats::new(Duration::from_secs(5));
        let start = Instant::now();
        assert_eq!(stats.record(start), 0.0);
        let mut fps = 0.0;
        for i in 1..=10 {
            fps = stats.record(start + Duration::from_millis(i * 50));
        }
        assert!((fps - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_fps_window_drops_old_frames() {
        let mut stats = FrameStats::new(Duration::from_secs(5));
        let start = Instant::now();
        stats.record(start);
        stats.record(start + Duration::from_secs(3));
        let fps = stats.record(start + Duration::from_millis(3100));
        assert!((fps - 10.0).abs() < 1e-2);
    }

    #[test]
    fn test_should_log_respects_interval() {
        let mut stats = FrameStats::new(Duration::from_secs(5));
        let start = Instant::now();
        assert!(stats.should_log(start));
        assert!(!stats.should_log(start + Duration::from_secs(1)));
        assert!(stats.should_log(start + Duration::from_secs(6)));

        let mut silent = FrameStats::new(Duration::ZERO);
        assert!(!silent.should_log(start));
    }

    #[test]
    fn test_clear_color() {
        let c = clear_color(Vec4::new(0.3, 0.3, 0.3, 1.0));
        assert!((c.r - 0.3).abs() < 1e-6);
        assert_eq!(c.a, 1.0);
    }
}
