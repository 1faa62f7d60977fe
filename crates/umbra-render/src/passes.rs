//! Frame pass plans and their encoding.
//!
//! A [`FramePasses`] lists what each of the four passes draws or dispatches.
//! [`PassScheduler`] walks it through a [`FrameSchedule`] before recording
//! anything, so a misordered plan never reaches the GPU.

use umbra_core::{Access, FrameSchedule, PassKind};

use crate::engine::RenderEngine;
use crate::error::{RenderError, RenderResult};
use crate::geometry::{GeometryStore, GpuPrimitive};
use crate::pipelines::TaggedPipeline;
use crate::shadow_volume::{stencil_index_count, ShadowVolume};

/// Frame-wide state shared by every pass.
pub struct FrameContext<'a> {
    pub engine: &'a RenderEngine,
    /// Group 0 of every pipeline.
    pub frame_bind_group: &'a wgpu::BindGroup,
    pub clear_color: wgpu::Color,
}

/// Attachments of a frame.
pub struct PassTargets<'a> {
    pub color: &'a wgpu::TextureView,
    pub depth_stencil: &'a wgpu::TextureView,
}

/// One primitive drawn by a scene pass.
pub struct DrawItem<'a> {
    pub store: &'a GeometryStore,
    pub node_bind_group: &'a wgpu::BindGroup,
    pub material_bind_group: &'a wgpu::BindGroup,
    pub primitive: &'a GpuPrimitive,
}

impl DrawItem<'_> {
    /// The primitive's pipeline for `pass`.
    fn pipeline(&self, pass: PassKind) -> RenderResult<&TaggedPipeline> {
        let tagged = match pass {
            PassKind::Ambient => &self.primitive.ambient,
            PassKind::Lit => &self.primitive.lit,
            other => {
                return Err(RenderError::Validation(format!(
                    "{} does not draw scene geometry",
                    other.label()
                )))
            }
        };
        if tagged.kind != pass {
            return Err(RenderError::Validation(format!(
                "{} pipeline bound in {}",
                tagged.kind.label(),
                pass.label()
            )));
        }
        Ok(tagged)
    }
}

/// One shadow volume regenerated by the compute pass.
pub struct ExtrudeItem<'a> {
    pub node_bind_group: &'a wgpu::BindGroup,
    pub volume: &'a ShadowVolume,
}

/// What a single pass does.
pub enum PassPlan<'a> {
    Ambient(Vec<DrawItem<'a>>),
    VolumeGeneration(Vec<ExtrudeItem<'a>>),
    StencilMark(Vec<&'a ShadowVolume>),
    Lit(Vec<DrawItem<'a>>),
}

impl PassPlan<'_> {
    #[must_use]
    pub fn kind(&self) -> PassKind {
        match self {
            Self::Ambient(_) => PassKind::Ambient,
            Self::VolumeGeneration(_) => PassKind::VolumeGeneration,
            Self::StencilMark(_) => PassKind::StencilMark,
            Self::Lit(_) => PassKind::Lit,
        }
    }

    /// Draws or dispatches recorded by the pass.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Ambient(items) | Self::Lit(items) => items.len(),
            Self::VolumeGeneration(items) => items.len(),
            Self::StencilMark(volumes) => volumes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The passes of one frame, in submission order.
#[derive(Default)]
pub struct FramePasses<'a> {
    pub passes: Vec<PassPlan<'a>>,
}

impl<'a> FramePasses<'a> {
    #[must_use]
    pub fn new(passes: Vec<PassPlan<'a>>) -> Self {
        Self { passes }
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<PassKind> {
        self.passes.iter().map(PassPlan::kind).collect()
    }

    /// Total draws and dispatches over all passes.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.passes.iter().map(PassPlan::len).sum()
    }
}

fn depth_ops(access: Access, clear: f32) -> Option<wgpu::Operations<f32>> {
    match access {
        Access::ClearWrite => Some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(clear),
            store: wgpu::StoreOp::Store,
        }),
        Access::ReadOnly | Access::None => None,
    }
}

fn stencil_ops(access: Access) -> Option<wgpu::Operations<u32>> {
    match access {
        Access::ClearWrite => Some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(0),
            store: wgpu::StoreOp::Store,
        }),
        Access::ReadOnly | Access::None => None,
    }
}

/// Depth/stencil attachment of a raster pass, shaped by its access rights.
fn depth_stencil_attachment(
    view: &wgpu::TextureView,
    pass: PassKind,
) -> wgpu::RenderPassDepthStencilAttachment<'_> {
    let access = pass.attachment_access();
    wgpu::RenderPassDepthStencilAttachment {
        view,
        depth_ops: depth_ops(access.depth, 1.0),
        stencil_ops: stencil_ops(access.stencil),
    }
}

/// Records a frame's passes into a command encoder.
pub struct PassScheduler;

impl PassScheduler {
    /// Checks that `passes` walks the frame order exactly once.
    pub fn validate(passes: &FramePasses<'_>) -> RenderResult<Vec<PassKind>> {
        let mut schedule = FrameSchedule::new();
        for plan in &passes.passes {
            schedule.begin(plan.kind())?;
        }
        Ok(schedule.finish()?)
    }

    /// Encodes all passes, returning the order they were recorded in.
    pub fn encode(
        encoder: &mut wgpu::CommandEncoder,
        context: &FrameContext<'_>,
        passes: &FramePasses<'_>,
        targets: &PassTargets<'_>,
    ) -> RenderResult<Vec<PassKind>> {
        let order = Self::validate(passes)?;
        for plan in &passes.passes {
            match plan {
                PassPlan::Ambient(items) => {
                    Self::encode_scene(encoder, context, targets, PassKind::Ambient, items)?;
                }
                PassPlan::VolumeGeneration(items) => {
                    Self::encode_volumes(encoder, context, items);
                }
                PassPlan::StencilMark(volumes) => {
                    Self::encode_stencil(encoder, context, targets, volumes);
                }
                PassPlan::Lit(items) => {
                    Self::encode_scene(encoder, context, targets, PassKind::Lit, items)?;
                }
            }
        }
        Ok(order)
    }

    fn encode_scene(
        encoder: &mut wgpu::CommandEncoder,
        context: &FrameContext<'_>,
        targets: &PassTargets<'_>,
        kind: PassKind,
        items: &[DrawItem<'_>],
    ) -> RenderResult<()> {
        let load = if kind == PassKind::Ambient {
            wgpu::LoadOp::Clear(context.clear_color)
        } else {
            wgpu::LoadOp::Load
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(kind.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: targets.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(depth_stencil_attachment(targets.depth_stencil, kind)),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if kind == PassKind::Lit {
            // Lit only where no volume covers the pixel.
            pass.set_stencil_reference(0);
        }
        pass.set_bind_group(0, context.frame_bind_group, &[]);
        for item in items {
            pass.set_pipeline(&item.pipeline(kind)?.pipeline);
            pass.set_bind_group(1, item.node_bind_group, &[]);
            pass.set_bind_group(2, item.material_bind_group, &[]);
            item.primitive.draw(&mut pass, item.store)?;
        }
        Ok(())
    }

    fn encode_volumes(
        encoder: &mut wgpu::CommandEncoder,
        context: &FrameContext<'_>,
        items: &[ExtrudeItem<'_>],
    ) {
        // Counters and index slots start from zero every frame.
        for item in items {
            item.volume.encode_clear(encoder);
        }
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(PassKind::VolumeGeneration.label()),
            timestamp_writes: None,
        });
        pass.set_bind_group(0, context.frame_bind_group, &[]);
        for item in items {
            context
                .engine
                .volumes
                .dispatch_extrude(&mut pass, item.node_bind_group, item.volume);
        }
    }

    fn encode_stencil(
        encoder: &mut wgpu::CommandEncoder,
        context: &FrameContext<'_>,
        targets: &PassTargets<'_>,
        volumes: &[&ShadowVolume],
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(PassKind::StencilMark.label()),
            color_attachments: &[],
            depth_stencil_attachment: Some(depth_stencil_attachment(
                targets.depth_stencil,
                PassKind::StencilMark,
            )),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&context.engine.pipelines.stencil_pipeline().pipeline);
        pass.set_bind_group(0, context.frame_bind_group, &[]);
        for volume in volumes {
            if volume.triangle_count == 0 {
                continue;
            }
            pass.set_vertex_buffer(0, volume.vertices.slice(..));
            pass.set_index_buffer(volume.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..stencil_index_count(&volume.capacity), 0, 0..1);
        }
    }
}
