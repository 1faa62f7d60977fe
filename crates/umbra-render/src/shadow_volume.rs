//! Shadow-volume generator: index widening and per-triangle extrusion.
//!
//! Index widening runs once per primitive after upload and leaves a 32-bit
//! storage index buffer that the extrusion stage (and 8-bit indexed draws)
//! read. Extrusion runs every frame, once per (node, primitive) pair, into
//! buffers preallocated from [`VolumeCapacity`].

use umbra_core::volume::INDICES_PER_TRIANGLE;
use umbra_core::{ComponentType, CounterSnapshot, PrimitiveAsset, VolumeCapacity};

use crate::buffer::{create_uniform_buffer, create_zeroed_buffer};
use crate::pipelines::SceneLayouts;

const WIDEN_SHADER: &str = include_str!("shaders/widen_indices.wgsl");
const EXTRUDE_SHADER: &str = include_str!("shaders/extrude_volume.wgsl");

/// Invocations per compute workgroup in both shaders.
pub const WORKGROUP_SIZE: u32 = 64;

/// Parameters of the index widening shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct WidenParams {
    pub mode: u32,
    pub count: u32,
    /// Offset of the first index, in source elements.
    pub offset: u32,
    pub _padding: u32,
}

impl WidenParams {
    /// Widening parameters for a primitive's index accessor.
    #[must_use]
    pub fn for_primitive(primitive: &PrimitiveAsset) -> Self {
        let (mode, offset) = match &primitive.indices {
            None => (0, 0),
            Some(indices) => {
                let mode = match indices.component_type {
                    ComponentType::UnsignedByte => 1,
                    ComponentType::UnsignedShort => 2,
                    _ => 3,
                };
                (mode, (indices.byte_offset / indices.element_size()) as u32)
            }
        };
        Self {
            mode,
            count: primitive.element_count(),
            offset,
            _padding: 0,
        }
    }
}

/// Parameters of the extrusion shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VolumeParams {
    /// Offsets and strides are counted in floats.
    pub position_offset: u32,
    pub position_stride: u32,
    pub normal_offset: u32,
    pub normal_stride: u32,
    pub triangle_count: u32,
    pub index_capacity: u32,
    pub has_normals: u32,
    pub near_bias: f32,
}

impl VolumeParams {
    #[must_use]
    pub fn new(primitive: &PrimitiveAsset, capacity: &VolumeCapacity, near_bias: f32) -> Self {
        let floats = |bytes: usize| (bytes / 4) as u32;
        let (normal_offset, normal_stride) = primitive
            .normals
            .as_ref()
            .map_or((0, 0), |n| (floats(n.byte_offset), floats(n.byte_stride)));
        Self {
            position_offset: floats(primitive.positions.byte_offset),
            position_stride: floats(primitive.positions.byte_stride),
            normal_offset,
            normal_stride,
            triangle_count: primitive.triangle_count(),
            index_capacity: capacity.indices,
            has_normals: u32::from(primitive.normals.is_some()),
            near_bias,
        }
    }
}

/// Number of workgroups covering `invocations`.
#[must_use]
pub fn workgroup_count(invocations: u32) -> u32 {
    invocations.div_ceil(WORKGROUP_SIZE)
}

/// A primitive's indices converted to 32 bits.
pub struct WidenedIndices {
    pub buffer: wgpu::Buffer,
    pub count: u32,
    params: WidenParams,
    params_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl WidenedIndices {
    #[must_use]
    pub fn params(&self) -> &WidenParams {
        &self.params
    }

    /// Every GPU buffer owned by the widened indices.
    #[must_use]
    pub fn buffers(&self) -> [&wgpu::Buffer; 2] {
        [&self.buffer, &self.params_buffer]
    }

    pub fn release(&self) {
        for buffer in self.buffers() {
            buffer.destroy();
        }
    }
}

/// Output buffers of one (node, primitive) pair.
pub struct ShadowVolume {
    pub capacity: VolumeCapacity,
    pub triangle_count: u32,
    /// View-space `vec4` vertices.
    pub vertices: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    /// `{claimed, dropped}`, cleared before every generation pass.
    pub counter: wgpu::Buffer,
    params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl ShadowVolume {
    /// Size in bytes of the counter block.
    pub const COUNTER_SIZE: u64 = std::mem::size_of::<CounterSnapshot>() as u64;

    /// Zeroes the counter and the index buffer. Unclaimed index slots stay
    /// zero and draw as degenerate triangles.
    pub fn encode_clear(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.counter, 0, None);
        encoder.clear_buffer(&self.indices, 0, None);
    }

    /// Every GPU buffer owned by the volume.
    #[must_use]
    pub fn buffers(&self) -> [&wgpu::Buffer; 4] {
        [&self.vertices, &self.indices, &self.counter, &self.params]
    }

    pub fn release(&self) {
        for buffer in self.buffers() {
            buffer.destroy();
        }
    }
}

/// Compute pipelines of the shadow-volume stage.
pub struct VolumeGenerator {
    widen_pipeline: wgpu::ComputePipeline,
    extrude_pipeline: wgpu::ComputePipeline,
    /// Bound in place of absent inputs.
    placeholder: wgpu::Buffer,
}

impl VolumeGenerator {
    #[must_use]
    pub fn new(device: &wgpu::Device, layouts: &SceneLayouts) -> Self {
        let widen_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("index widening shader"),
            source: wgpu::ShaderSource::Wgsl(WIDEN_SHADER.into()),
        });
        let widen_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("index widening pipeline layout"),
            bind_group_layouts: &[&layouts.widen],
            push_constant_ranges: &[],
        });
        let widen_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("index widening pipeline"),
            layout: Some(&widen_layout),
            module: &widen_shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let extrude_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow volume extrusion shader"),
            source: wgpu::ShaderSource::Wgsl(EXTRUDE_SHADER.into()),
        });
        let extrude_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow volume pipeline layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.node, &layouts.volume],
            push_constant_ranges: &[],
        });
        let extrude_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("shadow volume extrusion pipeline"),
            layout: Some(&extrude_layout),
            module: &extrude_shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let placeholder = create_zeroed_buffer(
            device,
            16,
            wgpu::BufferUsages::STORAGE,
            Some("placeholder storage"),
        );

        Self {
            widen_pipeline,
            extrude_pipeline,
            placeholder,
        }
    }

    /// Allocates the widened index buffer of a primitive. `source` is the
    /// storage copy of its index view, `None` for non-indexed primitives.
    #[must_use]
    pub fn create_widened(
        &self,
        device: &wgpu::Device,
        layouts: &SceneLayouts,
        primitive: &PrimitiveAsset,
        source: Option<&wgpu::Buffer>,
    ) -> WidenedIndices {
        let params = WidenParams::for_primitive(primitive);
        let buffer = create_zeroed_buffer(
            device,
            u64::from(params.count.max(1)) * 4,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDEX,
            Some("widened indices"),
        );
        let params_buffer = create_uniform_buffer(device, &params, Some("widen params"));
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("index widening bind group"),
            layout: &layouts.widen,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: source.unwrap_or(&self.placeholder).as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffer.as_entire_binding(),
                },
            ],
        });
        WidenedIndices {
            buffer,
            count: params.count,
            params,
            params_buffer,
            bind_group,
        }
    }

    /// Allocates the output buffers and bind group of one shadow volume.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn create_volume(
        &self,
        device: &wgpu::Device,
        layouts: &SceneLayouts,
        primitive: &PrimitiveAsset,
        positions: &wgpu::Buffer,
        normals: Option<&wgpu::Buffer>,
        widened: &WidenedIndices,
        multiplier: u32,
        near_bias: f32,
    ) -> ShadowVolume {
        let capacity = VolumeCapacity::for_vertex_count(primitive.vertex_count(), multiplier);
        let params = VolumeParams::new(primitive, &capacity, near_bias);

        let vertices = create_zeroed_buffer(
            device,
            capacity.vertex_bytes(),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
            Some("shadow volume vertices"),
        );
        let indices = create_zeroed_buffer(
            device,
            capacity.index_bytes(),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            Some("shadow volume indices"),
        );
        let counter = create_zeroed_buffer(
            device,
            ShadowVolume::COUNTER_SIZE,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            Some("shadow volume counter"),
        );
        let params_buffer = create_uniform_buffer(device, &params, Some("shadow volume params"));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow volume bind group"),
            layout: &layouts.volume,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: normals.unwrap_or(&self.placeholder).as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: widened.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: vertices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: indices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: counter.as_entire_binding(),
                },
            ],
        });

        log::debug!(
            "shadow volume: {} triangles, capacity {} vertices / {} indices",
            params.triangle_count,
            capacity.vertices,
            capacity.indices
        );

        ShadowVolume {
            capacity,
            triangle_count: params.triangle_count,
            vertices,
            indices,
            counter,
            params: params_buffer,
            bind_group,
        }
    }

    /// Records the widening dispatch of one primitive.
    pub fn dispatch_widen(&self, pass: &mut wgpu::ComputePass<'_>, widened: &WidenedIndices) {
        if widened.count == 0 {
            return;
        }
        pass.set_pipeline(&self.widen_pipeline);
        pass.set_bind_group(0, &widened.bind_group, &[]);
        pass.dispatch_workgroups(workgroup_count(widened.count), 1, 1);
    }

    /// Records the extrusion dispatch of one volume. Group 0 (frame uniforms)
    /// must already be bound.
    pub fn dispatch_extrude(
        &self,
        pass: &mut wgpu::ComputePass<'_>,
        node_bind_group: &wgpu::BindGroup,
        volume: &ShadowVolume,
    ) {
        if volume.triangle_count == 0 {
            return;
        }
        pass.set_pipeline(&self.extrude_pipeline);
        pass.set_bind_group(1, node_bind_group, &[]);
        pass.set_bind_group(2, &volume.bind_group, &[]);
        pass.dispatch_workgroups(workgroup_count(volume.triangle_count), 1, 1);
    }
}

/// Indices the stencil pass draws for a volume: the whole buffer, since
/// unclaimed slots are degenerate.
#[must_use]
pub fn stencil_index_count(capacity: &VolumeCapacity) -> u32 {
    capacity.triangle_slots() * INDICES_PER_TRIANGLE
}
