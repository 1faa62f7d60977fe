//! Bind group layouts, shader variants and the render pipeline cache.
//!
//! Pipelines carry the [`PassKind`] they were built for; encoding code
//! dispatches on that tag, never on labels.

use std::collections::HashMap;

use umbra_core::PassKind;

use crate::buffer::{storage_entry, uniform_entry};
use crate::engine::DEPTH_STENCIL_FORMAT;
use crate::error::{RenderError, RenderResult};

const SCENE_SHADER: &str = include_str!("shaders/scene.wgsl");
const STENCIL_SHADER: &str = include_str!("shaders/stencil_volume.wgsl");

/// Size of the frame uniform block (two matrices, two vectors).
pub(crate) const FRAME_UNIFORM_SIZE: u64 = 160;
/// Size of one matrix uniform.
pub(crate) const MATRIX_UNIFORM_SIZE: u64 = 64;
pub(crate) const NODE_ID_UNIFORM_SIZE: u64 = 16;
pub(crate) const MATERIAL_UNIFORM_SIZE: u64 = 48;
pub(crate) const VOLUME_PARAMS_SIZE: u64 = 32;
pub(crate) const WIDEN_PARAMS_SIZE: u64 = 16;

/// Bind group layouts shared by the render and compute pipelines.
///
/// - group 0: frame uniforms
/// - group 1: per-node model, normal matrix and id
/// - group 2: material (render) or shadow-volume buffers (compute)
pub struct SceneLayouts {
    pub frame: wgpu::BindGroupLayout,
    pub node: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub volume: wgpu::BindGroupLayout,
    pub widen: wgpu::BindGroupLayout,
}

impl SceneLayouts {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let all_stages = wgpu::ShaderStages::VERTEX
            | wgpu::ShaderStages::FRAGMENT
            | wgpu::ShaderStages::COMPUTE;
        let node_stages = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::COMPUTE;

        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame bind group layout"),
            entries: &[uniform_entry(0, all_stages, FRAME_UNIFORM_SIZE)],
        });

        let node = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("node bind group layout"),
            entries: &[
                uniform_entry(0, node_stages, MATRIX_UNIFORM_SIZE),
                uniform_entry(1, node_stages, MATRIX_UNIFORM_SIZE),
                uniform_entry(2, node_stages, NODE_ID_UNIFORM_SIZE),
            ],
        });

        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material bind group layout"),
            entries: &[uniform_entry(
                0,
                wgpu::ShaderStages::FRAGMENT,
                MATERIAL_UNIFORM_SIZE,
            )],
        });

        let volume = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow volume bind group layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE, VOLUME_PARAMS_SIZE),
                // Positions
                storage_entry(1, true),
                // Normals
                storage_entry(2, true),
                // Widened indices
                storage_entry(3, true),
                // Output vertices
                storage_entry(4, false),
                // Output indices
                storage_entry(5, false),
                // Append counter
                storage_entry(6, false),
            ],
        });

        let widen = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("index widening bind group layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE, WIDEN_PARAMS_SIZE),
                storage_entry(1, true),
                storage_entry(2, false),
            ],
        });

        Self {
            frame,
            node,
            material,
            volume,
            widen,
        }
    }
}

/// Vertex attribute presence, selecting a scene shader variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaderKey {
    pub has_normals: bool,
}

impl ShaderKey {
    /// Generates the scene shader source for this variant.
    #[must_use]
    pub fn source(self) -> String {
        let header = if self.has_normals {
            "const HAS_NORMALS: bool = true;\n\
             struct VertexInput {\n\
                 @location(0) position: vec3<f32>,\n\
                 @location(1) normal: vec3<f32>,\n\
             }\n\
             fn vertex_normal(in: VertexInput) -> vec3<f32> { return in.normal; }\n"
        } else {
            "const HAS_NORMALS: bool = false;\n\
             struct VertexInput {\n\
                 @location(0) position: vec3<f32>,\n\
             }\n\
             fn vertex_normal(in: VertexInput) -> vec3<f32> { return vec3<f32>(0.0, 0.0, 1.0); }\n"
        };
        format!("{header}\n{SCENE_SHADER}")
    }
}

/// Cache key of a scene pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub pass: PassKind,
    pub shader: ShaderKey,
    pub position_stride: u64,
    /// Zero when the variant has no normals.
    pub normal_stride: u64,
}

/// A render pipeline tagged with the pass it belongs to.
#[derive(Debug, Clone)]
pub struct TaggedPipeline {
    pub kind: PassKind,
    pub pipeline: wgpu::RenderPipeline,
}

/// Fixed-function state of the ambient and lit scene passes.
fn scene_depth_stencil(pass: PassKind) -> RenderResult<wgpu::DepthStencilState> {
    match pass {
        PassKind::Ambient => Ok(wgpu::DepthStencilState {
            format: DEPTH_STENCIL_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        PassKind::Lit => {
            let face = wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Equal,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: wgpu::StencilOperation::Keep,
            };
            Ok(wgpu::DepthStencilState {
                format: DEPTH_STENCIL_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState {
                    front: face,
                    back: face,
                    read_mask: 0xFF,
                    write_mask: 0x00,
                },
                bias: wgpu::DepthBiasState::default(),
            })
        }
        other => Err(RenderError::Validation(format!(
            "{} has no scene pipeline",
            other.label()
        ))),
    }
}

/// Two-sided depth-fail stencil state of the stencil-mark pass.
#[must_use]
pub fn stencil_mark_state() -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_STENCIL_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState {
            front: wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Always,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::IncrementWrap,
                pass_op: wgpu::StencilOperation::Keep,
            },
            back: wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Always,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::DecrementWrap,
                pass_op: wgpu::StencilOperation::Keep,
            },
            read_mask: 0xFF,
            write_mask: 0xFF,
        },
        bias: wgpu::DepthBiasState::default(),
    }
}

/// Shader modules and render pipelines, owned by the engine for its lifetime.
pub struct PipelineCache {
    color_format: wgpu::TextureFormat,
    scene_layout: wgpu::PipelineLayout,
    shaders: HashMap<ShaderKey, wgpu::ShaderModule>,
    pipelines: HashMap<PipelineKey, TaggedPipeline>,
    stencil: TaggedPipeline,
}

impl PipelineCache {
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        layouts: &SceneLayouts,
        color_format: wgpu::TextureFormat,
    ) -> Self {
        let scene_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene pipeline layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.node, &layouts.material],
            push_constant_ranges: &[],
        });

        Self {
            color_format,
            scene_layout,
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
            stencil: Self::create_stencil_pipeline(device, layouts),
        }
    }

    fn create_stencil_pipeline(device: &wgpu::Device, layouts: &SceneLayouts) -> TaggedPipeline {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("stencil volume shader"),
            source: wgpu::ShaderSource::Wgsl(STENCIL_SHADER.into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("stencil pipeline layout"),
            bind_group_layouts: &[&layouts.frame],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("stencil mark pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: 16,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x4],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            // Stencil only, no colour writes.
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(stencil_mark_state()),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        TaggedPipeline {
            kind: PassKind::StencilMark,
            pipeline,
        }
    }

    /// The single stencil-mark pipeline.
    #[must_use]
    pub fn stencil_pipeline(&self) -> &TaggedPipeline {
        &self.stencil
    }

    /// Returns the pipeline for `key`, building it (and its shader variant)
    /// on first use.
    pub fn scene_pipeline(
        &mut self,
        device: &wgpu::Device,
        key: PipelineKey,
    ) -> RenderResult<TaggedPipeline> {
        if let Some(p) = self.pipelines.get(&key) {
            return Ok(p.clone());
        }
        let depth_stencil = scene_depth_stencil(key.pass)?;

        let shader = self
            .shaders
            .entry(key.shader)
            .or_insert_with(|| {
                log::debug!("compiling scene shader {:?}", key.shader);
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("scene shader"),
                    source: wgpu::ShaderSource::Wgsl(key.shader.source().into()),
                })
            })
            .clone();

        let position_attrs = wgpu::vertex_attr_array![0 => Float32x3];
        let normal_attrs = wgpu::vertex_attr_array![1 => Float32x3];
        let mut buffers = vec![wgpu::VertexBufferLayout {
            array_stride: key.position_stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &position_attrs,
        }];
        if key.shader.has_normals {
            buffers.push(wgpu::VertexBufferLayout {
                array_stride: key.normal_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &normal_attrs,
            });
        }

        let (fragment_entry, blend) = if key.pass == PassKind::Lit {
            let additive = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            (
                "fs_lit",
                Some(wgpu::BlendState {
                    color: additive,
                    alpha: additive,
                }),
            )
        } else {
            ("fs_ambient", None)
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(key.pass.label()),
            layout: Some(&self.scene_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(fragment_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.color_format,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(depth_stencil),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let tagged = TaggedPipeline {
            kind: key.pass,
            pipeline,
        };
        self.pipelines.insert(key, tagged.clone());
        log::debug!("created {} pipeline for {key:?}", key.pass.label());
        Ok(tagged)
    }

    /// Number of cached scene pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Number of compiled scene shader variants.
    #[must_use]
    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_variants_differ() {
        let with = ShaderKey { has_normals: true }.source();
        let without = ShaderKey { has_normals: false }.source();
        assert!(with.contains("@location(1) normal"));
        assert!(!without.contains("@location(1) normal"));
        assert!(with.contains("const HAS_NORMALS: bool = true;"));
        assert!(without.contains("const HAS_NORMALS: bool = false;"));
        assert!(with.contains("fn fs_lit"));
    }

    #[test]
    fn test_stencil_state_is_two_sided_depth_fail() {
        let state = stencil_mark_state();
        assert!(!state.depth_write_enabled);
        assert_eq!(
            state.stencil.front.depth_fail_op,
            wgpu::StencilOperation::IncrementWrap
        );
        assert_eq!(
            state.stencil.back.depth_fail_op,
            wgpu::StencilOperation::DecrementWrap
        );
        assert_eq!(state.stencil.front.pass_op, wgpu::StencilOperation::Keep);
    }

    #[test]
    fn test_lit_state_tests_stencil_zero_without_writes() {
        let state = scene_depth_stencil(PassKind::Lit).unwrap();
        assert!(!state.depth_write_enabled);
        assert_eq!(state.depth_compare, wgpu::CompareFunction::LessEqual);
        assert_eq!(state.stencil.front.compare, wgpu::CompareFunction::Equal);
        assert_eq!(state.stencil.write_mask, 0);
    }

    #[test]
    fn test_ambient_state_writes_depth_only() {
        let state = scene_depth_stencil(PassKind::Ambient).unwrap();
        assert!(state.depth_write_enabled);
        assert!(!state.stencil.is_enabled());
    }

    #[test]
    fn test_compute_pass_has_no_scene_pipeline() {
        assert!(scene_depth_stencil(PassKind::VolumeGeneration).is_err());
        assert!(scene_depth_stencil(PassKind::StencilMark).is_err());
    }
}
