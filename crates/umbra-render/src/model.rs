//! A loaded model on the GPU.

use glam::{Mat4, Vec3};
use umbra_core::{ModelAsset, Options, PassKind, PrimitiveAsset, VolumeOptions};

use crate::engine::{with_error_scope, RenderEngine};
use crate::error::{RenderError, RenderResult};
use crate::geometry::{AttributeBinding, GeometryStore, GpuMesh, GpuPrimitive, IndexBinding};
use crate::materials::MaterialTable;
use crate::passes::{DrawItem, ExtrudeItem, FramePasses, PassPlan};
use crate::pipelines::{PipelineCache, PipelineKey, SceneLayouts, ShaderKey};
use crate::scene::GpuNode;
use crate::shadow_volume::{ShadowVolume, VolumeGenerator};

/// Geometry, materials, nodes and shadow volumes of one model.
pub struct GpuModel {
    store: GeometryStore,
    materials: MaterialTable,
    meshes: Vec<GpuMesh>,
    nodes: Vec<GpuNode>,
    bounds: Option<(Vec3, Vec3)>,
}

impl GpuModel {
    /// Parses a GLB byte stream and uploads it.
    pub fn load(engine: &mut RenderEngine, bytes: &[u8], options: &Options) -> RenderResult<Self> {
        let asset = ModelAsset::from_glb(bytes)?;
        Self::from_asset(engine, &asset, &options.volume)
    }

    /// Uploads a validated asset, widens its indices and allocates one shadow
    /// volume per (node, primitive) pair.
    pub fn from_asset(
        engine: &mut RenderEngine,
        asset: &ModelAsset,
        volume_options: &VolumeOptions,
    ) -> RenderResult<Self> {
        let device = &engine.device;
        let queue = &engine.queue;
        let layouts = &engine.layouts;
        let pipelines = &mut engine.pipelines;
        let generator = &engine.volumes;

        let model = with_error_scope(device, "model upload", || {
            let store = GeometryStore::upload(device, asset)?;
            let materials = MaterialTable::new(device, &layouts.material, &asset.materials);

            let mut meshes = Vec::with_capacity(asset.meshes.len());
            for mesh in &asset.meshes {
                let mut primitives = Vec::with_capacity(mesh.primitives.len());
                for primitive in &mesh.primitives {
                    primitives.push(upload_primitive(
                        device, layouts, pipelines, generator, &store, primitive,
                    )?);
                }
                meshes.push(GpuMesh {
                    name: mesh.name.clone(),
                    primitives,
                });
            }

            // One-time widening, ahead of any frame that reads the indices.
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("index widening encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("index widening"),
                    timestamp_writes: None,
                });
                for primitive in meshes.iter().flat_map(|m| &m.primitives) {
                    generator.dispatch_widen(&mut pass, &primitive.widened);
                }
            }
            queue.submit(std::iter::once(encoder.finish()));

            let mut nodes = Vec::with_capacity(asset.nodes.len());
            for scene_node in &asset.nodes {
                let Some(mesh_index) = scene_node.mesh else {
                    continue;
                };
                let (Some(mesh_asset), Some(gpu_mesh)) =
                    (asset.meshes.get(mesh_index), meshes.get(mesh_index))
                else {
                    return Err(RenderError::Validation(format!(
                        "node {} references missing mesh {mesh_index}",
                        scene_node.id
                    )));
                };

                let mut node = GpuNode::new(
                    device,
                    &layouts.node,
                    scene_node.id,
                    &scene_node.name,
                    mesh_index,
                    scene_node.transform,
                );
                let pairs = mesh_asset.primitives.iter().zip(&gpu_mesh.primitives);
                for (primitive, gpu_primitive) in pairs {
                    let positions = store.storage_buffer(primitive.positions.view)?;
                    let normals = match &primitive.normals {
                        Some(n) => Some(store.storage_buffer(n.view)?),
                        None => None,
                    };
                    node.volumes.push(generator.create_volume(
                        device,
                        layouts,
                        primitive,
                        positions,
                        normals,
                        &gpu_primitive.widened,
                        volume_options.multiplier,
                        volume_options.near_bias,
                    ));
                }
                nodes.push(node);
            }

            Ok(Self {
                store,
                materials,
                meshes,
                nodes,
                bounds: asset.bounds(),
            })
        })?;

        log::info!(
            "loaded model: {} nodes, {} primitives, {} materials, {} buffers, {} shadow volumes",
            model.node_count(),
            model.primitive_count(),
            model.material_count(),
            model.store.buffer_count(),
            model.volume_count()
        );
        Ok(model)
    }

    /// Plans the four passes of a frame over every node of the model.
    #[must_use]
    pub fn build_frame_passes(&self) -> FramePasses<'_> {
        let mut ambient = Vec::new();
        let mut extrude = Vec::new();
        let mut stencil = Vec::new();
        let mut lit = Vec::new();

        for node in &self.nodes {
            let Some(mesh) = self.meshes.get(node.mesh) else {
                continue;
            };
            for (primitive, volume) in mesh.primitives.iter().zip(&node.volumes) {
                let material = self.materials.get_or_default(primitive.material);
                let item = || DrawItem {
                    store: &self.store,
                    node_bind_group: &node.bind_group,
                    material_bind_group: &material.bind_group,
                    primitive,
                };
                ambient.push(item());
                lit.push(item());
                extrude.push(ExtrudeItem {
                    node_bind_group: &node.bind_group,
                    volume,
                });
                stencil.push(volume);
            }
        }

        FramePasses::new(vec![
            PassPlan::Ambient(ambient),
            PassPlan::VolumeGeneration(extrude),
            PassPlan::StencilMark(stencil),
            PassPlan::Lit(lit),
        ])
    }

    /// Moves a node. Returns false when no mesh-bearing node has that id.
    pub fn set_node_transform(&mut self, queue: &wgpu::Queue, id: u32, transform: Mat4) -> bool {
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.set_transform(queue, transform);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn node_transform(&self, id: u32) -> Option<Mat4> {
        self.nodes.iter().find(|n| n.id == id).map(|n| n.transform)
    }

    /// Every shadow volume, in node then primitive order.
    pub fn volumes(&self) -> impl Iterator<Item = &ShadowVolume> {
        self.nodes.iter().flat_map(|n| &n.volumes)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn primitive_count(&self) -> usize {
        self.meshes.iter().map(|m| m.primitives.len()).sum()
    }

    #[must_use]
    pub fn volume_count(&self) -> usize {
        self.nodes.iter().map(|n| n.volumes.len()).sum()
    }

    /// Materials, the default included.
    #[must_use]
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    #[must_use]
    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialTable {
        &mut self.materials
    }

    /// World-space bounds of all positions, `None` for an empty model.
    #[must_use]
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.bounds
    }

    /// Frees every GPU allocation of the model.
    pub fn release_all(&self) {
        for node in &self.nodes {
            node.release();
        }
        for primitive in self.meshes.iter().flat_map(|m| &m.primitives) {
            primitive.release();
        }
        self.materials.release();
        self.store.release();
    }
}

fn upload_primitive(
    device: &wgpu::Device,
    layouts: &SceneLayouts,
    pipelines: &mut PipelineCache,
    generator: &VolumeGenerator,
    store: &GeometryStore,
    primitive: &PrimitiveAsset,
) -> RenderResult<GpuPrimitive> {
    let positions = AttributeBinding::from_accessor(&primitive.positions);
    let normals = primitive.normals.as_ref().map(AttributeBinding::from_accessor);
    let shader_key = ShaderKey {
        has_normals: normals.is_some(),
    };
    let key = |pass| PipelineKey {
        pass,
        shader: shader_key,
        position_stride: positions.stride,
        normal_stride: normals.map_or(0, |n| n.stride),
    };
    let ambient = pipelines.scene_pipeline(device, key(PassKind::Ambient))?;
    let lit = pipelines.scene_pipeline(device, key(PassKind::Lit))?;

    let source = match &primitive.indices {
        Some(indices) => Some(store.storage_buffer(indices.view)?),
        None => None,
    };
    let widened = generator.create_widened(device, layouts, primitive, source);

    Ok(GpuPrimitive {
        positions,
        normals,
        indices: IndexBinding::for_primitive(primitive),
        widened,
        material: MaterialTable::slot_index(primitive.material),
        shader_key,
        ambient,
        lit,
        vertex_count: primitive.vertex_count(),
        element_count: primitive.element_count(),
        triangle_count: primitive.triangle_count(),
    })
}
