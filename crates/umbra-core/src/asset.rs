//! CPU-side model decoded from a GLB.
//!
//! [`ModelAsset::from_glb`] validates every record the renderer consumes and
//! finalises buffer-view usage masks before anything touches the GPU. The
//! renderer uploads from a `ModelAsset` and never mutates it.

use glam::{Mat4, Vec3};

use crate::accessor::{Accessor, ComponentType, ElementType};
use crate::buffer_view::{BufferView, ViewUsage};
use crate::document::{AccessorDesc, Document, PrimitiveDesc, MODE_TRIANGLES};
use crate::error::{Result, UmbraError};
use crate::glb::{parse_glb, Glb};
use crate::material::{MaterialParams, MaterialSlot};
use crate::scene::{flatten_nodes, SceneNode};

/// One triangle-list draw.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveAsset {
    pub positions: Accessor,
    pub normals: Option<Accessor>,
    pub indices: Option<Accessor>,
    pub material: MaterialSlot,
}

impl PrimitiveAsset {
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.positions.count as u32
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    /// Indices drawn, or vertices for non-indexed primitives.
    #[must_use]
    pub fn element_count(&self) -> u32 {
        self.indices
            .as_ref()
            .map_or(self.vertex_count(), |i| i.count as u32)
    }

    #[must_use]
    pub fn triangle_count(&self) -> u32 {
        self.element_count() / 3
    }

    /// Source index width, `None` for non-indexed primitives.
    #[must_use]
    pub fn index_type(&self) -> Option<ComponentType> {
        self.indices.as_ref().map(|i| i.component_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    pub name: String,
    pub primitives: Vec<PrimitiveAsset>,
}

/// Everything needed to build the GPU model, decoded and validated.
#[derive(Debug, Clone)]
pub struct ModelAsset {
    /// Sealed buffer views, indexed like the document's.
    pub views: Vec<BufferView>,
    pub materials: Vec<MaterialParams>,
    pub meshes: Vec<MeshAsset>,
    /// Flattened nodes that reference a mesh, in document order.
    pub nodes: Vec<SceneNode>,
    /// The binary chunk.
    pub bin: Vec<u8>,
}

impl ModelAsset {
    /// Decodes a GLB byte stream.
    pub fn from_glb(bytes: &[u8]) -> Result<Self> {
        let Glb { document, bin } = parse_glb(bytes)?;
        let bin = bin.unwrap_or_default();
        Self::from_document(&document, bin)
    }

    /// Builds a model from an already parsed document and binary chunk.
    pub fn from_document(document: &Document, bin: &[u8]) -> Result<Self> {
        let mut views = decode_views(document, bin)?;
        let accessors = document
            .accessors
            .iter()
            .enumerate()
            .map(|(i, desc)| decode_accessor(i, desc, &views))
            .collect::<Result<Vec<_>>>()?;

        let materials: Vec<MaterialParams> =
            document.materials.iter().map(MaterialParams::from).collect();

        let mut meshes = Vec::with_capacity(document.meshes.len());
        for (mesh_index, mesh) in document.meshes.iter().enumerate() {
            let primitives = mesh
                .primitives
                .iter()
                .map(|p| decode_primitive(p, &accessors, &views, materials.len(), bin))
                .collect::<Result<Vec<_>>>()?;
            meshes.push(MeshAsset {
                name: mesh
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("mesh{mesh_index}")),
                primitives,
            });
        }

        // Every consumer is known now; collect usage, then seal.
        for primitive in meshes.iter().flat_map(|m| &m.primitives) {
            request_usage(&mut views, primitive)?;
        }
        for view in &mut views {
            view.seal();
        }

        let mut nodes: Vec<SceneNode> = document
            .nodes
            .iter()
            .enumerate()
            .map(|(i, desc)| SceneNode::from_desc(i, desc))
            .collect();
        flatten_nodes(&mut nodes)?;
        for node in &nodes {
            if let Some(mesh) = node.mesh.filter(|&m| m >= meshes.len()) {
                return Err(UmbraError::format(format!(
                    "node {} references mesh {mesh}, but there are only {} meshes",
                    node.id,
                    meshes.len()
                )));
            }
        }
        nodes.retain(|n| n.mesh.is_some());

        log::info!(
            "decoded model: {} nodes, {} meshes, {} primitives, {} materials, {} buffer views",
            nodes.len(),
            meshes.len(),
            meshes.iter().map(|m| m.primitives.len()).sum::<usize>(),
            materials.len(),
            views.len()
        );

        Ok(Self {
            views,
            materials,
            meshes,
            nodes,
            bin: bin.to_vec(),
        })
    }

    #[must_use]
    pub fn primitive_count(&self) -> usize {
        self.meshes.iter().map(|m| m.primitives.len()).sum()
    }

    /// Material parameters for a slot; unknown or default slots resolve to the
    /// shared default.
    #[must_use]
    pub fn material(&self, slot: MaterialSlot) -> MaterialParams {
        match slot {
            MaterialSlot::Index(i) => self.materials.get(i).copied().unwrap_or_default(),
            MaterialSlot::Default => MaterialParams::default(),
        }
    }

    /// World-space bounding box of all drawn nodes, from accessor min/max.
    #[must_use]
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for node in &self.nodes {
            let Some(mesh) = node.mesh.and_then(|m| self.meshes.get(m)) else {
                continue;
            };
            for prim in &mesh.primitives {
                let (Some(lo), Some(hi)) = (prim.positions.min, prim.positions.max) else {
                    continue;
                };
                for corner in box_corners(Vec3::from_array(lo), Vec3::from_array(hi)) {
                    let p = node.transform.transform_point3(corner);
                    min = min.min(p);
                    max = max.max(p);
                }
            }
        }
        min.cmple(max).all().then_some((min, max))
    }

    /// Transform of the first drawn node with the given id.
    #[must_use]
    pub fn node_transform(&self, id: u32) -> Option<Mat4> {
        self.nodes.iter().find(|n| n.id == id).map(|n| n.transform)
    }
}

fn box_corners(lo: Vec3, hi: Vec3) -> [Vec3; 8] {
    [
        Vec3::new(lo.x, lo.y, lo.z),
        Vec3::new(hi.x, lo.y, lo.z),
        Vec3::new(lo.x, hi.y, lo.z),
        Vec3::new(hi.x, hi.y, lo.z),
        Vec3::new(lo.x, lo.y, hi.z),
        Vec3::new(hi.x, lo.y, hi.z),
        Vec3::new(lo.x, hi.y, hi.z),
        Vec3::new(hi.x, hi.y, hi.z),
    ]
}

fn decode_views(document: &Document, bin: &[u8]) -> Result<Vec<BufferView>> {
    document
        .buffer_views
        .iter()
        .enumerate()
        .map(|(i, desc)| {
            if desc.buffer != 0 {
                return Err(UmbraError::format(format!(
                    "buffer view {i} uses buffer {}; only the GLB binary chunk is supported",
                    desc.buffer
                )));
            }
            let end = desc.byte_offset.checked_add(desc.byte_length);
            if end.is_none_or(|end| end > bin.len()) {
                return Err(UmbraError::format(format!(
                    "buffer view {i} ({} + {}) lies outside the {}-byte binary chunk",
                    desc.byte_offset,
                    desc.byte_length,
                    bin.len()
                )));
            }
            Ok(BufferView::new(
                i,
                desc.byte_offset,
                desc.byte_length,
                desc.byte_stride.unwrap_or(0),
            ))
        })
        .collect()
}

fn decode_accessor(index: usize, desc: &AccessorDesc, views: &[BufferView]) -> Result<Accessor> {
    let component_type = ComponentType::from_code(desc.component_type)?;
    let element_type = ElementType::parse(&desc.element_type)?;

    let view_index = desc.buffer_view.ok_or_else(|| {
        UmbraError::format(format!("accessor {index} has no buffer view"))
    })?;
    let view = views.get(view_index).ok_or_else(|| {
        UmbraError::format(format!("accessor {index} references missing view {view_index}"))
    })?;

    let element_size = component_type.size() * element_type.num_components();
    let vec3 = |v: &Option<Vec<f32>>| {
        v.as_deref()
            .and_then(|v| <[f32; 3]>::try_from(v).ok())
    };
    let accessor = Accessor {
        index,
        view: view_index,
        count: desc.count,
        component_type,
        element_type,
        byte_offset: desc.byte_offset,
        byte_stride: Accessor::derive_stride(element_size, view.byte_stride),
        min: vec3(&desc.min),
        max: vec3(&desc.max),
    };

    if desc.byte_offset % component_type.size() != 0 {
        return Err(UmbraError::format(format!(
            "accessor {index} offset {} is not aligned to its component size",
            desc.byte_offset
        )));
    }
    if accessor.byte_offset.saturating_add(accessor.byte_span()) > view.byte_length {
        return Err(UmbraError::format(format!(
            "accessor {index} overruns buffer view {view_index}"
        )));
    }
    Ok(accessor)
}

fn attribute(
    accessors: &[Accessor],
    index: usize,
    semantic: &'static str,
) -> Result<Accessor> {
    let accessor = accessors.get(index).ok_or_else(|| {
        UmbraError::format(format!("{semantic} references missing accessor {index}"))
    })?;
    Ok(accessor.clone())
}

fn require_float_vec3(accessor: &Accessor, semantic: &'static str) -> Result<()> {
    if accessor.component_type != ComponentType::Float
        || accessor.element_type != ElementType::Vec3
    {
        return Err(UmbraError::UnsupportedAttribute {
            accessor: accessor.index,
            semantic,
            reason: format!(
                "expected FLOAT VEC3, found {:?} {}",
                accessor.component_type,
                accessor.element_type.tag()
            ),
        });
    }
    if accessor.byte_stride % 4 != 0 {
        return Err(UmbraError::UnsupportedAttribute {
            accessor: accessor.index,
            semantic,
            reason: format!("stride {} is not a multiple of 4", accessor.byte_stride),
        });
    }
    Ok(())
}

fn decode_primitive(
    desc: &PrimitiveDesc,
    accessors: &[Accessor],
    views: &[BufferView],
    material_count: usize,
    bin: &[u8],
) -> Result<PrimitiveAsset> {
    if desc.mode != MODE_TRIANGLES {
        return Err(UmbraError::UnsupportedPrimitiveMode(desc.mode));
    }

    let position_index = desc
        .attributes
        .get("POSITION")
        .copied()
        .ok_or_else(|| UmbraError::format("primitive has no POSITION attribute"))?;
    let positions = attribute(accessors, position_index, "POSITION")?;
    require_float_vec3(&positions, "POSITION")?;

    let normals = match desc.attributes.get("NORMAL") {
        Some(&i) => {
            let normals = attribute(accessors, i, "NORMAL")?;
            require_float_vec3(&normals, "NORMAL")?;
            if normals.count != positions.count {
                return Err(UmbraError::format(format!(
                    "NORMAL count {} differs from POSITION count {}",
                    normals.count, positions.count
                )));
            }
            Some(normals)
        }
        None => None,
    };

    let indices = match desc.indices {
        Some(i) => {
            let indices = attribute(accessors, i, "indices")?;
            check_indices(&indices, &views[indices.view], bin, positions.count)?;
            Some(indices)
        }
        None => None,
    };

    if let Some(m) = desc.material.filter(|&m| m >= material_count) {
        return Err(UmbraError::format(format!(
            "primitive references material {m}, but there are only {material_count} materials"
        )));
    }

    Ok(PrimitiveAsset {
        positions,
        normals,
        indices,
        material: MaterialSlot::from(desc.material),
    })
}

/// Checks index typing and that every index addresses an existing vertex.
fn check_indices(
    indices: &Accessor,
    view: &BufferView,
    bin: &[u8],
    vertex_count: usize,
) -> Result<()> {
    let reason = if indices.element_type != ElementType::Scalar {
        Some(format!("expected SCALAR, found {}", indices.element_type.tag()))
    } else if !matches!(
        indices.component_type,
        ComponentType::UnsignedByte | ComponentType::UnsignedShort | ComponentType::UnsignedInt
    ) {
        Some(format!(
            "expected an unsigned integer type, found {:?}",
            indices.component_type
        ))
    } else if indices.byte_stride != indices.element_size() {
        Some(format!("indices must be tightly packed, stride is {}", indices.byte_stride))
    } else {
        None
    };
    if let Some(reason) = reason {
        return Err(UmbraError::UnsupportedAttribute {
            accessor: indices.index,
            semantic: "indices",
            reason,
        });
    }

    let bytes = &view.bytes(bin)[indices.byte_offset..];
    let size = indices.element_size();
    let max = bytes
        .chunks_exact(size)
        .take(indices.count)
        .map(|c| match size {
            1 => u32::from(c[0]),
            2 => u32::from(u16::from_le_bytes([c[0], c[1]])),
            _ => u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
        })
        .max();
    if let Some(max) = max.filter(|&m| m as usize >= vertex_count) {
        return Err(UmbraError::format(format!(
            "accessor {} holds index {max}, but the primitive has {vertex_count} vertices",
            indices.index
        )));
    }
    Ok(())
}

/// Usage each consumer asks of its view. 8-bit indices cannot be bound for
/// drawing, so they are only read by the widening pass.
fn request_usage(views: &mut [BufferView], primitive: &PrimitiveAsset) -> Result<()> {
    let attribute_usage = ViewUsage::VERTEX | ViewUsage::STORAGE;
    views[primitive.positions.view].add_usage(attribute_usage)?;
    if let Some(normals) = &primitive.normals {
        views[normals.view].add_usage(attribute_usage)?;
    }
    if let Some(indices) = &primitive.indices {
        let usage = if indices.component_type == ComponentType::UnsignedByte {
            ViewUsage::STORAGE
        } else {
            ViewUsage::INDEX | ViewUsage::STORAGE
        };
        views[indices.view].add_usage(usage)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{MaterialDesc, NodeDesc, PbrMetallicRoughness};
    use crate::glb::GlbBuilder;

    const TRIANGLE: [[f32; 3]; 3] = [[0.0, 1.0, 0.0], [-1.0, -1.0, 0.0], [1.0, -1.0, 0.0]];

    fn primitive(positions: usize) -> PrimitiveDesc {
        let mut prim = PrimitiveDesc::default();
        prim.attributes.insert("POSITION".into(), positions);
        prim
    }

    #[test]
    fn test_single_triangle_scenario() {
        let model = ModelAsset::from_glb(&GlbBuilder::single_triangle().build()).unwrap();
        assert_eq!(model.nodes.len(), 1);
        assert_eq!(model.meshes.len(), 1);
        assert_eq!(model.primitive_count(), 1);

        let prim = &model.meshes[0].primitives[0];
        assert_eq!(prim.material, MaterialSlot::Default);
        assert_eq!(model.material(prim.material), MaterialParams::default());
        assert_eq!(prim.index_type(), Some(ComponentType::UnsignedShort));
        assert_eq!(prim.triangle_count(), 1);
        assert!(model.views.iter().all(BufferView::is_sealed));
        assert_eq!(
            model.views[prim.indices.as_ref().unwrap().view].usage(),
            ViewUsage::INDEX | ViewUsage::STORAGE
        );
        assert_eq!(
            model.views[prim.positions.view].usage(),
            ViewUsage::VERTEX | ViewUsage::STORAGE
        );
    }

    #[test]
    fn test_corrupt_magic_is_format_error() {
        let mut bytes = GlbBuilder::single_triangle().build();
        bytes[1] ^= 0xFF;
        let err = ModelAsset::from_glb(&bytes).unwrap_err();
        assert!(err.is_format(), "{err}");
    }

    #[test]
    fn test_unknown_component_type_fails_load() {
        let mut b = GlbBuilder::single_triangle();
        b.document.accessors[1].component_type = 5130;
        let err = ModelAsset::from_glb(&b.build()).unwrap_err();
        assert!(err.is_unsupported_type(), "{err}");
    }

    #[test]
    fn test_matrix_accessor_fails_load() {
        let mut b = GlbBuilder::single_triangle();
        b.document.accessors[1].element_type = "MAT4".into();
        let err = ModelAsset::from_glb(&b.build()).unwrap_err();
        assert!(matches!(err, UmbraError::UnsupportedElementType(_)));
    }

    #[test]
    fn test_non_triangle_mode_rejected() {
        let mut b = GlbBuilder::single_triangle();
        b.document.meshes[0].primitives[0].mode = 1;
        let err = ModelAsset::from_glb(&b.build()).unwrap_err();
        assert!(matches!(err, UmbraError::UnsupportedPrimitiveMode(1)));
    }

    #[test]
    fn test_index_out_of_range() {
        let mut b = GlbBuilder::new();
        let indices = b.push_indices_u16(&[0, 1, 3]);
        let positions = b.push_positions(&TRIANGLE);
        let mut prim = primitive(positions);
        prim.indices = Some(indices);
        let mesh = b.push_mesh("bad", vec![prim]);
        b.push_node(NodeDesc {
            mesh: Some(mesh),
            ..NodeDesc::default()
        });
        assert!(ModelAsset::from_glb(&b.build()).unwrap_err().is_format());
    }

    #[test]
    fn test_u8_indices_are_storage_only() {
        let mut b = GlbBuilder::new();
        let view = b.push_view(&[0, 1, 2], None);
        let indices = b.push_accessor(AccessorDesc {
            buffer_view: Some(view),
            component_type: ComponentType::UnsignedByte.code(),
            count: 3,
            element_type: "SCALAR".into(),
            ..AccessorDesc::default()
        });
        let positions = b.push_positions(&TRIANGLE);
        let mut prim = primitive(positions);
        prim.indices = Some(indices);
        let mesh = b.push_mesh("u8", vec![prim]);
        b.push_node(NodeDesc {
            mesh: Some(mesh),
            ..NodeDesc::default()
        });

        let model = ModelAsset::from_glb(&b.build()).unwrap();
        assert_eq!(model.views[view].usage(), ViewUsage::STORAGE);
    }

    #[test]
    fn test_int_indices_are_rejected() {
        let mut b = GlbBuilder::new();
        let view = b.push_view(bytemuck::cast_slice(&[0i32, 1, 2]), None);
        let indices = b.push_accessor(AccessorDesc {
            buffer_view: Some(view),
            component_type: ComponentType::Int.code(),
            count: 3,
            element_type: "SCALAR".into(),
            ..AccessorDesc::default()
        });
        let positions = b.push_positions(&TRIANGLE);
        let mut prim = primitive(positions);
        prim.indices = Some(indices);
        let mesh = b.push_mesh("int", vec![prim]);
        b.push_node(NodeDesc {
            mesh: Some(mesh),
            ..NodeDesc::default()
        });

        let err = ModelAsset::from_glb(&b.build()).unwrap_err();
        assert!(
            matches!(err, UmbraError::UnsupportedAttribute { semantic: "indices", .. }),
            "{err}"
        );
    }

    #[test]
    fn test_shared_view_usage_is_union() {
        // Two primitives read one position accessor; one is indexed.
        let mut b = GlbBuilder::new();
        let positions = b.push_positions(&TRIANGLE);
        let indices = b.push_indices_u32(&[0, 1, 2]);
        let mut indexed = primitive(positions);
        indexed.indices = Some(indices);
        let mesh = b.push_mesh("pair", vec![primitive(positions), indexed]);
        b.push_node(NodeDesc {
            mesh: Some(mesh),
            ..NodeDesc::default()
        });

        let model = ModelAsset::from_glb(&b.build()).unwrap();
        assert_eq!(model.primitive_count(), 2);
        assert!(!model.meshes[0].primitives[0].is_indexed());
        assert_eq!(model.meshes[0].primitives[0].element_count(), 3);
        assert_eq!(model.views[0].usage(), ViewUsage::VERTEX | ViewUsage::STORAGE);
    }

    #[test]
    fn test_material_reference() {
        let mut b = GlbBuilder::single_triangle();
        let m = b.push_material(MaterialDesc {
            pbr_metallic_roughness: Some(PbrMetallicRoughness {
                base_color_factor: Some([0.0, 1.0, 0.0, 1.0]),
                ..PbrMetallicRoughness::default()
            }),
            ..MaterialDesc::default()
        });
        b.document.meshes[0].primitives[0].material = Some(m);
        let model = ModelAsset::from_glb(&b.build()).unwrap();
        let slot = model.meshes[0].primitives[0].material;
        assert_eq!(slot, MaterialSlot::Index(0));
        assert_eq!(model.material(slot).base_color.y, 1.0);

        b.document.meshes[0].primitives[0].material = Some(4);
        assert!(ModelAsset::from_glb(&b.build()).unwrap_err().is_format());
    }

    #[test]
    fn test_hierarchy_is_flattened_and_bounds_follow() {
        let mut b = GlbBuilder::single_triangle();
        b.document.nodes[0].translation = Some([0.0, 0.0, 2.0]);
        let child_of = b.push_node(NodeDesc {
            translation: Some([10.0, 0.0, 0.0]),
            children: vec![0],
            ..NodeDesc::default()
        });
        assert_eq!(child_of, 1);

        let model = ModelAsset::from_glb(&b.build()).unwrap();
        // the transform-only parent is not drawn
        assert_eq!(model.nodes.len(), 1);
        let node = &model.nodes[0];
        assert_eq!(node.id, 0);
        assert!(node.children.is_empty());
        assert_eq!(
            node.transform.transform_point3(Vec3::ZERO),
            Vec3::new(10.0, 0.0, 2.0)
        );

        let (min, max) = model.bounds().unwrap();
        assert_eq!(min, Vec3::new(9.0, -1.0, 2.0));
        assert_eq!(max, Vec3::new(11.0, 1.0, 2.0));
    }

    #[test]
    fn test_view_outside_binary_chunk() {
        let mut b = GlbBuilder::single_triangle();
        b.document.buffer_views[1].byte_length = 4096;
        assert!(ModelAsset::from_glb(&b.build()).unwrap_err().is_format());
    }
}
