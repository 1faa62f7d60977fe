//! Plain glTF JSON records, as embedded in the GLB JSON chunk.
//!
//! Only the fields the renderer consumes are modelled; everything else in the
//! document is ignored by serde.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level glTF document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub buffers: Vec<BufferDesc>,
    pub buffer_views: Vec<BufferViewDesc>,
    pub accessors: Vec<AccessorDesc>,
    pub materials: Vec<MaterialDesc>,
    pub meshes: Vec<MeshDesc>,
    pub nodes: Vec<NodeDesc>,
}

/// A glTF buffer. In a GLB, buffer 0 without a URI is the binary chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferDesc {
    pub byte_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferViewDesc {
    pub buffer: usize,
    pub byte_offset: usize,
    pub byte_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_stride: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessorDesc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_view: Option<usize>,
    pub byte_offset: usize,
    pub component_type: u32,
    pub count: usize,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PbrMetallicRoughness {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_color_factor: Option<[f32; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metallic_factor: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roughness_factor: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaterialDesc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pbr_metallic_roughness: Option<PbrMetallicRoughness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emissive_factor: Option<[f32; 3]>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeshDesc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub primitives: Vec<PrimitiveDesc>,
}

/// `TRIANGLES` in the glTF mode enumeration.
pub const MODE_TRIANGLES: u32 = 4;

fn default_mode() -> u32 {
    MODE_TRIANGLES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveDesc {
    #[serde(default)]
    pub attributes: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<usize>,
    #[serde(default = "default_mode")]
    pub mode: u32,
}

impl Default for PrimitiveDesc {
    fn default() -> Self {
        Self {
            attributes: BTreeMap::new(),
            indices: None,
            material: None,
            mode: MODE_TRIANGLES,
        }
    }
}

/// A node record. `matrix` is column-major, `rotation` is `[x, y, z, w]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeDesc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matrix: Option<[f32; 16]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f32; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_mode_defaults_to_triangles() {
        let prim: PrimitiveDesc =
            serde_json::from_str(r#"{"attributes":{"POSITION":0}}"#).unwrap();
        assert_eq!(prim.mode, MODE_TRIANGLES);
        assert_eq!(prim.attributes["POSITION"], 0);
        assert!(prim.indices.is_none());
    }

    #[test]
    fn test_document_tolerates_missing_sections() {
        let doc: Document = serde_json::from_str(r#"{"asset":{"version":"2.0"}}"#).unwrap();
        assert!(doc.materials.is_empty());
        assert!(doc.nodes.is_empty());
    }

    #[test]
    fn test_accessor_type_field() {
        let acc: AccessorDesc = serde_json::from_str(
            r#"{"bufferView":1,"componentType":5126,"count":3,"type":"VEC3"}"#,
        )
        .unwrap();
        assert_eq!(acc.buffer_view, Some(1));
        assert_eq!(acc.element_type, "VEC3");
        assert_eq!(acc.byte_offset, 0);
    }
}
