//! Binary glTF (GLB) container reader.
//!
//! A GLB is a 12-byte header followed by a JSON chunk and at most one binary
//! chunk. Files carrying additional chunks after the binary chunk are rejected.

use crate::document::Document;
use crate::error::{Result, UmbraError};

/// `glTF` in little-endian.
pub const GLB_MAGIC: u32 = 0x4654_6C67;
/// The only container version this reader accepts.
pub const GLB_VERSION: u32 = 2;
/// `JSON` chunk type.
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
/// `BIN\0` chunk type.
pub const CHUNK_BIN: u32 = 0x004E_4942;

const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// A parsed GLB: the JSON document and a borrowed view of the binary chunk.
#[derive(Debug)]
pub struct Glb<'a> {
    pub document: Document,
    pub bin: Option<&'a [u8]>,
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| UmbraError::format(format!("truncated at byte {offset}")))
}

/// Parses a GLB byte stream into its JSON document and binary chunk.
pub fn parse_glb(bytes: &[u8]) -> Result<Glb<'_>> {
    if bytes.len() < HEADER_LEN + CHUNK_HEADER_LEN {
        return Err(UmbraError::format(format!(
            "{} bytes is too short for a GLB header",
            bytes.len()
        )));
    }

    let magic = read_u32(bytes, 0)?;
    if magic != GLB_MAGIC {
        return Err(UmbraError::format(format!(
            "bad magic 0x{magic:08X}, expected 0x{GLB_MAGIC:08X}"
        )));
    }
    let version = read_u32(bytes, 4)?;
    if version != GLB_VERSION {
        return Err(UmbraError::format(format!("unsupported GLB version {version}")));
    }
    let total_len = read_u32(bytes, 8)? as usize;
    if total_len > bytes.len() {
        return Err(UmbraError::format(format!(
            "header declares {total_len} bytes but only {} are present",
            bytes.len()
        )));
    }
    let bytes = &bytes[..total_len];

    let json_len = read_u32(bytes, 12)? as usize;
    let json_type = read_u32(bytes, 16)?;
    if json_type != CHUNK_JSON {
        return Err(UmbraError::format(format!(
            "first chunk has type 0x{json_type:08X}, expected JSON"
        )));
    }
    let json_start = HEADER_LEN + CHUNK_HEADER_LEN;
    let json_end = json_start
        .checked_add(json_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            UmbraError::format(format!("JSON chunk length {json_len} overruns the file"))
        })?;

    let document: Document = serde_json::from_slice(&bytes[json_start..json_end])?;

    if json_end == bytes.len() {
        log::debug!("GLB has no binary chunk");
        return Ok(Glb {
            document,
            bin: None,
        });
    }

    if json_len % 4 != 0 || json_end + CHUNK_HEADER_LEN > bytes.len() {
        return Err(UmbraError::format(format!(
            "JSON chunk length {json_len} does not align with the binary chunk header"
        )));
    }
    let bin_len = read_u32(bytes, json_end)? as usize;
    let bin_type = read_u32(bytes, json_end + 4)?;
    if bin_type != CHUNK_BIN {
        return Err(UmbraError::format(format!(
            "second chunk has type 0x{bin_type:08X}, expected BIN"
        )));
    }
    let bin_start = json_end + CHUNK_HEADER_LEN;
    let bin_end = bin_start
        .checked_add(bin_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            UmbraError::format(format!("binary chunk length {bin_len} overruns the file"))
        })?;

    if bin_end != bytes.len() {
        return Err(UmbraError::format(format!(
            "{} trailing bytes after the binary chunk; multiple binary chunks are not supported",
            bytes.len() - bin_end
        )));
    }

    Ok(Glb {
        document,
        bin: Some(&bytes[bin_start..bin_end]),
    })
}

#[cfg(any(test, feature = "test-utils"))]
pub use builder::GlbBuilder;

#[cfg(any(test, feature = "test-utils"))]
mod builder {
    use super::{CHUNK_BIN, CHUNK_JSON, GLB_MAGIC, GLB_VERSION};
    use crate::accessor::ComponentType;
    use crate::document::{
        AccessorDesc, BufferDesc, BufferViewDesc, Document, MaterialDesc, MeshDesc, NodeDesc,
        PrimitiveDesc,
    };

    /// Assembles GLB byte streams in memory for tests.
    #[derive(Debug, Default, Clone)]
    pub struct GlbBuilder {
        pub document: Document,
        pub bin: Vec<u8>,
    }

    impl GlbBuilder {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// One mesh, one node, one triangle: three `u16` indices and three
        /// `VEC3` float positions, no materials.
        #[must_use]
        pub fn single_triangle() -> Self {
            let mut b = Self::new();
            let indices = b.push_indices_u16(&[0, 1, 2]);
            let positions =
                b.push_positions(&[[0.0, 1.0, 0.0], [-1.0, -1.0, 0.0], [1.0, -1.0, 0.0]]);
            let mut prim = PrimitiveDesc {
                indices: Some(indices),
                ..PrimitiveDesc::default()
            };
            prim.attributes.insert("POSITION".into(), positions);
            let mesh = b.push_mesh("triangle", vec![prim]);
            b.push_node(NodeDesc {
                name: Some("triangle".into()),
                mesh: Some(mesh),
                ..NodeDesc::default()
            });
            b
        }

        /// Appends a buffer view holding `bytes`, 4-byte aligned in the binary chunk.
        pub fn push_view(&mut self, bytes: &[u8], byte_stride: Option<usize>) -> usize {
            while self.bin.len() % 4 != 0 {
                self.bin.push(0);
            }
            let byte_offset = self.bin.len();
            self.bin.extend_from_slice(bytes);
            self.document.buffer_views.push(BufferViewDesc {
                buffer: 0,
                byte_offset,
                byte_length: bytes.len(),
                byte_stride,
            });
            self.document.buffer_views.len() - 1
        }

        pub fn push_accessor(&mut self, accessor: AccessorDesc) -> usize {
            self.document.accessors.push(accessor);
            self.document.accessors.len() - 1
        }

        pub fn push_vec3(&mut self, data: &[[f32; 3]]) -> usize {
            let view = self.push_view(bytemuck::cast_slice(data), None);
            let mut min = [f32::INFINITY; 3];
            let mut max = [f32::NEG_INFINITY; 3];
            for p in data {
                for k in 0..3 {
                    min[k] = min[k].min(p[k]);
                    max[k] = max[k].max(p[k]);
                }
            }
            self.push_accessor(AccessorDesc {
                buffer_view: Some(view),
                component_type: ComponentType::Float.code(),
                count: data.len(),
                element_type: "VEC3".into(),
                min: Some(min.to_vec()),
                max: Some(max.to_vec()),
                ..AccessorDesc::default()
            })
        }

        pub fn push_positions(&mut self, data: &[[f32; 3]]) -> usize {
            self.push_vec3(data)
        }

        pub fn push_normals(&mut self, data: &[[f32; 3]]) -> usize {
            self.push_vec3(data)
        }

        pub fn push_indices_u16(&mut self, data: &[u16]) -> usize {
            let view = self.push_view(bytemuck::cast_slice(data), None);
            self.push_accessor(AccessorDesc {
                buffer_view: Some(view),
                component_type: ComponentType::UnsignedShort.code(),
                count: data.len(),
                element_type: "SCALAR".into(),
                ..AccessorDesc::default()
            })
        }

        pub fn push_indices_u32(&mut self, data: &[u32]) -> usize {
            let view = self.push_view(bytemuck::cast_slice(data), None);
            self.push_accessor(AccessorDesc {
                buffer_view: Some(view),
                component_type: ComponentType::UnsignedInt.code(),
                count: data.len(),
                element_type: "SCALAR".into(),
                ..AccessorDesc::default()
            })
        }

        pub fn push_material(&mut self, material: MaterialDesc) -> usize {
            self.document.materials.push(material);
            self.document.materials.len() - 1
        }

        pub fn push_mesh(&mut self, name: &str, primitives: Vec<PrimitiveDesc>) -> usize {
            self.document.meshes.push(MeshDesc {
                name: Some(name.into()),
                primitives,
            });
            self.document.meshes.len() - 1
        }

        pub fn push_node(&mut self, node: NodeDesc) -> usize {
            self.document.nodes.push(node);
            self.document.nodes.len() - 1
        }

        /// Serialises the document and binary chunk into a GLB byte stream.
        #[must_use]
        pub fn build(&self) -> Vec<u8> {
            let mut document = self.document.clone();
            let mut bin = self.bin.clone();
            while bin.len() % 4 != 0 {
                bin.push(0);
            }
            document.buffers = vec![BufferDesc {
                byte_length: bin.len(),
                uri: None,
            }];

            let mut json = serde_json::to_vec(&document).unwrap_or_default();
            while json.len() % 4 != 0 {
                json.push(b' ');
            }

            let total = 12 + 8 + json.len() + 8 + bin.len();
            let mut out = Vec::with_capacity(total);
            for word in [GLB_MAGIC, GLB_VERSION, total as u32] {
                out.extend_from_slice(&word.to_le_bytes());
            }
            out.extend_from_slice(&(json.len() as u32).to_le_bytes());
            out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
            out.extend_from_slice(&json);
            out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
            out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
            out.extend_from_slice(&bin);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_triangle() {
        let bytes = GlbBuilder::single_triangle().build();
        let glb = parse_glb(&bytes).unwrap();
        assert_eq!(glb.document.meshes.len(), 1);
        assert_eq!(glb.document.accessors.len(), 2);
        // 6 bytes of indices padded to 8, then 36 bytes of positions
        assert_eq!(glb.bin.unwrap().len(), 44);
    }

    #[test]
    fn test_bad_magic_is_format_error() {
        let mut bytes = GlbBuilder::single_triangle().build();
        bytes[0] = b'x';
        let err = parse_glb(&bytes).unwrap_err();
        assert!(err.is_format(), "{err}");
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut bytes = GlbBuilder::single_triangle().build();
        bytes[4..8].copy_from_slice(&1u32.to_le_bytes());
        assert!(parse_glb(&bytes).unwrap_err().is_format());
    }

    #[test]
    fn test_misaligned_json_length_rejected() {
        let mut bytes = GlbBuilder::single_triangle().build();
        let json_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        bytes[12..16].copy_from_slice(&(json_len - 1).to_le_bytes());
        let err = parse_glb(&bytes).unwrap_err();
        assert!(err.is_format(), "{err}");
    }

    #[test]
    fn test_truncated_file_rejected() {
        let bytes = GlbBuilder::single_triangle().build();
        let err = parse_glb(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, UmbraError::Format(_)));
    }

    #[test]
    fn test_trailing_chunk_rejected() {
        let mut bytes = GlbBuilder::single_triangle().build();
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        bytes.extend_from_slice(&[0; 4]);
        let total = bytes.len() as u32;
        bytes[8..12].copy_from_slice(&total.to_le_bytes());
        let err = parse_glb(&bytes).unwrap_err();
        assert!(err.to_string().contains("multiple binary chunks"));
    }

    #[test]
    fn test_json_only_glb() {
        let json = br#"{"asset":{"version":"2.0"}} "#;
        assert_eq!(json.len() % 4, 0);
        let total = (12 + 8 + json.len()) as u32;
        let mut bytes = Vec::new();
        for w in [GLB_MAGIC, GLB_VERSION, total, json.len() as u32, CHUNK_JSON] {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes.extend_from_slice(json);
        let glb = parse_glb(&bytes).unwrap();
        assert!(glb.bin.is_none());
    }
}
