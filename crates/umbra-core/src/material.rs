//! Material parameters and their GPU uniform layout.

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::document::MaterialDesc;

/// Metallic-roughness material factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialParams {
    pub base_color: Vec4,
    /// Only RGB comes from the source; alpha stays 1.
    pub emissive: Vec4,
    pub metallic: f32,
    pub roughness: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            emissive: Vec4::new(0.0, 0.0, 0.0, 1.0),
            metallic: 1.0,
            roughness: 1.0,
        }
    }
}

impl From<&MaterialDesc> for MaterialParams {
    fn from(desc: &MaterialDesc) -> Self {
        let mut params = Self::default();
        if let Some(pbr) = &desc.pbr_metallic_roughness {
            if let Some(c) = pbr.base_color_factor {
                params.base_color = Vec4::from_array(c);
            }
            if let Some(m) = pbr.metallic_factor {
                params.metallic = m;
            }
            if let Some(r) = pbr.roughness_factor {
                params.roughness = r;
            }
        }
        if let Some([r, g, b]) = desc.emissive_factor {
            params.emissive = Vec4::new(r, g, b, params.emissive.w);
        }
        params
    }
}

/// GPU-compatible material uniform data.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniforms {
    pub base_color: [f32; 4],
    pub emissive: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub _padding: [f32; 2],
}

impl From<&MaterialParams> for MaterialUniforms {
    fn from(params: &MaterialParams) -> Self {
        Self {
            base_color: params.base_color.to_array(),
            emissive: params.emissive.to_array(),
            metallic: params.metallic,
            roughness: params.roughness,
            _padding: [0.0; 2],
        }
    }
}

/// Which material a primitive draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialSlot {
    /// The shared default material.
    Default,
    /// An entry of the document's material list.
    Index(usize),
}

impl From<Option<usize>> for MaterialSlot {
    fn from(index: Option<usize>) -> Self {
        index.map_or(Self::Default, Self::Index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PbrMetallicRoughness;

    #[test]
    fn test_default_material_values() {
        let m = MaterialParams::default();
        assert_eq!(m.base_color.to_array(), [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(m.emissive.to_array(), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(m.metallic, 1.0);
        assert_eq!(m.roughness, 1.0);
    }

    #[test]
    fn test_material_from_desc() {
        let desc = MaterialDesc {
            name: Some("red".into()),
            pbr_metallic_roughness: Some(PbrMetallicRoughness {
                base_color_factor: Some([1.0, 0.0, 0.0, 0.5]),
                metallic_factor: Some(0.0),
                roughness_factor: None,
            }),
            emissive_factor: Some([0.2, 0.3, 0.4]),
        };
        let m = MaterialParams::from(&desc);
        assert_eq!(m.base_color.to_array(), [1.0, 0.0, 0.0, 0.5]);
        assert_eq!(m.emissive.to_array(), [0.2, 0.3, 0.4, 1.0]);
        assert_eq!(m.metallic, 0.0);
        assert_eq!(m.roughness, 1.0);
    }

    #[test]
    fn test_uniforms_size() {
        assert_eq!(std::mem::size_of::<MaterialUniforms>(), 48);
        let u = MaterialUniforms::from(&MaterialParams::default());
        assert_eq!(u.metallic, 1.0);
    }

    #[test]
    fn test_missing_index_uses_default_slot() {
        assert_eq!(MaterialSlot::from(None), MaterialSlot::Default);
        assert_eq!(MaterialSlot::from(Some(2)), MaterialSlot::Index(2));
    }
}
