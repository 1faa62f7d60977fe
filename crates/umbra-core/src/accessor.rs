//! Accessor typing and sizing.
//!
//! An accessor interprets bytes of a buffer view as `count` elements of
//! `element_type` made of `component_type` scalars. Every pair that reaches the
//! renderer must resolve to a known element size; unknown codes fail the load.

use crate::error::{Result, UmbraError};

/// glTF scalar component type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    /// Signed 32-bit. Sized like the others but never valid as indices.
    Int,
    UnsignedInt,
    Float,
}

impl ComponentType {
    /// All supported component types.
    pub const ALL: [ComponentType; 7] = [
        ComponentType::Byte,
        ComponentType::UnsignedByte,
        ComponentType::Short,
        ComponentType::UnsignedShort,
        ComponentType::Int,
        ComponentType::UnsignedInt,
        ComponentType::Float,
    ];

    /// Decodes a glTF component type code.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            5120 => Ok(Self::Byte),
            5121 => Ok(Self::UnsignedByte),
            5122 => Ok(Self::Short),
            5123 => Ok(Self::UnsignedShort),
            5124 => Ok(Self::Int),
            5125 => Ok(Self::UnsignedInt),
            5126 => Ok(Self::Float),
            other => Err(UmbraError::UnsupportedComponentType(other)),
        }
    }

    /// Returns the glTF code for this component type.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Byte => 5120,
            Self::UnsignedByte => 5121,
            Self::Short => 5122,
            Self::UnsignedShort => 5123,
            Self::Int => 5124,
            Self::UnsignedInt => 5125,
            Self::Float => 5126,
        }
    }

    /// Size of one scalar in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::Int | Self::UnsignedInt | Self::Float => 4,
        }
    }
}

/// glTF element (semantic) types. Matrix types are not rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
}

impl ElementType {
    pub const ALL: [ElementType; 4] = [
        ElementType::Scalar,
        ElementType::Vec2,
        ElementType::Vec3,
        ElementType::Vec4,
    ];

    /// Decodes a glTF `type` string.
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "SCALAR" => Ok(Self::Scalar),
            "VEC2" => Ok(Self::Vec2),
            "VEC3" => Ok(Self::Vec3),
            "VEC4" => Ok(Self::Vec4),
            other => Err(UmbraError::UnsupportedElementType(other.to_string())),
        }
    }

    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Scalar => "SCALAR",
            Self::Vec2 => "VEC2",
            Self::Vec3 => "VEC3",
            Self::Vec4 => "VEC4",
        }
    }

    #[must_use]
    pub fn num_components(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
        }
    }
}

/// Size in bytes of one element, resolved from raw glTF codes.
pub fn element_size(component_type: u32, element_type: &str) -> Result<usize> {
    let component = ComponentType::from_code(component_type)?;
    let element = ElementType::parse(element_type)?;
    Ok(component.size() * element.num_components())
}

/// A typed, validated view over a buffer view.
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    /// Index of the accessor in the source document.
    pub index: usize,
    /// Index of the buffer view it reads from.
    pub view: usize,
    pub count: usize,
    pub component_type: ComponentType,
    pub element_type: ElementType,
    /// Offset relative to the start of the buffer view.
    pub byte_offset: usize,
    /// `max(element_size, view.byte_stride)`.
    pub byte_stride: usize,
    pub min: Option<[f32; 3]>,
    pub max: Option<[f32; 3]>,
}

impl Accessor {
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.component_type.size() * self.element_type.num_components()
    }

    #[must_use]
    pub fn num_components(&self) -> usize {
        self.element_type.num_components()
    }

    /// Total number of scalars addressed by this accessor.
    #[must_use]
    pub fn num_scalars(&self) -> usize {
        self.count.saturating_mul(self.num_components())
    }

    /// Number of bytes from the accessor offset to the end of its last element.
    #[must_use]
    pub fn byte_span(&self) -> usize {
        if self.count == 0 {
            0
        } else {
            self.byte_stride
                .saturating_mul(self.count - 1)
                .saturating_add(self.element_size())
        }
    }

    /// Derived stride: tightly packed unless the view declares a larger stride.
    #[must_use]
    pub fn derive_stride(element_size: usize, view_stride: usize) -> usize {
        element_size.max(view_stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_size_table() {
        let expected = [
            (5120, "SCALAR", 1),
            (5121, "VEC2", 2),
            (5122, "VEC3", 6),
            (5123, "SCALAR", 2),
            (5123, "VEC4", 8),
            (5124, "SCALAR", 4),
            (5125, "SCALAR", 4),
            (5126, "VEC2", 8),
            (5126, "VEC3", 12),
            (5126, "VEC4", 16),
        ];
        for (component, element, size) in expected {
            assert_eq!(element_size(component, element).unwrap(), size, "{component} {element}");
        }
    }

    #[test]
    fn test_every_supported_pair_sizes() {
        for component in ComponentType::ALL {
            for element in ElementType::ALL {
                let size = element_size(component.code(), element.tag()).unwrap();
                assert_eq!(size, component.size() * element.num_components());
                assert!(size > 0);
            }
        }
    }

    #[test]
    fn test_unknown_component_type_fails() {
        let err = element_size(5130, "VEC3").unwrap_err();
        assert!(matches!(err, UmbraError::UnsupportedComponentType(5130)));
        assert!(element_size(0, "SCALAR").unwrap_err().is_unsupported_type());
    }

    #[test]
    fn test_unknown_element_type_fails() {
        let err = element_size(5126, "MAT4").unwrap_err();
        assert!(matches!(err, UmbraError::UnsupportedElementType(ref t) if t == "MAT4"));
    }

    #[test]
    fn test_stride_derivation() {
        assert_eq!(Accessor::derive_stride(12, 0), 12);
        assert_eq!(Accessor::derive_stride(12, 24), 24);
        assert_eq!(Accessor::derive_stride(16, 8), 16);
    }
}
