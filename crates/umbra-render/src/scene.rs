//! Per-node GPU state: transform uniforms and the node's shadow volumes.

use glam::{Mat3, Mat4};

use crate::buffer::{create_uniform_buffer, update_uniform};
use crate::shadow_volume::ShadowVolume;

/// A 4x4 matrix uniform.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MatrixUniform {
    pub value: [[f32; 4]; 4],
}

impl From<Mat4> for MatrixUniform {
    fn from(m: Mat4) -> Self {
        Self {
            value: m.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct NodeIdUniform {
    pub id: u32,
    pub _padding: [u32; 3],
}

/// Inverse-transpose of the upper 3x3 of `model`, padded to a 4x4 with no
/// translation, so `w = 0` directions stay directions. Falls back to the
/// plain 3x3 when it is singular.
#[must_use]
pub fn normal_matrix(model: Mat4) -> Mat4 {
    let linear = Mat3::from_mat4(model);
    let det = linear.determinant();
    if det.abs() <= f32::EPSILON || !det.is_finite() {
        return Mat4::from_mat3(linear);
    }
    Mat4::from_mat3(linear.inverse().transpose())
}

/// A mesh-bearing node on the GPU.
pub struct GpuNode {
    pub id: u32,
    pub name: String,
    pub mesh: usize,
    pub transform: Mat4,
    model_buffer: wgpu::Buffer,
    normal_buffer: wgpu::Buffer,
    id_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    /// One per primitive of the node's mesh, in primitive order.
    pub volumes: Vec<ShadowVolume>,
}

impl GpuNode {
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        id: u32,
        name: &str,
        mesh: usize,
        transform: Mat4,
    ) -> Self {
        let model_buffer =
            create_uniform_buffer(device, &MatrixUniform::from(transform), Some("node model"));
        let normal_buffer = create_uniform_buffer(
            device,
            &MatrixUniform::from(normal_matrix(transform)),
            Some("node normal matrix"),
        );
        let id_buffer = create_uniform_buffer(
            device,
            &NodeIdUniform { id, _padding: [0; 3] },
            Some("node id"),
        );
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("node bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: model_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: normal_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: id_buffer.as_entire_binding(),
                },
            ],
        });
        Self {
            id,
            name: name.to_string(),
            mesh,
            transform,
            model_buffer,
            normal_buffer,
            id_buffer,
            bind_group,
            volumes: Vec::new(),
        }
    }

    /// Moves the node. Only the uniform buffers change; the volumes are
    /// regenerated from them on the next frame.
    pub fn set_transform(&mut self, queue: &wgpu::Queue, transform: Mat4) {
        self.transform = transform;
        update_uniform(queue, &self.model_buffer, &MatrixUniform::from(transform));
        update_uniform(
            queue,
            &self.normal_buffer,
            &MatrixUniform::from(normal_matrix(transform)),
        );
    }

    pub fn release(&self) {
        self.model_buffer.destroy();
        self.normal_buffer.destroy();
        self.id_buffer.destroy();
        for volume in &self.volumes {
            volume.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3, Vec4};

    #[test]
    fn test_uniform_sizes_match_layouts() {
        assert_eq!(
            std::mem::size_of::<MatrixUniform>() as u64,
            crate::pipelines::MATRIX_UNIFORM_SIZE
        );
        assert_eq!(
            std::mem::size_of::<NodeIdUniform>() as u64,
            crate::pipelines::NODE_ID_UNIFORM_SIZE
        );
    }

    #[test]
    fn test_normal_matrix_of_rigid_transform_is_itself() {
        let m = Mat4::from_rotation_translation(
            Quat::from_rotation_y(0.7),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let n = normal_matrix(m);
        let v = Vec4::new(0.0, 0.0, 1.0, 0.0);
        // Full 4D comparison: a translated node must not give normals a w.
        assert!(((n * v) - (m * v)).length() < 1e-5);
    }

    #[test]
    fn test_normal_matrix_has_no_translation() {
        let m = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0));
        let n = normal_matrix(m) * Vec4::new(0.0, 1.0, 0.0, 0.0);
        assert_eq!(n, Vec4::new(0.0, 1.0, 0.0, 0.0));
    }

    #[test]
    fn test_view_normal_of_translated_node() {
        // Same multiply as the scene and extrusion shaders:
        // view * normal_matrix * vec4(n, 0).
        let model = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0));
        let view = Mat4::look_at_rh(Vec3::new(0.0, 8.0, 8.0), Vec3::ZERO, Vec3::Y);
        let n = (view * normal_matrix(model) * Vec4::new(0.0, 1.0, 0.0, 0.0)).truncate();
        let expected = view.transform_vector3(Vec3::Y);
        assert!((n - expected).length() < 1e-5, "{n:?} vs {expected:?}");
        assert!((n.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_normal_matrix_keeps_normals_perpendicular_under_scale() {
        let m = Mat4::from_scale(Vec3::new(4.0, 1.0, 1.0));
        let tangent = (m * Vec4::new(1.0, 1.0, 0.0, 0.0)).truncate();
        let normal = (normal_matrix(m) * Vec4::new(1.0, -1.0, 0.0, 0.0)).truncate();
        assert!(tangent.dot(normal).abs() < 1e-5);
    }

    #[test]
    fn test_normal_matrix_singular_falls_back() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 0.0, 1.0),
            Quat::IDENTITY,
            Vec3::new(3.0, 0.0, 0.0),
        );
        assert_eq!(normal_matrix(m), Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)));
    }
}
