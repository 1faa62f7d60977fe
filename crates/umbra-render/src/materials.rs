//! Material uniforms and bind groups.
//!
//! Slot 0 of a [`MaterialTable`] is always the shared default material; the
//! document's materials follow in order.

use umbra_core::{MaterialParams, MaterialSlot, MaterialUniforms};

use crate::buffer::{create_uniform_buffer, update_uniform};

/// A material's parameters and GPU resources.
pub struct GpuMaterial {
    pub params: MaterialParams,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl GpuMaterial {
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        params: MaterialParams,
    ) -> Self {
        let uniforms = MaterialUniforms::from(&params);
        let buffer = create_uniform_buffer(device, &uniforms, Some("material uniforms"));
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material bind group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            params,
            buffer,
            bind_group,
        }
    }
}

/// Materials of one model.
pub struct MaterialTable {
    materials: Vec<GpuMaterial>,
}

impl MaterialTable {
    /// Creates the default material followed by one entry per document material.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        materials: &[MaterialParams],
    ) -> Self {
        let mut table = Vec::with_capacity(materials.len() + 1);
        table.push(GpuMaterial::new(device, layout, MaterialParams::default()));
        table.extend(
            materials
                .iter()
                .map(|params| GpuMaterial::new(device, layout, *params)),
        );
        Self { materials: table }
    }

    /// Table index of a primitive's material slot.
    #[must_use]
    pub fn slot_index(slot: MaterialSlot) -> usize {
        match slot {
            MaterialSlot::Default => 0,
            MaterialSlot::Index(i) => i + 1,
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&GpuMaterial> {
        self.materials.get(index)
    }

    /// Resolves an index, falling back to the default material.
    #[must_use]
    pub fn get_or_default(&self, index: usize) -> &GpuMaterial {
        self.materials.get(index).unwrap_or(&self.materials[0])
    }

    /// The shared default material.
    #[must_use]
    pub fn default_material(&self) -> &GpuMaterial {
        &self.materials[0]
    }

    /// Replaces a material's parameters. Returns false for unknown indices.
    pub fn update(&mut self, queue: &wgpu::Queue, index: usize, params: MaterialParams) -> bool {
        let Some(material) = self.materials.get_mut(index) else {
            return false;
        };
        material.params = params;
        update_uniform(queue, &material.buffer, &MaterialUniforms::from(&params));
        true
    }

    /// Number of materials, the default included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn release(&self) {
        for material in &self.materials {
            material.buffer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_reserves_default() {
        assert_eq!(MaterialTable::slot_index(MaterialSlot::Default), 0);
        assert_eq!(MaterialTable::slot_index(MaterialSlot::Index(0)), 1);
        assert_eq!(MaterialTable::slot_index(MaterialSlot::Index(4)), 5);
    }

    #[test]
    fn test_uniform_size_matches_layout() {
        assert_eq!(
            std::mem::size_of::<MaterialUniforms>() as u64,
            crate::pipelines::MATERIAL_UNIFORM_SIZE
        );
    }
}
