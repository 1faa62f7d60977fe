//! GPU copies of a model's buffer views and the primitives drawn from them.

use umbra_core::{ComponentType, ModelAsset, PrimitiveAsset, ViewUsage};

use crate::buffer::create_padded_buffer;
use crate::error::{RenderError, RenderResult};
use crate::pipelines::{ShaderKey, TaggedPipeline};
use crate::shadow_volume::WidenedIndices;

/// Buffer usages of a view's draw buffer.
#[must_use]
pub fn draw_usages(usage: ViewUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::COPY_SRC;
    if usage.contains(ViewUsage::VERTEX) {
        out |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(ViewUsage::INDEX) {
        out |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(ViewUsage::UNIFORM) {
        out |= wgpu::BufferUsages::UNIFORM;
    }
    out
}

/// Buffer usages of a view's storage buffer.
#[must_use]
pub fn storage_usages() -> wgpu::BufferUsages {
    wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC
}

/// Maps a glTF index component type to a raster index format. 8-bit indices
/// have none and are drawn from their widened copy.
#[must_use]
pub fn index_format(component_type: ComponentType) -> Option<wgpu::IndexFormat> {
    match component_type {
        ComponentType::UnsignedShort => Some(wgpu::IndexFormat::Uint16),
        ComponentType::UnsignedInt => Some(wgpu::IndexFormat::Uint32),
        _ => None,
    }
}

/// The GPU buffers of one buffer view.
///
/// A view used both for drawing and for compute gets two allocations
/// holding the same bytes.
pub struct GpuBufferView {
    pub index: usize,
    pub usage: ViewUsage,
    pub byte_length: usize,
    pub draw: Option<wgpu::Buffer>,
    pub storage: Option<wgpu::Buffer>,
}

/// All buffer views of a model, uploaded once.
pub struct GeometryStore {
    views: Vec<GpuBufferView>,
}

impl GeometryStore {
    /// Uploads every used view of `asset`. Views must be sealed.
    pub fn upload(device: &wgpu::Device, asset: &ModelAsset) -> RenderResult<Self> {
        let mut views = Vec::with_capacity(asset.views.len());
        for view in &asset.views {
            if !view.is_sealed() {
                return Err(RenderError::Validation(format!(
                    "buffer view {} uploaded before its usage was sealed",
                    view.index
                )));
            }
            let usage = view.usage();
            let bytes = view.bytes(&asset.bin);

            let draw = usage.needs_draw_buffer().then(|| {
                create_padded_buffer(device, bytes, draw_usages(usage), Some("view draw buffer"))
            });
            let storage = usage.needs_storage_buffer().then(|| {
                create_padded_buffer(device, bytes, storage_usages(), Some("view storage buffer"))
            });
            if usage.is_empty() {
                log::debug!("buffer view {} is unused, skipping upload", view.index);
            }

            views.push(GpuBufferView {
                index: view.index,
                usage,
                byte_length: view.byte_length,
                draw,
                storage,
            });
        }
        log::debug!(
            "uploaded {} buffer views into {} buffers",
            views.len(),
            views
                .iter()
                .map(|v| usize::from(v.draw.is_some()) + usize::from(v.storage.is_some()))
                .sum::<usize>()
        );
        Ok(Self { views })
    }

    #[must_use]
    pub fn view(&self, index: usize) -> Option<&GpuBufferView> {
        self.views.get(index)
    }

    /// The draw buffer of a view, failing when it was not uploaded for drawing.
    pub fn draw_buffer(&self, index: usize) -> RenderResult<&wgpu::Buffer> {
        self.view(index)
            .and_then(|v| v.draw.as_ref())
            .ok_or_else(|| RenderError::Validation(format!("buffer view {index} has no draw buffer")))
    }

    /// The storage buffer of a view, failing when it was not uploaded for compute.
    pub fn storage_buffer(&self, index: usize) -> RenderResult<&wgpu::Buffer> {
        self.view(index).and_then(|v| v.storage.as_ref()).ok_or_else(|| {
            RenderError::Validation(format!("buffer view {index} has no storage buffer"))
        })
    }

    /// Number of GPU allocations.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.views
            .iter()
            .map(|v| usize::from(v.draw.is_some()) + usize::from(v.storage.is_some()))
            .sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn release(&self) {
        for view in &self.views {
            if let Some(b) = &view.draw {
                b.destroy();
            }
            if let Some(b) = &view.storage {
                b.destroy();
            }
        }
    }
}

/// A vertex attribute inside a view's draw buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBinding {
    pub view: usize,
    pub offset: u64,
    pub stride: u64,
}

impl AttributeBinding {
    #[must_use]
    pub fn from_accessor(accessor: &umbra_core::Accessor) -> Self {
        Self {
            view: accessor.view,
            offset: accessor.byte_offset as u64,
            stride: accessor.byte_stride as u64,
        }
    }
}

/// Index source of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBinding {
    /// 16- or 32-bit indices read straight from a view.
    View {
        view: usize,
        offset: u64,
        format: wgpu::IndexFormat,
    },
    /// 8-bit indices, drawn from the widened 32-bit copy.
    Widened,
    /// Sequential vertices.
    None,
}

impl IndexBinding {
    #[must_use]
    pub fn for_primitive(primitive: &PrimitiveAsset) -> Self {
        match &primitive.indices {
            None => Self::None,
            Some(indices) => match index_format(indices.component_type) {
                Some(format) => Self::View {
                    view: indices.view,
                    offset: indices.byte_offset as u64,
                    format,
                },
                None => Self::Widened,
            },
        }
    }
}

/// A primitive ready to draw.
pub struct GpuPrimitive {
    pub positions: AttributeBinding,
    pub normals: Option<AttributeBinding>,
    pub indices: IndexBinding,
    pub widened: WidenedIndices,
    /// Slot in the model's material table.
    pub material: usize,
    pub shader_key: ShaderKey,
    pub ambient: TaggedPipeline,
    pub lit: TaggedPipeline,
    pub vertex_count: u32,
    pub element_count: u32,
    pub triangle_count: u32,
}

impl GpuPrimitive {
    /// Binds vertex and index buffers and issues the draw.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, store: &GeometryStore) -> RenderResult<()> {
        pass.set_vertex_buffer(
            0,
            store
                .draw_buffer(self.positions.view)?
                .slice(self.positions.offset..),
        );
        if let Some(normals) = &self.normals {
            pass.set_vertex_buffer(1, store.draw_buffer(normals.view)?.slice(normals.offset..));
        }
        match self.indices {
            IndexBinding::View {
                view,
                offset,
                format,
            } => {
                pass.set_index_buffer(store.draw_buffer(view)?.slice(offset..), format);
                pass.draw_indexed(0..self.element_count, 0, 0..1);
            }
            IndexBinding::Widened => {
                pass.set_index_buffer(self.widened.buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..self.element_count, 0, 0..1);
            }
            IndexBinding::None => pass.draw(0..self.element_count, 0..1),
        }
        Ok(())
    }

    pub fn release(&self) {
        self.widened.release();
    }
}

/// The primitives of one mesh.
pub struct GpuMesh {
    pub name: String,
    pub primitives: Vec<GpuPrimitive>,
}
