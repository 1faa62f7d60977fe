//! Buffer views and their accumulated GPU usage.
//!
//! Usage is collected from every accessor over a view before the one-time
//! upload. Once a view is sealed its usage can no longer grow; a new access
//! pattern needs a new buffer and an explicit copy.

use bitflags::bitflags;

use crate::error::{Result, UmbraError};

bitflags! {
    /// GPU access classes a buffer view must support.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ViewUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const STORAGE = 1 << 2;
        const UNIFORM = 1 << 3;
    }
}

impl ViewUsage {
    /// Usage served by an ordinary draw-tagged buffer.
    pub const RASTER: ViewUsage = ViewUsage::VERTEX.union(ViewUsage::INDEX).union(ViewUsage::UNIFORM);

    /// Whether a rasterization (draw) buffer is required.
    #[must_use]
    pub fn needs_draw_buffer(self) -> bool {
        self.intersects(Self::RASTER)
    }

    /// Whether a storage-class (compute) buffer is required.
    #[must_use]
    pub fn needs_storage_buffer(self) -> bool {
        self.contains(Self::STORAGE)
    }
}

/// Rounds `len` up to the GPU minimum buffer-size alignment of 4 bytes.
#[must_use]
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(4) * 4
}

/// A byte sub-range of the binary chunk, with a usage mask.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferView {
    /// Index in the source document.
    pub index: usize,
    /// Offset of the view inside the binary chunk.
    pub byte_offset: usize,
    pub byte_length: usize,
    /// Declared stride, 0 when tightly packed.
    pub byte_stride: usize,
    usage: ViewUsage,
    sealed: bool,
}

impl BufferView {
    #[must_use]
    pub fn new(index: usize, byte_offset: usize, byte_length: usize, byte_stride: usize) -> Self {
        Self {
            index,
            byte_offset,
            byte_length,
            byte_stride,
            usage: ViewUsage::empty(),
            sealed: false,
        }
    }

    /// Adds usage requested by an accessor over this view.
    pub fn add_usage(&mut self, usage: ViewUsage) -> Result<()> {
        if self.sealed && !self.usage.contains(usage) {
            return Err(UmbraError::UsageSealed { view: self.index });
        }
        self.usage |= usage;
        Ok(())
    }

    /// Fixes the usage mask ahead of GPU allocation.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    #[must_use]
    pub fn usage(&self) -> ViewUsage {
        self.usage
    }

    /// Size of the GPU allocation backing this view.
    #[must_use]
    pub fn padded_len(&self) -> usize {
        padded_len(self.byte_length)
    }

    /// The view's bytes inside `bin`.
    #[must_use]
    pub fn bytes<'a>(&self, bin: &'a [u8]) -> &'a [u8] {
        &bin[self.byte_offset..self.byte_offset + self.byte_length]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(1), 4);
        assert_eq!(padded_len(6), 8);
        assert_eq!(padded_len(36), 36);
    }

    #[test]
    fn test_sealed_view_rejects_new_usage() {
        let mut view = BufferView::new(3, 0, 12, 0);
        view.add_usage(ViewUsage::VERTEX).unwrap();
        view.seal();
        // re-requesting an existing flag is fine
        view.add_usage(ViewUsage::VERTEX).unwrap();
        let err = view.add_usage(ViewUsage::STORAGE).unwrap_err();
        assert!(matches!(err, UmbraError::UsageSealed { view: 3 }));
        assert_eq!(view.usage(), ViewUsage::VERTEX);
    }

    #[test]
    fn test_buffer_split() {
        let usage = ViewUsage::VERTEX | ViewUsage::STORAGE;
        assert!(usage.needs_draw_buffer());
        assert!(usage.needs_storage_buffer());
        assert!(!ViewUsage::STORAGE.needs_draw_buffer());
        assert!(!ViewUsage::INDEX.needs_storage_buffer());
    }

    fn usage_strategy() -> impl Strategy<Value = ViewUsage> {
        (0u32..16).prop_map(ViewUsage::from_bits_truncate)
    }

    proptest! {
        #[test]
        fn usage_mask_is_order_independent(
            (requests, shuffled) in proptest::collection::vec(usage_strategy(), 0..16)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        ) {
            let expected = requests.iter().fold(ViewUsage::empty(), |acc, u| acc | *u);

            let mut forward = BufferView::new(0, 0, 4, 0);
            for u in &requests {
                forward.add_usage(*u).unwrap();
            }
            let mut permuted = BufferView::new(0, 0, 4, 0);
            for u in &shuffled {
                permuted.add_usage(*u).unwrap();
            }

            prop_assert_eq!(forward.usage(), expected);
            prop_assert_eq!(permuted.usage(), expected);
        }
    }
}
