//! Shadow-volume capacity policy and the append-claim protocol.
//!
//! The extrusion shader emits a fixed-size block per light-facing triangle:
//! six vertices (three near-cap, three at infinity) and 24 indices (two caps
//! and three side quads). Each invocation claims its block with a single
//! atomic add on a shared counter, and writes only after confirming the
//! claimed range lies inside the preallocated buffers. [`AppendCounter`] is
//! the host-side model of that counter.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Vertices written per extruded triangle.
pub const VERTICES_PER_TRIANGLE: u32 = 6;
/// Indices written per extruded triangle.
pub const INDICES_PER_TRIANGLE: u32 = 24;
/// Default extrusion multiplier, the largest seen in practice.
pub const DEFAULT_MULTIPLIER: u32 = 14;

/// Fixed output capacity of one primitive's shadow-volume buffers.
///
/// Capacity is `source vertices * multiplier`; it is an empirical bound, not a
/// proof of sufficiency. Triangles whose claim falls past the end are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeCapacity {
    pub vertices: u32,
    pub indices: u32,
}

impl VolumeCapacity {
    #[must_use]
    pub fn for_vertex_count(source_vertices: u32, multiplier: u32) -> Self {
        let vertices = source_vertices.saturating_mul(multiplier.max(1));
        Self {
            vertices,
            indices: vertices.saturating_mul(INDICES_PER_TRIANGLE / VERTICES_PER_TRIANGLE),
        }
    }

    /// How many whole triangle blocks fit.
    #[must_use]
    pub fn triangle_slots(&self) -> u32 {
        self.indices / INDICES_PER_TRIANGLE
    }

    /// Whether a claim of `indices` starting at `start` fits.
    #[must_use]
    pub fn fits(&self, start: u32, indices: u32) -> bool {
        start
            .checked_add(indices)
            .is_some_and(|end| end <= self.indices)
    }

    /// Bytes of the vertex buffer (`vec4<f32>` per vertex).
    #[must_use]
    pub fn vertex_bytes(&self) -> u64 {
        u64::from(self.vertices) * 16
    }

    #[must_use]
    pub fn index_bytes(&self) -> u64 {
        u64::from(self.indices) * 4
    }
}

/// A range handed out by [`AppendCounter::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub start: u32,
    pub len: u32,
}

impl Claim {
    #[must_use]
    pub fn range(&self) -> Range<u32> {
        self.start..self.start + self.len
    }

    /// First vertex of a triangle block claimed in index units.
    #[must_use]
    pub fn vertex_base(&self) -> u32 {
        self.start / (INDICES_PER_TRIANGLE / VERTICES_PER_TRIANGLE)
    }
}

/// Shared append counter: `claimed` grows by every request, `dropped` counts
/// requests that did not fit.
#[derive(Debug, Default)]
pub struct AppendCounter {
    claimed: AtomicU32,
    dropped: AtomicU32,
}

impl AppendCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `len` elements. Returns `None` when the claimed range lies past
    /// `capacity`; the caller must not write in that case.
    pub fn claim(&self, len: u32, capacity: &VolumeCapacity) -> Option<Claim> {
        let start = self.claimed.fetch_add(len, Ordering::Relaxed);
        if capacity.fits(start, len) {
            Some(Claim { start, len })
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Zeroes both counters, as done before each generation pass.
    pub fn reset(&self) {
        self.claimed.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            claimed: self.claimed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Counter values as read back from the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CounterSnapshot {
    pub claimed: u32,
    pub dropped: u32,
}

impl CounterSnapshot {
    /// Whether any triangle was dropped for lack of space.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.dropped > 0
    }

    /// Indices actually written, clamped to capacity.
    #[must_use]
    pub fn written(&self, capacity: &VolumeCapacity) -> u32 {
        let fitted = capacity.triangle_slots() * INDICES_PER_TRIANGLE;
        self.claimed.min(fitted)
    }
}
