//! Rendering backend for umbra.
//!
//! This crate provides the wgpu-based shadow-volume renderer, including:
//! - device setup, capability checks and error scopes
//! - one-time upload of buffer views and materials
//! - the compute stage that widens indices and extrudes shadow volumes
//! - the four-pass frame: ambient, volume generation, stencil mark, lit
//! - camera and per-frame statistics

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// GPU counts and offsets are u32
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod buffer;
pub mod camera;
pub mod engine;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod materials;
pub mod model;
pub mod passes;
pub mod pipelines;
pub mod scene;
pub mod shadow_volume;

pub use camera::Camera;
pub use engine::{check_capabilities, with_error_scope, RenderEngine, DEPTH_STENCIL_FORMAT};
pub use error::{RenderError, RenderResult};
pub use frame::{FrameDriver, FrameReport, FrameStats, FrameUniforms, VolumeReport};
pub use geometry::{GeometryStore, GpuMesh, GpuPrimitive};
pub use materials::{GpuMaterial, MaterialTable};
pub use model::GpuModel;
pub use passes::{FrameContext, FramePasses, PassPlan, PassScheduler, PassTargets};
pub use pipelines::{PipelineCache, PipelineKey, SceneLayouts, ShaderKey, TaggedPipeline};
pub use scene::GpuNode;
pub use shadow_volume::{ShadowVolume, VolumeGenerator, WidenedIndices};
