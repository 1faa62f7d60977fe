//! Core data model for umbra.
//!
//! This crate holds everything about a model that does not need a GPU:
//! - [`glb`] container parsing and the plain glTF [`document`] records
//! - accessor sizing and buffer-view usage accumulation
//! - node hierarchy flattening and material parameters
//! - [`ModelAsset`], the validated input to the renderer
//! - the shadow-volume capacity policy and append-claim protocol
//! - the per-frame pass order and depth/stencil access rights
//! - [`Options`]

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// glTF counts are u32 on the GPU side
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod accessor;
pub mod asset;
pub mod buffer_view;
pub mod document;
pub mod error;
pub mod glb;
pub mod material;
pub mod options;
pub mod pass;
pub mod scene;
pub mod volume;

pub use accessor::{element_size, Accessor, ComponentType, ElementType};
pub use asset::{MeshAsset, ModelAsset, PrimitiveAsset};
pub use buffer_view::{BufferView, ViewUsage};
pub use error::{Result, UmbraError};
pub use material::{MaterialParams, MaterialSlot, MaterialUniforms};
pub use options::{CameraOptions, LightOptions, Options, VolumeOptions};
pub use pass::{Access, AttachmentAccess, FrameSchedule, PassKind};
pub use scene::{flatten_nodes, local_transform, SceneNode};
pub use volume::{AppendCounter, Claim, CounterSnapshot, VolumeCapacity};

// Re-export glam types for convenience
pub use glam::{Mat4, Vec3, Vec4};
