//! umbra: a GLB viewer with GPU stencil shadow volumes.
//!
//! A model is decoded and validated on the CPU, uploaded once, and then drawn
//! every frame in four passes: an ambient depth pass, a compute pass that
//! extrudes shadow volumes away from a point light, a depth-fail stencil pass
//! over those volumes, and a lit pass restricted to unshadowed pixels.
//!
//! # Quick Start
//!
//! ```no_run
//! fn main() -> umbra::Result<()> {
//!     umbra::init_logging();
//!     let bytes = umbra::read_file("model.glb")?;
//!     umbra::show(umbra::Options::default(), bytes)
//! }
//! ```
//!
//! For offscreen use see [`render_to_image`] and [`HeadlessRenderer`].

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Window sizes and cursor positions go through f32
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

mod app;
mod error;
mod headless;
mod init;

pub use app::App;
pub use error::{Error, Result};
pub use headless::{render_to_image, HeadlessRenderer};
pub use init::{decode_model, init_logging, load_model, load_options, read_file};

// Re-export core types
pub use umbra_core::{
    CameraOptions, LightOptions, Mat4, ModelAsset, Options, PassKind, UmbraError, Vec3, Vec4,
    VolumeOptions,
};

// Re-export render types
pub use umbra_render::{
    Camera, FrameDriver, FrameReport, GpuModel, RenderEngine, RenderError, VolumeReport,
};

/// Opens the viewer window on `model_bytes` and blocks until it is closed.
///
/// When the GPU cannot run compute shaders the window stays up with a static
/// explanation in its title instead of rendering.
pub fn show(options: Options, model_bytes: Vec<u8>) -> Result<()> {
    init_logging();
    app::run_app(options, model_bytes)
}
