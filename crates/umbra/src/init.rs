//! Logging setup and model loading.

use std::path::Path;

use umbra_core::{ModelAsset, Options};
use umbra_render::{GpuModel, RenderEngine};

use crate::error::{Error, Result};

/// Installs the `env_logger` backend. Safe to call more than once.
///
/// Verbosity follows `RUST_LOG`, e.g. `RUST_LOG=umbra_render=debug`.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// Reads a whole file, keeping its path in the error.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Decodes and validates a GLB byte stream without touching the GPU.
///
/// # Errors
///
/// Returns a format error for a malformed container and an unsupported-type
/// error for accessors the renderer cannot consume.
pub fn decode_model(bytes: &[u8]) -> Result<ModelAsset> {
    let asset = ModelAsset::from_glb(bytes)?;
    log::debug!(
        "decoded model: {} views, {} meshes, {} nodes, {} materials",
        asset.views.len(),
        asset.meshes.len(),
        asset.nodes.len(),
        asset.materials.len()
    );
    Ok(asset)
}

/// Loads a GLB byte stream onto the engine's device.
///
/// The stream is fully decoded before the first GPU allocation, so a
/// malformed file never leaves buffers behind.
pub fn load_model(engine: &mut RenderEngine, bytes: &[u8], options: &Options) -> Result<GpuModel> {
    let asset = decode_model(bytes)?;
    Ok(GpuModel::from_asset(engine, &asset, &options.volume)?)
}

/// Loads options from a JSON file, or the defaults when `path` is `None`.
pub fn load_options(path: Option<&Path>) -> Result<Options> {
    match path {
        Some(path) => {
            let options = Options::load(path)?;
            log::info!("loaded options from {}", path.display());
            Ok(options)
        }
        None => Ok(Options::default()),
    }
}
