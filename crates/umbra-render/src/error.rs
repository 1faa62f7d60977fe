//! Rendering error types.

use thiserror::Error;
use umbra_core::UmbraError;

/// Errors that can occur during rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// Failed to create surface.
    #[error("failed to create surface: {0}")]
    SurfaceCreationFailed(#[from] wgpu::CreateSurfaceError),

    /// The adapter lacks a capability the shadow passes need.
    #[error("unsupported graphics environment: {0}")]
    Unsupported(String),

    /// A GPU allocation failed.
    #[error("GPU resources exhausted: {0}")]
    ResourceExhaustion(String),

    /// Pipeline or bind group creation was rejected by validation.
    #[error("GPU validation failed: {0}")]
    Validation(String),

    /// Mapping a read-back buffer failed.
    #[error("failed to map buffer for reading")]
    BufferMapFailed,

    /// Timeout waiting for GPU.
    #[error("timeout waiting for GPU")]
    Timeout,

    /// The model could not be decoded or scheduled.
    #[error(transparent)]
    Model(#[from] UmbraError),
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
