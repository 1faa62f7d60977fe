//! Error type of the umbra facade.

use thiserror::Error;
use umbra_core::UmbraError;
use umbra_render::RenderError;

/// Any failure surfaced to the host application.
#[derive(Error, Debug)]
pub enum Error {
    /// The model or configuration could not be decoded.
    #[error(transparent)]
    Model(#[from] UmbraError),

    /// GPU setup, upload or frame submission failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The window or event loop could not be created.
    #[error("window error: {0}")]
    Window(String),
}

impl Error {
    /// Whether this is a malformed-file error.
    #[must_use]
    pub fn is_format(&self) -> bool {
        match self {
            Self::Model(e) | Self::Render(RenderError::Model(e)) => e.is_format(),
            _ => false,
        }
    }

    /// Whether this is an unknown component, element or primitive type.
    #[must_use]
    pub fn is_unsupported_type(&self) -> bool {
        match self {
            Self::Model(e) | Self::Render(RenderError::Model(e)) => e.is_unsupported_type(),
            _ => false,
        }
    }

    /// Whether the GPU lacks a required capability.
    #[must_use]
    pub fn is_unsupported_gpu(&self) -> bool {
        matches!(
            self,
            Self::Render(RenderError::Unsupported(_) | RenderError::AdapterCreationFailed)
        )
    }
}

/// Result alias of the umbra facade.
pub type Result<T> = std::result::Result<T, Error>;
