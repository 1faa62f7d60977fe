//! Error types for umbra.

use thiserror::Error;

use crate::pass::PassKind;

/// The main error type for umbra model loading and scheduling.
#[derive(Error, Debug)]
pub enum UmbraError {
    /// The GLB container is malformed (bad magic, chunk layout, out-of-range views).
    #[error("malformed GLB: {0}")]
    Format(String),

    /// An accessor uses a component type code that cannot be sized.
    #[error("unsupported glTF component type {0}")]
    UnsupportedComponentType(u32),

    /// An accessor uses a semantic type tag that cannot be sized.
    #[error("unsupported glTF element type '{0}'")]
    UnsupportedElementType(String),

    /// A primitive uses a topology other than triangle lists.
    #[error("unsupported primitive mode {0} (only TRIANGLES is rendered)")]
    UnsupportedPrimitiveMode(u32),

    /// An accessor has a valid type that is not usable for the attribute it feeds.
    #[error("accessor {accessor} cannot be used as {semantic}: {reason}")]
    UnsupportedAttribute {
        accessor: usize,
        semantic: &'static str,
        reason: String,
    },

    /// A usage flag was requested on a buffer view after its GPU allocation was fixed.
    #[error("buffer view {view} usage is sealed; allocate a new buffer instead")]
    UsageSealed { view: usize },

    /// A render pass was started out of order within a frame.
    #[error("pass {found:?} started while {expected:?} was expected")]
    PassOrder {
        expected: Option<PassKind>,
        found: PassKind,
    },

    /// The frame was finished before all passes ran.
    #[error("frame finished after {completed} of 4 passes")]
    IncompleteFrame { completed: usize },

    /// JSON chunk could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An options file is not valid JSON for [`crate::Options`].
    #[error("invalid options: {0}")]
    Config(#[source] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UmbraError {
    /// Shorthand for [`UmbraError::Format`].
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Whether this error belongs to the "unsupported type" family.
    #[must_use]
    pub fn is_unsupported_type(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedComponentType(_)
                | Self::UnsupportedElementType(_)
                | Self::UnsupportedPrimitiveMode(_)
                | Self::UnsupportedAttribute { .. }
        )
    }

    /// Whether this error belongs to the "format" family.
    #[must_use]
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_) | Self::Json(_))
    }

    /// Whether this error came from reading options rather than a model.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// A specialized Result type for umbra operations.
pub type Result<T> = std::result::Result<T, UmbraError>;
