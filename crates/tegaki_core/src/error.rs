//! Core error types

use thiserror::Error;

use crate::transform::NodeId;

/// Which coordinate-mapping step produced a non-finite value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformStage {
    ScreenToCanvas,
    CanvasToWorld,
    WorldToLocal,
    LocalToWorld,
    WorldToCanvas,
    CanvasToScreen,
}

impl std::fmt::Display for TransformStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransformStage::ScreenToCanvas => "screen->canvas",
            TransformStage::CanvasToWorld => "canvas->world",
            TransformStage::WorldToLocal => "world->local",
            TransformStage::LocalToWorld => "local->world",
            TransformStage::WorldToCanvas => "world->canvas",
            TransformStage::CanvasToScreen => "canvas->screen",
        };
        f.write_str(name)
    }
}

/// Coordinate transform errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// A mapping step produced NaN or infinity
    #[error("Non-finite coordinates after {stage}")]
    InvalidGeometry { stage: TransformStage },

    /// The target node does not hang under the world root
    #[error("Transform node {0:?} is not attached to the world root")]
    DetachedNode(NodeId),

    /// The world transform changed and was not refreshed with `resolve()`
    #[error("World transform used before being resolved for this frame")]
    Unresolved,

    /// Re-parenting would have created a cycle
    #[error("Re-parenting {0:?} would create a cycle")]
    CycleRejected(NodeId),
}

/// Stroke recording errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrokeError {
    /// `add_point`/`end_stroke` called without `start_stroke`
    #[error("No stroke in progress")]
    NoActiveStroke,

    /// `start_stroke` called while a stroke is already in progress
    #[error("A stroke is already in progress")]
    AlreadyActive,

    /// A sample carried non-finite position data
    #[error("Sample has non-finite coordinates")]
    InvalidGeometry,
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Result type for transform operations
pub type Result<T> = std::result::Result<T, TransformError>;
