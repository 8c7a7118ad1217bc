//! Pipeline error types

use thiserror::Error;

use tegaki_core::{LayerId, NodeId, StrokeError, TransformError};
use tegaki_gpu::GpuError;
use tegaki_paint::PaintError;

/// Errors surfaced by the stroke pipeline entry points
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A sample mapped to non-finite coordinates. The sample is dropped and
    /// the stroke stays active.
    #[error("Sample dropped: {0}")]
    InvalidGeometry(String),

    /// The layer's transform node does not hang under the world root. The
    /// stroke is aborted.
    #[error("Layer transform {0:?} is not attached to the world root")]
    DetachedNode(NodeId),

    /// The compute path failed; only reported through events, never returned
    /// from `finalize_stroke`
    #[error("GPU distance field unavailable: {0}")]
    GpuUnavailable(String),

    #[error("Stroke cancelled")]
    Cancelled,

    #[error("No stroke in progress")]
    NoActiveStroke,

    #[error("A stroke is already in progress")]
    AlreadyActive,

    #[error("Unknown layer {0:?}")]
    UnknownLayer(LayerId),

    /// Undo asked for a stroke that a later stroke on the same layer still
    /// sits on top of
    #[error("Stroke on layer {0:?} is not the most recent one; undo in reverse order")]
    UndoOutOfOrder(LayerId),

    /// The finished stroke does not touch any pixel of its layer
    #[error("Stroke lies entirely outside layer {0:?}")]
    OutsideLayer(LayerId),
}

impl From<TransformError> for PipelineError {
    fn from(e: TransformError) -> Self {
        match e {
            TransformError::DetachedNode(node) => PipelineError::DetachedNode(node),
            other => PipelineError::InvalidGeometry(other.to_string()),
        }
    }
}

impl From<StrokeError> for PipelineError {
    fn from(e: StrokeError) -> Self {
        match e {
            StrokeError::NoActiveStroke => PipelineError::NoActiveStroke,
            StrokeError::AlreadyActive => PipelineError::AlreadyActive,
            StrokeError::InvalidGeometry => PipelineError::InvalidGeometry(e.to_string()),
        }
    }
}

impl From<PaintError> for PipelineError {
    fn from(e: PaintError) -> Self {
        match e {
            PaintError::UnknownLayer(id) => PipelineError::UnknownLayer(id),
            PaintError::Cancelled => PipelineError::Cancelled,
            PaintError::NotTopmost(id) => PipelineError::UndoOutOfOrder(id),
            PaintError::OutsideLayer => PipelineError::InvalidGeometry(e.to_string()),
        }
    }
}

impl From<GpuError> for PipelineError {
    fn from(e: GpuError) -> Self {
        match e {
            GpuError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::GpuUnavailable(other.to_string()),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
