//! Paint error types

use thiserror::Error;

use tegaki_core::LayerId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaintError {
    /// The layer handle does not (or no longer) exist
    #[error("Unknown layer {0:?}")]
    UnknownLayer(LayerId),

    /// Work was cancelled between stages
    #[error("Cancelled")]
    Cancelled,

    /// Only the topmost stamp of a layer can be reverted exactly
    #[error("Stamp on layer {0:?} is not the most recent one")]
    NotTopmost(LayerId),

    /// A field or stamp region does not intersect the layer
    #[error("Region lies outside the layer")]
    OutsideLayer,
}

/// Result type for paint operations
pub type Result<T> = std::result::Result<T, PaintError>;
