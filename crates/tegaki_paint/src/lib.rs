//! Tegaki Paint
//!
//! CPU raster side of the stroke pipeline:
//!
//! - Coverage rasters and committed stroke stamps
//! - The vector fallback renderer (circles and capsules) and live previews
//! - Software Jump Flooding distance fields
//! - Layer alpha masks and the layer store

pub mod coverage;
pub mod error;
pub mod fallback;
pub mod field;
pub mod layer;
pub mod mask;
pub mod stamp;

pub use coverage::CoverageMap;
pub use error::{PaintError, Result};
pub use fallback::{FallbackRenderer, VectorPreview, VectorShape};
pub use field::{DistanceField, SoftwareFieldGenerator};
pub use layer::{Layer, LayerImage, LayerStore, StampId};
pub use mask::{LayerMask, MaskMode, MaskPatch};
pub use stamp::StrokeStamp;
pub use tegaki_core::Color;
