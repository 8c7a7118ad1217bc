//! Tegaki App
//!
//! Stroke pipeline orchestration: pointer entry points, per-stroke render
//! tier fallback, compositing onto layers and history commands.
//!
//! # Example
//!
//! ```rust
//! use tegaki_app::{FieldStrategy, PointerSample, StaticProbe, StrokePipeline};
//! use tegaki_core::{BrushSettings, CanvasRect, PipelineConfig, Size, TransformNode, Viewport};
//! use tegaki_paint::SoftwareFieldGenerator;
//!
//! let viewport = Viewport::fixed(Size::new(64.0, 64.0), CanvasRect::new(0.0, 0.0, 64.0, 64.0));
//! let mut pipeline = StrokePipeline::new(
//!     PipelineConfig::default(),
//!     viewport,
//!     StaticProbe(true),
//!     FieldStrategy::Software(SoftwareFieldGenerator::new()),
//! );
//! let layer = pipeline.add_layer("ink", 64, 64, TransformNode::new()).unwrap();
//!
//! pipeline
//!     .start_stroke(layer, PointerSample::new(10.0, 10.0, 1.0), BrushSettings::default())
//!     .unwrap();
//! pipeline.continue_stroke(PointerSample::new(20.0, 10.0, 1.0)).unwrap();
//! let commit = pipeline.finalize_stroke().unwrap();
//! assert_eq!(commit.layer, layer);
//! ```

pub mod compositor;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod probe;
pub mod strategy;

pub use compositor::{FinalRender, StrokeCompositor, TierFallback};
pub use error::{PipelineError, Result};
pub use history::CommittedStroke;
pub use pipeline::{PointerSample, StrokePipeline};
pub use probe::{CapabilityProbe, GpuProbe, StaticProbe};
pub use strategy::FieldStrategy;
pub use tegaki_gpu::GpuCapabilities;
