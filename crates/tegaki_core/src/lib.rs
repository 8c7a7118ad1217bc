//! Tegaki Core
//!
//! CPU side of the stroke-to-pixel pipeline:
//!
//! - **Transform chain**: screen → canvas → world → layer-local mapping over an
//!   arena of transform nodes
//! - **Stroke recording**: sampled points with gap interpolation and pressure
//!   smoothing
//! - **Polygon construction**: variable-width closed outlines for finished
//!   strokes
//! - **Field model**: render tiers and the Jump Flooding schedule shared by
//!   the GPU and software distance-field generators
//!
//! # Example
//!
//! ```rust
//! use tegaki_core::{BrushSettings, LayerId, PolygonBuilder, StrokePoint, StrokeRecorder};
//! use tegaki_core::config::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! let mut recorder = StrokeRecorder::new(config.recorder.clone());
//! recorder
//!     .start_stroke(StrokePoint::new(10.0, 10.0, 1.0), BrushSettings::default(), LayerId::default())
//!     .unwrap();
//! recorder.add_point(StrokePoint::new(20.0, 10.0, 1.0)).unwrap();
//! let stroke = recorder.end_stroke().unwrap();
//!
//! let polygon = PolygonBuilder::new(config.polygon).build_stroke(&stroke);
//! assert!(polygon.outline_bounds.width() > 10.0);
//! ```

pub mod cancel;
pub mod color;
pub mod config;
pub mod error;
pub mod events;
pub mod field;
pub mod geometry;
pub mod polygon;
pub mod recorder;
pub mod stroke;
pub mod transform;

pub use cancel::CancelToken;
pub use color::Color;
pub use config::PipelineConfig;
pub use error::{ConfigError, Result, StrokeError, TransformError, TransformStage};
pub use events::{DropReason, StrokeEvent, StrokeEventDispatcher, StrokeEventKind};
pub use field::{ChannelFormat, FieldRequest, FieldStage, RenderTier};
pub use geometry::{Affine2D, PixelRect, Point, Rect, Size, Vec2};
pub use polygon::{CapStyle, PolygonBuilder, StrokePolygon};
pub use recorder::{PressureFilter, StrokeRecorder};
pub use stroke::{BrushSettings, LayerId, Stroke, StrokePoint, Tool};
pub use transform::{BoundsSource, CanvasRect, NodeId, TransformChain, TransformNode, Viewport};
