//! Committed stroke drawables

use serde::{Deserialize, Serialize};
use tegaki_core::{BrushSettings, Color, PixelRect, RenderTier, Tool};

use crate::coverage::CoverageMap;

/// The final, anti-aliased mark a stroke leaves on a layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokeStamp {
    pub coverage: CoverageMap,
    pub color: Color,
    pub opacity: f32,
    pub tool: Tool,
    /// Tier that produced the coverage
    pub tier: RenderTier,
}

impl StrokeStamp {
    pub fn new(coverage: CoverageMap, settings: &BrushSettings, tier: RenderTier) -> Self {
        Self {
            coverage,
            color: settings.color,
            opacity: settings.opacity,
            tool: settings.mode,
            tier,
        }
    }

    pub fn region(&self) -> PixelRect {
        self.coverage.region()
    }

    /// Coverage times opacity at layer pixel (x, y)
    pub fn alpha_at(&self, x: i32, y: i32) -> f32 {
        self.coverage.get(x, y) * self.opacity
    }

    pub fn is_eraser(&self) -> bool {
        self.tool == Tool::Eraser
    }
}
