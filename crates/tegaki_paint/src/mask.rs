//! Layer alpha masks
//!
//! A mask starts fully visible (1.0) and is multiplied into the layer's
//! color at composite time. Pen strokes add to it, eraser strokes subtract,
//! and every value stays clamped to [0, 1].

use serde::{Deserialize, Serialize};
use tegaki_core::{PixelRect, Point, StrokePolygon, Tool};

use crate::coverage::CoverageMap;

/// Direction of a mask update
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskMode {
    Add,
    Subtract,
}

impl MaskMode {
    pub fn for_tool(tool: Tool) -> Self {
        match tool {
            Tool::Pen => MaskMode::Add,
            Tool::Eraser => MaskMode::Subtract,
        }
    }

    fn sign(self) -> f32 {
        match self {
            MaskMode::Add => 1.0,
            MaskMode::Subtract => -1.0,
        }
    }
}

/// Saved copy of a mask region, used to undo an update exactly
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskPatch {
    region: PixelRect,
    values: Vec<f32>,
}

impl MaskPatch {
    pub fn region(&self) -> PixelRect {
        self.region
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerMask {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl LayerMask {
    /// Fully visible mask
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![1.0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, x: i32, y: i32) -> Option<f32> {
        self.index(x, y).map(|i| self.values[i])
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Recreate at a new size. Previous contents, including erased areas,
    /// are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        tracing::warn!(
            "layer mask resized {}x{} -> {}x{}; erase history cleared",
            self.width,
            self.height,
            width,
            height
        );
        *self = LayerMask::new(width, height);
    }

    /// Step every pixel whose center lies inside `polygon` by a full unit.
    /// Returns the touched region, if any.
    pub fn add_polygon(&mut self, polygon: &StrokePolygon, mode: MaskMode) -> Option<PixelRect> {
        let region = PixelRect::enclosing(&polygon.outline_bounds).intersect(&self.bounds())?;
        let delta = mode.sign();
        for y in region.y..region.max_y() {
            for x in region.x..region.max_x() {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                if polygon.contains(center) {
                    if let Some(i) = self.index(x, y) {
                        self.values[i] = (self.values[i] + delta).clamp(0.0, 1.0);
                    }
                }
            }
        }
        Some(region)
    }

    /// Anti-aliased update: step each pixel by `coverage * strength`.
    /// Returns the touched region, if any.
    pub fn apply_coverage(
        &mut self,
        coverage: &CoverageMap,
        strength: f32,
        mode: MaskMode,
    ) -> Option<PixelRect> {
        let region = coverage.region().intersect(&self.bounds())?;
        let delta = mode.sign() * strength.clamp(0.0, 1.0);
        for y in region.y..region.max_y() {
            for x in region.x..region.max_x() {
                let c = coverage.get(x, y);
                if c <= 0.0 {
                    continue;
                }
                if let Some(i) = self.index(x, y) {
                    self.values[i] = (self.values[i] + delta * c).clamp(0.0, 1.0);
                }
            }
        }
        Some(region)
    }

    /// Copy of `region` (clipped to the mask)
    pub fn snapshot(&self, region: PixelRect) -> Option<MaskPatch> {
        let region = region.intersect(&self.bounds())?;
        let mut values = Vec::with_capacity(region.area());
        for y in region.y..region.max_y() {
            let start = y as usize * self.width as usize + region.x as usize;
            values.extend_from_slice(&self.values[start..start + region.width as usize]);
        }
        Some(MaskPatch { region, values })
    }

    /// Write a patch back. Returns false if it no longer fits (mask resized).
    pub fn restore(&mut self, patch: &MaskPatch) -> bool {
        let r = patch.region;
        if r.max_x() > self.width as i32 || r.max_y() > self.height as i32 {
            return false;
        }
        for (row, y) in (r.y..r.max_y()).enumerate() {
            let start = y as usize * self.width as usize + r.x as usize;
            let src = &patch.values[row * r.width as usize..(row + 1) * r.width as usize];
            self.values[start..start + r.width as usize].copy_from_slice(src);
        }
        true
    }
}
