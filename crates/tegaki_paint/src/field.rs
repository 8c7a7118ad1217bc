//! Encoded distance fields and the software Jump Flooding generator
//!
//! The software generator runs the same stages as the GPU compute path
//! (seed init, halving-step propagation, encode) on the CPU. It is the
//! headless field strategy and the reference the GPU output is checked
//! against.
//!
//! Each texel tracks two seeds: the nearest covered texel and the nearest
//! uncovered one. Covered texels measure their distance to the outside set,
//! uncovered texels to the inside set, which gives a signed distance without
//! an explicit edge pass.

use tegaki_core::field::{coverage_from_distance, median3, signed_distance, NO_SEED};
use tegaki_core::{CancelToken, ChannelFormat, FieldRequest, FieldStage, PixelRect, Point, StrokePolygon};

use crate::coverage::CoverageMap;
use crate::error::{PaintError, Result};

/// A distance field read back into memory
///
/// Texels store normalized signed distances (pixels / `scale`), negative
/// inside the shape. Multi-channel fields carry three offset copies in
/// r, g, b and decode through the median; `a` is 1 for covered texels.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceField {
    region: PixelRect,
    format: ChannelFormat,
    scale: f32,
    texels: Vec<[f32; 4]>,
}

impl DistanceField {
    /// Wrap encoded texels. Returns `None` if the texel count does not match
    /// the region.
    pub fn from_texels(
        region: PixelRect,
        format: ChannelFormat,
        scale: f32,
        texels: Vec<[f32; 4]>,
    ) -> Option<Self> {
        (texels.len() == region.area()).then_some(Self {
            region,
            format,
            scale,
            texels,
        })
    }

    pub fn region(&self) -> PixelRect {
        self.region
    }

    pub fn format(&self) -> ChannelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.region.width
    }

    pub fn height(&self) -> u32 {
        self.region.height
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    /// Raw texel at layer pixel (x, y)
    pub fn texel(&self, x: i32, y: i32) -> Option<[f32; 4]> {
        let r = self.region;
        if x < r.x || y < r.y || x >= r.max_x() || y >= r.max_y() {
            return None;
        }
        Some(self.texels[(y - r.y) as usize * r.width as usize + (x - r.x) as usize])
    }

    /// Decoded signed distance in pixels at layer pixel (x, y)
    pub fn distance_at(&self, x: i32, y: i32) -> Option<f32> {
        let t = self.texel(x, y)?;
        let normalized = match self.format {
            ChannelFormat::Single => t[0],
            ChannelFormat::Multi => median3(t[0], t[1], t[2]),
        };
        Some(normalized * self.scale)
    }

    /// Anti-aliased coverage with a smoothstep band of `aa_width` pixels
    pub fn to_coverage(&self, aa_width: f32) -> CoverageMap {
        let r = self.region;
        let mut coverage = CoverageMap::new(r);
        for y in r.y..r.max_y() {
            for x in r.x..r.max_x() {
                if let Some(d) = self.distance_at(x, y) {
                    coverage.set(x, y, coverage_from_distance(d, aa_width));
                }
            }
        }
        coverage
    }
}

/// Per-texel seed record: nearest inside seed in xy, nearest outside seed in zw
type SeedTexel = [f32; 4];

fn seed_distance_sq(x: f32, y: f32, sx: f32, sy: f32) -> f32 {
    if sx < 0.0 {
        return f32::INFINITY;
    }
    let (dx, dy) = (sx - x, sy - y);
    dx * dx + dy * dy
}

/// CPU Jump Flooding
#[derive(Debug)]
pub struct SoftwareFieldGenerator {
    stage: FieldStage,
}

impl Default for SoftwareFieldGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareFieldGenerator {
    pub fn new() -> Self {
        Self {
            stage: FieldStage::Idle,
        }
    }

    /// Stage reached by the last invocation
    pub fn stage(&self) -> FieldStage {
        self.stage
    }

    fn enter(&mut self, stage: FieldStage) {
        tracing::trace!(?stage, "software field stage");
        self.stage = stage;
    }

    /// Generate a field for `polygon` over `request.region`
    pub fn generate(
        &mut self,
        polygon: &StrokePolygon,
        request: &FieldRequest,
        cancel: &CancelToken,
    ) -> Result<DistanceField> {
        let region = request.region;
        if region.is_empty() {
            return Err(PaintError::OutsideLayer);
        }
        let (w, h) = (region.width as usize, region.height as usize);

        self.enter(FieldStage::SeedInit);
        let mut covered = vec![false; w * h];
        let mut seeds: Vec<SeedTexel> = vec![[NO_SEED; 4]; w * h];
        for y in 0..h {
            for x in 0..w {
                let center = Point::new(
                    (region.x + x as i32) as f32 + 0.5,
                    (region.y + y as i32) as f32 + 0.5,
                );
                let i = y * w + x;
                if polygon.contains(center) {
                    covered[i] = true;
                    seeds[i][0] = x as f32;
                    seeds[i][1] = y as f32;
                } else {
                    seeds[i][2] = x as f32;
                    seeds[i][3] = y as f32;
                }
            }
        }

        let mut scratch = seeds.clone();
        for (iteration, step) in request.steps().into_iter().enumerate() {
            if cancel.is_cancelled() {
                self.enter(FieldStage::Idle);
                return Err(PaintError::Cancelled);
            }
            self.enter(FieldStage::Propagate {
                iteration: iteration as u32,
                step,
            });
            propagate(&seeds, &mut scratch, w, h, step as i32);
            std::mem::swap(&mut seeds, &mut scratch);
        }

        if cancel.is_cancelled() {
            self.enter(FieldStage::Idle);
            return Err(PaintError::Cancelled);
        }
        self.enter(FieldStage::Encode);
        let scale = request.scale();
        let offsets = request.channel_offsets();
        let texels = seeds
            .iter()
            .zip(&covered)
            .enumerate()
            .map(|(i, (seed, &inside))| {
                let (x, y) = ((i % w) as f32, (i / w) as f32);
                let d_in = seed_distance_sq(x, y, seed[0], seed[1]).sqrt();
                let d_out = seed_distance_sq(x, y, seed[2], seed[3]).sqrt();
                let sd = signed_distance(inside, d_in, d_out).clamp(-scale, scale);
                [
                    (sd + offsets[0]) / scale,
                    (sd + offsets[1]) / scale,
                    (sd + offsets[2]) / scale,
                    if inside { 1.0 } else { 0.0 },
                ]
            })
            .collect();

        self.enter(FieldStage::Done);
        tracing::debug!(
            width = region.width,
            height = region.height,
            format = ?request.format,
            "software field generated"
        );
        DistanceField::from_texels(region, request.format, scale, texels).ok_or(PaintError::OutsideLayer)
    }
}

/// One Jump Flooding round: every texel looks at its 8 neighbours `step`
/// texels away and keeps the nearest inside and outside seeds
fn propagate(src: &[SeedTexel], dst: &mut [SeedTexel], w: usize, h: usize, step: i32) {
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            let (fx, fy) = (x as f32, y as f32);
            let mut best = src[y as usize * w + x as usize];
            let mut best_in = seed_distance_sq(fx, fy, best[0], best[1]);
            let mut best_out = seed_distance_sq(fx, fy, best[2], best[3]);
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let (nx, ny) = (x + dx * step, y + dy * step);
                    if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                        continue;
                    }
                    let candidate = src[ny as usize * w + nx as usize];
                    let d_in = seed_distance_sq(fx, fy, candidate[0], candidate[1]);
                    if d_in < best_in {
                        best_in = d_in;
                        best[0] = candidate[0];
                        best[1] = candidate[1];
                    }
                    let d_out = seed_distance_sq(fx, fy, candidate[2], candidate[3]);
                    if d_out < best_out {
                        best_out = d_out;
                        best[2] = candidate[2];
                        best[3] = candidate[3];
                    }
                }
            }
            dst[y as usize * w + x as usize] = best;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tegaki_core::{PolygonBuilder, StrokePoint, Tool};

    fn request(region: PixelRect, format: ChannelFormat) -> FieldRequest {
        FieldRequest {
            region,
            format,
            refinement_pass: false,
            msdf_spread: 0.35,
        }
    }

    #[test]
    fn test_square_field_signs() {
        let polygon = PolygonBuilder::default()
            .build(
                &[StrokePoint::new(8.0, 16.0, 1.0), StrokePoint::new(24.0, 16.0, 1.0)],
                16.0,
                Tool::Eraser,
            )
            .unwrap();
        // Square caps: covered area is x in [0, 32], y in [8, 24]
        let region = PixelRect::new(-8, -8, 48, 48);
        let mut generator = SoftwareFieldGenerator::new();
        let field = generator
            .generate(&polygon, &request(region, ChannelFormat::Single), &CancelToken::new())
            .unwrap();
        assert_eq!(generator.stage(), FieldStage::Done);

        // Center pixel (16, 16): 8 px from the top/bottom edges
        let d = field.distance_at(16, 16).unwrap();
        assert!((d + 8.0).abs() <= 0.75, "{d}");
        // 10 px above the top edge
        let d = field.distance_at(16, -3).unwrap();
        assert!((d - 10.5).abs() <= 0.75, "{d}");

        let coverage = field.to_coverage(0.75);
        assert!(coverage.get(16, 16) > 0.99);
        assert!(coverage.get(16, 0) < 0.01);
    }

    #[test]
    fn test_multi_channel_decodes_to_single() {
        let polygon = PolygonBuilder::default()
            .build(&[StrokePoint::new(10.0, 10.0, 1.0)], 12.0, Tool::Pen)
            .unwrap();
        let region = PixelRect::new(0, 0, 24, 24);
        let mut generator = SoftwareFieldGenerator::new();
        let single = generator
            .generate(&polygon, &request(region, ChannelFormat::Single), &CancelToken::new())
            .unwrap();
        let multi = generator
            .generate(&polygon, &request(region, ChannelFormat::Multi), &CancelToken::new())
            .unwrap();
        for (x, y) in [(10, 10), (2, 2), (15, 10), (20, 20)] {
            let a = single.distance_at(x, y).unwrap();
            let b = multi.distance_at(x, y).unwrap();
            assert!((a - b).abs() < 1e-4, "({x}, {y}): {a} vs {b}");
        }
        let t = multi.texel(2, 2).unwrap();
        assert!(t[0] < t[1] && t[1] < t[2]);
    }

    #[test]
    fn test_cancelled_before_propagation() {
        let polygon = PolygonBuilder::default()
            .build(&[StrokePoint::new(4.0, 4.0, 1.0)], 4.0, Tool::Pen)
            .unwrap();
        let token = CancelToken::new();
        token.cancel();
        let mut generator = SoftwareFieldGenerator::new();
        let result = generator.generate(
            &polygon,
            &request(PixelRect::new(0, 0, 8, 8), ChannelFormat::Single),
            &token,
        );
        assert_eq!(result, Err(PaintError::Cancelled));
        assert_eq!(generator.stage(), FieldStage::Idle);
    }

    #[test]
    fn test_from_texels_checks_size() {
        assert!(DistanceField::from_texels(
            PixelRect::new(0, 0, 2, 2),
            ChannelFormat::Single,
            2.0,
            vec![[0.0; 4]; 3]
        )
        .is_none());
    }
}
