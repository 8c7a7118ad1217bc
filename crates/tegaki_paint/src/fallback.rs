//! Vector fallback renderer
//!
//! Draws a stroke as overlapping circles at every sample joined by tapered
//! capsules. The same shape list serves as the live preview a host draws on
//! every pointer move and, rasterized with analytic anti-aliasing, as the
//! final stamp whenever the distance-field path is unavailable.

use serde::{Deserialize, Serialize};
use tegaki_core::config::{CompositorConfig, PolygonConfig};
use tegaki_core::field::coverage_from_distance;
use tegaki_core::{
    BrushSettings, Color, PixelRect, Point, PolygonBuilder, Rect, RenderTier, Stroke, StrokePoint,
    Tool,
};

use crate::coverage::CoverageMap;
use crate::stamp::StrokeStamp;

/// One primitive of a vector stroke
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VectorShape {
    Circle {
        center: Point,
        radius: f32,
    },
    /// Segment with a radius interpolated linearly from `from` to `to`
    Capsule {
        from: Point,
        to: Point,
        from_radius: f32,
        to_radius: f32,
    },
}

impl VectorShape {
    /// Approximate signed distance from `p` to the shape edge
    pub fn signed_distance(&self, p: Point) -> f32 {
        match *self {
            VectorShape::Circle { center, radius } => p.distance(center) - radius,
            VectorShape::Capsule {
                from,
                to,
                from_radius,
                to_radius,
            } => {
                let ab = to - from;
                let len_sq = ab.dot(ab);
                let t = if len_sq > f32::EPSILON {
                    ((p - from).dot(ab) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let closest = from + ab.scaled(t);
                p.distance(closest) - (from_radius + (to_radius - from_radius) * t)
            }
        }
    }

    pub fn bounds(&self) -> Rect {
        match *self {
            VectorShape::Circle { center, radius } => {
                Rect::new(center.x, center.y, 0.0, 0.0).outset(radius)
            }
            VectorShape::Capsule {
                from,
                to,
                from_radius,
                to_radius,
            } => {
                let a = Rect::new(from.x, from.y, 0.0, 0.0).outset(from_radius);
                let b = Rect::new(to.x, to.y, 0.0, 0.0).outset(to_radius);
                a.union(&b)
            }
        }
    }
}

/// Transient drawable for a stroke in progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorPreview {
    pub shapes: Vec<VectorShape>,
    pub color: Color,
    pub opacity: f32,
    pub tool: Tool,
    /// Union of the shape bounds (layer space)
    pub bounds: Rect,
}

impl VectorPreview {
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

/// CPU renderer for the vector tier
#[derive(Clone, Debug)]
pub struct FallbackRenderer {
    widths: PolygonBuilder,
    antialias_width: f32,
}

impl Default for FallbackRenderer {
    fn default() -> Self {
        Self::new(&PolygonConfig::default(), &CompositorConfig::default())
    }
}

impl FallbackRenderer {
    pub fn new(polygon: &PolygonConfig, compositor: &CompositorConfig) -> Self {
        Self {
            widths: PolygonBuilder::new(polygon.clone()),
            antialias_width: compositor.antialias_width,
        }
    }

    /// Circles and capsules for `points`; cheap enough for every pointer move
    pub fn preview(&self, points: &[StrokePoint], settings: &BrushSettings) -> VectorPreview {
        let settings = settings.sanitized();
        let radius = |p: &StrokePoint| self.widths.width_at(settings.size, p.pressure) * 0.5;

        let mut shapes = Vec::with_capacity(points.len() * 2);
        for (i, p) in points.iter().enumerate() {
            shapes.push(VectorShape::Circle {
                center: p.position(),
                radius: radius(p),
            });
            if let Some(next) = points.get(i + 1) {
                shapes.push(VectorShape::Capsule {
                    from: p.position(),
                    to: next.position(),
                    from_radius: radius(p),
                    to_radius: radius(next),
                });
            }
        }

        let bounds = shapes
            .iter()
            .map(VectorShape::bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or(Rect::ZERO);

        VectorPreview {
            shapes,
            color: settings.color,
            opacity: settings.opacity,
            tool: settings.mode,
            bounds,
        }
    }

    /// Anti-aliased coverage of a preview, optionally clipped to `clip`.
    /// `None` when nothing lands inside the clip.
    pub fn rasterize(&self, preview: &VectorPreview, clip: Option<PixelRect>) -> Option<CoverageMap> {
        if preview.is_empty() {
            return None;
        }
        let aa = self.antialias_width;
        let mut region = PixelRect::enclosing(&preview.bounds.outset(aa + 1.0));
        if let Some(clip) = clip {
            region = region.intersect(&clip)?;
        }

        let width = region.width as usize;
        let mut distance = vec![f32::INFINITY; region.area()];
        for shape in &preview.shapes {
            let Some(area) = PixelRect::enclosing(&shape.bounds().outset(aa + 1.0)).intersect(&region)
            else {
                continue;
            };
            for y in area.y..area.max_y() {
                let row = (y - region.y) as usize * width;
                for x in area.x..area.max_x() {
                    let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                    let slot = &mut distance[row + (x - region.x) as usize];
                    *slot = slot.min(shape.signed_distance(center));
                }
            }
        }

        let mut coverage = CoverageMap::new(region);
        for y in region.y..region.max_y() {
            let row = (y - region.y) as usize * width;
            for x in region.x..region.max_x() {
                let d = distance[row + (x - region.x) as usize];
                if d.is_finite() {
                    coverage.set(x, y, coverage_from_distance(d, aa));
                }
            }
        }
        Some(coverage)
    }

    /// Final stamp for a finished stroke on the vector tier
    pub fn render(&self, stroke: &Stroke, clip: Option<PixelRect>) -> Option<StrokeStamp> {
        let settings = stroke.settings();
        let preview = self.preview(stroke.points(), &settings);
        let coverage = self.rasterize(&preview, clip)?;
        tracing::debug!(
            shapes = preview.shapes.len(),
            region = ?coverage.region(),
            "vector stamp rasterized"
        );
        Some(StrokeStamp::new(coverage, &settings, RenderTier::Vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tegaki_core::LayerId;

    #[test]
    fn test_preview_shapes() {
        let renderer = FallbackRenderer::default();
        let points = [
            StrokePoint::new(0.0, 0.0, 1.0),
            StrokePoint::new(10.0, 0.0, 0.5),
            StrokePoint::new(20.0, 0.0, 1.0),
        ];
        let preview = renderer.preview(&points, &BrushSettings::pen(8.0, Color::BLACK));
        assert_eq!(preview.shapes.len(), 5);
        assert!(matches!(
            preview.shapes[1],
            VectorShape::Capsule {
                from_radius,
                to_radius,
                ..
            } if from_radius == 4.0 && to_radius == 2.0
        ));
        assert_eq!(preview.bounds, Rect::new(-4.0, -4.0, 28.0, 8.0));
    }

    #[test]
    fn test_single_dot_is_filled_circle() {
        let renderer = FallbackRenderer::default();
        let stroke = Stroke::new(
            vec![StrokePoint::new(10.0, 10.0, 1.0)],
            BrushSettings::pen(6.0, Color::BLACK),
            LayerId::default(),
        )
        .unwrap();
        let stamp = renderer.render(&stroke, None).unwrap();
        assert_eq!(stamp.tier, RenderTier::Vector);
        assert!(stamp.coverage.get(10, 10) > 0.99);
        assert!(stamp.coverage.get(11, 11) > 0.99);
        assert!(stamp.coverage.get(15, 10) < 0.01);
        // Roughly pi * r^2
        let area = stamp.coverage.total();
        assert!((area - std::f32::consts::PI * 9.0).abs() < 2.0, "{area}");
    }

    #[test]
    fn test_clip_limits_region() {
        let renderer = FallbackRenderer::default();
        let points = [StrokePoint::new(0.0, 0.0, 1.0), StrokePoint::new(40.0, 0.0, 1.0)];
        let preview = renderer.preview(&points, &BrushSettings::default());
        let clip = PixelRect::new(0, -10, 20, 20);
        let coverage = renderer.rasterize(&preview, Some(clip)).unwrap();
        assert_eq!(coverage.region().max_x(), 20);
        assert!(renderer
            .rasterize(&preview, Some(PixelRect::new(100, 100, 4, 4)))
            .is_none());
    }
}
