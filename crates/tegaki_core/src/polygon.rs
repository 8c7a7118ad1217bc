//! Stroke outline construction
//!
//! Turns a sampled centerline with per-point width into one closed outline:
//! left offsets forward, end cap, right offsets backward, start cap.
//!
//! Joins bevel on the outer side of a turn and route through the centerline
//! point on the inner side. The inner route makes the outline cross itself at
//! sharp turns, which is harmless because the outline is always filled with
//! the nonzero winding rule.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::PolygonConfig;
use crate::geometry::{Point, Rect, Vec2};
use crate::stroke::{Stroke, StrokePoint, Tool};

/// Consecutive points closer than this are treated as one
const COINCIDENT_EPSILON: f32 = 1e-3;

/// End cap shape
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapStyle {
    Round,
    Square,
}

impl CapStyle {
    pub fn for_tool(tool: Tool) -> Self {
        match tool {
            Tool::Pen => CapStyle::Round,
            Tool::Eraser => CapStyle::Square,
        }
    }
}

/// Closed outline of a stroke
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokePolygon {
    pub vertices: Vec<Point>,
    /// Index pairs into `vertices`; one closed loop
    pub edges: Vec<[u32; 2]>,
    /// Outline bounds expanded by the configured padding; sizes the field texture
    pub bounds: Rect,
    /// Tight bounds of the outline vertices
    pub outline_bounds: Rect,
}

impl StrokePolygon {
    fn from_loop(vertices: Vec<Point>, padding: f32) -> Self {
        let n = vertices.len() as u32;
        let edges = (0..n).map(|i| [i, (i + 1) % n]).collect();
        let outline_bounds = Rect::bounding(vertices.iter().copied()).unwrap_or(Rect::ZERO);
        Self {
            vertices,
            edges,
            bounds: outline_bounds.outset(padding),
            outline_bounds,
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Edge segments as point pairs
    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.edges
            .iter()
            .map(|[a, b]| (self.vertices[*a as usize], self.vertices[*b as usize]))
    }

    /// Winding number of the outline around `p`
    pub fn winding_number(&self, p: Point) -> i32 {
        let mut winding = 0;
        for (a, b) in self.segments() {
            let side = (b - a).cross(p - a);
            if a.y <= p.y {
                if b.y > p.y && side > 0.0 {
                    winding += 1;
                }
            } else if b.y <= p.y && side < 0.0 {
                winding -= 1;
            }
        }
        winding
    }

    /// Point-in-polygon by ray casting, nonzero winding rule
    pub fn contains(&self, p: Point) -> bool {
        self.outline_bounds.contains(p) && self.winding_number(p) != 0
    }

    /// Euclidean distance from `p` to the nearest outline edge
    pub fn distance_to_outline(&self, p: Point) -> f32 {
        self.segments()
            .map(|(a, b)| segment_distance(p, a, b))
            .fold(f32::INFINITY, f32::min)
    }

    /// Distance to the outline, negative inside.
    ///
    /// Edges routed through the interior by inner joins are counted too, so
    /// this is exact only for outlines without inner joins.
    pub fn signed_distance(&self, p: Point) -> f32 {
        let d = self.distance_to_outline(p);
        if self.contains(p) {
            -d
        } else {
            d
        }
    }
}

fn segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let ab = b - a;
    let len_sq = ab.dot(ab);
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab.scaled(t))
}

/// A centerline point with its resolved half-width
#[derive(Clone, Copy, Debug)]
struct Sample {
    at: Point,
    half: f32,
}

/// Builds stroke outlines
#[derive(Clone, Debug, Default)]
pub struct PolygonBuilder {
    config: PolygonConfig,
}

impl PolygonBuilder {
    pub fn new(config: PolygonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolygonConfig {
        &self.config
    }

    /// Width at a point: `base * pressure` clamped to the configured range
    pub fn width_at(&self, base_width: f32, pressure: f32) -> f32 {
        (base_width * pressure).clamp(self.config.min_width, self.config.max_width)
    }

    /// Padding added around the outline bounds
    pub fn padding(&self, base_width: f32) -> f32 {
        (base_width * self.config.padding_ratio).max(self.config.min_padding)
    }

    /// Outline for a finished stroke
    pub fn build_stroke(&self, stroke: &Stroke) -> StrokePolygon {
        let points = stroke.points();
        if stroke.is_single_dot() {
            return self.dot(points[0], stroke.size);
        }
        // `Stroke` is never empty, so `build` always produces a polygon
        self.build(points, stroke.size, stroke.tool)
            .unwrap_or_else(|| self.dot(points[0], stroke.size))
    }

    /// Outline for a centerline. `None` only for an empty point list.
    pub fn build(&self, points: &[StrokePoint], base_width: f32, tool: Tool) -> Option<StrokePolygon> {
        let first = *points.first()?;
        if points.len() == 1 {
            return Some(self.dot(first, base_width));
        }

        let samples = self.collapse(points, base_width);
        let padding = self.padding(base_width);
        if samples.len() == 1 {
            // Distinct samples all on one spot: minimal square
            let half = (samples[0].half * 2.0).max(1.0) * 0.5;
            let c = samples[0].at;
            let quad = vec![
                Point::new(c.x - half, c.y - half),
                Point::new(c.x + half, c.y - half),
                Point::new(c.x + half, c.y + half),
                Point::new(c.x - half, c.y + half),
            ];
            tracing::debug!("degenerate stroke, emitting square");
            return Some(StrokePolygon::from_loop(quad, padding));
        }

        let cap = CapStyle::for_tool(tool);
        let dirs: Vec<Vec2> = samples
            .windows(2)
            .map(|w| (w[1].at - w[0].at).normalize())
            .collect();

        let mut left: Vec<Point> = Vec::with_capacity(samples.len() * 2);
        let mut right: Vec<Point> = Vec::with_capacity(samples.len() * 2);

        let start = samples[0];
        left.push(start.at + dirs[0].perp().scaled(start.half));
        right.push(start.at + (-dirs[0].perp()).scaled(start.half));

        for i in 1..samples.len() - 1 {
            let s = samples[i];
            let (before, after) = (dirs[i - 1], dirs[i]);
            left.extend(self.join(s, before.perp(), after.perp(), before, after, true));
            right.extend(self.join(s, -before.perp(), -after.perp(), before, after, false));
        }

        let end = samples[samples.len() - 1];
        let end_dir = dirs[dirs.len() - 1];
        left.push(end.at + end_dir.perp().scaled(end.half));
        right.push(end.at + (-end_dir.perp()).scaled(end.half));

        let mut outline = left;
        self.cap(&mut outline, end, end_dir, cap);
        outline.extend(right.into_iter().rev());
        self.cap(&mut outline, start, -dirs[0], cap);

        Some(StrokePolygon::from_loop(outline, padding))
    }

    /// Filled circle of the pressure-scaled width
    pub fn dot(&self, point: StrokePoint, base_width: f32) -> StrokePolygon {
        let radius = self.width_at(base_width, point.pressure) * 0.5;
        let segments = self.config.cap_segments.max(2) * 4;
        let c = point.position();
        let vertices = (0..segments)
            .map(|k| {
                let angle = 2.0 * PI * k as f32 / segments as f32;
                Point::new(c.x + radius * angle.cos(), c.y + radius * angle.sin())
            })
            .collect();
        StrokePolygon::from_loop(vertices, self.padding(base_width))
    }

    /// Merge runs of coincident points, keeping the widest
    fn collapse(&self, points: &[StrokePoint], base_width: f32) -> Vec<Sample> {
        let mut samples: Vec<Sample> = Vec::with_capacity(points.len());
        for p in points {
            let sample = Sample {
                at: p.position(),
                half: self.width_at(base_width, p.pressure) * 0.5,
            };
            match samples.last_mut() {
                Some(last) if last.at.distance(sample.at) < COINCIDENT_EPSILON => {
                    last.half = last.half.max(sample.half);
                }
                _ => samples.push(sample),
            }
        }
        samples
    }

    /// Offset vertices for one side of an interior join.
    /// `left` says whether `n_before`/`n_after` point to the left of travel.
    fn join(
        &self,
        s: Sample,
        n_before: Vec2,
        n_after: Vec2,
        d_before: Vec2,
        d_after: Vec2,
        left: bool,
    ) -> SmallVec<[Point; 3]> {
        let mut out = SmallVec::new();
        let cos_turn = d_before.dot(d_after).clamp(-1.0, 1.0);
        let turn_deg = cos_turn.acos().to_degrees();

        if turn_deg < self.config.join_merge_angle_deg {
            // Near-straight: one mitered vertex
            let mid = (n_before + n_after).normalize();
            let miter = s.half / mid.dot(n_before).max(0.5);
            out.push(s.at + mid.scaled(miter));
            return out;
        }

        // Turning towards a side's normal makes that side the inner one
        let turns_left = d_before.cross(d_after) > 0.0;
        let inner = turns_left == left;

        out.push(s.at + n_before.scaled(s.half));
        if inner {
            out.push(s.at);
        }
        out.push(s.at + n_after.scaled(s.half));
        out
    }

    /// Append the cap around `s`, travelling from the left offset to the
    /// right offset on the `dir` side
    fn cap(&self, outline: &mut Vec<Point>, s: Sample, dir: Vec2, style: CapStyle) {
        let n = dir.perp();
        match style {
            CapStyle::Round => {
                let segments = self.config.cap_segments.max(2);
                for k in 1..segments {
                    let theta = PI * k as f32 / segments as f32;
                    let v = n.scaled(theta.cos()) + dir.scaled(theta.sin());
                    outline.push(s.at + v.scaled(s.half));
                }
            }
            CapStyle::Square => {
                outline.push(s.at + (n + dir).scaled(s.half));
                outline.push(s.at + (dir + -n).scaled(s.half));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[(f32, f32)], pressure: f32) -> Vec<StrokePoint> {
        points
            .iter()
            .map(|&(x, y)| StrokePoint::new(x, y, pressure))
            .collect()
    }

    fn approx(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() <= eps
    }

    #[test]
    fn test_horizontal_stroke_bounds() {
        let builder = PolygonBuilder::default();
        let poly = builder
            .build(&line(&[(10.0, 10.0), (20.0, 10.0)], 1.0), 4.0, Tool::Pen)
            .unwrap();
        let b = poly.outline_bounds;
        assert!(approx(b.x(), 8.0, 1e-3), "{b:?}");
        assert!(approx(b.max_x(), 22.0, 1e-3), "{b:?}");
        assert!(approx(b.y(), 8.0, 1e-3), "{b:?}");
        assert!(approx(b.max_y(), 12.0, 1e-3), "{b:?}");
        assert!(poly.bounds.width() > b.width());
        assert_eq!(poly.edges.len(), poly.vertices.len());
    }

    #[test]
    fn test_uniform_width_on_straight_interior() {
        let builder = PolygonBuilder::default();
        let pts: Vec<(f32, f32)> = (0..=10).map(|i| (i as f32 * 3.0, 5.0)).collect();
        let poly = builder.build(&line(&pts, 0.5), 8.0, Tool::Pen).unwrap();
        // Interior vertices (x strictly between the end centers) sit at half-width 2
        for v in poly.vertices.iter().filter(|v| v.x > 0.5 && v.x < 29.5) {
            assert!(approx((v.y - 5.0).abs(), 2.0, 1e-4), "{v:?}");
        }
    }

    #[test]
    fn test_single_point_is_circle() {
        let builder = PolygonBuilder::default();
        let poly = builder
            .build(&[StrokePoint::new(5.0, 5.0, 1.0)], 6.0, Tool::Pen)
            .unwrap();
        for v in &poly.vertices {
            assert!(approx(v.distance(Point::new(5.0, 5.0)), 3.0, 1e-4));
        }
        assert!(poly.contains(Point::new(5.0, 5.0)));
        assert!(!poly.contains(Point::new(8.5, 5.0)));
    }

    #[test]
    fn test_coincident_points_yield_quad() {
        let builder = PolygonBuilder::default();
        let poly = builder
            .build(&line(&[(3.0, 3.0), (3.0, 3.0)], 1.0), 0.5, Tool::Pen)
            .unwrap();
        assert_eq!(poly.vertices.len(), 4);
        assert!(approx(poly.outline_bounds.width(), 1.0, 1e-5));
        assert!(poly.contains(Point::new(3.0, 3.0)));
    }

    #[test]
    fn test_empty_input() {
        assert!(PolygonBuilder::default().build(&[], 4.0, Tool::Pen).is_none());
    }

    #[test]
    fn test_width_clamped() {
        let builder = PolygonBuilder::default();
        assert_eq!(builder.width_at(4.0, 0.0), 0.5);
        assert_eq!(builder.width_at(4.0, 0.5), 2.0);
        assert_eq!(builder.width_at(10_000.0, 1.0), 512.0);
    }

    #[test]
    fn test_sharp_turn_fill() {
        let builder = PolygonBuilder::default();
        // Hairpin: out and back along nearly the same line
        let pts = line(&[(0.0, 0.0), (20.0, 0.0), (0.0, 2.0)], 1.0);
        let poly = builder.build(&pts, 4.0, Tool::Pen).unwrap();
        assert!(poly.contains(Point::new(10.0, 0.0)));
        assert!(poly.contains(Point::new(19.0, 0.5)));
        assert!(poly.contains(Point::new(10.0, 1.0)));
        assert!(!poly.contains(Point::new(10.0, 8.0)));
        assert!(!poly.contains(Point::new(30.0, 0.0)));

        // Right angle
        let pts = line(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)], 1.0);
        let poly = builder.build(&pts, 4.0, Tool::Pen).unwrap();
        // Outer bevel covers the corner up to the diagonal
        assert!(poly.contains(Point::new(10.8, -0.8)));
        assert!(!poly.contains(Point::new(11.8, -1.8)));
        assert!(poly.contains(Point::new(9.0, 1.0)));
        assert!(!poly.contains(Point::new(5.0, 5.0)));
    }

    #[test]
    fn test_eraser_square_caps() {
        let builder = PolygonBuilder::default();
        let poly = builder
            .build(&line(&[(10.0, 10.0), (20.0, 10.0)], 1.0), 4.0, Tool::Eraser)
            .unwrap();
        assert!(poly.contains(Point::new(21.8, 11.8)));
        assert!(approx(poly.outline_bounds.max_x(), 22.0, 1e-4));
    }

    #[test]
    fn test_signed_distance() {
        let builder = PolygonBuilder::default();
        let poly = builder
            .build(&line(&[(0.0, 0.0), (40.0, 0.0)], 1.0), 10.0, Tool::Eraser)
            .unwrap();
        assert!(approx(poly.signed_distance(Point::new(20.0, 0.0)), -5.0, 1e-4));
        assert!(approx(poly.signed_distance(Point::new(20.0, 8.0)), 3.0, 1e-4));
    }
}
