//! Stroke data model

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::color::Color;
use crate::geometry::{Point, Rect};

new_key_type! {
    /// Opaque handle to the layer a stroke belongs to
    pub struct LayerId;
}

/// Drawing tool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
}

/// Brush settings supplied by the host for each stroke
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushSettings {
    /// Base width in layer pixels
    pub size: f32,
    pub color: Color,
    /// Stroke opacity in [0, 1]
    pub opacity: f32,
    pub mode: Tool,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            size: 4.0,
            color: Color::INK,
            opacity: 1.0,
            mode: Tool::Pen,
        }
    }
}

impl BrushSettings {
    pub fn pen(size: f32, color: Color) -> Self {
        Self {
            size,
            color,
            ..Default::default()
        }
    }

    pub fn eraser(size: f32) -> Self {
        Self {
            size,
            mode: Tool::Eraser,
            ..Default::default()
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Copy with every value forced into its valid range
    pub fn sanitized(self) -> Self {
        Self {
            size: if self.size.is_finite() && self.size > 0.0 {
                self.size
            } else {
                1.0
            },
            color: self.color.clamped(),
            opacity: if self.opacity.is_nan() {
                1.0
            } else {
                self.opacity.clamp(0.0, 1.0)
            },
            mode: self.mode,
        }
    }
}

/// One sampled point of a stroke, in layer-local space
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    /// Pen pressure in [0, 1]
    pub pressure: f32,
    /// Normalized tilt in [-1, 1]
    pub tilt_x: f32,
    pub tilt_y: f32,
    /// Barrel rotation in [0, 2π)
    pub twist: f32,
    pub time_ms: u64,
}

impl StrokePoint {
    pub fn new(x: f32, y: f32, pressure: f32) -> Self {
        Self {
            x,
            y,
            pressure,
            tilt_x: 0.0,
            tilt_y: 0.0,
            twist: 0.0,
            time_ms: 0,
        }
    }

    pub fn at(mut self, time_ms: u64) -> Self {
        self.time_ms = time_ms;
        self
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Clamp pressure and tilt, wrap twist into [0, 2π)
    pub fn normalized(mut self) -> Self {
        let unit = |v: f32, lo: f32| if v.is_nan() { 0.0 } else { v.clamp(lo, 1.0) };
        self.pressure = if self.pressure.is_nan() {
            1.0
        } else {
            self.pressure.clamp(0.0, 1.0)
        };
        self.tilt_x = unit(self.tilt_x, -1.0);
        self.tilt_y = unit(self.tilt_y, -1.0);
        self.twist = if self.twist.is_finite() {
            self.twist.rem_euclid(TAU)
        } else {
            0.0
        };
        self
    }

    /// Linear interpolation of every channel towards `other`
    pub fn lerp(&self, other: &StrokePoint, t: f32) -> StrokePoint {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        StrokePoint {
            x: mix(self.x, other.x),
            y: mix(self.y, other.y),
            pressure: mix(self.pressure, other.pressure),
            tilt_x: mix(self.tilt_x, other.tilt_x),
            tilt_y: mix(self.tilt_y, other.tilt_y),
            twist: self.twist,
            time_ms: self.time_ms
                + ((other.time_ms.saturating_sub(self.time_ms)) as f32 * t).round() as u64,
        }
    }
}

/// A finished stroke
///
/// `points` is never empty. Once built a stroke is not modified; it is owned
/// by whatever it gets composited into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    points: Vec<StrokePoint>,
    is_single_dot: bool,
    pub color: Color,
    pub size: f32,
    pub opacity: f32,
    pub tool: Tool,
    pub layer: LayerId,
}

impl Stroke {
    /// Build a stroke; returns `None` for an empty point list
    pub fn new(points: Vec<StrokePoint>, settings: BrushSettings, layer: LayerId) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let settings = settings.sanitized();
        Some(Self {
            is_single_dot: points.len() == 1,
            points,
            color: settings.color,
            size: settings.size,
            opacity: settings.opacity,
            tool: settings.mode,
            layer,
        })
    }

    pub fn points(&self) -> &[StrokePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a built stroke
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_single_dot(&self) -> bool {
        self.is_single_dot
    }

    pub fn settings(&self) -> BrushSettings {
        BrushSettings {
            size: self.size,
            color: self.color,
            opacity: self.opacity,
            mode: self.tool,
        }
    }

    /// Bounds of the sampled centerline (no width applied)
    pub fn centerline_bounds(&self) -> Rect {
        Rect::bounding(self.points.iter().map(StrokePoint::position)).unwrap_or(Rect::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stroke_rejected() {
        assert!(Stroke::new(Vec::new(), BrushSettings::default(), LayerId::default()).is_none());
    }

    #[test]
    fn test_single_dot_flag() {
        let stroke = Stroke::new(
            vec![StrokePoint::new(1.0, 1.0, 0.5)],
            BrushSettings::default(),
            LayerId::default(),
        )
        .unwrap();
        assert!(stroke.is_single_dot());

        let line = Stroke::new(
            vec![StrokePoint::new(1.0, 1.0, 0.5), StrokePoint::new(3.0, 1.0, 0.5)],
            BrushSettings::default(),
            LayerId::default(),
        )
        .unwrap();
        assert!(!line.is_single_dot());
        assert_eq!(line.centerline_bounds(), Rect::new(1.0, 1.0, 2.0, 0.0));
    }

    #[test]
    fn test_point_normalization() {
        let mut p = StrokePoint::new(0.0, 0.0, 1.7);
        p.tilt_x = -3.0;
        p.twist = -0.5;
        let n = p.normalized();
        assert_eq!(n.pressure, 1.0);
        assert_eq!(n.tilt_x, -1.0);
        assert!(n.twist >= 0.0 && n.twist < TAU);
        assert!((n.twist - (TAU - 0.5)).abs() < 1e-5);
    }

    #[test]
    fn test_settings_sanitized() {
        let s = BrushSettings::pen(-2.0, Color::BLACK).with_opacity(4.0).sanitized();
        assert_eq!(s.size, 1.0);
        assert_eq!(s.opacity, 1.0);
    }

    #[test]
    fn test_lerp_time() {
        let a = StrokePoint::new(0.0, 0.0, 0.0).at(100);
        let b = StrokePoint::new(10.0, 0.0, 1.0).at(120);
        let m = a.lerp(&b, 0.5);
        assert_eq!(m.position(), Point::new(5.0, 0.0));
        assert_eq!(m.pressure, 0.5);
        assert_eq!(m.time_ms, 110);
    }
}
