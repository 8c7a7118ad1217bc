//! Live stroke recording
//!
//! Accumulates samples for the stroke in progress. Fast pointer motion leaves
//! large gaps between samples, so gaps wider than the configured spacing are
//! filled with linearly interpolated points. Pressure runs through a causal
//! exponential filter to suppress device jitter.

use crate::config::RecorderConfig;
use crate::error::StrokeError;
use crate::stroke::{BrushSettings, LayerId, Stroke, StrokePoint};

/// Exponential pressure filter. Output depends only on the samples fed so far.
#[derive(Clone, Copy, Debug)]
pub struct PressureFilter {
    factor: f32,
    last: Option<f32>,
}

impl PressureFilter {
    /// `factor` is the weight given to the previous output (0 = no smoothing)
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.clamp(0.0, 1.0),
            last: None,
        }
    }

    pub fn next(&mut self, raw: f32) -> f32 {
        let value = match self.last {
            Some(prev) => prev * self.factor + raw * (1.0 - self.factor),
            None => raw,
        };
        self.last = Some(value);
        value
    }
}

struct ActiveStroke {
    points: Vec<StrokePoint>,
    settings: BrushSettings,
    layer: LayerId,
    filter: PressureFilter,
}

/// Records the samples of one stroke at a time
pub struct StrokeRecorder {
    config: RecorderConfig,
    active: Option<ActiveStroke>,
}

impl StrokeRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Points recorded so far for the stroke in progress
    pub fn points(&self) -> &[StrokePoint] {
        self.active.as_ref().map_or(&[], |a| a.points.as_slice())
    }

    /// Settings of the stroke in progress
    pub fn settings(&self) -> Option<BrushSettings> {
        self.active.as_ref().map(|a| a.settings)
    }

    pub fn layer(&self) -> Option<LayerId> {
        self.active.as_ref().map(|a| a.layer)
    }

    /// Begin a stroke at `point`
    pub fn start_stroke(
        &mut self,
        point: StrokePoint,
        settings: BrushSettings,
        layer: LayerId,
    ) -> Result<(), StrokeError> {
        if self.active.is_some() {
            return Err(StrokeError::AlreadyActive);
        }
        if !point.is_finite() {
            return Err(StrokeError::InvalidGeometry);
        }
        let mut filter = PressureFilter::new(self.config.pressure_smoothing);
        let mut point = point.normalized();
        point.pressure = filter.next(point.pressure);
        self.active = Some(ActiveStroke {
            points: vec![point],
            settings: settings.sanitized(),
            layer,
            filter,
        });
        Ok(())
    }

    /// Append a sample, returning how many points were actually added
    /// (0 when the sample was too close to the previous one).
    pub fn add_point(&mut self, point: StrokePoint) -> Result<usize, StrokeError> {
        let spacing = self.config.interpolation_spacing;
        let min_distance = self.config.min_sample_distance;
        let max_fill = self.config.max_interpolated_points;
        let active = self.active.as_mut().ok_or(StrokeError::NoActiveStroke)?;
        if !point.is_finite() {
            return Err(StrokeError::InvalidGeometry);
        }

        let Some(last) = active.points.last().copied() else {
            return Err(StrokeError::NoActiveStroke);
        };
        let distance = last.position().distance(point.position());
        if min_distance > 0.0 && distance < min_distance {
            return Ok(0);
        }

        let mut point = point.normalized();
        point.pressure = active.filter.next(point.pressure);

        let mut added = 0;
        if spacing > 0.0 && distance > spacing {
            let segments = (distance / spacing).ceil();
            if segments - 1.0 > max_fill as f32 {
                tracing::debug!(distance, "gap too wide to interpolate; recorded as a segment");
            } else {
                let segments = segments as usize;
                for k in 1..segments {
                    let t = k as f32 / segments as f32;
                    active.points.push(last.lerp(&point, t));
                    added += 1;
                }
            }
        }
        active.points.push(point);
        Ok(added + 1)
    }

    /// Finish the stroke in progress
    pub fn end_stroke(&mut self) -> Result<Stroke, StrokeError> {
        let active = self.active.take().ok_or(StrokeError::NoActiveStroke)?;
        tracing::debug!(points = active.points.len(), "stroke recorded");
        Stroke::new(active.points, active.settings, active.layer).ok_or(StrokeError::NoActiveStroke)
    }

    /// Discard the stroke in progress. Returns whether one was active.
    pub fn cancel(&mut self) -> bool {
        self.active.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(spacing: f32, smoothing: f32) -> StrokeRecorder {
        StrokeRecorder::new(RecorderConfig {
            interpolation_spacing: spacing,
            pressure_smoothing: smoothing,
            ..RecorderConfig::default()
        })
    }

    #[test]
    fn test_single_point_is_dot() {
        let mut rec = recorder(2.0, 0.0);
        rec.start_stroke(
            StrokePoint::new(5.0, 5.0, 0.8),
            BrushSettings::default(),
            LayerId::default(),
        )
        .unwrap();
        let stroke = rec.end_stroke().unwrap();
        assert!(stroke.is_single_dot());
        assert_eq!(stroke.len(), 1);
        assert!(!rec.is_active());
    }

    #[test]
    fn test_interpolation_fills_gaps() {
        let mut rec = recorder(2.0, 0.0);
        rec.start_stroke(
            StrokePoint::new(0.0, 0.0, 0.0),
            BrushSettings::default(),
            LayerId::default(),
        )
        .unwrap();
        let added = rec.add_point(StrokePoint::new(10.0, 0.0, 1.0)).unwrap();
        assert_eq!(added, 5);

        let points = rec.points();
        assert_eq!(points.len(), 6);
        for pair in points.windows(2) {
            assert!(pair[0].position().distance(pair[1].position()) <= 2.0 + 1e-4);
        }
        // Linear pressure ramp
        assert!((points[1].pressure - 0.2).abs() < 1e-5);
        assert!((points[4].pressure - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_wide_gap_is_a_plain_segment() {
        let mut rec = recorder(2.0, 0.0);
        rec.start_stroke(
            StrokePoint::new(0.0, 0.0, 1.0),
            BrushSettings::default(),
            LayerId::default(),
        )
        .unwrap();
        assert_eq!(rec.add_point(StrokePoint::new(1.0e6, 0.0, 1.0)).unwrap(), 1);
        assert_eq!(rec.points().len(), 2);

        // Right at the cap the gap is still filled
        let cap = rec.config().max_interpolated_points;
        let x = 1.0e6 + 2.0 * (cap + 1) as f32;
        assert_eq!(rec.add_point(StrokePoint::new(x, 0.0, 1.0)).unwrap(), cap + 1);
        assert_eq!(rec.points().len(), cap + 3);
    }

    #[test]
    fn test_close_samples_not_interpolated() {
        let mut rec = recorder(2.0, 0.0);
        rec.start_stroke(
            StrokePoint::new(0.0, 0.0, 1.0),
            BrushSettings::default(),
            LayerId::default(),
        )
        .unwrap();
        assert_eq!(rec.add_point(StrokePoint::new(1.5, 0.0, 1.0)).unwrap(), 1);
        assert_eq!(rec.points().len(), 2);
    }

    #[test]
    fn test_min_sample_distance_drops() {
        let mut rec = StrokeRecorder::new(RecorderConfig {
            min_sample_distance: 1.0,
            ..RecorderConfig::default()
        });
        rec.start_stroke(
            StrokePoint::new(0.0, 0.0, 1.0),
            BrushSettings::default(),
            LayerId::default(),
        )
        .unwrap();
        assert_eq!(rec.add_point(StrokePoint::new(0.5, 0.0, 1.0)).unwrap(), 0);
        assert_eq!(rec.points().len(), 1);
    }

    #[test]
    fn test_invalid_sample_dropped_stroke_continues() {
        let mut rec = recorder(2.0, 0.0);
        rec.start_stroke(
            StrokePoint::new(0.0, 0.0, 1.0),
            BrushSettings::default(),
            LayerId::default(),
        )
        .unwrap();
        assert_eq!(
            rec.add_point(StrokePoint::new(f32::NAN, 0.0, 1.0)),
            Err(StrokeError::InvalidGeometry)
        );
        assert!(rec.is_active());
        assert_eq!(rec.add_point(StrokePoint::new(1.0, 0.0, 1.0)).unwrap(), 1);
    }

    #[test]
    fn test_state_errors() {
        let mut rec = recorder(2.0, 0.0);
        assert_eq!(
            rec.add_point(StrokePoint::new(0.0, 0.0, 1.0)),
            Err(StrokeError::NoActiveStroke)
        );
        assert_eq!(rec.end_stroke(), Err(StrokeError::NoActiveStroke));
        rec.start_stroke(
            StrokePoint::new(0.0, 0.0, 1.0),
            BrushSettings::default(),
            LayerId::default(),
        )
        .unwrap();
        assert_eq!(
            rec.start_stroke(
                StrokePoint::new(0.0, 0.0, 1.0),
                BrushSettings::default(),
                LayerId::default()
            ),
            Err(StrokeError::AlreadyActive)
        );
        assert!(rec.cancel());
        assert!(!rec.cancel());
    }

    #[test]
    fn test_pressure_filter_is_causal() {
        let mut a = PressureFilter::new(0.5);
        let mut b = PressureFilter::new(0.5);
        let history = [0.2, 0.9, 0.1, 0.6];
        let out_a: Vec<f32> = history.iter().map(|&p| a.next(p)).collect();
        let out_b: Vec<f32> = history.iter().map(|&p| b.next(p)).collect();
        assert_eq!(out_a, out_b);
        assert_eq!(out_a[0], 0.2);
        assert!((out_a[1] - 0.55).abs() < 1e-6);

        let mut passthrough = PressureFilter::new(0.0);
        assert_eq!(passthrough.next(0.3), 0.3);
        assert_eq!(passthrough.next(0.7), 0.7);
    }
}
