//! Preview and final stroke rendering
//!
//! Previews always take the vector path. Final renders walk the tier chain
//! starting at the configured tier (`msdf → sdf → vector`) for every stroke,
//! so a failure only downgrades the stroke it happened on.

use tegaki_core::config::{FieldConfig, PipelineConfig};
use tegaki_core::{
    BrushSettings, CancelToken, ChannelFormat, FieldRequest, PixelRect, RenderTier, Stroke,
    StrokePoint, StrokePolygon,
};
use tegaki_paint::{CoverageMap, FallbackRenderer, StrokeStamp, VectorPreview};

use crate::error::{PipelineError, Result};
use crate::strategy::FieldStrategy;

/// A tier that was skipped for one stroke, and why
#[derive(Clone, Debug, PartialEq)]
pub struct TierFallback {
    pub tier: RenderTier,
    pub reason: String,
}

/// Outcome of a final render
#[derive(Clone, Debug, PartialEq)]
pub struct FinalRender {
    pub stamp: StrokeStamp,
    /// Tier the chain started from
    pub requested: RenderTier,
    /// Tiers that failed before `stamp.tier` succeeded
    pub fallbacks: Vec<TierFallback>,
}

impl FinalRender {
    pub fn fell_back(&self) -> bool {
        !self.fallbacks.is_empty()
    }
}

pub struct StrokeCompositor {
    fallback: FallbackRenderer,
    field: FieldConfig,
    antialias_width: f32,
    strategy: FieldStrategy,
}

impl std::fmt::Debug for StrokeCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrokeCompositor")
            .field("preferred_tier", &self.field.preferred_tier)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl StrokeCompositor {
    pub fn new(config: &PipelineConfig, strategy: FieldStrategy) -> Self {
        Self {
            fallback: FallbackRenderer::new(&config.polygon, &config.compositor),
            field: config.field.clone(),
            antialias_width: config.compositor.antialias_width,
            strategy,
        }
    }

    pub fn strategy(&self) -> &FieldStrategy {
        &self.strategy
    }

    pub fn set_strategy(&mut self, strategy: FieldStrategy) {
        tracing::debug!("field strategy: {} -> {}", self.strategy.name(), strategy.name());
        self.strategy = strategy;
    }

    pub fn preferred_tier(&self) -> RenderTier {
        self.field.preferred_tier
    }

    /// Live preview shapes for the points recorded so far
    pub fn render_preview(&self, points: &[StrokePoint], settings: &BrushSettings) -> VectorPreview {
        self.fallback.preview(points, settings)
    }

    /// Rasterize a preview, for hosts without a vector canvas
    pub fn rasterize_preview(&self, preview: &VectorPreview, clip: Option<PixelRect>) -> Option<CoverageMap> {
        self.fallback.rasterize(preview, clip)
    }

    /// Render the committed stamp for `stroke`, clipped to `clip`.
    ///
    /// Returns `Ok(None)` when the stroke touches no pixel inside `clip`.
    /// Only cancellation is reported as an error; every other failure moves
    /// on to the next tier, ending at the vector tier which cannot fail.
    pub fn render_final(
        &mut self,
        stroke: &Stroke,
        polygon: &StrokePolygon,
        clip: PixelRect,
        compute_available: bool,
        cancel: &CancelToken,
    ) -> Result<Option<FinalRender>> {
        let requested = self.field.preferred_tier;
        let mut fallbacks = Vec::new();

        for &tier in requested.fallback_chain() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let stamp = match tier.channel_format() {
                Some(format) => {
                    match self.field_stamp(stroke, polygon, clip, tier, format, compute_available, cancel) {
                        Ok(stamp) => stamp,
                        Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                        Err(e) => {
                            tracing::warn!("{} tier failed, falling back: {}", tier, e);
                            fallbacks.push(TierFallback {
                                tier,
                                reason: e.to_string(),
                            });
                            continue;
                        }
                    }
                }
                None => self.fallback.render(stroke, Some(clip)),
            };

            return Ok(stamp.map(|stamp| FinalRender {
                stamp,
                requested,
                fallbacks,
            }));
        }
        Ok(None)
    }

    #[allow(clippy::too_many_arguments)]
    fn field_stamp(
        &mut self,
        stroke: &Stroke,
        polygon: &StrokePolygon,
        clip: PixelRect,
        tier: RenderTier,
        format: ChannelFormat,
        compute_available: bool,
        cancel: &CancelToken,
    ) -> Result<Option<StrokeStamp>> {
        if !compute_available {
            return Err(PipelineError::GpuUnavailable(
                "capability probe reports no compute support".to_string(),
            ));
        }
        let Some(region) = PixelRect::enclosing(&polygon.bounds).intersect(&clip) else {
            return Ok(None);
        };
        let max = self.field.max_texture_dim;
        if region.width > max || region.height > max {
            return Err(PipelineError::GpuUnavailable(format!(
                "field region {}x{} exceeds {} texels",
                region.width, region.height, max
            )));
        }

        let request = FieldRequest {
            region,
            format,
            refinement_pass: self.field.refinement_pass,
            msdf_spread: self.field.msdf_spread,
        };
        let coverage = self
            .strategy
            .coverage(polygon, &request, self.antialias_width, cancel)?;
        tracing::debug!(
            %tier,
            strategy = self.strategy.name(),
            region = ?region,
            "field stamp rendered"
        );
        Ok(Some(StrokeStamp::new(coverage, &stroke.settings(), tier)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tegaki_core::{LayerId, PolygonBuilder};
    use tegaki_paint::SoftwareFieldGenerator;

    fn stroke() -> Stroke {
        Stroke::new(
            vec![StrokePoint::new(10.0, 10.0, 1.0), StrokePoint::new(20.0, 10.0, 1.0)],
            BrushSettings::default(),
            LayerId::default(),
        )
        .unwrap()
    }

    fn render(
        compositor: &mut StrokeCompositor,
        compute_available: bool,
    ) -> FinalRender {
        let stroke = stroke();
        let polygon = PolygonBuilder::default().build_stroke(&stroke);
        compositor
            .render_final(
                &stroke,
                &polygon,
                PixelRect::new(0, 0, 64, 64),
                compute_available,
                &CancelToken::new(),
            )
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_field_tier_when_available() {
        let mut compositor = StrokeCompositor::new(
            &PipelineConfig::default(),
            FieldStrategy::Software(SoftwareFieldGenerator::new()),
        );
        let result = render(&mut compositor, true);
        assert_eq!(result.stamp.tier, RenderTier::Msdf);
        assert!(!result.fell_back());
        assert!(result.stamp.alpha_at(15, 10) > 0.9);
    }

    #[test]
    fn test_falls_back_to_vector_without_compute() {
        let mut compositor = StrokeCompositor::new(
            &PipelineConfig::default(),
            FieldStrategy::Software(SoftwareFieldGenerator::new()),
        );
        let result = render(&mut compositor, false);
        assert_eq!(result.stamp.tier, RenderTier::Vector);
        assert_eq!(result.requested, RenderTier::Msdf);
        let tiers: Vec<_> = result.fallbacks.iter().map(|f| f.tier).collect();
        assert_eq!(tiers, vec![RenderTier::Msdf, RenderTier::Sdf]);
        assert!(result.stamp.alpha_at(15, 10) > 0.9);
    }

    #[test]
    fn test_missing_backend_falls_back() {
        let mut compositor = StrokeCompositor::new(&PipelineConfig::default(), FieldStrategy::None);
        assert_eq!(render(&mut compositor, true).stamp.tier, RenderTier::Vector);
    }

    #[test]
    fn test_oversized_region_falls_back() {
        let mut config = PipelineConfig::default();
        config.field.max_texture_dim = 8;
        let mut compositor =
            StrokeCompositor::new(&config, FieldStrategy::Software(SoftwareFieldGenerator::new()));
        let result = render(&mut compositor, true);
        assert_eq!(result.stamp.tier, RenderTier::Vector);
        assert!(result.fallbacks[0].reason.contains("exceeds"));
    }

    #[test]
    fn test_outside_clip_renders_nothing() {
        let mut compositor = StrokeCompositor::new(
            &PipelineConfig::default(),
            FieldStrategy::Software(SoftwareFieldGenerator::new()),
        );
        let stroke = stroke();
        let polygon = PolygonBuilder::default().build_stroke(&stroke);
        let result = compositor
            .render_final(
                &stroke,
                &polygon,
                PixelRect::new(100, 100, 16, 16),
                true,
                &CancelToken::new(),
            )
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_far_stroke_is_clipped() {
        let mut compositor = StrokeCompositor::new(&PipelineConfig::default(), FieldStrategy::None);
        let stroke = Stroke::new(
            vec![StrokePoint::new(0.0, 0.0, 1.0), StrokePoint::new(3.0e9, 0.0, 1.0)],
            BrushSettings::default(),
            LayerId::default(),
        )
        .unwrap();
        let polygon = PolygonBuilder::default().build_stroke(&stroke);
        let clip = PixelRect::new(0, 0, 64, 64);
        let result = compositor
            .render_final(&stroke, &polygon, clip, true, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(result.stamp.tier, RenderTier::Vector);
        assert!(result.stamp.region().intersect(&clip) == Some(result.stamp.region()));
        assert!(result.stamp.alpha_at(10, 0) > 0.9);

        let away = compositor
            .render_final(
                &stroke,
                &polygon,
                PixelRect::new(0, 1000, 64, 64),
                true,
                &CancelToken::new(),
            )
            .unwrap();
        assert!(away.is_none());
    }

    #[test]
    fn test_cancelled_render() {
        let mut compositor = StrokeCompositor::new(&PipelineConfig::default(), FieldStrategy::None);
        let stroke = stroke();
        let polygon = PolygonBuilder::default().build_stroke(&stroke);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(
            compositor.render_final(&stroke, &polygon, PixelRect::new(0, 0, 64, 64), true, &cancel),
            Err(PipelineError::Cancelled)
        );
    }

    #[test]
    fn test_preview_never_uses_field() {
        let compositor = StrokeCompositor::new(&PipelineConfig::default(), FieldStrategy::None);
        let preview = compositor.render_preview(stroke().points(), &BrushSettings::default());
        assert_eq!(preview.shapes.len(), 3);
        assert!(compositor.rasterize_preview(&preview, None).is_some());
    }
}
