//! Distance-field strategy selection

use tegaki_core::config::FieldConfig;
use tegaki_core::{CancelToken, FieldRequest, StrokePolygon};
use tegaki_gpu::{GpuContext, GpuFieldGenerator};
use tegaki_paint::{CoverageMap, PaintError, SoftwareFieldGenerator};

use crate::error::{PipelineError, Result};

/// Backend that turns a stroke outline into anti-aliased coverage via a
/// distance field
#[derive(Debug, Default)]
pub enum FieldStrategy {
    /// wgpu compute passes
    Gpu(Box<GpuFieldGenerator>),
    /// CPU Jump Flooding; same stages, no device
    Software(SoftwareFieldGenerator),
    /// No field backend; every stroke renders on the vector tier
    #[default]
    None,
}

impl FieldStrategy {
    /// Compute backend if a device can be created, otherwise `None`
    pub fn gpu(config: &FieldConfig) -> Self {
        match GpuContext::new_blocking().and_then(GpuFieldGenerator::new) {
            Ok(generator) => {
                FieldStrategy::Gpu(Box::new(generator.with_max_texture_dim(config.max_texture_dim)))
            }
            Err(e) => {
                tracing::warn!("gpu field generator unavailable: {}", e);
                FieldStrategy::None
            }
        }
    }

    /// Compute backend when possible, software otherwise
    pub fn detect(config: &FieldConfig) -> Self {
        match Self::gpu(config) {
            FieldStrategy::None => FieldStrategy::Software(SoftwareFieldGenerator::new()),
            gpu => gpu,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldStrategy::Gpu(_) => "gpu",
            FieldStrategy::Software(_) => "software",
            FieldStrategy::None => "none",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, FieldStrategy::None)
    }

    /// Coverage for `polygon` over `request.region`. Failures other than
    /// cancellation come back as [`PipelineError::GpuUnavailable`].
    pub fn coverage(
        &mut self,
        polygon: &StrokePolygon,
        request: &FieldRequest,
        aa_width: f32,
        cancel: &CancelToken,
    ) -> Result<CoverageMap> {
        match self {
            FieldStrategy::Gpu(generator) => Ok(generator.stamp(polygon, request, aa_width, cancel)?),
            FieldStrategy::Software(generator) => generator
                .generate(polygon, request, cancel)
                .map(|field| field.to_coverage(aa_width))
                .map_err(|e| match e {
                    PaintError::Cancelled => PipelineError::Cancelled,
                    other => PipelineError::GpuUnavailable(other.to_string()),
                }),
            FieldStrategy::None => Err(PipelineError::GpuUnavailable(
                "no field backend configured".to_string(),
            )),
        }
    }
}
