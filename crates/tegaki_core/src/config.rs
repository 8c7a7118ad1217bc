//! Pipeline configuration (tegaki.toml)
//!
//! Every section and field has a default, so an empty document is a valid
//! configuration. A handful of values can be overridden from the environment
//! at startup:
//!
//! - `TEGAKI_FIELD_TIER=sdf`
//! - `TEGAKI_MAX_FIELD_DIM=2048`
//! - `TEGAKI_INTERP_SPACING=1.5`

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::field::RenderTier;

/// Top-level configuration
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub transform: TransformConfig,
    pub recorder: RecorderConfig,
    pub polygon: PolygonConfig,
    pub field: FieldConfig,
    pub compositor: CompositorConfig,
}

/// Coordinate mapping
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransformConfig {
    /// How long a queried canvas bounding rect stays valid
    pub rect_cache_ttl_ms: u64,
    /// Hard cap on parent hops when walking a node's ancestry
    pub max_ancestry: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            rect_cache_ttl_ms: 100,
            max_ancestry: 20,
        }
    }
}

/// Stroke sampling
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Samples further apart than this get interpolated points in between
    pub interpolation_spacing: f32,
    /// Exponential smoothing factor for pressure; 0 disables smoothing
    pub pressure_smoothing: f32,
    /// Samples closer than this to the previous point are dropped
    pub min_sample_distance: f32,
    /// Most points interpolated into one gap; wider gaps become a plain segment
    pub max_interpolated_points: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            interpolation_spacing: 2.0,
            pressure_smoothing: 0.35,
            min_sample_distance: 0.0,
            max_interpolated_points: 256,
        }
    }
}

/// Outline construction
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolygonConfig {
    pub min_width: f32,
    pub max_width: f32,
    /// Segments used to approximate a half-circle cap
    pub cap_segments: u32,
    /// Joins turning less than this collapse to a single averaged vertex
    pub join_merge_angle_deg: f32,
    /// Bounds padding as a fraction of the base width
    pub padding_ratio: f32,
    /// Lower bound on bounds padding, in pixels
    pub min_padding: f32,
}

impl Default for PolygonConfig {
    fn default() -> Self {
        Self {
            min_width: 0.5,
            max_width: 512.0,
            cap_segments: 8,
            join_merge_angle_deg: 8.0,
            padding_ratio: 0.25,
            min_padding: 2.0,
        }
    }
}

/// Distance-field generation
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldConfig {
    pub preferred_tier: RenderTier,
    /// Largest texture side a single stroke may allocate
    pub max_texture_dim: u32,
    /// Extra step-1 propagation round (JFA+1)
    pub refinement_pass: bool,
    /// Edge offset between multi-channel field channels, in pixels
    pub msdf_spread: f32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            preferred_tier: RenderTier::Msdf,
            max_texture_dim: 4096,
            refinement_pass: false,
            msdf_spread: 0.35,
        }
    }
}

/// Final stamp rendering
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Half-width of the smoothstep band around the edge, in pixels
    pub antialias_width: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            antialias_width: 0.75,
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            key: "config",
            message: e.to_string(),
        })
    }

    /// Apply `TEGAKI_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `TEGAKI_*` overrides looked up through `lookup`. Unparseable
    /// values and non-positive spacings are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |name: &str| lookup(name).map(|v| v.trim().to_string());
        if let Some(tier) = parse("TEGAKI_FIELD_TIER").and_then(|v| v.parse::<RenderTier>().ok()) {
            tracing::info!("config override: preferred_tier={}", tier);
            self.field.preferred_tier = tier;
        }
        if let Some(dim) = parse("TEGAKI_MAX_FIELD_DIM").and_then(|v| v.parse::<u32>().ok()) {
            tracing::info!("config override: max_texture_dim={}", dim);
            self.field.max_texture_dim = dim.max(1);
        }
        if let Some(spacing) = parse("TEGAKI_INTERP_SPACING").and_then(|v| v.parse::<f32>().ok()) {
            if spacing.is_finite() && spacing > 0.0 {
                tracing::info!("config override: interpolation_spacing={}", spacing);
                self.recorder.interpolation_spacing = spacing;
            } else {
                tracing::warn!("ignoring TEGAKI_INTERP_SPACING={}: must be positive", spacing);
            }
        }
        self
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key, message: &str| {
            Err(ConfigError::Invalid {
                key,
                message: message.to_string(),
            })
        };

        if !(self.polygon.min_width > 0.0) || self.polygon.max_width < self.polygon.min_width {
            return invalid("polygon.min_width", "need 0 < min_width <= max_width");
        }
        if !(0.0..=1.0).contains(&self.recorder.pressure_smoothing) {
            return invalid("recorder.pressure_smoothing", "must be within [0, 1]");
        }
        if !(self.recorder.interpolation_spacing > 0.0) {
            return invalid("recorder.interpolation_spacing", "must be positive");
        }
        if self.recorder.max_interpolated_points == 0 {
            return invalid("recorder.max_interpolated_points", "must be positive");
        }
        if self.polygon.cap_segments < 2 {
            return invalid("polygon.cap_segments", "must be at least 2");
        }
        if self.field.max_texture_dim == 0 {
            return invalid("field.max_texture_dim", "must be positive");
        }
        if self.transform.max_ancestry == 0 {
            return invalid("transform.max_ancestry", "must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.transform.max_ancestry, 20);
        assert_eq!(config.field.preferred_tier, RenderTier::Msdf);
    }

    #[test]
    fn test_partial_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [field]
            preferred_tier = "sdf"
            refinement_pass = true

            [polygon]
            cap_segments = 12
            "#,
        )
        .unwrap();
        assert_eq!(config.field.preferred_tier, RenderTier::Sdf);
        assert!(config.field.refinement_pass);
        assert_eq!(config.field.max_texture_dim, 4096);
        assert_eq!(config.polygon.cap_segments, 12);
        assert_eq!(config.polygon.min_width, 0.5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = PipelineConfig::from_toml_str("[recorder]\npressure_smoothing = 2.0\n");
        assert!(matches!(
            err,
            Err(ConfigError::Invalid {
                key: "recorder.pressure_smoothing",
                ..
            })
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("[field]\npreferred_tier = \"gpu\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_to_toml_reparses() {
        let mut config = PipelineConfig::default();
        config.compositor.antialias_width = 1.25;
        let text = config.to_toml().unwrap();
        assert!(text.contains("[compositor]"));
        assert_eq!(PipelineConfig::from_toml_str(&text).unwrap(), config);
    }

    fn overrides(vars: &[(&str, &str)]) -> PipelineConfig {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::default().with_overrides(|name| {
            vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        })
    }

    #[test]
    fn test_overrides_applied() {
        let config = overrides(&[
            ("TEGAKI_FIELD_TIER", " sdf "),
            ("TEGAKI_MAX_FIELD_DIM", "2048"),
            ("TEGAKI_INTERP_SPACING", "1.5"),
        ]);
        assert_eq!(config.field.preferred_tier, RenderTier::Sdf);
        assert_eq!(config.field.max_texture_dim, 2048);
        assert_eq!(config.recorder.interpolation_spacing, 1.5);
        assert_eq!(overrides(&[]), PipelineConfig::default());
    }

    #[test]
    fn test_bad_overrides_ignored() {
        let defaults = PipelineConfig::default();
        for spacing in ["0", "-2.5", "NaN", "inf", "wide"] {
            let config = overrides(&[("TEGAKI_INTERP_SPACING", spacing)]);
            assert_eq!(
                config.recorder.interpolation_spacing,
                defaults.recorder.interpolation_spacing,
                "{spacing}"
            );
        }
        let config = overrides(&[
            ("TEGAKI_FIELD_TIER", "gpu"),
            ("TEGAKI_MAX_FIELD_DIM", "-1"),
        ]);
        assert_eq!(config, defaults);
        assert_eq!(overrides(&[("TEGAKI_MAX_FIELD_DIM", "0")]).field.max_texture_dim, 1);
    }

    #[test]
    fn test_env_overrides_read_environment() {
        std::env::set_var("TEGAKI_FIELD_TIER", "vector");
        let config = PipelineConfig::default().with_env_overrides();
        std::env::remove_var("TEGAKI_FIELD_TIER");
        assert_eq!(config.field.preferred_tier, RenderTier::Vector);
    }

    #[test]
    fn test_tier_serializes_lowercase() {
        let json = serde_json::to_string(&FieldConfig::default()).unwrap();
        assert!(json.contains("\"preferred_tier\":\"msdf\""));
    }
}
