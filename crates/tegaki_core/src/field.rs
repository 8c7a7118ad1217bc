//! Distance-field stage model
//!
//! Types shared by the GPU and software distance-field generators: render
//! tiers, channel formats, the per-invocation stage machine and the Jump
//! Flooding step schedule.

use serde::{Deserialize, Serialize};

use crate::geometry::PixelRect;

/// Rendering quality tier, best first
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderTier {
    /// Multi-channel distance field
    Msdf,
    /// Single-channel distance field
    Sdf,
    /// Circles and capsules, no distance field
    Vector,
}

impl RenderTier {
    /// Channel format for tiers that go through a distance field
    pub fn channel_format(&self) -> Option<ChannelFormat> {
        match self {
            RenderTier::Msdf => Some(ChannelFormat::Multi),
            RenderTier::Sdf => Some(ChannelFormat::Single),
            RenderTier::Vector => None,
        }
    }

    /// Tiers to attempt, in order, when `self` is preferred
    pub fn fallback_chain(&self) -> &'static [RenderTier] {
        match self {
            RenderTier::Msdf => &[RenderTier::Msdf, RenderTier::Sdf, RenderTier::Vector],
            RenderTier::Sdf => &[RenderTier::Sdf, RenderTier::Vector],
            RenderTier::Vector => &[RenderTier::Vector],
        }
    }
}

impl std::str::FromStr for RenderTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "msdf" => Ok(RenderTier::Msdf),
            "sdf" => Ok(RenderTier::Sdf),
            "vector" | "legacy" => Ok(RenderTier::Vector),
            other => Err(format!("unknown render tier `{other}`")),
        }
    }
}

impl std::fmt::Display for RenderTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RenderTier::Msdf => "msdf",
            RenderTier::Sdf => "sdf",
            RenderTier::Vector => "vector",
        })
    }
}

/// Channel layout of an encoded distance field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelFormat {
    Single,
    Multi,
}

impl ChannelFormat {
    pub fn channels(&self) -> usize {
        match self {
            ChannelFormat::Single => 1,
            ChannelFormat::Multi => 3,
        }
    }
}

/// Stage of one distance-field invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldStage {
    Idle,
    SeedInit,
    Propagate { iteration: u32, step: u32 },
    Encode,
    Done,
}

/// Sentinel stored for "no seed found yet"
pub const NO_SEED: f32 = -1.0;

/// What a generator is asked to produce for one stroke
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldRequest {
    /// Pixel region of the field in layer space
    pub region: PixelRect,
    pub format: ChannelFormat,
    /// Run an extra step-1 pass after the halving schedule (JFA+1)
    pub refinement_pass: bool,
    /// Edge offset between the channels of a multi-channel field, in pixels
    pub msdf_spread: f32,
}

impl FieldRequest {
    /// Normalization divisor: the larger texture dimension
    pub fn scale(&self) -> f32 {
        self.region.width.max(self.region.height).max(1) as f32
    }

    /// Per-channel edge offsets in pixels
    pub fn channel_offsets(&self) -> [f32; 3] {
        match self.format {
            ChannelFormat::Single => [0.0; 3],
            ChannelFormat::Multi => [-self.msdf_spread, 0.0, self.msdf_spread],
        }
    }

    /// Jump Flooding step sizes for this request
    pub fn steps(&self) -> Vec<u32> {
        let mut steps = jfa_steps(self.region.width, self.region.height);
        if self.refinement_pass {
            steps.push(1);
        }
        steps
    }
}

/// Step sizes for `ceil(log2(max(width, height)))` Jump Flooding rounds,
/// halving each round and ending at 1
pub fn jfa_steps(width: u32, height: u32) -> Vec<u32> {
    let max_dim = width.max(height).max(1);
    let rounds = u32::BITS - (max_dim - 1).leading_zeros();
    let rounds = rounds.max(1);
    (0..rounds).rev().map(|i| 1u32 << i).collect()
}

/// Signed pixel distance from the nearest-inside / nearest-outside seed
/// distances of a texel. Negative inside, positive outside, zero on the edge.
pub fn signed_distance(covered: bool, dist_to_inside: f32, dist_to_outside: f32) -> f32 {
    if covered {
        -(dist_to_outside - 0.5)
    } else {
        dist_to_inside - 0.5
    }
}

/// Median of three, the decode step for multi-channel fields
pub fn median3(a: f32, b: f32, c: f32) -> f32 {
    a.min(b).max(a.max(b).min(c))
}

/// Anti-aliased coverage for a signed pixel distance
pub fn coverage_from_distance(distance: f32, aa_width: f32) -> f32 {
    let w = aa_width.max(1e-3);
    1.0 - smoothstep(-w, w, distance)
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jfa_steps() {
        assert_eq!(jfa_steps(1, 1), vec![1]);
        assert_eq!(jfa_steps(2, 1), vec![1]);
        assert_eq!(jfa_steps(16, 4), vec![8, 4, 2, 1]);
        assert_eq!(jfa_steps(17, 4), vec![16, 8, 4, 2, 1]);
        assert_eq!(jfa_steps(100, 300), vec![256, 128, 64, 32, 16, 8, 4, 2, 1]);
    }

    #[test]
    fn test_refinement_adds_step() {
        let request = FieldRequest {
            region: PixelRect::new(0, 0, 8, 8),
            format: ChannelFormat::Single,
            refinement_pass: true,
            msdf_spread: 0.0,
        };
        assert_eq!(request.steps(), vec![4, 2, 1, 1]);
        assert_eq!(request.scale(), 8.0);
    }

    #[test]
    fn test_median3() {
        assert_eq!(median3(1.0, 2.0, 3.0), 2.0);
        assert_eq!(median3(3.0, 1.0, 2.0), 2.0);
        assert_eq!(median3(2.0, 3.0, 1.0), 2.0);
    }

    #[test]
    fn test_signed_distance_edges() {
        assert_eq!(signed_distance(true, 0.0, 1.0), -0.5);
        assert_eq!(signed_distance(false, 1.0, 0.0), 0.5);
        assert!(coverage_from_distance(-2.0, 0.75) > 0.999);
        assert!(coverage_from_distance(2.0, 0.75) < 0.001);
        assert!((coverage_from_distance(0.0, 0.75) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_tier_parsing_and_chain() {
        assert_eq!("MSDF".parse::<RenderTier>(), Ok(RenderTier::Msdf));
        assert_eq!("legacy".parse::<RenderTier>(), Ok(RenderTier::Vector));
        assert!("gpu".parse::<RenderTier>().is_err());
        assert_eq!(RenderTier::Sdf.fallback_chain().last(), Some(&RenderTier::Vector));
    }
}
