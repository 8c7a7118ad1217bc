//! GPU capability probing
//!
//! The pipeline asks its probe before every finalize, so a probe that starts
//! reporting compute support again brings subsequent strokes back onto the
//! distance-field tiers.

use tegaki_gpu::GpuCapabilities;

/// Reports whether the distance-field (compute) path may be attempted
pub trait CapabilityProbe {
    fn compute_available(&self) -> bool;
}

impl<F> CapabilityProbe for F
where
    F: Fn() -> bool,
{
    fn compute_available(&self) -> bool {
        self()
    }
}

/// Fixed answer, for hosts that decide up front
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticProbe(pub bool);

impl CapabilityProbe for StaticProbe {
    fn compute_available(&self) -> bool {
        self.0
    }
}

/// Answer from a wgpu adapter probe taken at construction
#[derive(Clone, Debug)]
pub struct GpuProbe {
    capabilities: GpuCapabilities,
}

impl GpuProbe {
    pub fn new() -> Self {
        Self::from_capabilities(tegaki_gpu::probe_capabilities())
    }

    pub fn from_capabilities(capabilities: GpuCapabilities) -> Self {
        if !capabilities.available() {
            tracing::warn!(
                "gpu compute unavailable, strokes use the vector tier: {}",
                capabilities.error.as_deref().unwrap_or("unknown")
            );
        }
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Probe again, e.g. after a device loss
    pub fn refresh(&mut self) {
        *self = Self::new();
    }
}

impl Default for GpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityProbe for GpuProbe {
    fn compute_available(&self) -> bool {
        self.capabilities.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_closure_probe_follows_state() {
        let flag = Cell::new(false);
        let probe = || flag.get();
        assert!(!probe.compute_available());
        flag.set(true);
        assert!(probe.compute_available());
    }

    #[test]
    fn test_gpu_probe_from_capabilities() {
        let caps = GpuCapabilities {
            adapter: Some("Test Adapter".to_string()),
            backend: Some("Vulkan".to_string()),
            compute: true,
            shaders_valid: true,
            max_texture_dim: 8192,
            error: None,
        };
        assert!(GpuProbe::from_capabilities(caps.clone()).compute_available());

        let no_compute = GpuCapabilities {
            compute: false,
            ..caps
        };
        assert!(!GpuProbe::from_capabilities(no_compute).compute_available());
        assert!(StaticProbe(true).compute_available());
    }
}
