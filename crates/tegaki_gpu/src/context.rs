//! Headless wgpu device and capability probing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{GpuError, Result};
use crate::shaders;

/// What the current machine can do for the distance-field path
#[derive(Clone, Debug, PartialEq)]
pub struct GpuCapabilities {
    /// Adapter name, if one was found
    pub adapter: Option<String>,
    pub backend: Option<String>,
    pub compute: bool,
    pub shaders_valid: bool,
    pub max_texture_dim: u32,
    /// First failure encountered while probing
    pub error: Option<String>,
}

impl GpuCapabilities {
    /// Whether the compute distance-field path can be used
    pub fn available(&self) -> bool {
        self.adapter.is_some() && self.compute && self.shaders_valid
    }
}

fn preferred_backends() -> wgpu::Backends {
    #[cfg(target_os = "macos")]
    {
        wgpu::Backends::METAL
    }
    #[cfg(target_os = "windows")]
    {
        wgpu::Backends::DX12
    }
    #[cfg(target_os = "linux")]
    {
        wgpu::Backends::VULKAN
    }
    #[cfg(target_arch = "wasm32")]
    {
        wgpu::Backends::BROWSER_WEBGPU
    }
    #[cfg(not(any(
        target_os = "macos",
        target_os = "windows",
        target_os = "linux",
        target_arch = "wasm32"
    )))]
    {
        wgpu::Backends::PRIMARY
    }
}

async fn request_adapter() -> Result<wgpu::Adapter> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: preferred_backends(),
        ..Default::default()
    });
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or(GpuError::AdapterNotFound)
}

fn supports_compute(adapter: &wgpu::Adapter) -> bool {
    adapter
        .get_downlevel_capabilities()
        .flags
        .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
}

/// Probe adapter, compute support and shader validity without keeping a device
pub fn probe_capabilities() -> GpuCapabilities {
    let mut caps = GpuCapabilities {
        adapter: None,
        backend: None,
        compute: false,
        shaders_valid: false,
        max_texture_dim: 0,
        error: None,
    };

    if let Err(e) = shaders::validate_all() {
        caps.error = Some(e.to_string());
    } else {
        caps.shaders_valid = true;
    }

    match pollster::block_on(request_adapter()) {
        Ok(adapter) => {
            let info = adapter.get_info();
            caps.adapter = Some(info.name.clone());
            caps.backend = Some(format!("{:?}", info.backend));
            caps.compute = supports_compute(&adapter);
            caps.max_texture_dim = adapter.limits().max_texture_dimension_2d;
            if !caps.compute && caps.error.is_none() {
                caps.error = Some(GpuError::ComputeUnsupported(info.name).to_string());
            }
        }
        Err(e) => {
            caps.error.get_or_insert(e.to_string());
        }
    }

    tracing::info!(
        "gpu capabilities: adapter={:?}, compute={}, shaders_valid={}, max_texture_dim={}",
        caps.adapter,
        caps.compute,
        caps.shaders_valid,
        caps.max_texture_dim
    );
    caps
}

/// A device and queue dedicated to stroke work
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    max_texture_dim: u32,
    lost: Arc<AtomicBool>,
    lost_reason: Arc<Mutex<Option<String>>>,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.info.name)
            .field("backend", &self.info.backend)
            .field("lost", &self.is_lost())
            .finish()
    }
}

impl GpuContext {
    /// Create a headless device. Fails if there is no adapter or it cannot
    /// run compute shaders.
    pub async fn new() -> Result<Self> {
        let adapter = request_adapter().await?;
        let info = adapter.get_info();
        if !supports_compute(&adapter) {
            return Err(GpuError::ComputeUnsupported(info.name));
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Tegaki GPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await
            .map_err(|e| GpuError::Device(e.to_string()))?;

        let lost = Arc::new(AtomicBool::new(false));
        let lost_reason = Arc::new(Mutex::new(None));
        {
            let lost = lost.clone();
            let lost_reason = lost_reason.clone();
            device.set_device_lost_callback(move |reason, message| {
                tracing::warn!("gpu device lost ({:?}): {}", reason, message);
                lost.store(true, Ordering::Release);
                if let Ok(mut slot) = lost_reason.lock() {
                    *slot = Some(message);
                }
            });
        }
        device.on_uncaptured_error(Box::new(|error| {
            tracing::warn!("uncaptured wgpu error: {}", error);
        }));

        let max_texture_dim = device.limits().max_texture_dimension_2d;
        tracing::info!(
            "gpu context: adapter={}, backend={:?}, max_texture_dim={}",
            info.name,
            info.backend,
            max_texture_dim
        );

        Ok(Self {
            device,
            queue,
            info,
            max_texture_dim,
            lost,
            lost_reason,
        })
    }

    /// Blocking variant of [`new`](Self::new)
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    pub fn max_texture_dim(&self) -> u32 {
        self.max_texture_dim
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Error to report if the device has been lost
    pub fn check_alive(&self) -> Result<()> {
        if !self.is_lost() {
            return Ok(());
        }
        let reason = self
            .lost_reason
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| "unknown".to_string());
        Err(GpuError::DeviceLost(reason))
    }

    /// Run `f` inside a validation error scope
    pub fn scoped<T>(&self, stage: &'static str, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(GpuError::Validation {
                stage,
                message: error.to_string(),
            }),
            None => Ok(value),
        }
    }
}
