//! Tegaki GPU
//!
//! Jump Flooding distance fields and stroke stamps using wgpu compute.

pub mod context;
pub mod error;
pub mod field;
pub mod primitives;
pub mod shaders;

pub use context::{probe_capabilities, GpuCapabilities, GpuContext};
pub use error::{GpuError, Result};
pub use field::GpuFieldGenerator;
