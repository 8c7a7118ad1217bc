//! GPU-side data layouts

use bytemuck::{Pod, Zeroable};
use tegaki_core::{ChannelFormat, FieldRequest, StrokePolygon};

/// Per-pass uniform block; mirrors `Params` in the shaders
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FieldParams {
    pub size: [u32; 2],
    /// Jump Flooding step for propagate passes
    pub step: u32,
    pub edge_count: u32,
    /// Normalization divisor (larger texture side)
    pub scale: f32,
    pub aa_width: f32,
    pub channels: u32,
    pub _pad: u32,
    /// Per-channel edge offsets in pixels; `w` unused
    pub offsets: [f32; 4],
}

pub const FIELD_PARAMS_SIZE: u64 = std::mem::size_of::<FieldParams>() as u64;

impl FieldParams {
    pub fn new(request: &FieldRequest, edge_count: u32, aa_width: f32) -> Self {
        let [a, b, c] = request.channel_offsets();
        Self {
            size: [request.region.width, request.region.height],
            step: 0,
            edge_count,
            scale: request.scale(),
            aa_width,
            channels: match request.format {
                ChannelFormat::Single => 1,
                ChannelFormat::Multi => 3,
            },
            _pad: 0,
            offsets: [a, b, c, 0.0],
        }
    }

    pub fn with_step(mut self, step: u32) -> Self {
        self.step = step;
        self
    }
}

/// One outline edge in texel space
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuEdge {
    pub from: [f32; 2],
    pub to: [f32; 2],
}

/// Outline edges relative to the field origin
pub fn polygon_edges(polygon: &StrokePolygon, request: &FieldRequest) -> Vec<GpuEdge> {
    let (ox, oy) = (request.region.x as f32, request.region.y as f32);
    polygon
        .segments()
        .map(|(a, b)| GpuEdge {
            from: [a.x - ox, a.y - oy],
            to: [b.x - ox, b.y - oy],
        })
        .collect()
}
