//! Jump Flooding distance fields on the GPU
//!
//! One invocation walks `Idle → SeedInit → Propagate(k) → Encode → Done`:
//!
//! 1. seed pass rasterizes the outline into ping
//! 2. `k` propagate passes ping-pong between the two seed textures
//! 3. encode pass writes the normalized field into the output texture
//! 4. (stamp only) coverage pass turns the field into anti-aliased coverage
//!
//! Every texture and buffer of an invocation is destroyed when the
//! invocation ends, whether it succeeded, failed or was cancelled.

use std::num::NonZeroU64;

use tegaki_core::{CancelToken, FieldRequest, FieldStage, StrokePolygon};
use tegaki_paint::{CoverageMap, DistanceField};
use wgpu::util::DeviceExt;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::primitives::{polygon_edges, FieldParams, GpuEdge, FIELD_PARAMS_SIZE};
use crate::shaders::{self, ShaderPass, WORKGROUP_SIZE};

const fn align256(v: u64) -> u64 {
    (v + 255) & !255
}

/// Stride between per-pass parameter slots (dynamic offset alignment)
const PARAMS_STRIDE: u64 = align256(FIELD_PARAMS_SIZE);

/// Bytes per texel of the `rgba32float` targets
const TEXEL_BYTES: u32 = 16;

struct FieldPipelines {
    seed: wgpu::ComputePipeline,
    jfa: wgpu::ComputePipeline,
    encode: wgpu::ComputePipeline,
    stamp: wgpu::ComputePipeline,
}

/// Transient per-invocation resources
struct FieldTargets {
    ping: wgpu::Texture,
    pong: wgpu::Texture,
    out: wgpu::Texture,
    ping_view: wgpu::TextureView,
    pong_view: wgpu::TextureView,
    out_view: wgpu::TextureView,
    edges: wgpu::Buffer,
    params: wgpu::Buffer,
    readback: wgpu::Buffer,
    padded_row: u32,
}

impl Drop for FieldTargets {
    fn drop(&mut self) {
        self.ping.destroy();
        self.pong.destroy();
        self.out.destroy();
        self.edges.destroy();
        self.params.destroy();
        self.readback.destroy();
    }
}

/// What the invocation reads back
#[derive(Clone, Copy, Debug, PartialEq)]
enum Output {
    Field,
    Coverage { aa_width: f32 },
}

/// Compute-shader distance-field generator
pub struct GpuFieldGenerator {
    ctx: GpuContext,
    layout: wgpu::BindGroupLayout,
    pipelines: FieldPipelines,
    max_dim: u32,
    stage: FieldStage,
}

impl std::fmt::Debug for GpuFieldGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuFieldGenerator")
            .field("ctx", &self.ctx)
            .field("stage", &self.stage)
            .finish()
    }
}

impl GpuFieldGenerator {
    /// Compile every pass. Any compile failure is reported as
    /// [`GpuError::ShaderCompile`].
    pub fn new(ctx: GpuContext) -> Result<Self> {
        shaders::validate_all()?;

        let (layout, pipelines) = ctx
            .scoped("pipeline creation", |device| {
                let layout = create_bind_group_layout(device);
                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Tegaki Field Pipeline Layout"),
                    bind_group_layouts: &[&layout],
                    push_constant_ranges: &[],
                });
                let pipeline = |pass: ShaderPass| {
                    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some(pass.label),
                        source: wgpu::ShaderSource::Wgsl(pass.source().into()),
                    });
                    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some(pass.label),
                        layout: Some(&pipeline_layout),
                        module: &module,
                        entry_point: Some(pass.entry_point),
                        compilation_options: Default::default(),
                        cache: None,
                    })
                };
                let pipelines = FieldPipelines {
                    seed: pipeline(shaders::SEED_PASS),
                    jfa: pipeline(shaders::JFA_PASS),
                    encode: pipeline(shaders::ENCODE_PASS),
                    stamp: pipeline(shaders::STAMP_PASS),
                };
                (layout, pipelines)
            })
            .map_err(|e| match e {
                GpuError::Validation { message, .. } => GpuError::ShaderCompile {
                    label: "field pipelines",
                    message,
                },
                other => other,
            })?;

        tracing::debug!("field pipelines compiled");
        let max_dim = ctx.max_texture_dim();
        Ok(Self {
            ctx,
            layout,
            pipelines,
            max_dim,
            stage: FieldStage::Idle,
        })
    }

    /// Cap field textures below the device limit
    pub fn with_max_texture_dim(mut self, dim: u32) -> Self {
        self.max_dim = dim.clamp(1, self.ctx.max_texture_dim());
        self
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn max_texture_dim(&self) -> u32 {
        self.max_dim
    }

    /// Stage reached by the last invocation
    pub fn stage(&self) -> FieldStage {
        self.stage
    }

    fn enter(&mut self, stage: FieldStage) {
        tracing::trace!(?stage, "gpu field stage");
        self.stage = stage;
    }

    /// Generate and read back the encoded distance field
    pub fn generate(
        &mut self,
        polygon: &StrokePolygon,
        request: &FieldRequest,
        cancel: &CancelToken,
    ) -> Result<DistanceField> {
        let texels = self.run(polygon, request, Output::Field, cancel)?;
        DistanceField::from_texels(request.region, request.format, request.scale(), texels)
            .ok_or_else(|| GpuError::Readback("texel count mismatch".to_string()))
    }

    /// Generate the field and sample it into anti-aliased coverage on the GPU
    pub fn stamp(
        &mut self,
        polygon: &StrokePolygon,
        request: &FieldRequest,
        aa_width: f32,
        cancel: &CancelToken,
    ) -> Result<CoverageMap> {
        let texels = self.run(polygon, request, Output::Coverage { aa_width }, cancel)?;
        let region = request.region;
        let width = region.width as usize;
        Ok(CoverageMap::from_fn(region, |p| {
            let x = (p.x.floor() as i32 - region.x) as usize;
            let y = (p.y.floor() as i32 - region.y) as usize;
            texels.get(y * width + x).map_or(0.0, |t| t[0])
        }))
    }

    fn run(
        &mut self,
        polygon: &StrokePolygon,
        request: &FieldRequest,
        output: Output,
        cancel: &CancelToken,
    ) -> Result<Vec<[f32; 4]>> {
        self.ctx.check_alive()?;
        let region = request.region;
        let max = self.max_dim;
        if region.width > max || region.height > max {
            return Err(GpuError::TooLarge {
                width: region.width,
                height: region.height,
                max,
            });
        }
        if cancel.is_cancelled() {
            return Err(GpuError::Cancelled);
        }

        let steps = request.steps();
        let edges = polygon_edges(polygon, request);
        let aa_width = match output {
            Output::Coverage { aa_width } => aa_width,
            Output::Field => 0.0,
        };
        let base = FieldParams::new(request, edges.len() as u32, aa_width);

        // Slot 0 seed, 1..=k propagate, k+1 encode, k+2 stamp
        let mut slots = vec![base];
        slots.extend(steps.iter().map(|&s| base.with_step(s)));
        slots.push(base);
        slots.push(base);

        self.enter(FieldStage::SeedInit);
        let targets = self
            .ctx
            .scoped("field allocation", |device| create_targets(device, request, &edges, &slots))?;

        let (w, h) = (region.width, region.height);
        let mut current_is_ping = true;

        // Seed + propagate
        let propagate = self.ctx.scoped("seed and propagate", |device| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Tegaki Field Propagate"),
            });
            let seed_group = self.bind(device, &targets, &targets.pong_view, &targets.ping_view);
            dispatch(&mut encoder, &self.pipelines.seed, &seed_group, 0, w, h);

            let ping_to_pong = self.bind(device, &targets, &targets.ping_view, &targets.pong_view);
            let pong_to_ping = self.bind(device, &targets, &targets.pong_view, &targets.ping_view);
            for i in 0..steps.len() {
                let group = if current_is_ping { &ping_to_pong } else { &pong_to_ping };
                dispatch(&mut encoder, &self.pipelines.jfa, group, i as u32 + 1, w, h);
                current_is_ping = !current_is_ping;
            }
            self.ctx.queue().submit(Some(encoder.finish()));
        });
        propagate?;
        if let Some((iteration, step)) = steps.iter().enumerate().last() {
            self.enter(FieldStage::Propagate {
                iteration: iteration as u32,
                step: *step,
            });
        }

        if cancel.is_cancelled() {
            self.enter(FieldStage::Idle);
            tracing::debug!("field cancelled after propagation");
            return Err(GpuError::Cancelled);
        }

        // Encode (+ stamp) and copy out
        self.enter(FieldStage::Encode);
        let encode_slot = steps.len() as u32 + 1;
        self.ctx.scoped("encode", |device| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Tegaki Field Encode"),
            });
            let (current, spare, spare_tex) = if current_is_ping {
                (&targets.ping_view, &targets.pong_view, &targets.pong)
            } else {
                (&targets.pong_view, &targets.ping_view, &targets.ping)
            };
            let encode_group = self.bind(device, &targets, current, &targets.out_view);
            dispatch(&mut encoder, &self.pipelines.encode, &encode_group, encode_slot, w, h);

            let result = match output {
                Output::Field => &targets.out,
                Output::Coverage { .. } => {
                    let stamp_group = self.bind(device, &targets, &targets.out_view, spare);
                    dispatch(&mut encoder, &self.pipelines.stamp, &stamp_group, encode_slot + 1, w, h);
                    spare_tex
                }
            };

            encoder.copy_texture_to_buffer(
                wgpu::ImageCopyTexture {
                    texture: result,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::ImageCopyBuffer {
                    buffer: &targets.readback,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(targets.padded_row),
                        rows_per_image: Some(h),
                    },
                },
                wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
            );
            self.ctx.queue().submit(Some(encoder.finish()));
        })?;

        let texels = self.read_back(&targets, w, h)?;
        self.ctx.check_alive()?;

        if cancel.is_cancelled() {
            self.enter(FieldStage::Idle);
            tracing::debug!("field cancelled during readback");
            return Err(GpuError::Cancelled);
        }

        self.enter(FieldStage::Done);
        tracing::debug!(width = w, height = h, passes = slots.len(), "gpu field generated");
        Ok(texels)
    }

    fn bind(
        &self,
        device: &wgpu::Device,
        targets: &FieldTargets,
        src: &wgpu::TextureView,
        dst: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tegaki Field Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &targets.params,
                        offset: 0,
                        size: NonZeroU64::new(FIELD_PARAMS_SIZE),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: targets.edges.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(src),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(dst),
                },
            ],
        })
    }

    fn read_back(&self, targets: &FieldTargets, w: u32, h: u32) -> Result<Vec<[f32; 4]>> {
        let slice = targets.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.ctx.device().poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| GpuError::Readback(e.to_string()))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        let mut texels = Vec::with_capacity(w as usize * h as usize);
        {
            let data = slice.get_mapped_range();
            let row_bytes = (w * TEXEL_BYTES) as usize;
            for row in data.chunks(targets.padded_row as usize).take(h as usize) {
                for texel in row[..row_bytes].chunks_exact(TEXEL_BYTES as usize) {
                    texels.push(bytemuck::pod_read_unaligned::<[f32; 4]>(texel));
                }
            }
        }
        targets.readback.unmap();
        Ok(texels)
    }
}

fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Tegaki Field Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(FIELD_PARAMS_SIZE),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::Rgba32Float,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
        ],
    })
}

fn create_targets(
    device: &wgpu::Device,
    request: &FieldRequest,
    edges: &[GpuEdge],
    slots: &[FieldParams],
) -> FieldTargets {
    let (w, h) = (request.region.width, request.region.height);
    let texture = |label: &str| {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    };
    let ping = texture("Tegaki Seed Ping");
    let pong = texture("Tegaki Seed Pong");
    let out = texture("Tegaki Field Output");

    // Storage bindings may not be empty
    let placeholder = [GpuEdge::default()];
    let edge_data: &[GpuEdge] = if edges.is_empty() { &placeholder } else { edges };
    let edges = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Tegaki Outline Edges"),
        contents: bytemuck::cast_slice(edge_data),
        usage: wgpu::BufferUsages::STORAGE,
    });

    let mut param_bytes = vec![0u8; slots.len() * PARAMS_STRIDE as usize];
    for (i, slot) in slots.iter().enumerate() {
        let start = i * PARAMS_STRIDE as usize;
        param_bytes[start..start + FIELD_PARAMS_SIZE as usize].copy_from_slice(bytemuck::bytes_of(slot));
    }
    let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Tegaki Field Params"),
        contents: &param_bytes,
        usage: wgpu::BufferUsages::UNIFORM,
    });

    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_row = (w * TEXEL_BYTES).div_ceil(align) * align;
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Tegaki Field Readback"),
        size: padded_row as u64 * h as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    FieldTargets {
        ping_view: ping.create_view(&wgpu::TextureViewDescriptor::default()),
        pong_view: pong.create_view(&wgpu::TextureViewDescriptor::default()),
        out_view: out.create_view(&wgpu::TextureViewDescriptor::default()),
        ping,
        pong,
        out,
        edges,
        params,
        readback,
        padded_row,
    }
}

fn dispatch(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::ComputePipeline,
    group: &wgpu::BindGroup,
    slot: u32,
    w: u32,
    h: u32,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("Tegaki Field Pass"),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, group, &[slot * PARAMS_STRIDE as u32]);
    pass.dispatch_workgroups(w.div_ceil(WORKGROUP_SIZE), h.div_ceil(WORKGROUP_SIZE), 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_stride_is_aligned() {
        assert_eq!(PARAMS_STRIDE, 256);
        assert_eq!(align256(1), 256);
        assert_eq!(align256(256), 256);
        assert_eq!(align256(257), 512);
    }
}
