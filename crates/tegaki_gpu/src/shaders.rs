//! WGSL compute shaders for distance-field generation
//!
//! All passes share one bind group layout:
//!
//! - `@binding(0)` per-pass parameters (dynamic uniform offset)
//! - `@binding(1)` polygon edges in texel space, `vec4(ax, ay, bx, by)`
//! - `@binding(2)` source texture (`rgba32float`, unfilterable)
//! - `@binding(3)` destination storage texture (`rgba32float`)
//!
//! Seed texels hold the nearest inside seed in `xy` and the nearest outside
//! seed in `zw`, with -1 meaning "none found yet".

use crate::error::{GpuError, Result};

/// Shared declarations prepended to every pass
const COMMON: &str = r#"
const NO_SEED: f32 = -1.0;
const FAR: f32 = 3.0e38;

struct Params {
    size: vec2<u32>,
    step: u32,
    edge_count: u32,
    scale: f32,
    aa_width: f32,
    channels: u32,
    _pad: u32,
    offsets: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> edges: array<vec4<f32>>;
@group(0) @binding(2) var src: texture_2d<f32>;
@group(0) @binding(3) var dst: texture_storage_2d<rgba32float, write>;

fn outside_grid(id: vec3<u32>) -> bool {
    return id.x >= params.size.x || id.y >= params.size.y;
}

fn seed_distance_sq(p: vec2<f32>, seed: vec2<f32>) -> f32 {
    if (seed.x < 0.0) {
        return FAR;
    }
    let d = seed - p;
    return dot(d, d);
}
"#;

/// Rasterize the outline: nonzero winding test at every texel center
pub const SEED_SHADER: &str = r#"
fn winding(p: vec2<f32>) -> i32 {
    var w = 0;
    for (var i = 0u; i < params.edge_count; i++) {
        let e = edges[i];
        let a = e.xy;
        let b = e.zw;
        let side = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
        if (a.y <= p.y) {
            if (b.y > p.y && side > 0.0) {
                w += 1;
            }
        } else if (b.y <= p.y && side < 0.0) {
            w -= 1;
        }
    }
    return w;
}

@compute @workgroup_size(8, 8)
fn seed_main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (outside_grid(id)) {
        return;
    }
    let coord = vec2<f32>(id.xy);
    var seed = vec4<f32>(NO_SEED, NO_SEED, coord);
    if (winding(coord + vec2<f32>(0.5)) != 0) {
        seed = vec4<f32>(coord, NO_SEED, NO_SEED);
    }
    textureStore(dst, vec2<i32>(id.xy), seed);
}
"#;

/// One Jump Flooding round at `params.step`
pub const JFA_SHADER: &str = r#"
@compute @workgroup_size(8, 8)
fn jfa_main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (outside_grid(id)) {
        return;
    }
    let p = vec2<i32>(id.xy);
    let pf = vec2<f32>(id.xy);
    let size = vec2<i32>(params.size);
    let stride = i32(params.step);

    var best = textureLoad(src, p, 0);
    var best_in = seed_distance_sq(pf, best.xy);
    var best_out = seed_distance_sq(pf, best.zw);

    for (var dy = -1; dy <= 1; dy++) {
        for (var dx = -1; dx <= 1; dx++) {
            if (dx == 0 && dy == 0) {
                continue;
            }
            let q = p + vec2<i32>(dx, dy) * stride;
            if (q.x < 0 || q.y < 0 || q.x >= size.x || q.y >= size.y) {
                continue;
            }
            let candidate = textureLoad(src, q, 0);
            let d_in = seed_distance_sq(pf, candidate.xy);
            if (d_in < best_in) {
                best_in = d_in;
                best = vec4<f32>(candidate.xy, best.zw);
            }
            let d_out = seed_distance_sq(pf, candidate.zw);
            if (d_out < best_out) {
                best_out = d_out;
                best = vec4<f32>(best.xy, candidate.zw);
            }
        }
    }
    textureStore(dst, p, best);
}
"#;

/// Seeds to normalized signed distance, one copy per channel offset
pub const ENCODE_SHADER: &str = r#"
@compute @workgroup_size(8, 8)
fn encode_main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (outside_grid(id)) {
        return;
    }
    let p = vec2<i32>(id.xy);
    let pf = vec2<f32>(id.xy);
    let s = textureLoad(src, p, 0);
    let covered = s.x == pf.x && s.y == pf.y;

    let d_in = sqrt(seed_distance_sq(pf, s.xy));
    let d_out = sqrt(seed_distance_sq(pf, s.zw));
    var sd = d_in - 0.5;
    if (covered) {
        sd = -(d_out - 0.5);
    }
    sd = clamp(sd, -params.scale, params.scale);

    let o = params.offsets;
    textureStore(dst, p, vec4<f32>(
        (sd + o.x) / params.scale,
        (sd + o.y) / params.scale,
        (sd + o.z) / params.scale,
        select(0.0, 1.0, covered)
    ));
}
"#;

/// Anti-aliased coverage from an encoded field (stored in `r`)
pub const STAMP_SHADER: &str = r#"
fn median3(a: f32, b: f32, c: f32) -> f32 {
    return max(min(a, b), min(max(a, b), c));
}

@compute @workgroup_size(8, 8)
fn stamp_main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (outside_grid(id)) {
        return;
    }
    let p = vec2<i32>(id.xy);
    let t = textureLoad(src, p, 0);
    var n = t.x;
    if (params.channels == 3u) {
        n = median3(t.x, t.y, t.z);
    }
    let d = n * params.scale;
    let w = max(params.aa_width, 0.001);
    let coverage = 1.0 - smoothstep(-w, w, d);
    textureStore(dst, p, vec4<f32>(coverage, 0.0, 0.0, 1.0));
}
"#;

/// Workgroup edge length used by every pass
pub const WORKGROUP_SIZE: u32 = 8;

/// One compute pass: label, entry point and body
#[derive(Clone, Copy, Debug)]
pub struct ShaderPass {
    pub label: &'static str,
    pub entry_point: &'static str,
    pub body: &'static str,
}

pub const SEED_PASS: ShaderPass = ShaderPass {
    label: "Tegaki Seed",
    entry_point: "seed_main",
    body: SEED_SHADER,
};

pub const JFA_PASS: ShaderPass = ShaderPass {
    label: "Tegaki JFA",
    entry_point: "jfa_main",
    body: JFA_SHADER,
};

pub const ENCODE_PASS: ShaderPass = ShaderPass {
    label: "Tegaki Encode",
    entry_point: "encode_main",
    body: ENCODE_SHADER,
};

pub const STAMP_PASS: ShaderPass = ShaderPass {
    label: "Tegaki Stamp",
    entry_point: "stamp_main",
    body: STAMP_SHADER,
};

pub const ALL_PASSES: [ShaderPass; 4] = [SEED_PASS, JFA_PASS, ENCODE_PASS, STAMP_PASS];

impl ShaderPass {
    /// Full WGSL source for this pass
    pub fn source(&self) -> String {
        format!("{COMMON}\n{}", self.body)
    }

    /// Parse and validate the pass with naga, without a device
    pub fn validate(&self) -> Result<()> {
        let source = self.source();
        let module = naga::front::wgsl::parse_str(&source).map_err(|e| GpuError::ShaderCompile {
            label: self.label,
            message: e.emit_to_string(&source),
        })?;
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::empty(),
        )
        .validate(&module)
        .map_err(|e| GpuError::ShaderCompile {
            label: self.label,
            message: e.emit_to_string(&source),
        })?;
        if !module
            .entry_points
            .iter()
            .any(|ep| ep.name == self.entry_point)
        {
            return Err(GpuError::ShaderCompile {
                label: self.label,
                message: format!("missing entry point `{}`", self.entry_point),
            });
        }
        Ok(())
    }
}

/// Validate every pass
pub fn validate_all() -> Result<()> {
    ALL_PASSES.iter().try_for_each(ShaderPass::validate)
}
