//! Pointer script replay
//!
//! A script describes a canvas, its layers and a list of strokes as raw
//! pointer samples. Replaying feeds every sample through the full pipeline
//! and reports what each stroke produced.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tegaki_app::{
    CapabilityProbe, CommittedStroke, FieldStrategy, GpuProbe, PipelineError, PointerSample,
    StaticProbe, StrokePipeline,
};
use tegaki_core::{
    BrushSettings, CanvasRect, LayerId, PipelineConfig, PixelRect, RenderTier, Size, StrokeEvent,
    TransformNode, Viewport,
};
use tegaki_paint::SoftwareFieldGenerator;

/// Which distance-field backend the replay uses
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// wgpu compute, probed at startup
    Gpu,
    /// CPU Jump Flooding
    Software,
    /// Vector tier only
    Vector,
}

enum Probe {
    Gpu(GpuProbe),
    Static(StaticProbe),
}

impl CapabilityProbe for Probe {
    fn compute_available(&self) -> bool {
        match self {
            Probe::Gpu(probe) => probe.compute_available(),
            Probe::Static(probe) => probe.compute_available(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CanvasDef {
    pub width: f32,
    pub height: f32,
    /// Backing store pixels per CSS pixel, used when `rect` is absent
    pub device_pixel_ratio: f32,
    /// Canvas bounding box in CSS pixels; defaults to the canvas size
    /// divided by `device_pixel_ratio`, at the origin
    pub rect: Option<[f32; 4]>,
}

impl Default for CanvasDef {
    fn default() -> Self {
        Self {
            width: 256.0,
            height: 256.0,
            device_pixel_ratio: 1.0,
            rect: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LayerDef {
    pub name: String,
    /// Defaults to the canvas size
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub position: [f32; 2],
    pub scale: [f32; 2],
    pub rotation: f32,
    pub pivot: [f32; 2],
    /// Name of an earlier layer to nest under
    pub parent: Option<String>,
}

impl Default for LayerDef {
    fn default() -> Self {
        Self {
            name: "layer".to_string(),
            width: None,
            height: None,
            position: [0.0; 2],
            scale: [1.0; 2],
            rotation: 0.0,
            pivot: [0.0; 2],
            parent: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct StrokeDef {
    pub layer: String,
    #[serde(default)]
    pub brush: BrushSettings,
    pub samples: Vec<PointerSample>,
    /// Cancel instead of finalizing (tool switch mid-stroke)
    #[serde(default)]
    pub cancel: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Script {
    pub canvas: CanvasDef,
    pub layers: Vec<LayerDef>,
    pub strokes: Vec<StrokeDef>,
    /// Undo this many of the last committed strokes after replaying
    pub undo: usize,
}

impl Script {
    pub fn from_json(content: &str) -> Result<Self> {
        let script: Script = serde_json::from_str(content).context("invalid replay script")?;
        if script.layers.is_empty() {
            bail!("replay script defines no layers");
        }
        Ok(script)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeStatus {
    Committed,
    Cancelled,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct StrokeReport {
    pub index: usize,
    pub layer: String,
    pub status: StrokeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<RenderTier>,
    pub point_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<PixelRect>,
    pub dropped_samples: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LayerReport {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub stamps: usize,
    /// Sum of composited alpha
    pub ink: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplayReport {
    pub backend: String,
    pub strokes: Vec<StrokeReport>,
    pub undone: usize,
    pub layers: Vec<LayerReport>,
}

fn build_pipeline(script: &Script, config: PipelineConfig, backend: Backend) -> StrokePipeline {
    let canvas = &script.canvas;
    let dpr = if canvas.device_pixel_ratio > 0.0 {
        canvas.device_pixel_ratio
    } else {
        1.0
    };
    let [left, top, width, height] = canvas
        .rect
        .unwrap_or([0.0, 0.0, canvas.width / dpr, canvas.height / dpr]);
    let viewport = Viewport::fixed(
        Size::new(canvas.width, canvas.height),
        CanvasRect::new(left, top, width, height),
    );

    let (probe, strategy) = match backend {
        Backend::Gpu => (Probe::Gpu(GpuProbe::new()), FieldStrategy::gpu(&config.field)),
        Backend::Software => (
            Probe::Static(StaticProbe(true)),
            FieldStrategy::Software(SoftwareFieldGenerator::new()),
        ),
        Backend::Vector => (Probe::Static(StaticProbe(false)), FieldStrategy::None),
    };
    StrokePipeline::new(config, viewport, probe, strategy)
}

fn add_layers(pipeline: &mut StrokePipeline, script: &Script) -> Result<HashMap<String, LayerId>> {
    let mut ids = HashMap::new();
    for def in &script.layers {
        let node = TransformNode::new()
            .with_position(def.position[0], def.position[1])
            .with_scale(def.scale[0], def.scale[1])
            .with_rotation(def.rotation)
            .with_pivot(def.pivot[0], def.pivot[1]);
        let width = def.width.unwrap_or(script.canvas.width.max(1.0) as u32);
        let height = def.height.unwrap_or(script.canvas.height.max(1.0) as u32);
        let id = pipeline
            .add_layer(def.name.clone(), width, height, node)
            .with_context(|| format!("adding layer `{}`", def.name))?;

        if let Some(parent) = &def.parent {
            let parent_id = ids
                .get(parent)
                .with_context(|| format!("layer `{}` nests under unknown layer `{}`", def.name, parent))?;
            let parent_node = pipeline.layers().get(*parent_id)?.node();
            let node = pipeline.layers().get(id)?.node();
            pipeline.chain_mut().set_parent(node, Some(parent_node))?;
        }
        ids.insert(def.name.clone(), id);
    }
    Ok(ids)
}

fn replay_stroke(
    pipeline: &mut StrokePipeline,
    layer: LayerId,
    def: &StrokeDef,
) -> std::result::Result<Option<CommittedStroke>, PipelineError> {
    let Some((first, rest)) = def.samples.split_first() else {
        return Err(PipelineError::NoActiveStroke);
    };
    pipeline.start_stroke(layer, *first, def.brush)?;
    for sample in rest {
        match pipeline.continue_stroke(*sample) {
            Ok(_) | Err(PipelineError::InvalidGeometry(_)) => {}
            Err(e) => return Err(e),
        }
    }
    if def.cancel {
        pipeline.cancel_stroke();
        return Ok(None);
    }
    pipeline.finalize_stroke().map(Some)
}

/// Run `script` and summarize every stroke
pub fn replay(script: &Script, config: PipelineConfig, backend: Backend) -> Result<ReplayReport> {
    let mut pipeline = build_pipeline(script, config, backend);
    let layers = add_layers(&mut pipeline, script)?;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    pipeline.events_mut().register_all(move |event: &StrokeEvent| {
        if let Ok(mut log) = sink.lock() {
            log.push(event.clone());
        }
    });

    let mut reports = Vec::with_capacity(script.strokes.len());
    let mut commits = Vec::new();
    for (index, def) in script.strokes.iter().enumerate() {
        let layer = *layers
            .get(&def.layer)
            .with_context(|| format!("stroke {} targets unknown layer `{}`", index, def.layer))?;

        let outcome = replay_stroke(&mut pipeline, layer, def);
        let stroke_events: Vec<StrokeEvent> = events
            .lock()
            .map(|mut log| log.drain(..).collect())
            .unwrap_or_default();

        let mut report = StrokeReport {
            index,
            layer: def.layer.clone(),
            status: StrokeStatus::Failed,
            tier: None,
            point_count: 0,
            region: None,
            dropped_samples: 0,
            fallback: None,
            error: None,
        };
        for event in &stroke_events {
            match event {
                StrokeEvent::SampleDropped { dropped, .. } => report.dropped_samples = *dropped,
                StrokeEvent::FallbackUsed { reason, .. } => report.fallback = Some(reason.clone()),
                _ => {}
            }
        }

        match outcome {
            Ok(Some(commit)) => {
                report.status = StrokeStatus::Committed;
                report.tier = Some(commit.tier);
                report.point_count = commit.point_count;
                report.region = Some(commit.region);
                commits.push(commit);
            }
            Ok(None) => report.status = StrokeStatus::Cancelled,
            Err(e) => {
                pipeline.cancel_stroke();
                tracing::warn!("stroke {} failed: {}", index, e);
                report.error = Some(e.to_string());
            }
        }
        reports.push(report);
    }

    let mut undone = 0;
    while undone < script.undo {
        let Some(mut commit) = commits.pop() else {
            break;
        };
        if pipeline.undo(&mut commit)? {
            undone += 1;
        }
    }

    let layer_reports = script
        .layers
        .iter()
        .filter_map(|def| {
            let layer = pipeline.layers().get(*layers.get(&def.name)?).ok()?;
            let image = layer.composite();
            Some(LayerReport {
                name: def.name.clone(),
                width: layer.width(),
                height: layer.height(),
                stamps: layer.stamp_count(),
                ink: image.pixels.iter().map(|p| p[3]).sum(),
            })
        })
        .collect();

    Ok(ReplayReport {
        backend: pipeline.compositor().strategy().name().to_string(),
        strokes: reports,
        undone,
        layers: layer_reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"{
        "canvas": { "width": 64, "height": 64 },
        "layers": [
            { "name": "base" },
            { "name": "detail", "position": [8, 8], "parent": "base" }
        ],
        "strokes": [
            {
                "layer": "base",
                "brush": { "size": 4, "color": { "r": 0, "g": 0, "b": 0 } },
                "samples": [
                    { "client_x": 10, "client_y": 10 },
                    { "client_x": 20, "client_y": 10, "time_ms": 16 }
                ]
            },
            {
                "layer": "detail",
                "brush": { "size": 6, "mode": "eraser" },
                "samples": [{ "client_x": 30, "client_y": 30 }]
            },
            {
                "layer": "base",
                "samples": [{ "client_x": 5, "client_y": 5 }, { "client_x": 40, "client_y": 5 }],
                "cancel": true
            },
            {
                "layer": "base",
                "samples": [{ "client_x": 30, "client_y": 40 }, { "client_x": 50, "client_y": 40 }]
            }
        ],
        "undo": 1
    }"#;

    #[test]
    fn test_script_parses_with_defaults() {
        let script = Script::from_json(SCRIPT).unwrap();
        assert_eq!(script.layers[0].scale, [1.0, 1.0]);
        assert_eq!(script.strokes[0].samples[0].pressure, 1.0);
        assert_eq!(script.strokes[2].brush, BrushSettings::default());
        assert!(script.strokes[2].cancel);
    }

    #[test]
    fn test_replay_software() {
        let script = Script::from_json(SCRIPT).unwrap();
        let report = replay(&script, PipelineConfig::default(), Backend::Software).unwrap();

        assert_eq!(report.backend, "software");
        let statuses: Vec<_> = report.strokes.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StrokeStatus::Committed,
                StrokeStatus::Committed,
                StrokeStatus::Cancelled,
                StrokeStatus::Committed
            ]
        );
        assert_eq!(report.strokes[0].tier, Some(RenderTier::Msdf));
        assert_eq!(report.undone, 1);
        assert_eq!(report.layers[0].stamps, 1);
        assert!(report.layers[0].ink > 0.0);
    }

    #[test]
    fn test_replay_vector_reports_fallback() {
        let script = Script::from_json(SCRIPT).unwrap();
        let report = replay(&script, PipelineConfig::default(), Backend::Vector).unwrap();
        assert_eq!(report.strokes[0].tier, Some(RenderTier::Vector));
        assert!(report.strokes[0].fallback.is_some());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"cancelled\""));
    }

    #[test]
    fn test_unknown_layer_rejected() {
        let script = Script::from_json(
            r#"{ "layers": [{ "name": "a" }], "strokes": [{ "layer": "b", "samples": [] }] }"#,
        )
        .unwrap();
        assert!(replay(&script, PipelineConfig::default(), Backend::Vector).is_err());
    }

    #[test]
    fn test_script_without_layers_rejected() {
        assert!(Script::from_json("{}").is_err());
    }
}
