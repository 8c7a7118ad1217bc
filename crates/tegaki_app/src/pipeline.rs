//! Pointer-driven stroke pipeline
//!
//! ```text
//! pointer sample -> TransformChain (screen -> canvas -> world -> local)
//!                -> StrokeRecorder
//! finalize       -> PolygonBuilder -> StrokeCompositor (tier chain)
//!                -> LayerStore commit -> CommittedStroke for the host history
//! ```
//!
//! The pipeline owns its collaborators; nothing is reached through globals.
//! Notifications go out through the [`StrokeEventDispatcher`] at the same
//! points every time: stroke started, sample dropped, fallback used, stroke
//! completed, layer modified, stroke cancelled.

use serde::{Deserialize, Serialize};
use tegaki_core::{
    BrushSettings, CancelToken, DropReason, LayerId, NodeId, PipelineConfig, PolygonBuilder,
    StrokeEvent, StrokeEventDispatcher, StrokePoint, StrokeRecorder, TransformChain,
    TransformError, TransformNode, Viewport,
};
use tegaki_paint::{Layer, LayerImage, LayerStore, VectorPreview};

use crate::compositor::StrokeCompositor;
use crate::error::{PipelineError, Result};
use crate::history::CommittedStroke;
use crate::probe::CapabilityProbe;
use crate::strategy::FieldStrategy;

/// Raw pointer sample; `client_x`/`client_y` are CSS pixels as reported by
/// the host pointer event
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerSample {
    pub client_x: f32,
    pub client_y: f32,
    pub pressure: f32,
    pub tilt_x: f32,
    pub tilt_y: f32,
    pub twist: f32,
    pub time_ms: u64,
}

impl Default for PointerSample {
    fn default() -> Self {
        Self {
            client_x: 0.0,
            client_y: 0.0,
            pressure: 1.0,
            tilt_x: 0.0,
            tilt_y: 0.0,
            twist: 0.0,
            time_ms: 0,
        }
    }
}

impl PointerSample {
    pub fn new(client_x: f32, client_y: f32, pressure: f32) -> Self {
        Self {
            client_x,
            client_y,
            pressure,
            ..Default::default()
        }
    }

    pub fn at(mut self, time_ms: u64) -> Self {
        self.time_ms = time_ms;
        self
    }
}

#[derive(Debug)]
struct ActiveStroke {
    layer: LayerId,
    node: NodeId,
    cancel: CancelToken,
    dropped: u32,
}

pub struct StrokePipeline {
    config: PipelineConfig,
    chain: TransformChain,
    recorder: StrokeRecorder,
    builder: PolygonBuilder,
    compositor: StrokeCompositor,
    layers: LayerStore,
    events: StrokeEventDispatcher,
    probe: Box<dyn CapabilityProbe>,
    active: Option<ActiveStroke>,
}

impl std::fmt::Debug for StrokePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrokePipeline")
            .field("layers", &self.layers.len())
            .field("compositor", &self.compositor)
            .field("active", &self.active)
            .finish()
    }
}

impl StrokePipeline {
    pub fn new(
        config: PipelineConfig,
        viewport: Viewport,
        probe: impl CapabilityProbe + 'static,
        strategy: FieldStrategy,
    ) -> Self {
        tracing::debug!(
            "stroke pipeline: preferred_tier={}, strategy={}",
            config.field.preferred_tier,
            strategy.name()
        );
        Self {
            chain: TransformChain::new(viewport, &config.transform),
            recorder: StrokeRecorder::new(config.recorder.clone()),
            builder: PolygonBuilder::new(config.polygon.clone()),
            compositor: StrokeCompositor::new(&config, strategy),
            layers: LayerStore::new(),
            events: StrokeEventDispatcher::new(),
            probe: Box::new(probe),
            active: None,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut TransformChain {
        &mut self.chain
    }

    pub fn layers(&self) -> &LayerStore {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut LayerStore {
        &mut self.layers
    }

    pub fn events(&self) -> &StrokeEventDispatcher {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut StrokeEventDispatcher {
        &mut self.events
    }

    pub fn compositor(&self) -> &StrokeCompositor {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut StrokeCompositor {
        &mut self.compositor
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Token of the stroke in progress; cancelling it discards the stroke's
    /// result at the next stage boundary
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.active.as_ref().map(|a| a.cancel.clone())
    }

    /// Create a layer whose transform node hangs under the world root
    pub fn add_layer(
        &mut self,
        name: impl Into<String>,
        width: u32,
        height: u32,
        node: TransformNode,
    ) -> Result<LayerId> {
        let node = self.chain.insert(node, self.chain.world())?;
        Ok(self.layers.insert(Layer::new(name, width, height, node)))
    }

    /// Recreate a layer's mask at a new size. Mask contents and attached
    /// stamps are discarded, so erasing history is lost.
    pub fn resize_layer(&mut self, layer: LayerId, width: u32, height: u32) -> Result<()> {
        self.layers.resize(layer, width, height)?;
        let region = self.layers.get(layer)?.bounds();
        self.events.dispatch(&StrokeEvent::LayerModified { layer, region });
        Ok(())
    }

    pub fn layer_thumbnail(&self, layer: LayerId, max_side: u32) -> Result<LayerImage> {
        Ok(self.layers.get(layer)?.thumbnail(max_side))
    }

    fn to_local(&mut self, node: NodeId, sample: &PointerSample) -> std::result::Result<StrokePoint, TransformError> {
        let p = self.chain.screen_to_local(sample.client_x, sample.client_y, node)?;
        Ok(StrokePoint {
            x: p.x,
            y: p.y,
            pressure: sample.pressure,
            tilt_x: sample.tilt_x,
            tilt_y: sample.tilt_y,
            twist: sample.twist,
            time_ms: sample.time_ms,
        }
        .normalized())
    }

    /// Pointer down on `layer`
    pub fn start_stroke(&mut self, layer: LayerId, sample: PointerSample, settings: BrushSettings) -> Result<()> {
        if self.active.is_some() {
            return Err(PipelineError::AlreadyActive);
        }
        let node = self.layers.get(layer)?.node();
        let point = match self.to_local(node, &sample) {
            Ok(point) => point,
            Err(e) => {
                tracing::warn!("stroke on layer {:?} not started: {}", layer, e);
                if matches!(e, TransformError::InvalidGeometry { .. }) {
                    self.events.dispatch(&StrokeEvent::SampleDropped {
                        layer,
                        reason: DropReason::NonFinite(e.to_string()),
                        dropped: 1,
                    });
                }
                return Err(e.into());
            }
        };

        self.recorder.start_stroke(point, settings, layer)?;
        self.active = Some(ActiveStroke {
            layer,
            node,
            cancel: CancelToken::new(),
            dropped: 0,
        });
        tracing::debug!("stroke started on layer {:?} at ({}, {})", layer, point.x, point.y);
        self.events.dispatch(&StrokeEvent::Started {
            layer,
            tool: settings.mode,
        });
        Ok(())
    }

    /// Pointer move. Returns the number of points added (interpolated
    /// points included).
    ///
    /// A sample that maps to non-finite coordinates is dropped with
    /// [`PipelineError::InvalidGeometry`] and the stroke stays active. A
    /// layer node that has been detached aborts the stroke.
    pub fn continue_stroke(&mut self, sample: PointerSample) -> Result<usize> {
        let (layer, node) = match &self.active {
            Some(active) => (active.layer, active.node),
            None => return Err(PipelineError::NoActiveStroke),
        };

        match self.to_local(node, &sample) {
            Ok(point) => Ok(self.recorder.add_point(point)?),
            Err(TransformError::DetachedNode(id)) => {
                tracing::warn!("layer {:?} detached mid-stroke; aborting", layer);
                self.abort();
                Err(PipelineError::DetachedNode(id))
            }
            Err(e) => {
                let dropped = match self.active.as_mut() {
                    Some(active) => {
                        active.dropped += 1;
                        active.dropped
                    }
                    None => 1,
                };
                tracing::warn!("dropped sample {} on layer {:?}: {}", dropped, layer, e);
                self.events.dispatch(&StrokeEvent::SampleDropped {
                    layer,
                    reason: DropReason::NonFinite(e.to_string()),
                    dropped,
                });
                Err(PipelineError::InvalidGeometry(e.to_string()))
            }
        }
    }

    /// Vector preview of the stroke in progress
    pub fn preview(&self) -> Option<VectorPreview> {
        let settings = self.recorder.settings()?;
        Some(self.compositor.render_preview(self.recorder.points(), &settings))
    }

    /// Pointer up. Renders the final stamp, commits it to the layer and
    /// returns the history entry.
    ///
    /// Distance-field failures never surface here: the stroke falls back to
    /// the vector tier and a `FallbackUsed` event is emitted instead.
    pub fn finalize_stroke(&mut self) -> Result<CommittedStroke> {
        let active = self.active.take().ok_or(PipelineError::NoActiveStroke)?;
        let layer = active.layer;
        let stroke = self.recorder.end_stroke()?;

        let clip = self.layers.get(layer)?.bounds();
        let polygon = self.builder.build_stroke(&stroke);
        let compute = self.probe.compute_available();

        let render = match self
            .compositor
            .render_final(&stroke, &polygon, clip, compute, &active.cancel)
        {
            Ok(Some(render)) => render,
            Ok(None) => return Err(PipelineError::OutsideLayer(layer)),
            Err(e) => {
                if e == PipelineError::Cancelled {
                    tracing::debug!("stroke on layer {:?} cancelled during render", layer);
                    self.events.dispatch(&StrokeEvent::Cancelled { layer });
                }
                return Err(e);
            }
        };

        if render.fell_back() {
            let reason = render
                .fallbacks
                .iter()
                .map(|f| format!("{}: {}", f.tier, f.reason))
                .collect::<Vec<_>>()
                .join("; ");
            self.events.dispatch(&StrokeEvent::FallbackUsed {
                layer,
                requested: render.requested,
                used: render.stamp.tier,
                reason,
            });
        }

        let tier = render.stamp.tier;
        let tool = stroke.tool;
        let region = render.stamp.region();
        let point_count = stroke.len();
        let (stamp, patch) = self.layers.commit_stamp(layer, render.stamp)?;

        tracing::debug!(
            "stroke committed: layer={:?}, points={}, tier={}, region={:?}",
            layer,
            point_count,
            tier,
            region
        );
        self.events.dispatch(&StrokeEvent::Completed {
            layer,
            tool,
            point_count,
            tier,
        });
        self.events.dispatch(&StrokeEvent::LayerModified { layer, region });

        Ok(CommittedStroke::new(layer, stamp, patch, point_count, tool, tier, region))
    }

    /// Tool switch or pointer capture loss. Returns false if no stroke was
    /// in progress.
    pub fn cancel_stroke(&mut self) -> bool {
        if self.active.is_none() {
            return false;
        }
        self.abort();
        true
    }

    fn abort(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            self.recorder.cancel();
            tracing::debug!("stroke on layer {:?} cancelled", active.layer);
            self.events.dispatch(&StrokeEvent::Cancelled {
                layer: active.layer,
            });
        }
    }

    /// Undo a committed stroke
    pub fn undo(&mut self, commit: &mut CommittedStroke) -> Result<bool> {
        let changed = commit.revert(&mut self.layers)?;
        if changed {
            self.events.dispatch(&StrokeEvent::LayerModified {
                layer: commit.layer,
                region: commit.region,
            });
        }
        Ok(changed)
    }

    /// Redo a reverted stroke
    pub fn redo(&mut self, commit: &mut CommittedStroke) -> Result<bool> {
        let changed = commit.apply(&mut self.layers)?;
        if changed {
            self.events.dispatch(&StrokeEvent::LayerModified {
                layer: commit.layer,
                region: commit.region,
            });
        }
        Ok(changed)
    }
}
