//! Undo/redo commands for committed strokes
//!
//! The pipeline hands one [`CommittedStroke`] to the host per finalized
//! stroke. Doing attaches the stamp and folds it into the mask; undoing
//! detaches the stamp and writes back the mask region captured before the
//! commit. Undo must run in LIFO order per layer, and then leaves the layer
//! bit-identical to its pre-stroke state.

use tegaki_core::{LayerId, PixelRect, RenderTier, Tool};
use tegaki_paint::{LayerStore, MaskPatch, StampId, StrokeStamp};

use crate::error::Result;

#[derive(Clone, Debug, PartialEq)]
enum CommitState {
    Attached {
        stamp: StampId,
        patch: Option<MaskPatch>,
    },
    Detached(StrokeStamp),
}

/// History entry for one finalized stroke
#[derive(Clone, Debug, PartialEq)]
pub struct CommittedStroke {
    pub layer: LayerId,
    pub point_count: usize,
    pub tool: Tool,
    pub tier: RenderTier,
    /// Layer pixels the stroke touched
    pub region: PixelRect,
    state: CommitState,
}

impl CommittedStroke {
    pub(crate) fn new(
        layer: LayerId,
        stamp: StampId,
        patch: Option<MaskPatch>,
        point_count: usize,
        tool: Tool,
        tier: RenderTier,
        region: PixelRect,
    ) -> Self {
        Self {
            layer,
            point_count,
            tool,
            tier,
            region,
            state: CommitState::Attached { stamp, patch },
        }
    }

    /// Whether the stroke is currently on its layer
    pub fn is_applied(&self) -> bool {
        matches!(self.state, CommitState::Attached { .. })
    }

    /// Handle of the attached stamp
    pub fn stamp_id(&self) -> Option<StampId> {
        match &self.state {
            CommitState::Attached { stamp, .. } => Some(*stamp),
            CommitState::Detached(_) => None,
        }
    }

    /// Undo. Returns false if the stroke was not applied or its stamp is gone
    /// (the layer was resized since).
    ///
    /// Only the most recent stroke still applied on the layer can be undone.
    /// Restoring the mask captured before an older stroke would overwrite
    /// the mask writes of every stroke after it, so that case fails with
    /// [`UndoOutOfOrder`](crate::PipelineError::UndoOutOfOrder) and leaves the layer untouched.
    pub fn revert(&mut self, layers: &mut LayerStore) -> Result<bool> {
        let CommitState::Attached { stamp, patch } = &self.state else {
            return Ok(false);
        };
        match layers.revert_stamp(self.layer, *stamp, patch.as_ref())? {
            Some(removed) => {
                self.state = CommitState::Detached(removed);
                Ok(true)
            }
            None => {
                tracing::warn!("stamp for layer {:?} no longer attached", self.layer);
                Ok(false)
            }
        }
    }

    /// Redo. Returns false if the stroke is already applied.
    pub fn apply(&mut self, layers: &mut LayerStore) -> Result<bool> {
        let CommitState::Detached(stamp) = &self.state else {
            return Ok(false);
        };
        let (stamp, patch) = layers.commit_stamp(self.layer, stamp.clone())?;
        self.state = CommitState::Attached { stamp, patch };
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use tegaki_core::{BrushSettings, NodeId};
    use tegaki_paint::{CoverageMap, Layer};

    fn store_with_stamp() -> (LayerStore, CommittedStroke) {
        let mut layers = LayerStore::new();
        let layer = layers.insert(Layer::new("ink", 16, 16, NodeId::default()));
        let coverage = CoverageMap::from_fn(PixelRect::new(2, 2, 6, 6), |_| 1.0);
        let stamp = StrokeStamp::new(coverage, &BrushSettings::eraser(4.0), RenderTier::Sdf);
        let region = stamp.region();
        let (id, patch) = layers.commit_stamp(layer, stamp).unwrap();
        let commit = CommittedStroke::new(layer, id, patch, 2, Tool::Eraser, RenderTier::Sdf, region);
        (layers, commit)
    }

    #[test]
    fn test_revert_and_apply() {
        let (mut layers, mut commit) = store_with_stamp();
        let layer = commit.layer;
        assert_eq!(layers.get(layer).unwrap().mask().get(3, 3), Some(0.0));

        assert!(commit.revert(&mut layers).unwrap());
        assert!(!commit.is_applied());
        assert_eq!(layers.get(layer).unwrap().stamp_count(), 0);
        assert_eq!(layers.get(layer).unwrap().mask().get(3, 3), Some(1.0));
        assert!(!commit.revert(&mut layers).unwrap());

        assert!(commit.apply(&mut layers).unwrap());
        assert!(commit.stamp_id().is_some());
        assert_eq!(layers.get(layer).unwrap().mask().get(3, 3), Some(0.0));
        assert!(!commit.apply(&mut layers).unwrap());
    }

    #[test]
    fn test_revert_out_of_order_rejected() {
        let (mut layers, mut first) = store_with_stamp();
        let layer = first.layer;
        let coverage = CoverageMap::from_fn(PixelRect::new(4, 4, 6, 6), |_| 1.0);
        let stamp = StrokeStamp::new(coverage, &BrushSettings::default(), RenderTier::Sdf);
        let region = stamp.region();
        let (id, patch) = layers.commit_stamp(layer, stamp).unwrap();
        let mut second = CommittedStroke::new(layer, id, patch, 2, Tool::Pen, RenderTier::Sdf, region);
        let before = layers.get(layer).unwrap().composite();

        assert_eq!(
            first.revert(&mut layers),
            Err(PipelineError::UndoOutOfOrder(layer))
        );
        assert!(first.is_applied());
        assert_eq!(layers.get(layer).unwrap().composite(), before);

        assert!(second.revert(&mut layers).unwrap());
        assert!(first.revert(&mut layers).unwrap());
        assert_eq!(layers.get(layer).unwrap().mask().get(5, 5), Some(1.0));
    }

    #[test]
    fn test_revert_after_resize() {
        let (mut layers, mut commit) = store_with_stamp();
        layers.resize(commit.layer, 32, 32).unwrap();
        assert!(!commit.revert(&mut layers).unwrap());
        assert!(commit.is_applied());
    }
}
