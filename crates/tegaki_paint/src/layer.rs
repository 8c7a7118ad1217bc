//! Layers and the layer store
//!
//! A layer owns the stamps committed to it (in draw order), its alpha mask
//! and a handle to its transform node. Composition is a pure function of
//! that state, so detaching a stamp and restoring the mask region it touched
//! brings back the exact previous pixels.

use slotmap::{new_key_type, SlotMap};
use tegaki_core::transform::NodeId;
use tegaki_core::{LayerId, PixelRect, StrokePolygon};

use crate::error::{PaintError, Result};
use crate::mask::{LayerMask, MaskMode, MaskPatch};
use crate::stamp::StrokeStamp;

new_key_type! {
    /// Handle to a stamp attached to a layer
    pub struct StampId;
}

/// Premultiplied RGBA image
#[derive(Clone, Debug, PartialEq)]
pub struct LayerImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

impl LayerImage {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        (x < self.width && y < self.height)
            .then(|| self.pixels[y as usize * self.width as usize + x as usize])
    }

    /// Straight (non-premultiplied) 8-bit RGBA
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for &[r, g, b, a] in &self.pixels {
            let unpremul = |c: f32| if a > 0.0 { c / a } else { 0.0 };
            let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            out.extend_from_slice(&[byte(unpremul(r)), byte(unpremul(g)), byte(unpremul(b)), byte(a)]);
        }
        out
    }
}

#[derive(Debug)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
    node: NodeId,
    mask: LayerMask,
    stamps: SlotMap<StampId, StrokeStamp>,
    order: Vec<StampId>,
}

impl Layer {
    pub fn new(name: impl Into<String>, width: u32, height: u32, node: NodeId) -> Self {
        Self {
            name: name.into(),
            visible: true,
            node,
            mask: LayerMask::new(width, height),
            stamps: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn bounds(&self) -> PixelRect {
        self.mask.bounds()
    }

    pub fn mask(&self) -> &LayerMask {
        &self.mask
    }

    pub fn mask_mut(&mut self) -> &mut LayerMask {
        &mut self.mask
    }

    pub fn stamp_count(&self) -> usize {
        self.order.len()
    }

    pub fn stamp(&self, id: StampId) -> Option<&StrokeStamp> {
        self.stamps.get(id)
    }

    /// Stamps in draw order
    pub fn stamps(&self) -> impl Iterator<Item = (StampId, &StrokeStamp)> {
        self.order.iter().map(|id| (*id, &self.stamps[*id]))
    }

    /// Most recently attached stamp
    pub fn top_stamp(&self) -> Option<StampId> {
        self.order.last().copied()
    }

    /// Attach a stamp on top of the existing ones
    pub fn attach(&mut self, stamp: StrokeStamp) -> StampId {
        let id = self.stamps.insert(stamp);
        self.order.push(id);
        id
    }

    /// Detach and return a stamp
    pub fn detach(&mut self, id: StampId) -> Option<StrokeStamp> {
        let stamp = self.stamps.remove(id)?;
        self.order.retain(|other| *other != id);
        Some(stamp)
    }

    /// Recreate the mask at a new size and drop every stamp. Nothing is
    /// carried over; erasing history is lost.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.mask.resize(width, height);
        self.stamps.clear();
        self.order.clear();
    }

    /// Source-over of every pen stamp, multiplied by the mask
    pub fn composite(&self) -> LayerImage {
        let (w, h) = (self.width(), self.height());
        let bounds = self.bounds();
        let mut pixels = vec![[0.0f32; 4]; w as usize * h as usize];

        for (_, stamp) in self.stamps() {
            if stamp.is_eraser() {
                continue;
            }
            let Some(region) = stamp.region().intersect(&bounds) else {
                continue;
            };
            for y in region.y..region.max_y() {
                for x in region.x..region.max_x() {
                    let alpha = stamp.alpha_at(x, y);
                    if alpha <= 0.0 {
                        continue;
                    }
                    let src = stamp.color.premultiplied(alpha);
                    let dst = &mut pixels[y as usize * w as usize + x as usize];
                    for c in 0..4 {
                        dst[c] = src[c] + dst[c] * (1.0 - alpha);
                    }
                }
            }
        }

        for (px, m) in pixels.iter_mut().zip(self.mask.values()) {
            for c in px.iter_mut() {
                *c *= m;
            }
        }

        LayerImage {
            width: w,
            height: h,
            pixels,
        }
    }

    /// Box-filtered preview no larger than `max_side` on either axis
    pub fn thumbnail(&self, max_side: u32) -> LayerImage {
        let full = self.composite();
        let max_side = max_side.max(1);
        let factor = full.width.max(full.height).div_ceil(max_side).max(1);
        if factor == 1 {
            return full;
        }
        let tw = full.width.div_ceil(factor);
        let th = full.height.div_ceil(factor);
        let mut pixels = Vec::with_capacity(tw as usize * th as usize);
        for ty in 0..th {
            for tx in 0..tw {
                let mut sum = [0.0f32; 4];
                let mut count = 0.0;
                for y in ty * factor..((ty + 1) * factor).min(full.height) {
                    for x in tx * factor..((tx + 1) * factor).min(full.width) {
                        let p = full.pixels[y as usize * full.width as usize + x as usize];
                        for c in 0..4 {
                            sum[c] += p[c];
                        }
                        count += 1.0;
                    }
                }
                pixels.push(sum.map(|v| v / count));
            }
        }
        LayerImage {
            width: tw,
            height: th,
            pixels,
        }
    }
}

/// All layers of a document, keyed by `LayerId`
#[derive(Debug, Default)]
pub struct LayerStore {
    layers: SlotMap<LayerId, Layer>,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, layer: Layer) -> LayerId {
        self.layers.insert(layer)
    }

    pub fn remove(&mut self, id: LayerId) -> Option<Layer> {
        self.layers.remove(id)
    }

    pub fn get(&self, id: LayerId) -> Result<&Layer> {
        self.layers.get(id).ok_or(PaintError::UnknownLayer(id))
    }

    pub fn get_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.layers.get_mut(id).ok_or(PaintError::UnknownLayer(id))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.layers.keys()
    }

    /// Step the mask under `polygon` by one unit, clamped. Returns the
    /// touched region.
    pub fn add_polygon_to_mask(
        &mut self,
        id: LayerId,
        polygon: &StrokePolygon,
        mode: MaskMode,
    ) -> Result<PixelRect> {
        self.get_mut(id)?
            .mask
            .add_polygon(polygon, mode)
            .ok_or(PaintError::OutsideLayer)
    }

    /// Attach a stamp and fold its coverage into the mask in one step.
    /// Returns the stamp handle and the pre-update mask patch for undo.
    pub fn commit_stamp(&mut self, id: LayerId, stamp: StrokeStamp) -> Result<(StampId, Option<MaskPatch>)> {
        let layer = self.get_mut(id)?;
        let mode = MaskMode::for_tool(stamp.tool);
        let patch = layer.mask.snapshot(stamp.region());
        if patch.is_some() {
            layer
                .mask
                .apply_coverage(&stamp.coverage, stamp.opacity, mode);
        }
        let stamp_id = layer.attach(stamp);
        Ok((stamp_id, patch))
    }

    /// Undo `commit_stamp`: detach the stamp and restore the mask patch.
    ///
    /// The patch holds the mask as it was before this commit, so restoring it
    /// under a later commit would wipe that commit's mask writes. Only the
    /// topmost stamp can be reverted; anything else fails with
    /// [`PaintError::NotTopmost`]. Returns `None` if the stamp is no longer
    /// attached.
    pub fn revert_stamp(
        &mut self,
        id: LayerId,
        stamp: StampId,
        patch: Option<&MaskPatch>,
    ) -> Result<Option<StrokeStamp>> {
        let layer = self.get_mut(id)?;
        if layer.stamp(stamp).is_none() {
            return Ok(None);
        }
        if layer.top_stamp() != Some(stamp) {
            return Err(PaintError::NotTopmost(id));
        }
        let removed = layer.detach(stamp);
        if let Some(patch) = patch {
            if !layer.mask.restore(patch) {
                tracing::warn!("mask patch no longer fits layer {:?}; skipped", id);
            }
        }
        Ok(removed)
    }

    /// Resize a layer, clearing its mask and stamps
    pub fn resize(&mut self, id: LayerId, width: u32, height: u32) -> Result<()> {
        self.get_mut(id)?.resize(width, height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::CoverageMap;
    use tegaki_core::{BrushSettings, Color, RenderTier};

    fn layer() -> Layer {
        Layer::new("base", 8, 8, NodeId::default())
    }

    fn stamp(settings: BrushSettings) -> StrokeStamp {
        let coverage = CoverageMap::from_fn(PixelRect::new(2, 2, 4, 4), |_| 1.0);
        StrokeStamp::new(coverage, &settings, RenderTier::Sdf)
    }

    #[test]
    fn test_composite_premultiplied() {
        let mut layer = layer();
        layer.attach(stamp(BrushSettings::pen(1.0, Color::RED).with_opacity(0.5)));
        let image = layer.composite();
        assert_eq!(image.pixel(3, 3), Some([0.5, 0.0, 0.0, 0.5]));
        assert_eq!(image.pixel(0, 0), Some([0.0; 4]));
        assert_eq!(&image.to_rgba8()[(3 * 8 + 3) * 4..(3 * 8 + 3) * 4 + 4], &[255, 0, 0, 128]);
    }

    #[test]
    fn test_commit_and_revert_restore_pixels() {
        let mut store = LayerStore::new();
        let id = store.insert(layer());
        store
            .commit_stamp(id, stamp(BrushSettings::pen(1.0, Color::BLACK)))
            .unwrap();
        let before = store.get(id).unwrap().composite();

        let (eraser, patch) = store.commit_stamp(id, stamp(BrushSettings::eraser(1.0))).unwrap();
        let erased = store.get(id).unwrap().composite();
        assert_eq!(erased.pixel(3, 3).map(|p| p[3]), Some(0.0));

        store.revert_stamp(id, eraser, patch.as_ref()).unwrap();
        assert_eq!(store.get(id).unwrap().composite(), before);
    }

    #[test]
    fn test_revert_rejects_buried_stamp() {
        let mut store = LayerStore::new();
        let id = store.insert(layer());
        let (first, first_patch) = store.commit_stamp(id, stamp(BrushSettings::eraser(1.0))).unwrap();
        let (second, second_patch) = store
            .commit_stamp(id, stamp(BrushSettings::pen(1.0, Color::BLACK)))
            .unwrap();
        let mask_before = store.get(id).unwrap().mask().clone();

        assert_eq!(
            store.revert_stamp(id, first, first_patch.as_ref()),
            Err(PaintError::NotTopmost(id))
        );
        assert_eq!(store.get(id).unwrap().stamp_count(), 2);
        assert_eq!(store.get(id).unwrap().mask(), &mask_before);

        assert!(store.revert_stamp(id, second, second_patch.as_ref()).unwrap().is_some());
        assert!(store.revert_stamp(id, first, first_patch.as_ref()).unwrap().is_some());
        assert_eq!(store.get(id).unwrap().mask().get(3, 3), Some(1.0));
        assert_eq!(store.revert_stamp(id, first, first_patch.as_ref()), Ok(None));
    }

    #[test]
    fn test_thumbnail_downsamples() {
        let mut layer = Layer::new("big", 64, 32, NodeId::default());
        layer.attach(StrokeStamp::new(
            CoverageMap::from_fn(PixelRect::new(0, 0, 64, 32), |_| 1.0),
            &BrushSettings::pen(1.0, Color::WHITE),
            RenderTier::Vector,
        ));
        let thumb = layer.thumbnail(16);
        assert_eq!((thumb.width, thumb.height), (16, 8));
        assert_eq!(thumb.pixel(5, 5), Some([1.0; 4]));
    }

    #[test]
    fn test_unknown_layer() {
        let mut store = LayerStore::new();
        let id = store.insert(layer());
        store.remove(id);
        assert_eq!(
            store.resize(id, 4, 4).unwrap_err(),
            PaintError::UnknownLayer(id)
        );
    }
}
