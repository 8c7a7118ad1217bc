//! Coverage rasters
//!
//! A `CoverageMap` holds one coverage value in [0, 1] per pixel of a region in
//! layer pixel space. Stamps, masks and the fallback renderer all exchange
//! pixels through it.

use serde::{Deserialize, Serialize};
use tegaki_core::{PixelRect, Point};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoverageMap {
    region: PixelRect,
    data: Vec<f32>,
}

impl CoverageMap {
    /// Empty (all zero) coverage over `region`
    pub fn new(region: PixelRect) -> Self {
        Self {
            region,
            data: vec![0.0; region.area()],
        }
    }

    /// Fill `region` by evaluating `f` at every pixel center
    pub fn from_fn(region: PixelRect, mut f: impl FnMut(Point) -> f32) -> Self {
        let mut data = Vec::with_capacity(region.area());
        for y in 0..region.height as i32 {
            for x in 0..region.width as i32 {
                let center = Point::new(
                    (region.x + x) as f32 + 0.5,
                    (region.y + y) as f32 + 0.5,
                );
                data.push(f(center).clamp(0.0, 1.0));
            }
        }
        Self { region, data }
    }

    pub fn region(&self) -> PixelRect {
        self.region
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let r = self.region;
        if x < r.x || y < r.y || x >= r.max_x() || y >= r.max_y() {
            return None;
        }
        Some((y - r.y) as usize * r.width as usize + (x - r.x) as usize)
    }

    /// Coverage at layer pixel (x, y); zero outside the region
    pub fn get(&self, x: i32, y: i32) -> f32 {
        self.index(x, y).map_or(0.0, |i| self.data[i])
    }

    pub fn set(&mut self, x: i32, y: i32, value: f32) {
        if let Some(i) = self.index(x, y) {
            self.data[i] = value.clamp(0.0, 1.0);
        }
    }

    /// Sum of all coverage values
    pub fn total(&self) -> f32 {
        self.data.iter().sum()
    }

    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(0.0, f32::max)
    }

    /// Tight pixel bounds of non-zero coverage
    pub fn covered_region(&self) -> Option<PixelRect> {
        let r = self.region;
        let (mut x0, mut y0, mut x1, mut y1) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
        for y in 0..r.height as i32 {
            for x in 0..r.width as i32 {
                if self.data[y as usize * r.width as usize + x as usize] > 0.0 {
                    x0 = x0.min(x);
                    y0 = y0.min(y);
                    x1 = x1.max(x);
                    y1 = y1.max(y);
                }
            }
        }
        (x1 >= x0).then(|| {
            PixelRect::new(
                r.x + x0,
                r.y + y0,
                (x1 - x0 + 1) as u32,
                (y1 - y0 + 1) as u32,
            )
        })
    }

    /// Copy restricted to `clip`; `None` if they do not overlap
    pub fn clipped(&self, clip: &PixelRect) -> Option<CoverageMap> {
        let region = self.region.intersect(clip)?;
        let mut out = CoverageMap::new(region);
        for y in region.y..region.max_y() {
            for x in region.x..region.max_x() {
                out.set(x, y, self.get(x, y));
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fn_and_lookup() {
        let map = CoverageMap::from_fn(PixelRect::new(-2, 3, 4, 2), |p| {
            if p.x > 0.0 {
                1.0
            } else {
                0.25
            }
        });
        assert_eq!(map.get(-2, 3), 0.25);
        assert_eq!(map.get(1, 4), 1.0);
        assert_eq!(map.get(2, 4), 0.0);
        assert_eq!(map.total(), 4.0 * 0.25 + 4.0 * 1.0);
    }

    #[test]
    fn test_covered_region() {
        let mut map = CoverageMap::new(PixelRect::new(0, 0, 10, 10));
        assert_eq!(map.covered_region(), None);
        map.set(3, 4, 0.5);
        map.set(6, 5, 2.0);
        assert_eq!(map.get(6, 5), 1.0);
        assert_eq!(map.covered_region(), Some(PixelRect::new(3, 4, 4, 2)));
    }

    #[test]
    fn test_clipped() {
        let map = CoverageMap::from_fn(PixelRect::new(0, 0, 8, 8), |_| 1.0);
        let clipped = map.clipped(&PixelRect::new(6, 6, 10, 10)).unwrap();
        assert_eq!(clipped.region(), PixelRect::new(6, 6, 2, 2));
        assert!(map.clipped(&PixelRect::new(20, 20, 2, 2)).is_none());
    }
}
