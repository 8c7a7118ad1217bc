//! Core geometry types
//!
//! Points, vectors, rectangles and 2D affine matrices shared by every stage
//! of the stroke pipeline. All values are `f32`, matching what the GPU side
//! consumes.

use serde::{Deserialize, Serialize};

/// 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: Point) -> f32 {
        (*self - other).length()
    }

    pub fn distance_squared(&self, other: Point) -> f32 {
        let d = *self - other;
        d.x * d.x + d.y * d.y
    }

    /// Linear interpolation towards `other`
    pub fn lerp(&self, other: Point, t: f32) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    pub fn to_array(&self) -> [f32; 2] {
        [self.x, self.y]
    }
}

impl std::ops::Sub for Point {
    type Output = Vec2;

    fn sub(self, rhs: Point) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Add<Vec2> for Point {
    type Output = Point;

    fn add(self, rhs: Vec2) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub<Vec2> for Point {
    type Output = Point;

    fn sub(self, rhs: Vec2) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// 2D size
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// 2D vector
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const ONE: Vec2 = Vec2 { x: 1.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self::new(self.x / len, self.y / len)
        } else {
            Self::ZERO
        }
    }

    /// Counter-clockwise perpendicular (in a y-down space this points to the left
    /// of the direction of travel)
    pub fn perp(&self) -> Self {
        Self::new(-self.y, self.x)
    }

    pub fn dot(&self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product
    pub fn cross(&self, other: Vec2) -> f32 {
        self.x * other.y - self.y * other.x
    }

    pub fn scaled(&self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// Axis-aligned rectangle
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        origin: Point::ZERO,
        size: Size::ZERO,
    };

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    /// Build from min/max corners
    pub fn from_min_max(min: Point, max: Point) -> Self {
        Self::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    /// Smallest rect containing every point, or `None` for an empty iterator
    pub fn bounding<I: IntoIterator<Item = Point>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min, mut max) = (first, first);
        for p in iter {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some(Self::from_min_max(min, max))
    }

    pub fn x(&self) -> f32 {
        self.origin.x
    }

    pub fn y(&self) -> f32 {
        self.origin.y
    }

    pub fn width(&self) -> f32 {
        self.size.width
    }

    pub fn height(&self) -> f32 {
        self.size.height
    }

    pub fn max_x(&self) -> f32 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f32 {
        self.origin.y + self.size.height
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.x <= self.max_x()
            && point.y >= self.origin.y
            && point.y <= self.max_y()
    }

    /// Grow the rect by `amount` on every side
    pub fn outset(&self, amount: f32) -> Self {
        Rect::new(
            self.origin.x - amount,
            self.origin.y - amount,
            self.size.width + 2.0 * amount,
            self.size.height + 2.0 * amount,
        )
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::from_min_max(
            Point::new(self.x().min(other.x()), self.y().min(other.y())),
            Point::new(self.max_x().max(other.max_x()), self.max_y().max(other.max_y())),
        )
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let min = Point::new(self.x().max(other.x()), self.y().max(other.y()));
        let max = Point::new(
            self.max_x().min(other.max_x()),
            self.max_y().min(other.max_y()),
        );
        (max.x > min.x && max.y > min.y).then(|| Rect::from_min_max(min, max))
    }
}

/// Integer pixel rectangle, used to size textures and raster buffers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest pixel rect covering `rect`. Coordinates beyond the `i32`
    /// range saturate at its ends.
    pub fn enclosing(rect: &Rect) -> Self {
        let x0 = saturate(rect.x().floor());
        let y0 = saturate(rect.y().floor());
        let x1 = saturate(rect.max_x().ceil());
        let y1 = saturate(rect.max_y().ceil());
        Self::from_edges(x0, y0, x1.max(x0 + 1), y1.max(y0 + 1))
    }

    /// Rect spanning `[x0, x1) x [y0, y1)`, clamped so every edge fits `i32`
    fn from_edges(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64);
        let (x0, y0) = (clamp(x0), clamp(y0));
        let (x1, y1) = (clamp(x1), clamp(y1));
        Self::new(x0 as i32, y0 as i32, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    pub fn max_x(&self) -> i32 {
        (self.x as i64 + self.width as i64).min(i32::MAX as i64) as i32
    }

    pub fn max_y(&self) -> i32 {
        (self.y as i64 + self.height as i64).min(i32::MAX as i64) as i32
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn intersect(&self, other: &PixelRect) -> Option<PixelRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        (x1 > x0 && y1 > y0)
            .then(|| PixelRect::from_edges(x0 as i64, y0 as i64, x1 as i64, y1 as i64))
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }
}

fn saturate(v: f32) -> i64 {
    if v.is_nan() {
        0
    } else {
        v.clamp(i32::MIN as f32, i32::MAX as f32) as i64
    }
}

/// 2D affine transformation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Affine2D {
    /// Matrix elements [a, b, c, d, tx, ty]
    /// | a  c  tx |
    /// | b  d  ty |
    /// | 0  0   1 |
    pub elements: [f32; 6],
}

impl Default for Affine2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine2D {
    pub const IDENTITY: Affine2D = Affine2D {
        elements: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    };

    pub fn translation(x: f32, y: f32) -> Self {
        Self {
            elements: [1.0, 0.0, 0.0, 1.0, x, y],
        }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            elements: [sx, 0.0, 0.0, sy, 0.0, 0.0],
        }
    }

    pub fn rotation(angle: f32) -> Self {
        let c = angle.cos();
        let s = angle.sin();
        Self {
            elements: [c, s, -s, c, 0.0, 0.0],
        }
    }

    pub fn transform_point(&self, point: Point) -> Point {
        let [a, b, c, d, tx, ty] = self.elements;
        Point::new(a * point.x + c * point.y + tx, b * point.x + d * point.y + ty)
    }

    /// Concatenate this transform with another (self * other)
    /// The resulting transform first applies `other`, then `self`.
    pub fn then(&self, other: &Affine2D) -> Affine2D {
        let [a1, b1, c1, d1, tx1, ty1] = self.elements;
        let [a2, b2, c2, d2, tx2, ty2] = other.elements;

        Affine2D {
            elements: [
                a1 * a2 + c1 * b2,
                b1 * a2 + d1 * b2,
                a1 * c2 + c1 * d2,
                b1 * c2 + d1 * d2,
                a1 * tx2 + c1 * ty2 + tx1,
                b1 * tx2 + d1 * ty2 + ty1,
            ],
        }
    }

    pub fn determinant(&self) -> f32 {
        let [a, b, c, d, _, _] = self.elements;
        a * d - b * c
    }

    /// Inverse matrix, or `None` when the matrix is singular
    pub fn invert(&self) -> Option<Affine2D> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let [a, b, c, d, tx, ty] = self.elements;
        let inv = 1.0 / det;
        let ia = d * inv;
        let ib = -b * inv;
        let ic = -c * inv;
        let id = a * inv;
        Some(Affine2D {
            elements: [
                ia,
                ib,
                ic,
                id,
                -(ia * tx + ic * ty),
                -(ib * tx + id * ty),
            ],
        })
    }

    pub fn is_finite(&self) -> bool {
        self.elements.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4
    }

    #[test]
    fn test_affine_invert() {
        let m = Affine2D::translation(5.0, -3.0)
            .then(&Affine2D::rotation(0.7))
            .then(&Affine2D::scale(2.0, 0.5));
        let inv = m.invert().unwrap();
        let p = Point::new(12.0, -4.5);
        assert!(approx(inv.transform_point(m.transform_point(p)), p));
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        assert!(Affine2D::scale(0.0, 1.0).invert().is_none());
    }

    #[test]
    fn test_then_order() {
        // Scale first, then translate
        let m = Affine2D::translation(10.0, 0.0).then(&Affine2D::scale(2.0, 2.0));
        assert_eq!(m.transform_point(Point::new(1.0, 1.0)), Point::new(12.0, 2.0));
    }

    #[test]
    fn test_rect_helpers() {
        let r = Rect::bounding([Point::new(1.0, 5.0), Point::new(-2.0, 3.0)]).unwrap();
        assert_eq!(r, Rect::new(-2.0, 3.0, 3.0, 2.0));
        assert_eq!(r.outset(1.0), Rect::new(-3.0, 2.0, 5.0, 4.0));
        assert!(Rect::bounding(std::iter::empty()).is_none());

        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersect(&b), Some(Rect::new(5.0, 5.0, 5.0, 5.0)));
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 15.0, 15.0));
    }

    #[test]
    fn test_pixel_rect_enclosing() {
        let px = PixelRect::enclosing(&Rect::new(0.5, 1.2, 3.0, 2.0));
        assert_eq!(px, PixelRect::new(0, 1, 4, 3));
        let clip = px.intersect(&PixelRect::new(2, 0, 10, 10)).unwrap();
        assert_eq!(clip, PixelRect::new(2, 1, 2, 3));
    }

    #[test]
    fn test_pixel_rect_enclosing_far_coordinates() {
        let px = PixelRect::enclosing(&Rect::new(-3.0e9, 0.0, 6.0e9, 4.0));
        assert_eq!(px.x, i32::MIN);
        assert_eq!(px.max_x(), i32::MAX);
        assert_eq!(px.height, 4);

        let clip = px.intersect(&PixelRect::new(0, 0, 64, 64)).unwrap();
        assert_eq!(clip, PixelRect::new(0, 0, 64, 4));

        let edge = PixelRect::new(i32::MAX - 2, 0, u32::MAX, 1);
        assert_eq!(edge.max_x(), i32::MAX);
        assert!(edge.intersect(&PixelRect::new(0, 0, 8, 8)).is_none());
    }
}
