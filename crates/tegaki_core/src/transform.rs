//! Coordinate transform chain
//!
//! Maps pointer positions from device space down to a layer's local space:
//!
//! ```text
//! screen (CSS px) -> canvas (canvas px) -> world -> layer local
//! ```
//!
//! Transform nodes live in an arena with index-based parent links. The world
//! root sits directly under the fixed canvas origin; every layer node must
//! hang somewhere below it.
//!
//! Each node maps its local space into its parent's space as
//! `translate(position) * rotate(rotation) * scale(scale) * translate(-pivot)`.
//! Inverse mapping composes the forward matrices root-to-leaf and inverts the
//! composed matrix once, rather than unwinding each node step by step.

use std::time::{Duration, Instant};

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::config::TransformConfig;
use crate::error::{Result, TransformError, TransformStage};
use crate::geometry::{Affine2D, Point, Size, Vec2};

new_key_type! {
    /// Handle to a node in the transform arena
    pub struct NodeId;
}

/// Scale components with a smaller magnitude than this are treated as 1
const MIN_SCALE: f32 = 1e-6;

fn checked(point: Point, stage: TransformStage) -> Result<Point> {
    if point.is_finite() {
        Ok(point)
    } else {
        Err(TransformError::InvalidGeometry { stage })
    }
}

fn sanitize_scale(s: f32) -> f32 {
    if s.is_finite() && s.abs() >= MIN_SCALE {
        s
    } else {
        1.0
    }
}

/// Position, scale, rotation and pivot of one container level
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformNode {
    pub position: Point,
    pub scale: Vec2,
    /// Radians, counter-clockwise in a y-up sense
    pub rotation: f32,
    pub pivot: Point,
    parent: Option<NodeId>,
}

impl Default for TransformNode {
    fn default() -> Self {
        Self {
            position: Point::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
            pivot: Point::ZERO,
            parent: None,
        }
    }
}

impl TransformNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Point::new(x, y);
        self
    }

    pub fn with_scale(mut self, sx: f32, sy: f32) -> Self {
        self.scale = Vec2::new(sx, sy);
        self
    }

    pub fn with_rotation(mut self, radians: f32) -> Self {
        self.rotation = radians;
        self
    }

    pub fn with_pivot(mut self, x: f32, y: f32) -> Self {
        self.pivot = Point::new(x, y);
        self
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Scale with zero or non-finite components replaced by 1
    pub fn effective_scale(&self) -> Vec2 {
        Vec2::new(sanitize_scale(self.scale.x), sanitize_scale(self.scale.y))
    }

    fn effective_rotation(&self) -> f32 {
        if self.rotation.is_finite() {
            self.rotation
        } else {
            0.0
        }
    }

    /// Matrix mapping this node's local space into its parent's space
    pub fn local_matrix(&self) -> Affine2D {
        let s = self.effective_scale();
        Affine2D::translation(self.position.x, self.position.y)
            .then(&Affine2D::rotation(self.effective_rotation()))
            .then(&Affine2D::scale(s.x, s.y))
            .then(&Affine2D::translation(-self.pivot.x, -self.pivot.y))
    }

    /// Map a point from the parent's space into this node's space, one
    /// operation at a time: subtract position, undo rotation, divide by
    /// scale, add pivot.
    pub fn inverse_point(&self, p: Point) -> Point {
        let s = self.effective_scale();
        let (sin, cos) = (-self.effective_rotation()).sin_cos();
        let dx = p.x - self.position.x;
        let dy = p.y - self.position.y;
        let rx = dx * cos - dy * sin;
        let ry = dx * sin + dy * cos;
        Point::new(rx / s.x + self.pivot.x, ry / s.y + self.pivot.y)
    }
}

/// The canvas element's box on screen, in CSS pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl CanvasRect {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Supplies the canvas bounding rect (a layout query on the host side)
pub trait BoundsSource {
    fn canvas_rect(&mut self) -> CanvasRect;
}

impl<F> BoundsSource for F
where
    F: FnMut() -> CanvasRect,
{
    fn canvas_rect(&mut self) -> CanvasRect {
        self()
    }
}

/// Screen-to-canvas mapping with a short-lived bounding rect cache
pub struct Viewport {
    canvas_size: Size,
    source: Box<dyn BoundsSource>,
    ttl: Duration,
    cached: Option<(CanvasRect, Instant)>,
    queries: u64,
}

impl std::fmt::Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewport")
            .field("canvas_size", &self.canvas_size)
            .field("ttl", &self.ttl)
            .field("cached", &self.cached.map(|(rect, _)| rect))
            .finish()
    }
}

impl Viewport {
    /// `canvas_size` is the canvas resolution in canvas pixels. The bounds
    /// source reports the displayed box in CSS pixels; their ratio absorbs
    /// the device pixel ratio.
    pub fn new(canvas_size: Size, source: impl BoundsSource + 'static) -> Self {
        Self {
            canvas_size,
            source: Box::new(source),
            ttl: Duration::from_millis(TransformConfig::default().rect_cache_ttl_ms),
            cached: None,
            queries: 0,
        }
    }

    /// Viewport whose canvas fills a fixed rect
    pub fn fixed(canvas_size: Size, rect: CanvasRect) -> Self {
        Self::new(canvas_size, move || rect)
    }

    /// Canvas with a backing store of `rect` scaled by `device_pixel_ratio`,
    /// the usual setup for crisp rendering on high density displays
    pub fn backing_store(rect: CanvasRect, device_pixel_ratio: f32) -> Self {
        let dpr = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        Self::fixed(Size::new(rect.width * dpr, rect.height * dpr), rect)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn canvas_size(&self) -> Size {
        self.canvas_size
    }

    /// Number of times the bounds source has been queried
    pub fn rect_queries(&self) -> u64 {
        self.queries
    }

    /// Drop the cached rect (e.g. after a window resize)
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    fn rect(&mut self) -> CanvasRect {
        let now = Instant::now();
        match self.cached {
            Some((rect, at)) if now.duration_since(at) < self.ttl => rect,
            _ => {
                let rect = self.source.canvas_rect();
                self.queries += 1;
                self.cached = Some((rect, now));
                rect
            }
        }
    }

    /// Pointer client coordinates (CSS pixels) to canvas pixels
    pub fn screen_to_canvas(&mut self, client_x: f32, client_y: f32) -> Result<Point> {
        let rect = self.rect();
        let p = Point::new(
            (client_x - rect.left) * (self.canvas_size.width / rect.width),
            (client_y - rect.top) * (self.canvas_size.height / rect.height),
        );
        checked(p, TransformStage::ScreenToCanvas)
    }

    /// Canvas pixels back to client coordinates
    pub fn canvas_to_screen(&mut self, p: Point) -> Result<Point> {
        let rect = self.rect();
        checked(
            Point::new(
                p.x * (rect.width / self.canvas_size.width) + rect.left,
                p.y * (rect.height / self.canvas_size.height) + rect.top,
            ),
            TransformStage::CanvasToScreen,
        )
    }
}

#[derive(Clone, Copy, Debug)]
struct ResolvedWorld {
    forward: Affine2D,
    inverse: Affine2D,
}

/// Arena of transform nodes plus the viewport they are displayed through
#[derive(Debug)]
pub struct TransformChain {
    nodes: SlotMap<NodeId, TransformNode>,
    world: NodeId,
    viewport: Viewport,
    max_ancestry: usize,
    resolved: Option<ResolvedWorld>,
}

impl TransformChain {
    /// Create a chain with an identity world root
    pub fn new(viewport: Viewport, config: &TransformConfig) -> Self {
        let mut nodes = SlotMap::with_key();
        let world = nodes.insert(TransformNode::default());
        let viewport = viewport.with_ttl(Duration::from_millis(config.rect_cache_ttl_ms));
        Self {
            nodes,
            world,
            viewport,
            max_ancestry: config.max_ancestry.max(1),
            resolved: None,
        }
    }

    pub fn world(&self) -> NodeId {
        self.world
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn node(&self, id: NodeId) -> Option<&TransformNode> {
        self.nodes.get(id)
    }

    /// Mutable access to a node. Touching the world root marks the world
    /// transform stale until the next [`resolve`](Self::resolve).
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TransformNode> {
        if id == self.world {
            self.resolved = None;
        }
        self.nodes.get_mut(id)
    }

    /// Insert a node under `parent`
    pub fn insert(&mut self, node: TransformNode, parent: NodeId) -> Result<NodeId> {
        if !self.nodes.contains_key(parent) {
            return Err(TransformError::DetachedNode(parent));
        }
        let id = self.nodes.insert(TransformNode {
            parent: Some(parent),
            ..node
        });
        Ok(id)
    }

    /// Insert a node with no parent. It stays detached until re-parented.
    pub fn insert_detached(&mut self, node: TransformNode) -> NodeId {
        self.nodes.insert(TransformNode {
            parent: None,
            ..node
        })
    }

    /// Move `id` under `parent`, refusing moves that would form a cycle
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<()> {
        if id == self.world {
            return Err(TransformError::CycleRejected(id));
        }
        if !self.nodes.contains_key(id) {
            return Err(TransformError::DetachedNode(id));
        }
        if let Some(p) = parent {
            let mut cursor = Some(p);
            let mut hops = 0;
            while let Some(current) = cursor {
                if current == id || hops > self.max_ancestry {
                    return Err(TransformError::CycleRejected(id));
                }
                cursor = self.nodes.get(current).and_then(|n| n.parent);
                hops += 1;
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = parent;
        }
        Ok(())
    }

    /// Remove a node; its children become detached
    pub fn remove(&mut self, id: NodeId) -> Option<TransformNode> {
        if id == self.world {
            return None;
        }
        self.nodes.remove(id)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Recompute the world container's transform for the current frame
    pub fn resolve(&mut self) -> Result<()> {
        let forward = self.nodes[self.world].local_matrix();
        let inverse = forward
            .invert()
            .filter(Affine2D::is_finite)
            .ok_or(TransformError::InvalidGeometry {
                stage: TransformStage::CanvasToWorld,
            })?;
        self.resolved = Some(ResolvedWorld { forward, inverse });
        Ok(())
    }

    /// Nodes from `target` up to (excluding) the world root, leaf first
    pub fn ancestry(&self, target: NodeId) -> Result<SmallVec<[NodeId; 8]>> {
        let mut chain = SmallVec::new();
        let mut cursor = target;
        loop {
            if cursor == self.world {
                return Ok(chain);
            }
            if chain.len() >= self.max_ancestry {
                tracing::warn!(
                    "transform ancestry of {:?} exceeds {} hops",
                    target,
                    self.max_ancestry
                );
                return Err(TransformError::DetachedNode(target));
            }
            let node = self
                .nodes
                .get(cursor)
                .ok_or(TransformError::DetachedNode(target))?;
            chain.push(cursor);
            cursor = node.parent.ok_or(TransformError::DetachedNode(target))?;
        }
    }

    /// Composed matrix mapping `target`'s local space into world space
    pub fn local_to_world_matrix(&self, target: NodeId) -> Result<Affine2D> {
        let chain = self.ancestry(target)?;
        let mut matrix = Affine2D::IDENTITY;
        for id in chain.iter().rev() {
            matrix = matrix.then(&self.nodes[*id].local_matrix());
        }
        Ok(matrix)
    }

    pub fn screen_to_canvas(&mut self, client_x: f32, client_y: f32) -> Result<Point> {
        self.viewport.screen_to_canvas(client_x, client_y)
    }

    pub fn canvas_to_screen(&mut self, p: Point) -> Result<Point> {
        self.viewport.canvas_to_screen(p)
    }

    /// Undo the world container's transform. Requires [`resolve`](Self::resolve)
    /// since the last change to the world root.
    pub fn canvas_to_world(&self, p: Point) -> Result<Point> {
        let resolved = self.resolved.ok_or(TransformError::Unresolved)?;
        checked(
            resolved.inverse.transform_point(p),
            TransformStage::CanvasToWorld,
        )
    }

    pub fn world_to_canvas(&self, p: Point) -> Result<Point> {
        let resolved = self.resolved.ok_or(TransformError::Unresolved)?;
        checked(
            resolved.forward.transform_point(p),
            TransformStage::WorldToCanvas,
        )
    }

    /// Map a world-space point into `target`'s local space
    pub fn world_to_local(&self, p: Point, target: NodeId) -> Result<Point> {
        let inverse = self
            .local_to_world_matrix(target)?
            .invert()
            .ok_or(TransformError::InvalidGeometry {
                stage: TransformStage::WorldToLocal,
            })?;
        checked(inverse.transform_point(p), TransformStage::WorldToLocal)
    }

    pub fn local_to_world(&self, p: Point, target: NodeId) -> Result<Point> {
        let matrix = self.local_to_world_matrix(target)?;
        checked(matrix.transform_point(p), TransformStage::LocalToWorld)
    }

    /// Full device-to-layer mapping, refreshing the world transform if stale
    pub fn screen_to_local(&mut self, client_x: f32, client_y: f32, target: NodeId) -> Result<Point> {
        if !self.is_resolved() {
            self.resolve()?;
        }
        let canvas = self.screen_to_canvas(client_x, client_y)?;
        let world = self.canvas_to_world(canvas)?;
        self.world_to_local(world, target)
    }

    /// Full layer-to-device mapping
    pub fn local_to_screen(&mut self, p: Point, target: NodeId) -> Result<Point> {
        if !self.is_resolved() {
            self.resolve()?;
        }
        let world = self.local_to_world(p, target)?;
        let canvas = self.world_to_canvas(world)?;
        self.canvas_to_screen(canvas)
    }
}
