//! Stroke notifications
//!
//! Typed replacement for a global pub/sub bus. Hosts register handlers per
//! event kind on the dispatcher owned by their pipeline.

use rustc_hash::FxHashMap;

use crate::field::RenderTier;
use crate::geometry::PixelRect;
use crate::stroke::{LayerId, Tool};

/// Event kind, used as the registration key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrokeEventKind {
    Started,
    SampleDropped,
    Completed,
    LayerModified,
    FallbackUsed,
    Cancelled,
}

/// Why a sample never made it into the stroke
#[derive(Clone, Debug, PartialEq)]
pub enum DropReason {
    /// A mapping step produced a non-finite value
    NonFinite(String),
}

/// Pipeline notification
#[derive(Clone, Debug, PartialEq)]
pub enum StrokeEvent {
    Started {
        layer: LayerId,
        tool: Tool,
    },
    SampleDropped {
        layer: LayerId,
        reason: DropReason,
        /// Samples dropped so far in this stroke
        dropped: u32,
    },
    Completed {
        layer: LayerId,
        tool: Tool,
        point_count: usize,
        tier: RenderTier,
    },
    /// Layer pixels changed; `region` is in layer pixel space
    LayerModified {
        layer: LayerId,
        region: PixelRect,
    },
    /// The preferred tier failed for one stroke
    FallbackUsed {
        layer: LayerId,
        requested: RenderTier,
        used: RenderTier,
        reason: String,
    },
    Cancelled {
        layer: LayerId,
    },
}

impl StrokeEvent {
    pub fn kind(&self) -> StrokeEventKind {
        match self {
            StrokeEvent::Started { .. } => StrokeEventKind::Started,
            StrokeEvent::SampleDropped { .. } => StrokeEventKind::SampleDropped,
            StrokeEvent::Completed { .. } => StrokeEventKind::Completed,
            StrokeEvent::LayerModified { .. } => StrokeEventKind::LayerModified,
            StrokeEvent::FallbackUsed { .. } => StrokeEventKind::FallbackUsed,
            StrokeEvent::Cancelled { .. } => StrokeEventKind::Cancelled,
        }
    }

    pub fn layer(&self) -> LayerId {
        match self {
            StrokeEvent::Started { layer, .. }
            | StrokeEvent::SampleDropped { layer, .. }
            | StrokeEvent::Completed { layer, .. }
            | StrokeEvent::LayerModified { layer, .. }
            | StrokeEvent::FallbackUsed { layer, .. }
            | StrokeEvent::Cancelled { layer } => *layer,
        }
    }
}

/// Event handler function type
pub type StrokeEventHandler = Box<dyn Fn(&StrokeEvent) + Send + Sync>;

/// Dispatches stroke events to registered handlers
pub struct StrokeEventDispatcher {
    handlers: FxHashMap<StrokeEventKind, Vec<StrokeEventHandler>>,
}

impl StrokeEventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: FxHashMap::default(),
        }
    }

    /// Register a handler for one event kind
    pub fn register<F>(&mut self, kind: StrokeEventKind, handler: F)
    where
        F: Fn(&StrokeEvent) + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Register a handler for every event kind
    pub fn register_all<F>(&mut self, handler: F)
    where
        F: Fn(&StrokeEvent) + Send + Sync + Clone + 'static,
    {
        for kind in [
            StrokeEventKind::Started,
            StrokeEventKind::SampleDropped,
            StrokeEventKind::Completed,
            StrokeEventKind::LayerModified,
            StrokeEventKind::FallbackUsed,
            StrokeEventKind::Cancelled,
        ] {
            self.register(kind, handler.clone());
        }
    }

    pub fn handler_count(&self, kind: StrokeEventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    pub fn dispatch(&self, event: &StrokeEvent) {
        if let Some(handlers) = self.handlers.get(&event.kind()) {
            for handler in handlers {
                handler(event);
            }
        }
    }
}

impl Default for StrokeEventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StrokeEventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrokeEventDispatcher")
            .field("kinds", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_dispatch_by_kind() {
        let mut dispatcher = StrokeEventDispatcher::new();
        let started = Arc::new(AtomicUsize::new(0));
        let any = Arc::new(AtomicUsize::new(0));

        let counter = started.clone();
        dispatcher.register(StrokeEventKind::Started, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = any.clone();
        dispatcher.register_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let layer = LayerId::default();
        dispatcher.dispatch(&StrokeEvent::Started {
            layer,
            tool: Tool::Pen,
        });
        dispatcher.dispatch(&StrokeEvent::Cancelled { layer });

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(any.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.handler_count(StrokeEventKind::Started), 2);
        assert_eq!(dispatcher.handler_count(StrokeEventKind::Completed), 1);
    }

    #[test]
    fn test_event_kind_and_layer() {
        let event = StrokeEvent::LayerModified {
            layer: LayerId::default(),
            region: PixelRect::new(0, 0, 4, 4),
        };
        assert_eq!(event.kind(), StrokeEventKind::LayerModified);
        assert_eq!(event.layer(), LayerId::default());
    }
}
