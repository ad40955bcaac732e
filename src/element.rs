//! The rendering collaborator seam.
//!
//! The crate never owns visual elements. A [`ViewHost`] (implemented by the rendering layer)
//! answers geometry queries for elements by [`ElementId`], and trackers refer to elements through
//! an [`ElementHandle`] that holds the host weakly. A tracker therefore never extends the lifetime
//! of either the element or its host.
use std::sync::{Arc, Weak};

use derive_more::{Display, From, Into};

use crate::geometry::Rect;

/// Opaque identifier of a visual element, assigned by the rendering collaborator.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, From, Into)]
pub struct ElementId(u64);

/// Clip and visibility state of one ancestor of an element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AncestorClip {
    /// Bounds the ancestor clips its descendants to, in surface coordinates. `None` if the
    /// ancestor does not clip.
    pub clip: Option<Rect>,
    /// Whether the ancestor is hidden.
    pub is_hidden: bool,
    /// Opacity of the ancestor.
    pub alpha: f64,
}

impl AncestorClip {
    /// A visible ancestor that clips to `bounds`.
    pub fn clipping(bounds: Rect) -> AncestorClip {
        AncestorClip {
            clip: Some(bounds),
            is_hidden: false,
            alpha: 1.0,
        }
    }

    pub(crate) fn is_visible(&self) -> bool {
        !self.is_hidden && self.alpha > 0.0
    }
}

/// Geometry of an element at one instant, as reported by the rendering collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSnapshot {
    /// Frame of the element in surface coordinates.
    pub frame: Rect,
    /// Whether the element itself is hidden.
    pub is_hidden: bool,
    /// Opacity of the element.
    pub alpha: f64,
    /// Whether the element is currently attached to a surface.
    pub is_attached: bool,
    /// Ancestors from the closest parent up to the surface root.
    pub ancestors: Vec<AncestorClip>,
    /// Rectangles of sibling content drawn above the element.
    pub obstructions: Vec<Rect>,
    /// Bounds of the surface containing the element.
    pub surface_bounds: Rect,
}

impl ElementSnapshot {
    /// A visible, attached element with no ancestors or obstructions.
    pub fn new(frame: Rect, surface_bounds: Rect) -> ElementSnapshot {
        ElementSnapshot {
            frame,
            is_hidden: false,
            alpha: 1.0,
            is_attached: true,
            ancestors: Vec::new(),
            obstructions: Vec::new(),
            surface_bounds,
        }
    }

    pub(crate) fn is_visible(&self) -> bool {
        !self.is_hidden && self.alpha > 0.0 && self.ancestors.iter().all(AncestorClip::is_visible)
    }
}

/// Geometry queries the rendering collaborator answers.
pub trait ViewHost: Send + Sync {
    /// Returns the current geometry of `element`, or `None` if the element no longer exists.
    fn snapshot(&self, element: ElementId) -> Option<ElementSnapshot>;
}

/// A non-owning reference to an element: its id plus a weak pointer to the host that can answer
/// questions about it.
#[derive(Clone)]
pub struct ElementHandle {
    id: ElementId,
    host: Weak<dyn ViewHost>,
}

impl ElementHandle {
    /// Create a handle to `id` living in `host`.
    pub fn new(id: ElementId, host: &Arc<dyn ViewHost>) -> ElementHandle {
        ElementHandle {
            id,
            host: Arc::downgrade(host),
        }
    }

    pub(crate) fn from_weak(id: ElementId, host: Weak<dyn ViewHost>) -> ElementHandle {
        ElementHandle { id, host }
    }

    /// Id of the referenced element.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Current geometry, or `None` if either the host or the element is gone.
    pub fn snapshot(&self) -> Option<ElementSnapshot> {
        self.host.upgrade()?.snapshot(self.id)
    }

    /// Whether the element still exists.
    pub fn is_alive(&self) -> bool {
        self.snapshot().is_some()
    }
}

impl std::fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementHandle")
            .field("id", &self.id)
            .field("host_alive", &(self.host.strong_count() > 0))
            .finish()
    }
}
