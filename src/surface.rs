//! Top-level presentation surfaces (windows).
//!
//! The rendering collaborator keeps a [`SurfaceRegistry`] up to date as surfaces are presented and
//! dismissed. Observers subscribe to it to learn about newly presented surfaces.
use std::sync::{PoisonError, RwLock, Weak};

use derive_more::{Display, From, Into};

use crate::{element::ElementId, geometry::Rect};

/// Opaque identifier of a surface, assigned by the rendering collaborator.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, From, Into)]
pub struct SurfaceId(u64);

/// A top-level presentation surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    /// Id of the surface.
    pub id: SurfaceId,
    /// Bounds of the surface in screen coordinates.
    pub bounds: Rect,
    /// Whether this is the host application's primary surface.
    pub is_primary: bool,
    /// Root content element of the surface, if any.
    pub content: Option<ElementId>,
}

/// Receives notifications about newly presented surfaces.
pub trait SurfaceListener: Send + Sync {
    /// Called after `surface` has been presented.
    fn surface_presented(&self, surface: &Surface);
}

/// Identifies a subscription to a [`SurfaceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// `SurfaceRegistry` provides a thread-safe (`Sync`) list of currently presented surfaces and
/// notifies subscribers when a new one appears.
///
/// Subscribers are held weakly: a dropped listener is pruned on the next notification.
#[derive(Default)]
pub struct SurfaceRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    surfaces: Vec<Surface>,
    listeners: Vec<(SubscriptionId, Weak<dyn SurfaceListener>)>,
    next_subscription: u64,
}

impl SurfaceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        SurfaceRegistry::default()
    }

    /// Snapshot of currently presented surfaces, in presentation order.
    pub fn surfaces(&self) -> Vec<Surface> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .surfaces
            .clone()
    }

    /// Bounds of the primary surface, if one is presented.
    pub fn primary_bounds(&self) -> Option<Rect> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .surfaces
            .iter()
            .find(|s| s.is_primary)
            .map(|s| s.bounds)
    }

    /// Record that `surface` was presented and notify subscribers. Presenting a surface with an
    /// id that is already registered replaces it.
    pub fn present(&self, surface: Surface) {
        let listeners: Vec<_> = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            inner.surfaces.retain(|s| s.id != surface.id);
            inner.surfaces.push(surface.clone());
            inner.listeners.retain(|(_, l)| l.strong_count() > 0);
            inner
                .listeners
                .iter()
                .filter_map(|(_, l)| l.upgrade())
                .collect()
        };

        log::debug!(target: "adtrack", surface:display = surface.id, listeners = listeners.len(); "surface presented");

        // Notify outside of the lock, so that listeners can (un)subscribe.
        for listener in listeners {
            listener.surface_presented(&surface);
        }
    }

    /// Record that the surface with `id` was dismissed. Returns the removed surface.
    pub fn dismiss(&self, id: SurfaceId) -> Option<Surface> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let index = inner.surfaces.iter().position(|s| s.id == id)?;
        Some(inner.surfaces.remove(index))
    }

    /// Subscribe `listener` to surface presentation notifications.
    pub fn subscribe(&self, listener: Weak<dyn SurfaceListener>) -> SubscriptionId {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner.listeners.push((id, listener));
        id
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .retain(|(sid, _)| *sid != id);
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .filter(|(_, l)| l.strong_count() > 0)
            .count()
    }
}
