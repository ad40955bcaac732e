//! Detection of full-screen ad surfaces.
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::{
    geometry::Rect,
    surface::{SubscriptionId, Surface, SurfaceListener, SurfaceRegistry},
};

/// Phase of an [`InterstitialSurfaceObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverPhase {
    /// Not observing.
    Idle,
    /// Waiting for a qualifying surface.
    Watching,
    /// A surface was found and the callback is running.
    Found,
}

/// Watches a [`SurfaceRegistry`] for a full-screen surface that is not the application's primary
/// surface, and hands it to a callback exactly once per [`start`](Self::start).
///
/// After the callback fires the observer returns to [`ObserverPhase::Idle`] by itself;
/// observing again requires another `start()`.
#[derive(Clone)]
pub struct InterstitialSurfaceObserver {
    shared: Arc<ObserverShared>,
}

struct ObserverShared {
    registry: Arc<SurfaceRegistry>,
    state: Mutex<ObserverState>,
    on_found: Box<dyn Fn(Surface) + Send + Sync>,
}

struct ObserverState {
    phase: ObserverPhase,
    subscription: Option<SubscriptionId>,
}

impl InterstitialSurfaceObserver {
    /// Create an idle observer of `registry`.
    pub fn new(
        registry: Arc<SurfaceRegistry>,
        on_found: impl Fn(Surface) + Send + Sync + 'static,
    ) -> InterstitialSurfaceObserver {
        InterstitialSurfaceObserver {
            shared: Arc::new(ObserverShared {
                registry,
                state: Mutex::new(ObserverState {
                    phase: ObserverPhase::Idle,
                    subscription: None,
                }),
                on_found: Box::new(on_found),
            }),
        }
    }

    /// Start watching. Surfaces that are already presented are considered too. No-op unless the
    /// observer is idle.
    pub fn start(&self) {
        {
            let mut state = self.shared.lock();
            if state.phase != ObserverPhase::Idle {
                log::debug!(target: "adtrack", "interstitial observer is already started");
                return;
            }
            state.phase = ObserverPhase::Watching;
            let listener: Weak<dyn SurfaceListener> = Arc::downgrade(&self.shared) as _;
            state.subscription = Some(self.shared.registry.subscribe(listener));
        }

        for surface in self.shared.registry.surfaces() {
            self.shared.surface_presented(&surface);
        }
    }

    /// Stop watching without invoking the callback. Idempotent.
    pub fn stop(&self) {
        let subscription = {
            let mut state = self.shared.lock();
            if state.phase == ObserverPhase::Watching {
                state.phase = ObserverPhase::Idle;
            }
            state.subscription.take()
        };
        if let Some(subscription) = subscription {
            self.shared.registry.unsubscribe(subscription);
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ObserverPhase {
        self.shared.lock().phase
    }
}

impl ObserverShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, ObserverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn qualifies(&self, surface: &Surface) -> bool {
        if surface.is_primary || surface.content.is_none() {
            return false;
        }
        match self.registry.primary_bounds() {
            Some(screen) => covers(surface.bounds, screen),
            None => true,
        }
    }
}

impl SurfaceListener for ObserverShared {
    fn surface_presented(&self, surface: &Surface) {
        if !self.qualifies(surface) {
            return;
        }

        let subscription = {
            let mut state = self.lock();
            if state.phase != ObserverPhase::Watching {
                return;
            }
            state.phase = ObserverPhase::Found;
            state.subscription.take()
        };
        if let Some(subscription) = subscription {
            self.registry.unsubscribe(subscription);
        }

        log::debug!(target: "adtrack", surface:display = surface.id; "found interstitial surface");
        (self.on_found)(surface.clone());

        let mut state = self.lock();
        if state.phase == ObserverPhase::Found {
            state.phase = ObserverPhase::Idle;
        }
    }
}

fn covers(outer: Rect, inner: Rect) -> bool {
    outer.x0 <= inner.x0 && outer.y0 <= inner.y0 && outer.x1 >= inner.x1 && outer.y1 >= inner.y1
}
