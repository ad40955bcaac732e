//! Single-shot impression tracking.
//!
//! An [`ImpressionTracker`] watches the element a creative was rendered into and fires the
//! `impression` event the first time any part of it becomes visible, after checking that the
//! element still renders the registered creative. Views can be recycled between "became visible"
//! and "identity resolved"; a mismatch drops the impression.
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use tokio::runtime::Handle;

use crate::{
    element::{ElementHandle, ElementId, ViewHost},
    events::{EventSink, TrackingEventKind},
    exposure::ExposureSample,
    interstitial::InterstitialSurfaceObserver,
    surface::{Surface, SurfaceRegistry},
    viewability::ViewabilityTracker,
    CacheId, CreativePayload, ResolutionError, TrackerConfig,
};

/// Future returned by [`CacheIdResolver::resolve_cache_id`].
pub type ResolveFuture =
    Pin<Box<dyn Future<Output = std::result::Result<CacheId, ResolutionError>> + Send + 'static>>;

/// Looks up which cached creative an element is rendering (collaborator).
pub trait CacheIdResolver: Send + Sync {
    /// Resolve the cache id of the markup rendered in `element`.
    fn resolve_cache_id(&self, element: ElementId) -> ResolveFuture;
}

/// Where an [`ImpressionTracker`] looks for its creative. The variant selects the sub-observer.
#[derive(Clone)]
pub enum ImpressionTarget {
    /// A banner rendered inline: track the element directly.
    Banner(ElementHandle),
    /// An interstitial: wait for a full-screen surface to be presented, then track its content.
    Interstitial {
        /// Registry to watch for the interstitial surface.
        surfaces: Arc<SurfaceRegistry>,
        /// Host answering geometry queries for the surface content.
        host: Weak<dyn ViewHost>,
    },
}

/// Progress of an [`ImpressionTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpressionPhase {
    /// Not started yet.
    Idle,
    /// Waiting for the element to become visible.
    Tracking,
    /// The element became visible; its identity is being resolved.
    Resolving,
    /// Tracking finished, whether or not the impression fired.
    Finished,
    /// Stopped before finishing.
    Stopped,
}

/// Fires a single `impression` event for a creative. See the module documentation.
///
/// Cloning produces another handle to the same tracker.
#[derive(Clone)]
pub struct ImpressionTracker {
    shared: Arc<ImpressionShared>,
}

struct ImpressionShared {
    runtime: Handle,
    config: TrackerConfig,
    resolver: Arc<dyn CacheIdResolver>,
    // Held around the sink call; `stop()` takes it before `state`.
    delivery: Mutex<()>,
    state: Mutex<ImpressionState>,
}

struct ImpressionState {
    phase: ImpressionPhase,
    delivered: bool,
    payload: Option<CreativePayload>,
    sink: Option<Arc<dyn EventSink>>,
    attachment: Attachment,
}

#[derive(Default)]
enum Attachment {
    #[default]
    Detached,
    Banner(ViewabilityTracker),
    Interstitial {
        observer: InterstitialSurfaceObserver,
        tracker: Option<ViewabilityTracker>,
    },
}

impl Attachment {
    fn stop(&self) {
        match self {
            Attachment::Detached => {}
            Attachment::Banner(tracker) => tracker.stop(),
            Attachment::Interstitial { observer, tracker } => {
                observer.stop();
                if let Some(tracker) = tracker {
                    tracker.stop();
                }
            }
        }
    }
}

impl ImpressionTracker {
    /// Create an idle tracker.
    pub fn new(
        config: TrackerConfig,
        resolver: Arc<dyn CacheIdResolver>,
        runtime: Handle,
    ) -> ImpressionTracker {
        ImpressionTracker {
            shared: Arc::new(ImpressionShared {
                runtime,
                config,
                resolver,
                delivery: Mutex::new(()),
                state: Mutex::new(ImpressionState {
                    phase: ImpressionPhase::Idle,
                    delivered: false,
                    payload: None,
                    sink: None,
                    attachment: Attachment::Detached,
                }),
            }),
        }
    }

    /// Register the creative the impression is for.
    pub fn register_payload(&self, payload: CreativePayload) {
        self.shared.lock().payload = Some(payload);
    }

    /// Register where the impression is reported.
    ///
    /// The sink is called on a runtime worker and must not call [`stop`](Self::stop) on this
    /// tracker from within the callback.
    pub fn register_event_sink(&self, sink: Arc<dyn EventSink>) {
        self.shared.lock().sink = Some(sink);
    }

    /// Start tracking `target`. A tracker can only be started once; later calls are no-ops.
    pub fn start(&self, target: ImpressionTarget) {
        let weak = Arc::downgrade(&self.shared);
        let attachment = {
            let mut state = self.shared.lock();
            if state.phase != ImpressionPhase::Idle {
                log::debug!(target: "adtrack", phase:? = state.phase; "impression tracker is already started");
                return;
            }
            state.phase = ImpressionPhase::Tracking;

            let attachment = match target {
                ImpressionTarget::Banner(element) => {
                    Attachment::Banner(self.shared.exposure_tracker(weak, element))
                }
                ImpressionTarget::Interstitial { surfaces, host } => {
                    let observer = InterstitialSurfaceObserver::new(surfaces, move |surface| {
                        ImpressionShared::attach_to_surface(&weak, surface, host.clone());
                    });
                    Attachment::Interstitial {
                        observer,
                        tracker: None,
                    }
                }
            };
            state.attachment = clone_attachment(&attachment);
            attachment
        };

        // Started outside of the lock: the observer may find a surface synchronously.
        match &attachment {
            Attachment::Detached => {}
            Attachment::Banner(tracker) => tracker.start(),
            Attachment::Interstitial { observer, .. } => observer.start(),
        }

        if self.phase() == ImpressionPhase::Stopped {
            // stop() raced with start(); make sure nothing keeps running.
            attachment.stop();
        }
    }

    /// Stop all tracking. Any identity resolution still in flight is discarded. Idempotent.
    ///
    /// If the sink is being called at the same time, this waits for the call to return. Once
    /// `stop()` returned, the sink is not called again.
    pub fn stop(&self) {
        let attachment = {
            let _delivery = self.shared.lock_delivery();
            let mut state = self.shared.lock();
            let undelivered = state.phase == ImpressionPhase::Finished && !state.delivered;
            if undelivered
                || matches!(
                    state.phase,
                    ImpressionPhase::Idle | ImpressionPhase::Tracking | ImpressionPhase::Resolving
                )
            {
                state.phase = ImpressionPhase::Stopped;
            }
            state.payload = None;
            state.sink = None;
            std::mem::take(&mut state.attachment)
        };
        attachment.stop();
    }

    /// Current phase.
    pub fn phase(&self) -> ImpressionPhase {
        self.shared.lock().phase
    }
}

fn clone_attachment(attachment: &Attachment) -> Attachment {
    match attachment {
        Attachment::Detached => Attachment::Detached,
        Attachment::Banner(tracker) => Attachment::Banner(tracker.clone()),
        Attachment::Interstitial { observer, tracker } => Attachment::Interstitial {
            observer: observer.clone(),
            tracker: tracker.clone(),
        },
    }
}

impl ImpressionShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, ImpressionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_delivery(&self) -> std::sync::MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exposure_tracker(
        &self,
        weak: Weak<ImpressionShared>,
        element: ElementHandle,
    ) -> ViewabilityTracker {
        let id = element.id();
        ViewabilityTracker::new(
            element,
            self.config.clone(),
            self.runtime.clone(),
            move |_previous, current| ImpressionShared::on_exposure_change(&weak, id, current),
        )
    }

    fn attach_to_surface(weak: &Weak<ImpressionShared>, surface: Surface, host: Weak<dyn ViewHost>) {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let Some(content) = surface.content else {
            return;
        };

        let tracker = {
            let mut state = shared.lock();
            if state.phase != ImpressionPhase::Tracking {
                return;
            }
            let Attachment::Interstitial { tracker: slot, .. } = &mut state.attachment else {
                return;
            };
            let tracker = shared.exposure_tracker(weak.clone(), ElementHandle::from_weak(content, host));
            *slot = Some(tracker.clone());
            tracker
        };

        log::debug!(target: "adtrack", surface:display = surface.id, element:display = content; "attaching impression tracking to interstitial");
        tracker.start();
    }

    fn on_exposure_change(weak: &Weak<ImpressionShared>, element: ElementId, current: &ExposureSample) {
        if !current.is_exposed() {
            return;
        }
        let Some(shared) = weak.upgrade() else {
            return;
        };

        let attachment = {
            let mut state = shared.lock();
            if state.phase != ImpressionPhase::Tracking {
                return;
            }
            state.phase = ImpressionPhase::Resolving;
            std::mem::take(&mut state.attachment)
        };
        // Stop sampling before resolving: resolution may trigger re-layout and more ticks.
        attachment.stop();

        log::debug!(target: "adtrack", element:display = element, factor = current.factor; "element became visible, resolving creative");

        let resolution = shared.resolver.resolve_cache_id(element);
        let weak = weak.clone();
        shared.runtime.spawn(async move {
            let result = resolution.await;
            ImpressionShared::finish_resolution(&weak, result);
        });
    }

    fn finish_resolution(
        weak: &Weak<ImpressionShared>,
        result: std::result::Result<CacheId, ResolutionError>,
    ) {
        let Some(shared) = weak.upgrade() else {
            log::debug!(target: "adtrack", "impression tracker dropped before resolution finished");
            return;
        };

        let (payload, sink) = {
            let mut state = shared.lock();
            if state.phase != ImpressionPhase::Resolving {
                log::debug!(target: "adtrack", phase:? = state.phase; "discarding stale creative resolution");
                return;
            }
            state.phase = ImpressionPhase::Finished;
            (state.payload.clone(), state.sink.clone())
        };

        let outcome = result.and_then(|found| match payload {
            Some(payload) if payload.cache_id == found => Ok(()),
            Some(payload) => Err(ResolutionError::CacheIdMismatch {
                expected: payload.cache_id,
                found,
            }),
            None => Err(ResolutionError::NotFound),
        });

        let _delivery = shared.lock_delivery();
        {
            let mut state = shared.lock();
            if state.phase != ImpressionPhase::Finished {
                log::debug!(target: "adtrack", phase:? = state.phase; "tracker stopped before delivery, discarding outcome");
                return;
            }
            state.delivered = true;
        }

        match (outcome, sink) {
            (Ok(()), Some(sink)) => sink.track_event(TrackingEventKind::Impression),
            (Ok(()), None) => {
                log::warn!(target: "adtrack", "creative verified but no event sink is registered");
            }
            (Err(err), sink) => {
                // Never retried and never re-armed.
                log::warn!(target: "adtrack", "dropping impression: {}", err);
                if let Some(sink) = sink {
                    sink.impression_dropped(&err);
                }
            }
        }
    }
}
