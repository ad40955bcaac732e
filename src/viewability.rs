//! Periodic viewability tracking for one element.
use std::sync::{Arc, Mutex, PoisonError};

use tokio::{runtime::Handle, time::Instant};

use crate::{
    element::ElementHandle, exposure, exposure::ExposureSample, scheduler::PollingScheduler,
    TrackerConfig,
};

/// Callback invoked with `(previous, current)` samples whenever exposure changes meaningfully.
pub type ExposureChangeCallback = dyn Fn(&ExposureSample, &ExposureSample) + Send + Sync;

/// Samples the exposure of one element at a fixed interval and notifies a subscriber when it
/// changes.
///
/// A change is reported when the element goes from not exposed to exposed (or back), or when the
/// exposure factor moves by at least [`TrackerConfig::exposure_epsilon`]. The tracker refers to
/// the element through an [`ElementHandle`], so it never keeps the element alive.
///
/// `ViewabilityTracker` is a cheap handle; clones control the same tracker. The tracker stops
/// when the last clone is dropped.
#[derive(Clone)]
pub struct ViewabilityTracker {
    probe: Arc<ExposureProbe>,
    scheduler: Arc<PollingScheduler>,
}

/// The part of the tracker that the tick loop needs. Kept separate from the scheduler so the
/// running loop never keeps the scheduler alive.
struct ExposureProbe {
    element: ElementHandle,
    config: TrackerConfig,
    last: Mutex<Option<ExposureSample>>,
    on_change: Box<ExposureChangeCallback>,
}

impl ViewabilityTracker {
    /// Create a stopped tracker for `element`.
    pub fn new(
        element: ElementHandle,
        config: TrackerConfig,
        runtime: Handle,
        on_change: impl Fn(&ExposureSample, &ExposureSample) + Send + Sync + 'static,
    ) -> ViewabilityTracker {
        ViewabilityTracker {
            probe: Arc::new(ExposureProbe {
                element,
                config,
                last: Mutex::new(None),
                on_change: Box::new(on_change),
            }),
            scheduler: Arc::new(PollingScheduler::new(runtime)),
        }
    }

    /// Start polling. Calling `start()` on a running tracker is a no-op.
    pub fn start(&self) {
        if self.scheduler.is_running() {
            log::debug!(target: "adtrack", element:display = self.probe.element.id(); "viewability tracker is already started");
            return;
        }
        log::debug!(target: "adtrack", element:display = self.probe.element.id(); "starting viewability tracker");

        let probe = Arc::clone(&self.probe);
        self.scheduler
            .start(self.probe.config.polling_interval, move || probe.poll());
    }

    /// Stop polling and forget the last observed exposure. The element itself is unaffected.
    /// Idempotent.
    pub fn stop(&self) {
        self.scheduler.stop();
        *self.probe.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether the tracker is polling.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Take a sample right now, without touching the polling cadence or the change history.
    pub fn check_now(&self) -> ExposureSample {
        self.probe.sample(Instant::now())
    }

    /// Element this tracker observes.
    pub fn element(&self) -> &ElementHandle {
        &self.probe.element
    }
}

impl ExposureProbe {
    fn sample(&self, now: Instant) -> ExposureSample {
        let Some(snapshot) = self.element.snapshot() else {
            // The element (or its host) is gone, which counts as detached.
            return ExposureSample::hidden(now);
        };
        if self.config.force_viewable {
            return ExposureSample::fully_visible(snapshot.frame, now);
        }
        exposure::sample(&snapshot, snapshot.surface_bounds, now)
    }

    fn poll(&self) {
        let current = self.sample(Instant::now());
        let previous = {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            last.replace(current.clone())
        }
        .unwrap_or_else(|| ExposureSample::hidden(current.sampled_at));

        log::trace!(target: "adtrack",
                    element:display = self.element.id(),
                    factor = current.factor;
                    "sampled exposure");

        if is_meaningful_change(&previous, &current, self.config.exposure_epsilon) {
            // Called without holding any lock: the subscriber is free to stop the tracker.
            (self.on_change)(&previous, &current);
        }
    }
}

pub(crate) fn is_meaningful_change(
    previous: &ExposureSample,
    current: &ExposureSample,
    epsilon: f64,
) -> bool {
    previous.is_exposed() != current.is_exposed()
        || (current.factor - previous.factor).abs() >= epsilon
}
