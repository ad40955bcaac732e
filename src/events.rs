//! Tracking events and their exactly-once delivery.
//!
//! Trackers and lifecycles report events through the [`EventSink`] trait. The [`EventManager`]
//! keeps a record per `(creative, kind)` pair and forwards each pair to the
//! [`BeaconDispatcher`] at most once. Network delivery and retries are the dispatcher's business.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CreativeId, ResolutionError};

/// Kind of a tracking event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingEventKind {
    /// The creative was displayed.
    Loaded,
    /// The creative became viewable and was verified to be the rendered content.
    Impression,
    /// The user clicked the creative.
    Click,
    /// The user earned the reward of a rewarded creative.
    Reward,
    /// The post-reward delay elapsed.
    PostReward,
}

/// A tracking event that has been recorded for a creative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEventRecord {
    /// Creative the event belongs to.
    pub creative_id: CreativeId,
    /// Kind of the event.
    pub event_kind: TrackingEventKind,
    /// When the event was recorded.
    pub fired_at: DateTime<Utc>,
}

/// Receives tracking events for a single creative.
pub trait EventSink: Send + Sync {
    /// Record `kind` for the creative this sink belongs to.
    fn track_event(&self, kind: TrackingEventKind);

    /// The impression was dropped because the creative could not be verified. It will not be
    /// retried.
    fn impression_dropped(&self, _error: &ResolutionError) {}
}

impl<T: Fn(TrackingEventKind) + Send + Sync> EventSink for T {
    fn track_event(&self, kind: TrackingEventKind) {
        self(kind);
    }
}

/// Delivers recorded events (e.g., fires tracking beacons). Implementations must not call back
/// into the [`EventManager`] that invokes them.
pub trait BeaconDispatcher: Send + Sync {
    /// Deliver `record`. Called exactly once per `(creative, kind)` pair.
    fn dispatch(&self, record: &TrackingEventRecord);
}

pub(crate) struct NoopBeaconDispatcher;
impl BeaconDispatcher for NoopBeaconDispatcher {
    fn dispatch(&self, _record: &TrackingEventRecord) {}
}

impl<T: Fn(&TrackingEventRecord) + Send + Sync> BeaconDispatcher for T {
    fn dispatch(&self, record: &TrackingEventRecord) {
        self(record);
    }
}

/// Records tracking events and forwards each `(creative, kind)` pair to the dispatcher at most
/// once.
///
/// Calls for the same creative are serialized, so the dispatcher sees events in the order they
/// were recorded.
pub struct EventManager {
    dispatcher: Box<dyn BeaconDispatcher>,
    records: Mutex<HashMap<CreativeId, Vec<TrackingEventRecord>>>,
}

impl EventManager {
    /// Create an event manager that forwards events to `dispatcher`.
    pub fn new(dispatcher: impl BeaconDispatcher + 'static) -> EventManager {
        EventManager {
            dispatcher: Box::new(dispatcher),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Record `kind` for `creative`. Returns `true` if the event was recorded and dispatched, or
    /// `false` if it had already been recorded for this creative.
    pub fn track_event(&self, creative: &CreativeId, kind: TrackingEventKind) -> bool {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let creative_records = records.entry(creative.clone()).or_default();
        if creative_records.iter().any(|r| r.event_kind == kind) {
            log::debug!(target: "adtrack",
                        creative_id:display = creative,
                        kind:? = kind;
                        "tracking event already recorded, ignoring");
            return false;
        }

        let record = TrackingEventRecord {
            creative_id: creative.clone(),
            event_kind: kind,
            fired_at: Utc::now(),
        };
        log::trace!(target: "adtrack", record:serde; "dispatching tracking event");
        // Dispatching under the lock keeps per-creative delivery order equal to record order.
        self.dispatcher.dispatch(&record);
        creative_records.push(record);
        true
    }

    /// Whether `kind` has been recorded for `creative`.
    pub fn has_fired(&self, creative: &CreativeId, kind: TrackingEventKind) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(creative)
            .is_some_and(|records| records.iter().any(|r| r.event_kind == kind))
    }

    /// Records of `creative`, in the order they were recorded.
    pub fn records(&self, creative: &CreativeId) -> Vec<TrackingEventRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(creative)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop the records of a creative that has been torn down. Must not be called while the
    /// creative can still report events. A dropped [`CreativeLifecycle`](crate::CreativeLifecycle)
    /// forgets its own records.
    pub fn forget(&self, creative: &CreativeId) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(creative);
    }

    /// An [`EventSink`] that records events for `creative`.
    pub fn for_creative(self: &Arc<Self>, creative: CreativeId) -> CreativeEvents {
        CreativeEvents {
            manager: Arc::clone(self),
            creative,
        }
    }
}

impl Default for EventManager {
    fn default() -> Self {
        EventManager::new(NoopBeaconDispatcher)
    }
}

/// An [`EventManager`] scoped to one creative.
#[derive(Clone)]
pub struct CreativeEvents {
    manager: Arc<EventManager>,
    creative: CreativeId,
}

impl CreativeEvents {
    /// Creative this handle records events for.
    pub fn creative_id(&self) -> &CreativeId {
        &self.creative
    }

    /// Record `kind`. Returns `false` if it had already been recorded.
    pub fn record(&self, kind: TrackingEventKind) -> bool {
        self.manager.track_event(&self.creative, kind)
    }

    /// Whether `kind` has been recorded.
    pub fn has_fired(&self, kind: TrackingEventKind) -> bool {
        self.manager.has_fired(&self.creative, kind)
    }

    /// Drop all records of this creative. See [`EventManager::forget`].
    pub fn forget(&self) {
        self.manager.forget(&self.creative);
    }
}

impl EventSink for CreativeEvents {
    fn track_event(&self, kind: TrackingEventKind) {
        self.record(kind);
    }
}
