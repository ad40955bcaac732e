//! In-memory collaborator doubles shared by the unit tests.
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use crate::{
    element::{ElementId, ElementSnapshot, ViewHost},
    geometry::Rect,
    impression::{CacheIdResolver, ResolveFuture},
    lifecycle::CreativeDelegate,
    CacheId, Error, ResolutionError,
};

/// Bounds of the single surface every [`TestHost`] element lives in.
pub(crate) const SURFACE: Rect = Rect::new(0.0, 0.0, 100.0, 100.0);

/// A view host with 100x100 elements in a 100x100 surface. An element with exposure `f` is
/// shifted right so that exactly `f` of it stays inside the surface.
#[derive(Default)]
pub(crate) struct TestHost {
    elements: Mutex<HashMap<ElementId, ElementSnapshot>>,
    next_id: Mutex<u64>,
}

impl TestHost {
    pub(crate) fn new() -> TestHost {
        TestHost::default()
    }

    pub(crate) fn add_element(&self, exposure: f64) -> ElementId {
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            ElementId::from(*next_id)
        };
        self.elements
            .lock()
            .unwrap()
            .insert(id, ElementSnapshot::new(frame(exposure), SURFACE));
        id
    }

    pub(crate) fn set_exposure(&self, id: ElementId, exposure: f64) {
        if let Some(snapshot) = self.elements.lock().unwrap().get_mut(&id) {
            snapshot.frame = frame(exposure);
        }
    }

    pub(crate) fn remove_element(&self, id: ElementId) {
        self.elements.lock().unwrap().remove(&id);
    }
}

fn frame(exposure: f64) -> Rect {
    let x0 = 100.0 - 100.0 * exposure;
    Rect::new(x0, 0.0, x0 + 100.0, 100.0)
}

impl ViewHost for TestHost {
    fn snapshot(&self, element: ElementId) -> Option<ElementSnapshot> {
        self.elements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&element)
            .cloned()
    }
}

/// Resolves every element to the same result, optionally after a delay.
pub(crate) struct StaticResolver {
    result: std::result::Result<CacheId, ResolutionError>,
    delay: Mutex<Duration>,
    resolved: Mutex<Vec<ElementId>>,
}

impl StaticResolver {
    pub(crate) fn new(result: std::result::Result<CacheId, ResolutionError>) -> StaticResolver {
        StaticResolver {
            result,
            delay: Mutex::new(Duration::ZERO),
            resolved: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub(crate) fn calls(&self) -> usize {
        self.resolved.lock().unwrap().len()
    }

    pub(crate) fn resolved_elements(&self) -> Vec<ElementId> {
        self.resolved.lock().unwrap().clone()
    }
}

impl CacheIdResolver for StaticResolver {
    fn resolve_cache_id(&self, element: ElementId) -> ResolveFuture {
        self.resolved.lock().unwrap().push(element);
        let result = self.result.clone();
        let delay = *self.delay.lock().unwrap();
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

/// What a [`RecordingDelegate`] was told, in order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DelegateCall {
    Display,
    Fail(String),
    RewardedEvent,
    Complete,
}

#[derive(Default)]
pub(crate) struct RecordingDelegate {
    calls: Mutex<Vec<DelegateCall>>,
}

impl RecordingDelegate {
    pub(crate) fn calls(&self) -> Vec<DelegateCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl CreativeDelegate for RecordingDelegate {
    fn creative_did_display(&self) {
        self.calls.lock().unwrap().push(DelegateCall::Display);
    }

    fn creative_did_fail(&self, error: &Error) {
        self.calls
            .lock()
            .unwrap()
            .push(DelegateCall::Fail(error.to_string()));
    }

    fn creative_did_send_rewarded_event(&self) {
        self.calls.lock().unwrap().push(DelegateCall::RewardedEvent);
    }

    fn creative_did_complete(&self) {
        self.calls.lock().unwrap().push(DelegateCall::Complete);
    }
}
