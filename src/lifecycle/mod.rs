//! The state machine of one displayed creative.
//!
//! A [`CreativeLifecycle`] is created when a creative is registered and dropped when the creative
//! is torn down. It drives the `loaded → impression → reward → post_reward` event sequence from
//! exposure samples, identity resolution and reward deadlines:
//!
//! | From | Event | To |
//! |---|---|---|
//! | `Idle` | [`display`](CreativeLifecycle::display) succeeds | `Displayed` |
//! | `Displayed` | first sample with exposure | `Viewable` |
//! | `Viewable` | impression resolved and matched | `ImpressionFired` |
//! | `ImpressionFired` | an uninterrupted exposed run is in progress | `RewardPending` |
//! | `RewardPending` | the run lasted the required duration | `RewardEarned` → `PostRewardPending` |
//! | `PostRewardPending` | post-reward delay elapsed | `Completed` |
//! | any non-terminal | [`dismiss`](CreativeLifecycle::dismiss) | `Completed` |
//! | `Idle` | precondition failure | `Failed` |
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::{runtime::Handle, time::Instant};

mod reward;
mod timers;

use reward::{RewardClock, RunChange};
use timers::{DeadlineKind, DeadlineTimers};

use crate::{
    element::ElementHandle,
    events::{CreativeEvents, EventManager, EventSink, TrackingEventKind},
    exposure::ExposureSample,
    impression::{CacheIdResolver, ImpressionTarget, ImpressionTracker},
    rewarded::{RewardPolicy, RewardTrigger},
    viewability::ViewabilityTracker,
    CreativeConfig, CreativeId, CreativePayload, Error, PreconditionError, ResolutionError,
    Result,
};

/// State of a [`CreativeLifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Registered, not displayed yet.
    Idle,
    /// Displayed; waiting for the element to become visible.
    Displayed,
    /// Visible at least once; the impression is being verified.
    Viewable,
    /// The impression event fired.
    ImpressionFired,
    /// A rewarded creative is accumulating uninterrupted exposure.
    RewardPending,
    /// The reward was earned.
    RewardEarned,
    /// The reward was earned and the post-reward delay is running.
    PostRewardPending,
    /// Finished, either dismissed or after the post-reward event.
    Completed,
    /// Could not be displayed.
    Failed,
}

impl LifecycleState {
    /// Whether no further transitions (and no further events) are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Completed | LifecycleState::Failed)
    }

    fn is_displayed(self) -> bool {
        !self.is_terminal() && self != LifecycleState::Idle
    }
}

/// Callbacks to the owner of a creative. All methods default to doing nothing.
///
/// Callbacks are never invoked while the lifecycle holds internal locks, so implementations may
/// call back into the [`CreativeLifecycle`].
pub trait CreativeDelegate: Send + Sync {
    /// The creative became viewable for the first time.
    fn creative_did_display(&self) {}

    /// The creative could not be displayed. Called at most once.
    fn creative_did_fail(&self, _error: &Error) {}

    /// The user earned the reward.
    fn creative_did_send_rewarded_event(&self) {}

    /// The creative completed, either dismissed or after the post-reward event.
    fn creative_did_complete(&self) {}
}

/// Default delegate that ignores all callbacks.
pub struct NoopDelegate;
impl CreativeDelegate for NoopDelegate {}

/// The lifecycle of one displayed creative. It moves through the states of [`LifecycleState`].
///
/// Dropping the lifecycle releases its trackers, cancels pending deadlines and drops the events
/// recorded for the creative from the [`EventManager`].
pub struct CreativeLifecycle {
    shared: Arc<LifecycleShared>,
}

struct LifecycleShared {
    this: Weak<LifecycleShared>,
    creative_id: CreativeId,
    payload: CreativePayload,
    config: CreativeConfig,
    events: CreativeEvents,
    resolver: Arc<dyn CacheIdResolver>,
    runtime: Handle,
    inner: Mutex<LifecycleInner>,
}

struct LifecycleInner {
    state: LifecycleState,
    delegate: Arc<dyn CreativeDelegate>,
    trackers: Trackers,
    impression_target: Option<ImpressionTarget>,
    exposed: bool,
    endcard_visible: bool,
    reward_earned: bool,
    clock: RewardClock,
    timers: DeadlineTimers,
}

#[derive(Default)]
struct Trackers {
    exposure: Option<ViewabilityTracker>,
    impression: Option<ImpressionTracker>,
}

impl Trackers {
    fn stop(&self) {
        if let Some(exposure) = &self.exposure {
            exposure.stop();
        }
        if let Some(impression) = &self.impression {
            impression.stop();
        }
    }
}

enum Notification {
    Display,
    Fail(Error),
    RewardedEvent,
    Complete,
}

/// Work decided under the lock and carried out after releasing it.
#[derive(Default)]
struct Effects {
    start: Trackers,
    start_impression: Option<ImpressionTarget>,
    release: Trackers,
    notifications: Vec<Notification>,
    delegate: Option<Arc<dyn CreativeDelegate>>,
}

impl CreativeLifecycle {
    /// Register a creative. Nothing is tracked until [`display`](Self::display) is called.
    ///
    /// `config` is captured here and never re-read.
    pub fn new(
        creative_id: CreativeId,
        payload: CreativePayload,
        config: CreativeConfig,
        events: Arc<EventManager>,
        resolver: Arc<dyn CacheIdResolver>,
        runtime: Handle,
    ) -> CreativeLifecycle {
        let shared = Arc::new_cyclic(|this| LifecycleShared {
            this: this.clone(),
            events: events.for_creative(creative_id.clone()),
            creative_id,
            payload,
            config,
            resolver,
            inner: Mutex::new(LifecycleInner {
                state: LifecycleState::Idle,
                delegate: Arc::new(NoopDelegate),
                trackers: Trackers::default(),
                impression_target: None,
                exposed: false,
                endcard_visible: false,
                reward_earned: false,
                clock: RewardClock::default(),
                timers: DeadlineTimers::new(runtime.clone()),
            }),
            runtime,
        });
        CreativeLifecycle { shared }
    }

    /// Set the owner callbacks.
    pub fn set_delegate(&self, delegate: Arc<dyn CreativeDelegate>) {
        self.shared.lock().delegate = delegate;
    }

    /// Id of the creative.
    pub fn creative_id(&self) -> &CreativeId {
        &self.shared.creative_id
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.shared.lock().state
    }

    /// Display the creative in `element` and start tracking it. `impression` selects how the
    /// impression is verified: directly on the element for banners, or on the interstitial
    /// surface once it is presented.
    ///
    /// Fires the `loaded` event. If the element is already gone, the lifecycle moves to
    /// [`LifecycleState::Failed`] and the delegate is told about it.
    pub fn display(&self, element: ElementHandle, impression: ImpressionTarget) -> Result<()> {
        let shared = &self.shared;
        let (effects, result) = {
            let mut inner = shared.lock();
            match inner.state {
                LifecycleState::Idle => {}
                state if state.is_terminal() => {
                    return Err(PreconditionError::Terminated.into());
                }
                _ => return Err(PreconditionError::AlreadyDisplayed.into()),
            }

            if !element.is_alive() {
                let error = Error::from(PreconditionError::ElementUnavailable);
                let effects = shared.fail(&mut inner, error.clone());
                (effects, Err(error))
            } else {
                shared.transition(&mut inner, LifecycleState::Displayed);
                shared.events.record(TrackingEventKind::Loaded);

                let exposure = shared.exposure_tracker(element);
                let impression_tracker = ImpressionTracker::new(
                    shared.config.tracker.clone(),
                    Arc::clone(&shared.resolver),
                    shared.runtime.clone(),
                );
                impression_tracker.register_payload(shared.payload.clone());
                impression_tracker.register_event_sink(Arc::new(ImpressionRelay {
                    lifecycle: shared.this.clone(),
                }));

                inner.trackers = Trackers {
                    exposure: Some(exposure.clone()),
                    impression: Some(impression_tracker),
                };
                inner.impression_target = Some(impression);

                let effects = Effects {
                    start: Trackers {
                        exposure: Some(exposure),
                        impression: None,
                    },
                    ..Effects::default()
                };
                (effects, Ok(()))
            }
        };
        shared.deliver(effects);
        result
    }

    /// Report that displaying failed for a reason outside of the lifecycle's view (e.g., the
    /// markup failed to render). Only has an effect before the creative is displayed.
    pub fn report_failure(&self, error: PreconditionError) {
        let effects = {
            let mut inner = self.shared.lock();
            if inner.state != LifecycleState::Idle {
                log::debug!(target: "adtrack",
                            creative_id:display = self.shared.creative_id,
                            state:? = inner.state;
                            "ignoring failure reported after display: {}", error);
                return;
            }
            self.shared.fail(&mut inner, error.into())
        };
        self.shared.deliver(effects);
    }

    /// Sample the exposure of the displayed element right now and apply it like a regular poll
    /// would. Returns `None` if the creative is not being tracked.
    pub fn check_viewability(&self) -> Option<ExposureSample> {
        let tracker = {
            let inner = self.shared.lock();
            if !inner.state.is_displayed() {
                return None;
            }
            inner.trackers.exposure.clone()?
        };
        let sample = tracker.check_now();
        self.shared.apply_sample(&sample);
        Some(sample)
    }

    /// Set whether the endcard (companion) is shown. Unlocks the reward timer of endcard-rewarded
    /// creatives; hiding the endcard interrupts accumulation.
    pub fn set_endcard_visible(&self, visible: bool) {
        let mut inner = self.shared.lock();
        if inner.endcard_visible == visible {
            return;
        }
        inner.endcard_visible = visible;
        log::debug!(target: "adtrack",
                    creative_id:display = self.shared.creative_id,
                    visible;
                    "endcard visibility changed");
        if inner.state.is_displayed() {
            self.shared.update_reward(&mut inner, Instant::now());
        }
    }

    /// Record a click on the creative. Returns `false` if the creative is not displayed or a
    /// click was already recorded.
    pub fn track_click(&self) -> bool {
        let inner = self.shared.lock();
        if !inner.state.is_displayed() {
            return false;
        }
        self.shared.events.record(TrackingEventKind::Click)
    }

    /// Tear the creative down: stop all trackers and cancel pending deadlines. No event fires
    /// afterwards. No-op once the lifecycle has terminated.
    pub fn dismiss(&self) {
        let effects = {
            let mut inner = self.shared.lock();
            if inner.state.is_terminal() {
                return;
            }
            self.shared.complete(&mut inner)
        };
        self.shared.deliver(effects);
    }

    /// Whether the reward was earned.
    pub fn has_earned_reward(&self) -> bool {
        self.shared.lock().reward_earned
    }

    /// Whether the post-reward event was sent.
    pub fn post_reward_sent(&self) -> bool {
        self.shared.events.has_fired(TrackingEventKind::PostReward)
    }
}

impl LifecycleShared {
    fn lock(&self) -> MutexGuard<'_, LifecycleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut LifecycleInner, to: LifecycleState) {
        log::debug!(target: "adtrack",
                    creative_id:display = self.creative_id,
                    from:? = inner.state,
                    to:? = to;
                    "creative lifecycle transition");
        inner.state = to;
    }

    fn reward_policy(&self) -> Option<&RewardPolicy> {
        self.config.reward.as_ref()
    }

    fn exposure_tracker(&self, element: ElementHandle) -> ViewabilityTracker {
        let lifecycle = self.this.clone();
        ViewabilityTracker::new(
            element,
            self.config.tracker.clone(),
            self.runtime.clone(),
            move |_previous, current| {
                if let Some(lifecycle) = lifecycle.upgrade() {
                    lifecycle.apply_sample(current);
                }
            },
        )
    }

    fn apply_sample(&self, sample: &ExposureSample) {
        let effects = {
            let mut inner = self.lock();
            if !inner.state.is_displayed() {
                return;
            }
            inner.exposed = sample.is_exposed();

            let mut effects = Effects::default();
            if inner.state == LifecycleState::Displayed && inner.exposed {
                self.transition(&mut inner, LifecycleState::Viewable);
                effects.start.impression = inner.trackers.impression.clone();
                effects.start_impression = inner.impression_target.take();
                effects.notify(Notification::Display);
            }
            self.update_reward(&mut inner, sample.sampled_at);
            effects.with_delegate(&inner)
        };
        self.deliver(effects);
    }

    fn impression_verified(&self) {
        let effects = {
            let mut inner = self.lock();
            if inner.state != LifecycleState::Viewable {
                log::debug!(target: "adtrack",
                            creative_id:display = self.creative_id,
                            state:? = inner.state;
                            "ignoring impression outside of viewable state");
                return;
            }
            self.events.record(TrackingEventKind::Impression);
            self.transition(&mut inner, LifecycleState::ImpressionFired);

            let mut effects = Effects::default();
            if self.reward_policy().is_some() {
                self.arm_reward(&mut inner);
            } else {
                // Nothing left to observe for a non-rewarded creative.
                effects.release.exposure = inner.trackers.exposure.take();
            }
            effects
        };
        self.deliver(effects);
    }

    /// The impression can never fire: stop sampling. The creative stays `Viewable`.
    fn impression_dropped(&self, error: &ResolutionError) {
        let effects = {
            let mut inner = self.lock();
            if inner.state != LifecycleState::Viewable {
                return;
            }
            log::warn!(target: "adtrack",
                       creative_id:display = self.creative_id;
                       "impression dropped, releasing exposure tracking: {}", error);
            inner.exposed = false;
            Effects {
                release: Trackers {
                    exposure: inner.trackers.exposure.take(),
                    impression: None,
                },
                ..Effects::default()
            }
        };
        self.deliver(effects);
    }

    /// Feed the current exposure and endcard state into reward accounting.
    fn update_reward(&self, inner: &mut LifecycleInner, at: Instant) {
        let Some(policy) = self.reward_policy() else {
            return;
        };
        let unlocked = match policy.trigger {
            RewardTrigger::BannerTimer => true,
            RewardTrigger::EndcardTimer => inner.endcard_visible,
        };
        let counting = matches!(
            inner.state,
            LifecycleState::Viewable | LifecycleState::ImpressionFired | LifecycleState::RewardPending
        );

        let accumulated = inner.clock.accumulated(at);
        match inner.clock.observe(counting && inner.exposed && unlocked, at) {
            RunChange::Started => {
                log::trace!(target: "adtrack", creative_id:display = self.creative_id; "reward accumulation started");
                self.arm_reward(inner);
            }
            RunChange::Interrupted => {
                log::debug!(target: "adtrack",
                            creative_id:display = self.creative_id,
                            accumulated:? = accumulated;
                            "reward accumulation interrupted");
                inner.timers.cancel(DeadlineKind::Reward);
                if inner.state == LifecycleState::RewardPending {
                    self.transition(inner, LifecycleState::ImpressionFired);
                }
            }
            RunChange::Unchanged => {}
        }
    }

    /// Arm the reward deadline at the end of the current run. Only possible once the impression
    /// fired.
    fn arm_reward(&self, inner: &mut LifecycleInner) {
        if inner.state != LifecycleState::ImpressionFired {
            return;
        }
        let Some(policy) = self.reward_policy() else {
            return;
        };
        let Some(deadline) = inner.clock.deadline(policy.required_continuous_exposure) else {
            return;
        };

        let lifecycle = self.this.clone();
        inner.timers.arm(DeadlineKind::Reward, deadline, move |token| {
            if let Some(lifecycle) = lifecycle.upgrade() {
                lifecycle.deadline_fired(DeadlineKind::Reward, token);
            }
        });
        self.transition(inner, LifecycleState::RewardPending);
    }

    fn deadline_fired(&self, kind: DeadlineKind, token: u64) {
        let effects = {
            let mut inner = self.lock();
            if !inner.timers.disarm(kind, token) {
                log::trace!(target: "adtrack", kind:? = kind; "ignoring stale deadline");
                return;
            }
            match (kind, inner.state) {
                (DeadlineKind::Reward, LifecycleState::RewardPending) => self.earn_reward(&mut inner),
                (DeadlineKind::PostReward, LifecycleState::PostRewardPending) => {
                    self.events.record(TrackingEventKind::PostReward);
                    self.complete(&mut inner)
                }
                (kind, state) => {
                    log::debug!(target: "adtrack", kind:? = kind, state:? = state; "deadline fired in unexpected state");
                    return;
                }
            }
        };
        self.deliver(effects);
    }

    fn earn_reward(&self, inner: &mut LifecycleInner) -> Effects {
        self.transition(inner, LifecycleState::RewardEarned);
        inner.reward_earned = true;
        self.events.record(TrackingEventKind::Reward);

        let mut effects = Effects::default();
        effects.release.exposure = inner.trackers.exposure.take();
        effects.notify(Notification::RewardedEvent);

        let delay = self
            .reward_policy()
            .map(|policy| policy.post_reward_delay)
            .unwrap_or(RewardPolicy::DEFAULT_POST_REWARD_DELAY);
        let lifecycle = self.this.clone();
        inner.timers.arm(DeadlineKind::PostReward, Instant::now() + delay, move |token| {
            if let Some(lifecycle) = lifecycle.upgrade() {
                lifecycle.deadline_fired(DeadlineKind::PostReward, token);
            }
        });
        self.transition(inner, LifecycleState::PostRewardPending);

        effects.with_delegate(inner)
    }

    fn complete(&self, inner: &mut LifecycleInner) -> Effects {
        self.transition(inner, LifecycleState::Completed);
        inner.timers.cancel_all();
        inner.impression_target = None;

        let mut effects = Effects {
            release: std::mem::take(&mut inner.trackers),
            ..Effects::default()
        };
        effects.notify(Notification::Complete);
        effects.with_delegate(inner)
    }

    fn fail(&self, inner: &mut LifecycleInner, error: Error) -> Effects {
        log::warn!(target: "adtrack", creative_id:display = self.creative_id; "creative failed to display: {}", error);
        self.transition(inner, LifecycleState::Failed);
        inner.timers.cancel_all();

        let mut effects = Effects {
            release: std::mem::take(&mut inner.trackers),
            ..Effects::default()
        };
        effects.notify(Notification::Fail(error));
        effects.with_delegate(inner)
    }

    /// Carry out effects. Must be called without holding the lock.
    fn deliver(&self, effects: Effects) {
        effects.release.stop();

        if let Some(exposure) = &effects.start.exposure {
            exposure.start();
        }
        if let (Some(impression), Some(target)) = (&effects.start.impression, effects.start_impression)
        {
            impression.start(target);
        }
        if effects.start.exposure.is_some() || effects.start.impression.is_some() {
            // A concurrent dismiss() may have released the trackers before they were started.
            if self.lock().state.is_terminal() {
                effects.start.stop();
            }
        }

        if let Some(delegate) = effects.delegate {
            for notification in effects.notifications {
                match notification {
                    Notification::Display => delegate.creative_did_display(),
                    Notification::Fail(error) => delegate.creative_did_fail(&error),
                    Notification::RewardedEvent => delegate.creative_did_send_rewarded_event(),
                    Notification::Complete => delegate.creative_did_complete(),
                }
            }
        }
    }
}

impl Drop for CreativeLifecycle {
    fn drop(&mut self) {
        let shared = &self.shared;
        let released = {
            let mut inner = shared.lock();
            if !inner.state.is_terminal() {
                // Continuations that still hold the shared state see a terminal state.
                shared.transition(&mut inner, LifecycleState::Completed);
            }
            inner.timers.cancel_all();
            inner.impression_target = None;
            std::mem::take(&mut inner.trackers)
        };
        released.stop();
        shared.events.forget();
    }
}

impl Effects {
    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    fn with_delegate(mut self, inner: &LifecycleInner) -> Effects {
        if !self.notifications.is_empty() {
            self.delegate = Some(Arc::clone(&inner.delegate));
        }
        self
    }
}

/// Receives the verified impression from the [`ImpressionTracker`] and moves the lifecycle
/// forward. The impression event itself is recorded by the lifecycle.
struct ImpressionRelay {
    lifecycle: Weak<LifecycleShared>,
}

impl EventSink for ImpressionRelay {
    fn track_event(&self, kind: TrackingEventKind) {
        match (kind, self.lifecycle.upgrade()) {
            (TrackingEventKind::Impression, Some(lifecycle)) => lifecycle.impression_verified(),
            (_, Some(lifecycle)) => {
                let inner = lifecycle.lock();
                if inner.state.is_displayed() {
                    lifecycle.events.record(kind);
                }
            }
            (_, None) => {}
        }
    }

    fn impression_dropped(&self, error: &ResolutionError) {
        if let Some(lifecycle) = self.lifecycle.upgrade() {
            lifecycle.impression_dropped(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::runtime::Handle;

    use super::*;
    use crate::{
        element::{ElementId, ViewHost},
        events::TrackingEventRecord,
        rewarded::RewardTrigger,
        surface::{Surface, SurfaceId, SurfaceRegistry},
        test_utils::{DelegateCall, RecordingDelegate, StaticResolver, TestHost, SURFACE},
        CacheId, ResolutionError, TrackerConfig,
    };

    struct Fixture {
        host: Arc<TestHost>,
        events: Arc<EventManager>,
        delegate: Arc<RecordingDelegate>,
        lifecycle: CreativeLifecycle,
        element: ElementId,
    }

    impl Fixture {
        fn new(config: CreativeConfig) -> Fixture {
            Fixture::with_resolved(config, Ok("cache-1"))
        }

        fn with_resolved(
            config: CreativeConfig,
            resolved: std::result::Result<&str, ResolutionError>,
        ) -> Fixture {
            let _ = env_logger::builder().is_test(true).try_init();
            let host = Arc::new(TestHost::new());
            let element = host.add_element(1.0);
            let events = Arc::new(EventManager::default());
            let delegate = Arc::new(RecordingDelegate::default());
            let lifecycle = CreativeLifecycle::new(
                CreativeId::from("creative"),
                CreativePayload::new("cache-1"),
                config,
                Arc::clone(&events),
                Arc::new(StaticResolver::new(resolved.map(CacheId::from))),
                Handle::current(),
            );
            lifecycle.set_delegate(delegate.clone());
            Fixture {
                host,
                events,
                delegate,
                lifecycle,
                element,
            }
        }

        fn display(&self) -> Result<()> {
            let host: Arc<dyn ViewHost> = self.host.clone();
            let element = ElementHandle::new(self.element, &host);
            self.lifecycle
                .display(element.clone(), ImpressionTarget::Banner(element))
        }

        fn display_interstitial(&self, surfaces: Arc<SurfaceRegistry>) -> Result<()> {
            let host: Arc<dyn ViewHost> = self.host.clone();
            let element = ElementHandle::new(self.element, &host);
            self.lifecycle.display(
                element,
                ImpressionTarget::Interstitial {
                    surfaces,
                    host: Arc::downgrade(&host),
                },
            )
        }

        fn exposure_tracker(&self) -> Option<ViewabilityTracker> {
            self.lifecycle.shared.lock().trackers.exposure.clone()
        }

        fn event_kinds(&self) -> Vec<TrackingEventKind> {
            self.events
                .records(self.lifecycle.creative_id())
                .into_iter()
                .map(|r: TrackingEventRecord| r.event_kind)
                .collect()
        }
    }

    fn rewarded(required: f64, post_reward: f64, trigger: RewardTrigger) -> CreativeConfig {
        CreativeConfig::new().with_reward_policy(RewardPolicy::new(
            Duration::from_secs_f64(required),
            Duration::from_secs_f64(post_reward),
            trigger,
        ))
    }

    async fn sleep(secs: f64) {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn banner_fires_loaded_then_impression() {
        let f = Fixture::new(CreativeConfig::new());

        f.display().unwrap();
        assert_eq!(f.lifecycle.state(), LifecycleState::Displayed);
        assert_eq!(f.event_kinds(), vec![TrackingEventKind::Loaded]);

        sleep(1.0).await;

        assert_eq!(f.lifecycle.state(), LifecycleState::ImpressionFired);
        assert_eq!(
            f.event_kinds(),
            vec![TrackingEventKind::Loaded, TrackingEventKind::Impression]
        );
        assert_eq!(f.delegate.calls(), vec![DelegateCall::Display]);
    }

    #[tokio::test(start_paused = true)]
    async fn force_viewable_ignores_geometry() {
        let config = CreativeConfig::new().with_tracker(TrackerConfig::new().with_force_viewable(true));
        let f = Fixture::new(config);
        f.host.set_exposure(f.element, 0.0);

        f.display().unwrap();
        sleep(1.0).await;

        assert_eq!(
            f.event_kinds(),
            vec![TrackingEventKind::Loaded, TrackingEventKind::Impression]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_creative_stays_displayed() {
        let f = Fixture::new(CreativeConfig::new());
        f.host.set_exposure(f.element, 0.0);

        f.display().unwrap();
        sleep(2.0).await;

        assert_eq!(f.lifecycle.state(), LifecycleState::Displayed);
        assert_eq!(f.event_kinds(), vec![TrackingEventKind::Loaded]);
        assert!(f.delegate.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_creative_never_fires_impression() {
        let f = Fixture::with_resolved(
            rewarded(1.0, 0.0, RewardTrigger::BannerTimer),
            Ok("recycled"),
        );

        f.display().unwrap();
        let exposure = f.exposure_tracker().unwrap();
        sleep(5.0).await;

        assert_eq!(f.lifecycle.state(), LifecycleState::Viewable);
        assert_eq!(f.event_kinds(), vec![TrackingEventKind::Loaded]);
        assert!(!f.lifecycle.has_earned_reward());
        assert!(!exposure.is_running());
        assert!(f.exposure_tracker().is_none());
        assert!(f.lifecycle.check_viewability().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_resolution_releases_exposure_tracking() {
        let f = Fixture::with_resolved(CreativeConfig::new(), Err(ResolutionError::NotFound));

        f.display().unwrap();
        let exposure = f.exposure_tracker().unwrap();
        sleep(1.0).await;
        assert!(!exposure.is_running());

        f.host.set_exposure(f.element, 0.0);
        sleep(1.0).await;
        f.host.set_exposure(f.element, 1.0);
        sleep(1.0).await;

        assert_eq!(f.lifecycle.state(), LifecycleState::Viewable);
        assert_eq!(f.event_kinds(), vec![TrackingEventKind::Loaded]);
        assert_eq!(f.delegate.calls(), vec![DelegateCall::Display]);
    }

    #[tokio::test(start_paused = true)]
    async fn interstitial_impression_waits_for_surface() {
        let f = Fixture::new(CreativeConfig::new());
        let registry = Arc::new(SurfaceRegistry::new());
        registry.present(Surface {
            id: SurfaceId::from(0),
            bounds: SURFACE,
            is_primary: true,
            content: Some(f.host.add_element(1.0)),
        });

        f.display_interstitial(registry.clone()).unwrap();
        sleep(1.0).await;
        // Viewable, but the impression tracker has no surface to watch yet.
        assert_eq!(f.lifecycle.state(), LifecycleState::Viewable);
        assert_eq!(f.event_kinds(), vec![TrackingEventKind::Loaded]);

        registry.present(Surface {
            id: SurfaceId::from(1),
            bounds: SURFACE,
            is_primary: false,
            content: Some(f.element),
        });
        sleep(1.0).await;

        assert_eq!(f.lifecycle.state(), LifecycleState::ImpressionFired);
        assert_eq!(
            f.event_kinds(),
            vec![TrackingEventKind::Loaded, TrackingEventKind::Impression]
        );
        assert_eq!(f.delegate.calls(), vec![DelegateCall::Display]);
    }

    #[tokio::test(start_paused = true)]
    async fn reward_after_uninterrupted_exposure() {
        let f = Fixture::new(rewarded(5.0, 0.0, RewardTrigger::BannerTimer));
        f.host.set_exposure(f.element, 0.6);

        f.display().unwrap();
        // First visible sample at 0.2s starts the run.
        sleep(5.1).await;
        assert_eq!(f.lifecycle.state(), LifecycleState::RewardPending);
        assert!(!f.lifecycle.has_earned_reward());

        sleep(0.2).await;
        assert!(f.lifecycle.has_earned_reward());
        assert!(f.lifecycle.post_reward_sent());
        assert_eq!(f.lifecycle.state(), LifecycleState::Completed);
        assert_eq!(
            f.event_kinds(),
            vec![
                TrackingEventKind::Loaded,
                TrackingEventKind::Impression,
                TrackingEventKind::Reward,
                TrackingEventKind::PostReward
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn interruption_restarts_accumulation() {
        let f = Fixture::new(rewarded(5.0, 0.0, RewardTrigger::BannerTimer));

        f.display().unwrap();
        sleep(3.05).await;
        f.host.set_exposure(f.element, 0.0);
        // Hidden sample at 3.2s resets the run.
        sleep(0.25).await;
        assert_eq!(f.lifecycle.state(), LifecycleState::ImpressionFired);
        f.host.set_exposure(f.element, 0.6);

        // Visible again at 3.4s, reward due at 8.4s.
        sleep(5.0).await;
        assert!(!f.lifecycle.has_earned_reward());

        sleep(0.2).await;
        assert!(f.lifecycle.has_earned_reward());
        assert_eq!(
            f.delegate.calls(),
            vec![
                DelegateCall::Display,
                DelegateCall::RewardedEvent,
                DelegateCall::Complete
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn post_reward_fires_after_delay() {
        let f = Fixture::new(rewarded(1.0, 2.0, RewardTrigger::BannerTimer));

        f.display().unwrap();
        sleep(1.3).await;
        assert!(f.lifecycle.has_earned_reward());
        assert_eq!(f.lifecycle.state(), LifecycleState::PostRewardPending);
        assert!(!f.lifecycle.post_reward_sent());

        sleep(2.0).await;
        assert!(f.lifecycle.post_reward_sent());
        assert_eq!(f.lifecycle.state(), LifecycleState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn endcard_gates_reward() {
        let f = Fixture::new(rewarded(1.0, 0.0, RewardTrigger::EndcardTimer));

        f.display().unwrap();
        sleep(2.0).await;
        assert_eq!(f.lifecycle.state(), LifecycleState::ImpressionFired);

        f.lifecycle.set_endcard_visible(true);
        sleep(0.5).await;
        f.lifecycle.set_endcard_visible(false);
        f.lifecycle.set_endcard_visible(true);
        sleep(0.9).await;
        assert!(!f.lifecycle.has_earned_reward());

        sleep(0.2).await;
        assert!(f.lifecycle.has_earned_reward());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_cancels_pending_reward() {
        let f = Fixture::new(rewarded(5.0, 0.0, RewardTrigger::BannerTimer));

        f.display().unwrap();
        sleep(1.0).await;
        assert_eq!(f.lifecycle.state(), LifecycleState::RewardPending);

        f.lifecycle.dismiss();
        f.lifecycle.dismiss();
        sleep(10.0).await;

        assert_eq!(f.lifecycle.state(), LifecycleState::Completed);
        assert!(!f.lifecycle.has_earned_reward());
        assert!(!f.lifecycle.track_click());
        assert_eq!(
            f.event_kinds(),
            vec![TrackingEventKind::Loaded, TrackingEventKind::Impression]
        );
        assert_eq!(
            f.delegate.calls(),
            vec![DelegateCall::Display, DelegateCall::Complete]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_element_fails_once() {
        let f = Fixture::new(CreativeConfig::new());
        f.host.remove_element(f.element);

        let result = f.display();

        assert!(matches!(
            result,
            Err(Error::Precondition(PreconditionError::ElementUnavailable))
        ));
        assert_eq!(f.lifecycle.state(), LifecycleState::Failed);
        assert!(matches!(
            f.display(),
            Err(Error::Precondition(PreconditionError::Terminated))
        ));
        f.lifecycle.dismiss();
        f.lifecycle.report_failure(PreconditionError::Render("again".to_owned()));
        sleep(1.0).await;

        assert!(f.event_kinds().is_empty());
        assert_eq!(
            f.delegate.calls(),
            vec![DelegateCall::Fail(
                "element to display into is unavailable".to_owned()
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reported_failure_only_before_display() {
        let f = Fixture::new(CreativeConfig::new());
        f.lifecycle
            .report_failure(PreconditionError::Render("bad markup".to_owned()));
        assert_eq!(f.lifecycle.state(), LifecycleState::Failed);

        let g = Fixture::new(CreativeConfig::new());
        g.display().unwrap();
        g.lifecycle
            .report_failure(PreconditionError::Render("late".to_owned()));
        assert_eq!(g.lifecycle.state(), LifecycleState::Displayed);
        assert!(matches!(
            g.display(),
            Err(Error::Precondition(PreconditionError::AlreadyDisplayed))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn check_viewability_applies_sample_immediately() {
        let f = Fixture::new(CreativeConfig::new());
        assert!(f.lifecycle.check_viewability().is_none());

        f.display().unwrap();
        let sample = f.lifecycle.check_viewability().unwrap();

        assert_eq!(sample.factor, 1.0);
        assert_eq!(f.lifecycle.state(), LifecycleState::Viewable);
        assert_eq!(f.delegate.calls(), vec![DelegateCall::Display]);
    }

    #[tokio::test(start_paused = true)]
    async fn click_is_recorded_once() {
        let f = Fixture::new(CreativeConfig::new());
        assert!(!f.lifecycle.track_click());

        f.display().unwrap();
        assert!(f.lifecycle.track_click());
        assert!(!f.lifecycle.track_click());

        assert_eq!(
            f.event_kinds(),
            vec![TrackingEventKind::Loaded, TrackingEventKind::Click]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_lifecycle_stops_tracking() {
        let f = Fixture::new(rewarded(1.0, 0.0, RewardTrigger::BannerTimer));
        f.display().unwrap();
        sleep(0.5).await;
        let Fixture {
            events, lifecycle, ..
        } = f;
        let creative = lifecycle.creative_id().clone();

        assert!(!events.records(&creative).is_empty());

        drop(lifecycle);
        sleep(5.0).await;

        assert!(!events.has_fired(&creative, TrackingEventKind::Reward));
        assert!(events.records(&creative).is_empty());
    }
}
