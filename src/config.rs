use std::time::Duration;

use crate::rewarded::RewardPolicy;

/// Configuration for [`ViewabilityTracker`](crate::ViewabilityTracker) and the trackers built on
/// top of it.
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Interval between two exposure samples.
    ///
    /// Defaults to [`TrackerConfig::DEFAULT_POLLING_INTERVAL`].
    pub polling_interval: Duration,
    /// Minimum change of the exposure factor that is reported to subscribers. Transitions between
    /// zero and non-zero exposure are always reported.
    ///
    /// Defaults to [`TrackerConfig::DEFAULT_EXPOSURE_EPSILON`].
    pub exposure_epsilon: f64,
    /// Report every element as fully visible, regardless of its geometry. Meant for debugging and
    /// test harnesses that have no real view hierarchy.
    pub force_viewable: bool,
}

impl TrackerConfig {
    /// Default value for [`TrackerConfig::polling_interval`].
    pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(200);
    /// Default value for [`TrackerConfig::exposure_epsilon`].
    pub const DEFAULT_EXPOSURE_EPSILON: f64 = f64::EPSILON;

    /// Create a new `TrackerConfig` using default configuration.
    pub fn new() -> TrackerConfig {
        TrackerConfig::default()
    }

    /// Update polling interval with `interval`.
    pub fn with_polling_interval(mut self, interval: Duration) -> TrackerConfig {
        self.polling_interval = interval;
        self
    }

    /// Update exposure change threshold with `epsilon`.
    pub fn with_exposure_epsilon(mut self, epsilon: f64) -> TrackerConfig {
        self.exposure_epsilon = epsilon;
        self
    }

    /// Force every sample to report the element as fully visible.
    pub fn with_force_viewable(mut self, force_viewable: bool) -> TrackerConfig {
        self.force_viewable = force_viewable;
        self
    }
}

impl Default for TrackerConfig {
    fn default() -> TrackerConfig {
        TrackerConfig {
            polling_interval: TrackerConfig::DEFAULT_POLLING_INTERVAL,
            exposure_epsilon: TrackerConfig::DEFAULT_EXPOSURE_EPSILON,
            force_viewable: false,
        }
    }
}

/// Configuration captured by a [`CreativeLifecycle`](crate::CreativeLifecycle) when the creative
/// is registered. It is never read from global state afterwards.
#[derive(Debug, Clone, Default)]
pub struct CreativeConfig {
    /// Configuration for the exposure and impression trackers of the creative.
    pub tracker: TrackerConfig,
    /// Reward rules. `None` for non-rewarded creatives.
    pub reward: Option<RewardPolicy>,
}

impl CreativeConfig {
    /// Create a configuration for a non-rewarded creative with default tracking settings.
    pub fn new() -> CreativeConfig {
        CreativeConfig::default()
    }

    /// Set tracker configuration.
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use adtrack::{CreativeConfig, TrackerConfig};
    /// let config = CreativeConfig::new()
    ///     .with_tracker(TrackerConfig::new().with_polling_interval(Duration::from_millis(100)));
    /// ```
    pub fn with_tracker(mut self, tracker: TrackerConfig) -> CreativeConfig {
        self.tracker = tracker;
        self
    }

    /// Make the creative rewarded.
    pub fn with_reward_policy(mut self, policy: RewardPolicy) -> CreativeConfig {
        self.reward = Some(policy);
        self
    }

    /// Override the polling interval, as delivered by server configuration. `None` keeps the
    /// current interval.
    pub fn with_polling_interval_override(mut self, interval: Option<Duration>) -> CreativeConfig {
        if let Some(interval) = interval {
            self.tracker.polling_interval = interval;
        }
        self
    }
}
