//! Rewarded ad configuration.
//!
//! The server delivers reward rules as the `rwdd` object of the bid response extension. It is
//! parsed once, when the creative is registered, and turned into an immutable [`RewardPolicy`].
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Server-delivered rewarded configuration (`rwdd`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct RewardedConfiguration {
    /// The reward granted to the user.
    pub reward: Option<Reward>,
    /// Criteria for granting the reward.
    pub completion: Option<RewardedCompletion>,
    /// Behavior after the reward is granted.
    pub close: Option<RewardedClose>,
}

/// Reward granted to the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    /// Reward type, e.g. `"coins"`.
    #[serde(rename = "type")]
    pub reward_type: Option<String>,
    /// Reward amount.
    pub count: Option<f64>,
    /// Publisher-specific extension.
    pub ext: Option<HashMap<String, serde_json::Value>>,
}

/// Criteria for granting the reward, per creative format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct RewardedCompletion {
    /// Criteria for banner (HTML) creatives.
    pub banner: Option<RewardedCompletionBanner>,
    /// Criteria for video creatives.
    pub video: Option<RewardedCompletionVideo>,
}

/// Completion criteria for banner (HTML) creatives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct RewardedCompletionBanner {
    /// Seconds of uninterrupted exposure required to earn the reward.
    pub time: Option<f64>,
    /// Creative event that grants the reward.
    pub event: Option<String>,
}

/// Completion criteria for video creatives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct RewardedCompletionVideo {
    /// Seconds of playback required to earn the reward.
    pub time: Option<f64>,
    /// Playback event that grants the reward.
    pub playbackevent: Option<String>,
    /// Criteria applied while the endcard (companion) is shown.
    pub endcard: Option<RewardedCompletionEndcard>,
}

/// Completion criteria for the endcard shown after a video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct RewardedCompletionEndcard {
    /// Seconds of uninterrupted endcard exposure required to earn the reward.
    pub time: Option<f64>,
    /// Creative event that grants the reward.
    pub event: Option<String>,
}

/// Close behavior of a rewarded ad.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct RewardedClose {
    /// Seconds to wait after the reward before the post-reward event.
    pub postrewardtime: Option<f64>,
    /// Action to take once the ad may be closed.
    pub action: Option<String>,
}

impl RewardedConfiguration {
    /// Parse the `rwdd` JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRewardedConfiguration`](crate::Error::InvalidRewardedConfiguration)
    /// if `json` is not a valid rewarded configuration.
    pub fn from_json(json: &str) -> Result<RewardedConfiguration> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Which state unlocks the reward timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardTrigger {
    /// Fixed timer counted from first viewability of a banner creative.
    BannerTimer,
    /// Timer counted only while the endcard (companion) is shown.
    EndcardTimer,
}

/// Rules for earning a reward. Immutable; derived from server configuration at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardPolicy {
    /// Uninterrupted exposure required to earn the reward.
    pub required_continuous_exposure: Duration,
    /// Delay between earning the reward and the post-reward event.
    pub post_reward_delay: Duration,
    /// What unlocks the reward timer.
    pub trigger: RewardTrigger,
}

impl RewardPolicy {
    /// Completion time used when the server does not deliver one.
    pub const DEFAULT_COMPLETION_TIME: Duration = Duration::from_secs(120);
    /// Post-reward delay used when the server does not deliver one.
    pub const DEFAULT_POST_REWARD_DELAY: Duration = Duration::ZERO;

    /// Create a policy with explicit durations.
    pub fn new(
        required_continuous_exposure: Duration,
        post_reward_delay: Duration,
        trigger: RewardTrigger,
    ) -> RewardPolicy {
        RewardPolicy {
            required_continuous_exposure,
            post_reward_delay,
            trigger,
        }
    }

    /// Derive the policy for a creative from server configuration.
    ///
    /// Banner creatives use `completion.banner.time`, endcards use
    /// `completion.video.endcard.time`. Missing or invalid values fall back to
    /// [`RewardPolicy::DEFAULT_COMPLETION_TIME`] and [`RewardPolicy::DEFAULT_POST_REWARD_DELAY`].
    pub fn from_rewarded(config: &RewardedConfiguration, trigger: RewardTrigger) -> RewardPolicy {
        let completion = config.completion.as_ref();
        let completion_time = match trigger {
            RewardTrigger::BannerTimer => completion
                .and_then(|c| c.banner.as_ref())
                .and_then(|b| b.time),
            RewardTrigger::EndcardTimer => completion
                .and_then(|c| c.video.as_ref())
                .and_then(|v| v.endcard.as_ref())
                .and_then(|e| e.time),
        };
        let post_reward_time = config.close.as_ref().and_then(|c| c.postrewardtime);

        RewardPolicy {
            required_continuous_exposure: seconds(completion_time)
                .unwrap_or(RewardPolicy::DEFAULT_COMPLETION_TIME),
            post_reward_delay: seconds(post_reward_time)
                .unwrap_or(RewardPolicy::DEFAULT_POST_REWARD_DELAY),
            trigger,
        }
    }
}

fn seconds(value: Option<f64>) -> Option<Duration> {
    value.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}
