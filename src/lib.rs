//! Viewability measurement and impression/reward lifecycle tracking for displayed ad creatives.
//!
//! # Overview
//!
//! A [`CreativeLifecycle`] is created for every creative that is about to be displayed. Once
//! [`displayed`](CreativeLifecycle::display), it samples the on-screen geometry of the element the
//! creative was rendered into, using a [`ViewabilityTracker`], and moves through the
//! [`LifecycleState`]s: the `loaded` event fires on display, the `impression` event fires after
//! the element first becomes visible and an [`ImpressionTracker`] verified that it still renders
//! the creative, and rewarded creatives earn their reward after an uninterrupted exposure period.
//!
//! The crate never owns visual elements. The rendering layer implements [`ViewHost`] to answer
//! geometry queries and keeps a [`SurfaceRegistry`] up to date so that interstitials can be
//! detected. Tracking events are recorded by an [`EventManager`], which hands each of them to a
//! [`BeaconDispatcher`] exactly once.
//!
//! All periodic work runs on a [`tokio`] runtime whose handle is passed in explicitly.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Most failures are not surfaced at all: a creative whose identity cannot be verified simply
//! never fires its impression. Only failures that prevent a creative from being displayed are
//! returned to the caller (and reported to its [`CreativeDelegate`]).
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages under the `adtrack` target. Consider integrating a `log`-compatible logger
//! implementation for better visibility into tracking decisions.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod config;
mod creative;
mod element;
mod error;
mod events;
mod exposure;
mod geometry;
mod impression;
mod interstitial;
mod lifecycle;
mod rewarded;
mod scheduler;
mod surface;
mod viewability;

#[cfg(test)]
mod test_utils;

pub use config::{CreativeConfig, TrackerConfig};
pub use creative::{CacheId, CreativeId, CreativePayload};
pub use element::{AncestorClip, ElementHandle, ElementId, ElementSnapshot, ViewHost};
pub use error::{Error, PreconditionError, ResolutionError, Result};
pub use events::{
    BeaconDispatcher, CreativeEvents, EventManager, EventSink, TrackingEventKind,
    TrackingEventRecord,
};
pub use exposure::{sample as sample_exposure, ExposureSample};
pub use geometry::Rect;
pub use impression::{
    CacheIdResolver, ImpressionPhase, ImpressionTarget, ImpressionTracker, ResolveFuture,
};
pub use interstitial::{InterstitialSurfaceObserver, ObserverPhase};
pub use lifecycle::{CreativeDelegate, CreativeLifecycle, LifecycleState, NoopDelegate};
pub use rewarded::{
    Reward, RewardPolicy, RewardTrigger, RewardedClose, RewardedCompletion,
    RewardedCompletionBanner, RewardedCompletionEndcard, RewardedCompletionVideo,
    RewardedConfiguration,
};
pub use scheduler::PollingScheduler;
pub use surface::{SubscriptionId, Surface, SurfaceId, SurfaceListener, SurfaceRegistry};
pub use viewability::{ExposureChangeCallback, ViewabilityTracker};
