use std::sync::Arc;

use thiserror::Error;

use crate::CacheId;

/// Represents a result type for operations in this crate.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors surfaced by viewability and lifecycle tracking.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Identity lookup for a rendered element failed or did not match. Never fatal: the tracker
    /// logs it and drops the impression.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The creative could not be displayed. The lifecycle transitions to `Failed`.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// Server-delivered rewarded configuration could not be parsed.
    #[error("invalid rewarded configuration")]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    InvalidRewardedConfiguration(#[source] Arc<serde_json::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::InvalidRewardedConfiguration(Arc::new(value))
    }
}

/// Failure to correlate a rendered element with the creative that registered for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The rendered content carries no cache id.
    #[error("cache id not found in rendered content")]
    NotFound,
    /// The rendered content could not be interpreted as creative markup.
    #[error("rendered content does not match creative markup")]
    MismatchedContent,
    /// The element renders a different creative than the one registered with the tracker.
    #[error("resolved cache id {found} does not match registered cache id {expected}")]
    CacheIdMismatch {
        /// Cache id registered with the tracker.
        expected: CacheId,
        /// Cache id found in the rendered content.
        found: CacheId,
    },
    /// The element was torn down before its identity could be resolved.
    #[error("element is no longer alive")]
    ElementGone,
}

/// Reasons a creative could not reach the `Displayed` state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// The element to display into does not exist (or its host is gone).
    #[error("element to display into is unavailable")]
    ElementUnavailable,
    /// `display()` was called on a creative that has already been displayed.
    #[error("creative is already displayed")]
    AlreadyDisplayed,
    /// The lifecycle has already completed or failed.
    #[error("creative lifecycle has already terminated")]
    Terminated,
    /// The rendering collaborator reported a failure.
    #[error("render failed: {0}")]
    Render(String),
}
