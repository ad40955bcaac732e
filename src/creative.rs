use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Identifier of a creative instance, assigned by its owner.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, From, Into, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreativeId(String);

impl From<&str> for CreativeId {
    fn from(value: &str) -> Self {
        CreativeId(value.to_owned())
    }
}

/// Opaque identifier of server-cached creative markup.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, From, Into, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheId(String);

impl From<&str> for CacheId {
    fn from(value: &str) -> Self {
        CacheId(value.to_owned())
    }
}

impl CacheId {
    /// The cache id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What a creative registers with its impression tracker. Set once; used only to check that the
/// element that became visible still renders this creative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreativePayload {
    /// Cache id of the markup this creative rendered.
    pub cache_id: CacheId,
}

impl CreativePayload {
    /// Create a payload for markup cached under `cache_id`.
    pub fn new(cache_id: impl Into<CacheId>) -> CreativePayload {
        CreativePayload {
            cache_id: cache_id.into(),
        }
    }
}
