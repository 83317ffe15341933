use std::time::Duration;

use displaydoc::Display;
use thiserror::Error;

use crate::types::response::StoredResponse;

/// Joins a primary-key field sequence into the opaque key the storage
/// backends are keyed by (`spec.md` §4.4 "joined into the storage-specific
/// opaque key"). `\u{1f}` (unit separator) keeps field boundaries
/// unambiguous even when a field itself contains `|`.
#[must_use]
pub fn encode_key(parts: &[String]) -> String {
    parts.join("\u{1f}")
}

#[derive(Debug, Clone)]
pub struct PutRequest {
    pub primary_key: String,
    pub surrogate_keys: Vec<String>,
    pub response: StoredResponse,
    pub ttl: Duration,
}

/// Result of a storage `get` (`spec.md` §4.5): a transport error is a
/// distinct outcome from a plain miss so callers never write through a
/// fresh copy after a read they can't trust.
#[derive(Debug, Clone)]
pub enum GetOutcome {
    Hit(StoredResponse),
    Miss,
    Error,
}

impl GetOutcome {
    #[must_use]
    pub fn into_option(self) -> Option<StoredResponse> {
        match self {
            Self::Hit(response) => Some(response),
            Self::Miss | Self::Error => None,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

#[derive(Debug, Error, Display)]
pub enum StorageError {
    /// backend connection error: {0}
    Connection(String),
    /// backend returned malformed data: {0}
    Corrupt(String),
}
