use std::{collections::HashMap, sync::Arc};

use crate::types::{request_context::RequestContext, request_parts::RequestParts, response::StoredResponse};

/// Per-`cache_entry` extension point referenced by name via
/// `cache_entry.use_filter` (`spec.md` §4.7, §9 "Dynamic middleware
/// chain": "user-extensible filters follow the same pattern, referenced
/// by a string ... and resolved at startup"). No concrete filters ship
/// with Casper; operators register implementations before startup.
#[async_trait::async_trait]
pub trait Filter: Send + Sync + std::fmt::Debug {
    async fn on_request(&self, _req: &RequestParts, _ctx: &RequestContext) -> Option<StoredResponse> {
        None
    }

    async fn after_response(&self, _ctx: &RequestContext, _response: &StoredResponse) {}
}

#[derive(Debug, Clone, Default)]
pub struct FilterRegistry(HashMap<String, Arc<dyn Filter>>);

impl FilterRegistry {
    #[must_use]
    pub fn new(filters: HashMap<String, Arc<dyn Filter>>) -> Self {
        Self(filters)
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.0.get(name).cloned()
    }
}
