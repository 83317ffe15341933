use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::{
    cache::storage::Storage,
    config::registry::ConfigRegistry,
    middleware::{
        chain::{Chain, Forwarder},
        filter::FilterRegistry,
    },
    observability::Observability,
    upstream::UpstreamClient,
};

/// Shared, cheaply-cloneable worker state, mirroring the teacher's
/// `AppState(pub Arc<InnerAppState>)` split (`ai-gateway/src/app_state.rs`).
#[derive(Debug, Clone)]
pub struct AppState(pub Arc<InnerAppState>);

impl AppState {
    #[must_use]
    pub fn new(inner: InnerAppState) -> Self {
        Self(Arc::new(inner))
    }

    #[must_use]
    pub fn config(&self) -> &ConfigRegistry {
        self.0.config.as_ref()
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.0.storage
    }

    #[must_use]
    pub fn upstream(&self) -> &UpstreamClient {
        &self.0.upstream
    }

    #[must_use]
    pub fn observability(&self) -> &Observability {
        &self.0.observability
    }

    #[must_use]
    pub fn filters(&self) -> &FilterRegistry {
        &self.0.filters
    }

    #[must_use]
    pub fn worker_id(&self) -> &str {
        &self.0.worker_id
    }

    #[must_use]
    pub fn chain(&self) -> &Chain {
        &self.0.chain
    }

    #[must_use]
    pub fn forwarder(&self) -> &dyn Forwarder {
        self.0.forwarder.as_ref()
    }

    /// Tracks detached `after_response` tasks (`spec.md` §5 "Admission")
    /// so shutdown can drain them instead of dropping in-flight cache
    /// writes.
    #[must_use]
    pub fn task_tracker(&self) -> &TaskTracker {
        &self.0.task_tracker
    }
}

pub struct InnerAppState {
    /// Shared with the background reload task spawned in `main.rs`, so
    /// both see the same hot-reloaded snapshot (`spec.md` §4.1).
    pub config: Arc<ConfigRegistry>,
    pub storage: Storage,
    pub upstream: UpstreamClient,
    pub observability: Observability,
    pub filters: FilterRegistry,
    /// Stable per-process identifier surfaced by `GET /configs`
    /// (`spec.md` §4.10).
    pub worker_id: String,
    pub chain: Chain,
    pub forwarder: Arc<dyn Forwarder>,
    #[doc(hidden)]
    pub task_tracker: TaskTracker,
}

impl std::fmt::Debug for InnerAppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerAppState")
            .field("config", &self.config)
            .field("storage", &self.storage)
            .field("upstream", &self.upstream)
            .field("observability", &self.observability)
            .field("filters", &self.filters)
            .field("worker_id", &self.worker_id)
            .field("chain", &self.chain)
            .field("task_tracker", &self.task_tracker)
            .finish_non_exhaustive()
    }
}
