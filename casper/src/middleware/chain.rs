use std::sync::Arc;

use crate::{
    app_state::AppState,
    types::{request_context::RequestContext, request_parts::RequestParts, response::StoredResponse},
};

/// A response flowing through the chain, tagged with where it came from
/// (`spec.md` §4.9): these flags drive metric labels and branching in
/// downstream middlewares.
#[derive(Debug, Clone)]
pub struct MiddlewareResponse {
    pub response: StoredResponse,
    pub is_proxied: bool,
    pub is_cached: bool,
}

impl MiddlewareResponse {
    #[must_use]
    pub fn cached(response: StoredResponse) -> Self {
        Self {
            response,
            is_proxied: false,
            is_cached: true,
        }
    }

    #[must_use]
    pub fn proxied(response: StoredResponse) -> Self {
        Self {
            response,
            is_proxied: true,
            is_cached: false,
        }
    }
}

/// One chain participant (`spec.md` §4.9, §9 "Dynamic middleware chain":
/// "a registry of statically-known middleware implementations selected
/// by name in configuration"). Implementations must not let errors
/// unwind past any of these methods — catch and log internally; the
/// engine has nowhere to route a propagated error back to.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    async fn on_request(
        &self,
        _req: &RequestParts,
        _ctx: &mut RequestContext,
        _state: &AppState,
    ) -> Option<MiddlewareResponse> {
        None
    }

    async fn on_response(
        &self,
        _ctx: &mut RequestContext,
        _response: &mut MiddlewareResponse,
        _state: &AppState,
    ) {
    }

    async fn after_response(
        &self,
        _ctx: &RequestContext,
        _response: &MiddlewareResponse,
        _state: &AppState,
    ) {
    }
}

/// The terminal step invoked when no middleware short-circuits the
/// request: actually reaching the upstream service.
#[async_trait::async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        req: &RequestParts,
        ctx: &mut RequestContext,
        state: &AppState,
    ) -> MiddlewareResponse;
}

/// The ordered middleware chain (C9). One `Chain` is built once at
/// startup from configuration and shared across requests.
#[derive(Clone)]
pub struct Chain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("middlewares", &self.middlewares.iter().map(|m| m.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Everything the pipeline driver needs to finish the request: the
/// response to flush, and the subset of the chain to run
/// `after_response` on afterward (`spec.md` §4.9 step 4).
pub struct DispatchOutcome {
    pub response: MiddlewareResponse,
    invoked: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    #[must_use]
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    /// Runs `on_request` in declared order, the forwarder or a
    /// short-circuit response, then `on_response` in reverse order
    /// (`spec.md` §4.9 steps 1-2).
    pub async fn dispatch(
        &self,
        req: &RequestParts,
        ctx: &mut RequestContext,
        state: &AppState,
        forwarder: &dyn Forwarder,
    ) -> DispatchOutcome {
        let mut invoked: Vec<Arc<dyn Middleware>> = Vec::with_capacity(self.middlewares.len());
        let mut short_circuit = None;
        for mw in &self.middlewares {
            invoked.push(Arc::clone(mw));
            if let Some(response) = mw.on_request(req, ctx, state).await {
                short_circuit = Some(response);
                break;
            }
        }

        let mut response = match short_circuit {
            Some(response) => response,
            None => forwarder.forward(req, ctx, state).await,
        };

        for mw in invoked.iter().rev() {
            mw.on_response(ctx, &mut response, state).await;
        }

        DispatchOutcome { response, invoked }
    }
}

impl DispatchOutcome {
    /// Runs `after_response` in declared order for every middleware whose
    /// `on_request` was invoked. Callers MUST flush `self.response` to
    /// the client before calling this (invariant I4).
    pub async fn run_after_response(self, ctx: &RequestContext, state: &AppState) {
        for mw in &self.invoked {
            mw.after_response(ctx, &self.response, state).await;
        }
    }
}
