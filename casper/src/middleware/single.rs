use std::time::Duration;

use crate::{
    app_state::AppState,
    cache::storage::GetOutcome,
    types::{request_context::RequestContext, request_parts::RequestParts, response::StoredResponse},
};

use super::chain::{Middleware, MiddlewareResponse};

/// Cache-aside handling for non-bulk cacheable endpoints (C7, `spec.md`
/// §4.6). Bulk endpoints (`cache_entry.bulk_support`) are left untouched
/// for [`super::bulk::BulkEndpoint`] to handle.
#[derive(Debug, Default)]
pub struct SingleEndpoint;

impl SingleEndpoint {
    /// Applies whenever C3 produced a cache entry for this request,
    /// whether that's an ordinary cacheable hit/miss lookup or a forced
    /// no-cache-header refresh (`spec.md` P8, S6) — both still need keys
    /// derived and a write-through after a 200.
    fn applies(ctx: &RequestContext) -> Option<&crate::types::CacheEntry> {
        let decision = ctx.cacheability_info.as_ref()?;
        if !decision.is_cacheable && !decision.refresh_cache {
            return None;
        }
        let cache_entry = decision.cache_entry.as_deref()?;
        if cache_entry.bulk_support {
            return None;
        }
        Some(cache_entry)
    }
}

#[async_trait::async_trait]
impl Middleware for SingleEndpoint {
    fn name(&self) -> &'static str {
        "single-endpoint"
    }

    async fn on_request(
        &self,
        req: &RequestParts,
        ctx: &mut RequestContext,
        state: &AppState,
    ) -> Option<MiddlewareResponse> {
        let cache_entry = Self::applies(ctx)?.clone();
        let is_refresh = ctx
            .cacheability_info
            .as_ref()
            .is_some_and(|decision| decision.refresh_cache);
        if is_refresh {
            // Forced refresh: skip the cache-aside lookup entirely and let
            // the chain fall through to the forwarder.
            return None;
        }

        if let Some(filter_name) = &cache_entry.use_filter {
            if let Some(filter) = state.filters().resolve(filter_name) {
                if let Some(response) = filter.on_request(req, ctx).await {
                    ctx.cache_status = "filter-short-circuit".to_string();
                    return Some(MiddlewareResponse::cached(response));
                }
            }
        }

        let primary_key = ctx.primary_key.clone()?;
        match state.storage().get(&primary_key).await {
            GetOutcome::Hit(response) => {
                ctx.cache_status = "hit".to_string();
                Some(MiddlewareResponse::cached(response))
            }
            GetOutcome::Miss => {
                ctx.cache_status = "miss".to_string();
                None
            }
            GetOutcome::Error => {
                ctx.cache_status = "storage-error".to_string();
                None
            }
        }
    }

    async fn on_response(
        &self,
        ctx: &mut RequestContext,
        response: &mut MiddlewareResponse,
        _state: &AppState,
    ) {
        if response.is_cached {
            return;
        }
        let Some(decision) = ctx.cacheability_info.clone() else {
            return;
        };
        if Self::applies(ctx).is_none() {
            return;
        }
        // A forced no-cache-header refresh keeps its own status tag
        // (`spec.md` P8, S6); only an ordinary cacheable miss gets
        // overwritten with the upstream outcome here.
        if !decision.is_cacheable {
            return;
        }
        if response.response.status == 200 {
            ctx.cache_status = "miss".to_string();
        } else {
            ctx.cache_status = format!("non-cacheable-response: status code is {}", response.response.status);
        }
    }

    async fn after_response(
        &self,
        ctx: &RequestContext,
        response: &MiddlewareResponse,
        state: &AppState,
    ) {
        if response.is_cached {
            return;
        }
        let Some(cache_entry) = Self::applies(ctx) else {
            return;
        };
        if response.response.status != 200 {
            return;
        }
        let Some(primary_key) = ctx.primary_key.as_ref() else {
            return;
        };

        if let Some(filter_name) = &cache_entry.use_filter {
            if let Some(filter) = state.filters().resolve(filter_name) {
                filter.after_response(ctx, &response.response).await;
            }
        }

        let uncacheable_headers: &[String] = cache_entry.uncacheable_headers.as_deref().unwrap_or_else(|| {
            ctx.service_config
                .as_ref()
                .map(|sc| sc.uncacheable_headers.as_slice())
                .unwrap_or(&[])
        });
        let stored = StoredResponse {
            status: response.response.status,
            headers: response.response.without_uncacheable(uncacheable_headers),
            body: response.response.body.clone(),
        };

        state
            .storage()
            .store(
                primary_key,
                ctx.surrogate_keys.clone(),
                stored,
                Duration::from_secs(cache_entry.ttl_seconds),
            )
            .await;
    }
}
