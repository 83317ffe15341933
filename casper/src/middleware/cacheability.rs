use crate::{
    app_state::AppState,
    cache::{evaluator, key},
    normalize,
    types::{request_context::RequestContext, request_parts::RequestParts},
};

use super::chain::{Middleware, MiddlewareResponse};

/// Always the first entry in the configured chain: normalizes the
/// request (C2), runs the cacheability evaluator (C3), and derives the
/// primary key / extracted id (C4), stashing the results on `ctx` for
/// [`super::single::SingleEndpoint`] and [`super::bulk::BulkEndpoint`] to
/// consume (`spec.md` §2 data flow: "spectre middleware calls C3/C4").
/// Never short-circuits.
#[derive(Debug, Default)]
pub struct CacheabilityMiddleware;

#[async_trait::async_trait]
impl Middleware for CacheabilityMiddleware {
    fn name(&self) -> &'static str {
        "cacheability"
    }

    async fn on_request(
        &self,
        req: &RequestParts,
        ctx: &mut RequestContext,
        state: &AppState,
    ) -> Option<MiddlewareResponse> {
        let raw_uri = ctx
            .uri
            .path_and_query()
            .map(ToString::to_string)
            .unwrap_or_else(|| ctx.uri.path().to_string());
        ctx.normalized_uri = normalize::normalize_uri(&raw_uri);

        let service_config = state.config().get_destination(&ctx.destination).await.ok();
        let global = state.config().global().await;

        let decision = evaluator::evaluate(
            &ctx.method,
            &ctx.normalized_uri,
            &req.headers,
            &ctx.destination,
            service_config.as_deref(),
            &global,
            &req.body,
        );
        ctx.cache_status = decision.initial_cache_status();

        if let (true, Some(cache_entry), Some(service_config)) = (
            decision.is_cacheable || decision.refresh_cache,
            decision.cache_entry.clone(),
            service_config.clone(),
        ) {
            ctx.normalized_body = normalize::normalize_body(&req.body, &cache_entry);
            if ctx.method == http::Method::GET && cache_entry.enable_id_extraction {
                ctx.extracted_id = key::extract_id(cache_entry.active_pattern(), &ctx.normalized_uri);
            }
            let cache_name = decision.cache_name.clone().unwrap_or_default();
            let primary_key = key::primary_key(
                &ctx.normalized_uri,
                &ctx.method,
                ctx.normalized_body.as_ref(),
                &ctx.destination,
                &cache_name,
                &cache_entry,
                &service_config,
                &req.headers,
            );
            ctx.primary_key = Some(primary_key);
            ctx.surrogate_keys = key::surrogate_keys(&ctx.destination, &cache_name, ctx.extracted_id.as_deref());
        }

        ctx.service_config = service_config;
        ctx.cacheability_info = Some(decision);
        None
    }
}
