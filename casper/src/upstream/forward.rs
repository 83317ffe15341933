use std::time::Duration;

use crate::{
    app_state::AppState,
    middleware::chain::{Forwarder, MiddlewareResponse},
    types::{request_context::RequestContext, request_parts::RequestParts},
};

use super::resolve;

/// The default [`Forwarder`]: resolves the destination via SmartStack or
/// Envoy (C6) and proxies the request through [`super::UpstreamClient`].
/// Errors resolving the destination synthesize a 502 rather than panic,
/// mirroring the transport-error handling in [`super::UpstreamClient::forward`].
#[derive(Debug, Default)]
pub struct UpstreamForwarder;

#[async_trait::async_trait]
impl Forwarder for UpstreamForwarder {
    async fn forward(
        &self,
        req: &RequestParts,
        ctx: &mut RequestContext,
        state: &AppState,
    ) -> MiddlewareResponse {
        let global = state.config().global().await;
        let smartstack = state.config().smartstack().await;
        let envoy = state.config().envoy().await;

        let request_uri = ctx
            .uri
            .path_and_query()
            .map(ToString::to_string)
            .unwrap_or_else(|| ctx.uri.path().to_string());

        let resolved = match resolve::resolve(
            &ctx.destination,
            &request_uri,
            &global,
            &smartstack,
            envoy.as_deref(),
        ) {
            Ok(resolved) => resolved,
            Err(error) => {
                return MiddlewareResponse::proxied(crate::types::response::StoredResponse {
                    status: 502,
                    headers: vec![("content-type".to_string(), "text/plain".to_string())],
                    body: format!("Error resolving {}: {error}", ctx.destination).into(),
                });
            }
        };

        let mut headers = crate::types::response::strip_hop_by_hop(&req.headers);
        if let Some(svc) = resolved.svc_header {
            if let Ok(value) = http::HeaderValue::from_str(&svc) {
                headers.insert(http::HeaderName::from_static("x-yelp-svc"), value);
            }
        }

        let timeout = Duration::from_millis(global.casper.http.timeout_ms);
        let response = state
            .upstream()
            .forward(ctx.method.clone(), &resolved.absolute_uri, headers, req.body.clone(), timeout)
            .await;

        MiddlewareResponse::proxied(response)
    }
}
