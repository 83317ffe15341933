use std::net::IpAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    response::IntoResponse,
};
use http::{HeaderMap, Method, StatusCode, Uri};
use telemetry::b3::B3Context;

use crate::{
    app_state::AppState,
    error::CasperError,
    internal,
    middleware::chain::MiddlewareResponse,
    types::{request_context::RequestContext, request_parts::RequestParts},
};

const SMARTSTACK_SOURCE: &str = "x-smartstack-source";
const SMARTSTACK_DESTINATION: &str = "x-smartstack-destination";
const SYNC_HEADER: &str = "x-casper-sync";

/// C12: classifies every inbound request and either runs it through the
/// middleware chain (proxied path) or routes it to the internal
/// endpoints (`spec.md` §4.12). This is the single entry point handed to
/// the hyper server in [`crate::app`].
pub async fn handle(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<std::net::SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    match classify(&headers) {
        Classification::Proxied { source, destination } => {
            proxied(state, method, uri, headers, body, Some(remote_addr.ip()), source, destination).await
        }
        Classification::Malformed(name, values) => {
            let diagnostic = format!("X-Smartstack-{name} has multiple values: {};", values.join(" "));
            CasperError::ClientMalformed(diagnostic).into_response()
        }
        Classification::Internal => internal::route(&state, &method, uri.path(), uri.query(), &headers).await,
    }
}

enum Classification {
    Proxied { source: String, destination: String },
    /// `(header name for the diagnostic message, all observed values)`.
    Malformed(&'static str, Vec<String>),
    Internal,
}

/// `spec.md` §4.12: exactly-one-each of the two headers selects the
/// proxied path; either header repeated is a 400; anything else is
/// internal.
fn classify(headers: &HeaderMap) -> Classification {
    let sources: Vec<&str> = headers
        .get_all(SMARTSTACK_SOURCE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    let destinations: Vec<&str> = headers
        .get_all(SMARTSTACK_DESTINATION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    if sources.len() > 1 {
        return Classification::Malformed("Source", sources.iter().map(ToString::to_string).collect());
    }
    if destinations.len() > 1 {
        return Classification::Malformed(
            "Destination",
            destinations.iter().map(ToString::to_string).collect(),
        );
    }
    match (sources.first(), destinations.first()) {
        (Some(source), Some(destination)) => Classification::Proxied {
            source: (*source).to_string(),
            destination: (*destination).to_string(),
        },
        _ => Classification::Internal,
    }
}

#[allow(clippy::too_many_arguments)]
async fn proxied(
    state: AppState,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<IpAddr>,
    source: String,
    destination: String,
) -> axum::response::Response {
    let req = RequestParts { headers: headers.clone(), body };
    let mut ctx = RequestContext::new(method.clone(), uri.clone(), remote_addr, destination.clone(), source);
    ctx.trace = B3Context::extract(&headers);

    let outcome = state
        .chain()
        .dispatch(&req, &mut ctx, &state, state.forwarder())
        .await;
    ctx.finish(StatusCode::from_u16(outcome.response.response.status).unwrap_or(StatusCode::OK));

    let is_sync = headers
        .get(SYNC_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "1");

    let response = render(&outcome.response, &ctx);

    if is_sync {
        outcome.run_after_response(&ctx, &state).await;
    } else {
        let tracker_state = state.clone();
        let tracker_ctx = ctx.clone();
        state.task_tracker().spawn(async move {
            outcome.run_after_response(&tracker_ctx, &tracker_state).await;
        });
    }

    emit_observability(&state, &ctx);
    response
}

/// Builds the outgoing client response, adding the headers `spec.md` §6
/// promises on every proxied response.
fn render(response: &MiddlewareResponse, ctx: &RequestContext) -> axum::response::Response {
    let stored = &response.response;
    let mut builder = http::Response::builder().status(
        StatusCode::from_u16(stored.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    );
    for (name, value) in stored.without_hop_by_hop() {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = builder.header("spectre-cache-status", ctx.cache_status.as_str());
    if response.is_proxied {
        builder = builder.header("x-original-status", stored.status.to_string());
    }
    if let Some(trace) = &ctx.trace {
        builder = builder.header("x-zipkin-id", trace.trace_id.as_str());
    }
    builder
        .body(axum::body::Body::from(stored.body.clone()))
        .unwrap_or_else(|_| {
            http::Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(axum::body::Body::empty())
                .expect("static response is well-formed")
        })
}

fn emit_observability(state: &AppState, ctx: &RequestContext) {
    let cache_name = ctx.cacheability_info.as_ref().and_then(|d| d.cache_name.as_deref());
    let status_str = ctx.response_status.unwrap_or(0).to_string();
    state.observability().increment(
        "requests",
        &[
            ("namespace", ctx.destination.as_str()),
            ("cache_status", ctx.cache_status.as_str()),
            ("status", status_str.as_str()),
        ],
    );
    let millis = ctx.elapsed().as_secs_f64() * 1000.0;
    state
        .observability()
        .record_request_timing(cache_name, &ctx.destination, millis);

    if let Some(b3) = &ctx.trace {
        let end = ctx.end_time.unwrap_or(ctx.start_time);
        let client_ip = ctx.remote_addr.map(|ip| ip.to_string()).unwrap_or_default();
        let line = telemetry::syslog_trace::TraceLine {
            b3,
            start: ctx.start_time,
            end,
            client_ip: &client_ip,
            cache_status: &ctx.cache_status,
            method: ctx.method.as_str(),
            uri: &ctx.normalized_uri,
        };
        state.observability().emit_trace(&line);
    }
}
