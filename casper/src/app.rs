use std::{net::SocketAddr, time::Duration};

use axum::Router;
use futures::future::BoxFuture;
use meltdown::Token;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, sensitive_headers::SetSensitiveHeadersLayer,
    trace::TraceLayer, ServiceBuilderExt,
};
use tracing::{info, warn, Level};

use crate::{app_state::AppState, pipeline};
use telemetry::{make_span::SpanFactory, request_id::MakeRequestId};

/// Bound on how long shutdown waits for detached `after_response` cache
/// writes (`spec.md` §4.13) to drain before the process exits anyway.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Startup/runtime failures surfaced by [`App::run`] (C13, `spec.md`
/// §6 "Exit codes": casper exits non-zero only when the listener can't
/// be bound).
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum ServeError {
    /// failed to bind {0}: {1}
    Bind(SocketAddr, std::io::Error),
    /// server loop failed: {0}
    Serve(std::io::Error),
}

/// The top-level service: [`crate::pipeline::handle`] wrapped in the
/// same ambient `tower` layers the teacher applies globally (panic
/// catching, header redaction, tracing, compression), mirroring
/// `ai-gateway/src/app.rs`'s `build_service_stack` minus the
/// provider-routing-specific layers this proxy has no use for.
#[derive(Clone)]
pub struct App {
    pub state: AppState,
    addr: SocketAddr,
}

impl App {
    #[must_use]
    pub fn new(state: AppState, addr: SocketAddr) -> Self {
        Self { state, addr }
    }

    fn router(&self) -> Router {
        let compression = CompressionLayer::new().gzip(true).br(true).deflate(true).zstd(true);

        Router::new()
            .fallback(pipeline::handle)
            .layer(
                ServiceBuilder::new()
                    .layer(CatchPanicLayer::new())
                    .layer(SetSensitiveHeadersLayer::new(std::iter::once(http::header::AUTHORIZATION)))
                    .layer(TraceLayer::new_for_http().make_span_with(SpanFactory::new(Level::INFO, true)))
                    .set_x_request_id(MakeRequestId)
                    .propagate_x_request_id()
                    .layer(compression),
            )
            .with_state(self.state.clone())
    }
}

impl meltdown::Service for App {
    type Future = BoxFuture<'static, Result<(), ServeError>>;

    fn run(self, token: Token) -> Self::Future {
        Box::pin(async move {
            let addr = self.addr;
            let router = self.router();
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|e| ServeError::Bind(addr, e))?;
            info!(%addr, "server starting");

            let task_tracker = self.state.task_tracker().clone();
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(token)
            .await
            .map_err(ServeError::Serve)?;

            task_tracker.close();
            if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, task_tracker.wait())
                .await
                .is_err()
            {
                warn!("timed out draining in-flight cache writes on shutdown");
            }
            Ok(())
        })
    }
}
