use tower_http::trace::MakeSpan;
use tracing::Level;

use crate::b3::B3Context;

/// `tower_http::trace::TraceLayer::make_span_with` factory that opens one
/// span per request and records the B3 trace id (if any) as a field, so
/// every log line emitted while handling the request is correlated with
/// the upstream trace.
#[derive(Debug, Clone)]
pub struct SpanFactory {
    level: Level,
    propagate: bool,
}

impl SpanFactory {
    #[must_use]
    pub const fn new(level: Level, propagate: bool) -> Self {
        Self { level, propagate }
    }
}

impl<B> MakeSpan<B> for SpanFactory {
    fn make_span(&mut self, request: &http::Request<B>) -> tracing::Span {
        let trace_id = self
            .propagate
            .then(|| B3Context::extract(request.headers()))
            .flatten()
            .map(|ctx| ctx.trace_id);

        macro_rules! span_at {
            ($lvl:expr) => {
                tracing::span!(
                    $lvl,
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    trace_id = trace_id.as_deref().unwrap_or("none"),
                )
            };
        }

        match self.level {
            Level::TRACE => span_at!(Level::TRACE),
            Level::DEBUG => span_at!(Level::DEBUG),
            Level::INFO => span_at!(Level::INFO),
            Level::WARN => span_at!(Level::WARN),
            Level::ERROR => span_at!(Level::ERROR),
        }
    }
}
