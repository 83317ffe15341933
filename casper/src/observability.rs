use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use telemetry::{
    metrics_relay::MetricsSink,
    syslog_trace::{SyslogTraceSink, TraceLine},
};

/// Local Prometheus-text counter registry for `GET /metrics`
/// (`spec.md` §4.10), independent of the UDP relay transport in
/// [`telemetry::metrics_relay`] (§4.11 "Observability sinks" names two
/// separate consumers of the same counter events).
#[derive(Debug, Default)]
struct PrometheusRegistry {
    counters: Mutex<HashMap<String, u64>>,
}

impl PrometheusRegistry {
    fn increment(&self, name: &str, dimensions: &[(&str, &str)]) {
        let key = render_key(name, dimensions);
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters.entry(key).or_insert(0) += 1;
    }

    fn render(&self) -> String {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let mut lines: Vec<String> = counters
            .iter()
            .map(|(key, value)| format!("{key} {value}"))
            .collect();
        lines.sort();
        if lines.is_empty() {
            String::new()
        } else {
            lines.join("\n") + "\n"
        }
    }
}

fn render_key(name: &str, dimensions: &[(&str, &str)]) -> String {
    if dimensions.is_empty() {
        return name.to_string();
    }
    let labels: Vec<String> = dimensions
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect();
    format!("{name}{{{}}}", labels.join(","))
}

/// Combines the UDP metrics relay, the local Prometheus registry, and the
/// syslog trace sink behind one request-facing API (C11, `spec.md`
/// §4.11). `namespace`/`cache_name`/`cache_status`/`status` are the
/// dimensions the spec calls out by name.
#[derive(Clone)]
pub struct Observability {
    relay: Arc<dyn MetricsSink>,
    prometheus: Arc<PrometheusRegistry>,
    trace: Option<SyslogTraceSink>,
}

impl std::fmt::Debug for Observability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observability")
            .field("has_trace_sink", &self.trace.is_some())
            .finish()
    }
}

impl Observability {
    #[must_use]
    pub fn new(relay: Arc<dyn MetricsSink>, trace: Option<SyslogTraceSink>) -> Self {
        Self {
            relay,
            prometheus: Arc::new(PrometheusRegistry::default()),
            trace,
        }
    }

    pub fn increment(&self, name: &str, dimensions: &[(&str, &str)]) {
        self.relay.increment(name, dimensions);
        self.prometheus.increment(name, dimensions);
    }

    /// Emits request timing across the cross-product
    /// `{cache_name, __ALL__} × {namespace, __ALL__}` (`spec.md` §4.11).
    pub fn record_request_timing(&self, cache_name: Option<&str>, namespace: &str, millis: f64) {
        let cache_names: HashSet<&str> = [cache_name.unwrap_or("__ALL__"), "__ALL__"].into();
        let namespaces: HashSet<&str> = [namespace, "__ALL__"].into();
        for cn in &cache_names {
            for ns in &namespaces {
                self.relay
                    .timing("request_time", millis, &[("cache_name", cn), ("namespace", ns)]);
            }
        }
    }

    pub fn emit_trace(&self, line: &TraceLine<'_>) {
        if let Some(sink) = &self.trace {
            sink.emit(line);
        }
    }

    #[must_use]
    pub fn render_prometheus(&self) -> String {
        self.prometheus.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry::metrics_relay::NullMetricsSink;

    #[test]
    fn increment_is_reflected_in_prometheus_render() {
        let obs = Observability::new(Arc::new(NullMetricsSink), None);
        obs.increment("cache_hits", &[("namespace", "biz.main")]);
        obs.increment("cache_hits", &[("namespace", "biz.main")]);
        let rendered = obs.render_prometheus();
        assert_eq!(rendered, "cache_hits{namespace=\"biz.main\"} 2\n");
    }
}
