//! Emitter for the Yelp-meteorite UDP metrics relay wire format
//! described in `spec.md` §6:
//!
//! ```text
//! [["<dim>", "<val>"], …, ["metric_name", "<name>"]]:<value>|<type>
//! ```
//!
//! with `type` one of `c` (counter), `ms` (timer, milliseconds), `g`
//! (gauge). Every payload is prefixed with the default dimensions
//! `habitat`, `service_name`, `instance_name`, `casper_version`.

use std::{net::SocketAddr, sync::Arc};

use displaydoc::Display;
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::config::MetricsRelayConfig;

#[derive(Debug, Error, Display)]
pub enum MetricsRelayError {
    /// failed to bind local UDP socket: {0}
    Bind(std::io::Error),
    /// failed to send metric payload: {0}
    Send(std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub enum MetricType {
    Counter,
    Timer,
    Gauge,
}

impl MetricType {
    const fn wire_suffix(self) -> &'static str {
        match self {
            Self::Counter => "c",
            Self::Timer => "ms",
            Self::Gauge => "g",
        }
    }
}

/// The contract this component provides to the rest of Casper: record a
/// named counter or timer with arbitrary dimensions. Transport to the
/// actual relay process is an external collaborator per `spec.md` §1;
/// [`UdpMetricsSink`] is one conforming implementation and
/// [`NullMetricsSink`] is the no-op used in tests.
pub trait MetricsSink: Send + Sync + std::fmt::Debug {
    fn record(&self, name: &str, value: f64, metric_type: MetricType, dimensions: &[(&str, &str)]);

    fn increment(&self, name: &str, dimensions: &[(&str, &str)]) {
        self.record(name, 1.0, MetricType::Counter, dimensions);
    }

    fn timing(&self, name: &str, millis: f64, dimensions: &[(&str, &str)]) {
        self.record(name, millis, MetricType::Timer, dimensions);
    }
}

#[derive(Debug, Clone, Default)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn record(&self, _name: &str, _value: f64, _metric_type: MetricType, _dimensions: &[(&str, &str)]) {}
}

#[derive(Debug, Clone)]
pub struct UdpMetricsSink {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    socket: UdpSocket,
    relay_addr: SocketAddr,
    default_dims: Vec<(String, String)>,
}

impl UdpMetricsSink {
    pub async fn connect(config: &MetricsRelayConfig) -> Result<Self, MetricsRelayError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(MetricsRelayError::Bind)?;
        let relay_addr = SocketAddr::new(config.host, config.port);
        let default_dims = vec![
            ("habitat".to_string(), config.habitat.clone()),
            ("service_name".to_string(), config.service_name.clone()),
            ("instance_name".to_string(), config.instance_name.clone()),
            ("casper_version".to_string(), config.casper_version.clone()),
        ];
        Ok(Self {
            inner: Arc::new(Inner {
                socket,
                relay_addr,
                default_dims,
            }),
        })
    }

    fn encode(&self, name: &str, value: f64, metric_type: MetricType, dimensions: &[(&str, &str)]) -> String {
        let mut dims: Vec<(String, String)> = self.inner.default_dims.clone();
        dims.extend(dimensions.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        dims.push(("metric_name".to_string(), name.to_string()));

        let mut pairs = String::from("[");
        for (idx, (k, v)) in dims.iter().enumerate() {
            if idx > 0 {
                pairs.push(',');
            }
            pairs.push_str(&format!("[\"{k}\", \"{v}\"]"));
        }
        pairs.push(']');

        #[allow(clippy::cast_possible_truncation)]
        let rendered_value = if value.fract() == 0.0 {
            format!("{}", value as i64)
        } else {
            format!("{value}")
        };

        format!("{pairs}:{rendered_value}|{}", metric_type.wire_suffix())
    }

    fn send(&self, payload: String) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(error) = inner
                .socket
                .send_to(payload.as_bytes(), inner.relay_addr)
                .await
            {
                tracing::debug!(%error, "failed to send metric to relay, dropping");
            }
        });
    }
}

impl MetricsSink for UdpMetricsSink {
    fn record(&self, name: &str, value: f64, metric_type: MetricType, dimensions: &[(&str, &str)]) {
        let payload = self.encode(name, value, metric_type, dimensions);
        self.send(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encodes_counter_payload() {
        let sink = UdpMetricsSink {
            inner: Arc::new(Inner {
                // never actually used to send in this test
                socket: futures_unused_socket(),
                relay_addr: "127.0.0.1:8125".parse().unwrap(),
                default_dims: vec![
                    ("habitat".to_string(), "dev".to_string()),
                    ("service_name".to_string(), "casper".to_string()),
                    ("instance_name".to_string(), "0".to_string()),
                    ("casper_version".to_string(), "0.1.0".to_string()),
                ],
            }),
        };
        let payload = sink.encode(
            "cache_hits",
            1.0,
            MetricType::Counter,
            &[("namespace", "biz.main")],
        );
        assert!(payload.starts_with("[[\"habitat\", \"dev\"]"));
        assert!(payload.contains("[\"namespace\", \"biz.main\"]"));
        assert!(payload.contains("[\"metric_name\", \"cache_hits\"]"));
        assert!(payload.ends_with(":1|c"));
    }

    fn futures_unused_socket() -> UdpSocket {
        // A bound-but-never-sent-on socket for payload-encoding unit tests.
        let std_socket =
            std::net::UdpSocket::bind("127.0.0.1:0").expect("bind local socket");
        std_socket.set_nonblocking(true).expect("set nonblocking");
        UdpSocket::from_std(std_socket).expect("wrap tokio socket")
    }
}
