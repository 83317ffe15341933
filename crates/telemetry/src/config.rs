use std::net::IpAddr;

use serde::{Deserialize, Serialize};

fn default_level() -> String {
    "info,casper=debug".to_string()
}

fn default_metrics_port() -> u16 {
    8125
}

fn default_syslog_port() -> u16 {
    514
}

/// Top level telemetry configuration, deserialized from the
/// `telemetry` section of the config file (or `CASPER__TELEMETRY__*`
/// environment variables).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// `tracing-subscriber` `EnvFilter` directive string.
    pub level: String,
    /// Whether to propagate B3 trace headers on proxied responses.
    pub propagate: bool,
    pub metrics_relay: MetricsRelayConfig,
    pub zipkin_syslog: SyslogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: default_level(),
            propagate: true,
            metrics_relay: MetricsRelayConfig::default(),
            zipkin_syslog: SyslogConfig::default(),
        }
    }
}

/// `yelp_meteorite.metrics-relay.{host,port}` in `spec.md` terms.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct MetricsRelayConfig {
    pub host: IpAddr,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    pub habitat: String,
    pub service_name: String,
    pub instance_name: String,
    pub casper_version: String,
}

impl Default for MetricsRelayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: default_metrics_port(),
            habitat: "dev".to_string(),
            service_name: String::new(),
            instance_name: String::new(),
            casper_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `zipkin.syslog.{host,port}` in `spec.md` terms.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyslogConfig {
    pub host: IpAddr,
    #[serde(default = "default_syslog_port")]
    pub port: u16,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: default_syslog_port(),
        }
    }
}
