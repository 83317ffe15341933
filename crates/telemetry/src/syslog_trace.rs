//! Emitter for the RFC5424-ish zipkin syslog line described in
//! `spec.md` §6:
//!
//! ```text
//! <64>MMM DD HH:MM:SS <hostname> nginx_spectre[<pid>]: spectre/zipkin <trace> <span> <parent> <flags|-> <sampled|-> <start_us> <end_us>, client: <ip>, server: , cache_status: <status>, request: "<METHOD> <URI> HTTP/1.1"
//! ```

use std::{net::SocketAddr, sync::Arc};

use chrono::{DateTime, Utc};
use displaydoc::Display;
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::{b3::B3Context, config::SyslogConfig};

#[derive(Debug, Error, Display)]
pub enum SyslogTraceError {
    /// failed to bind local UDP socket: {0}
    Bind(std::io::Error),
}

const PRI: u8 = 64; // local0.info, matches the spec's literal `<64>`

#[derive(Debug, Clone)]
pub struct TraceLine<'a> {
    pub b3: &'a B3Context,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub client_ip: &'a str,
    pub cache_status: &'a str,
    pub method: &'a str,
    pub uri: &'a str,
}

/// Renders one [`TraceLine`] into the wire format above. Separated from
/// sending so it's independently unit-testable.
#[must_use]
pub fn render(hostname: &str, pid: u32, line: &TraceLine<'_>) -> String {
    let timestamp = line.start.format("%b %d %H:%M:%S");
    let flags = line.b3.flags.as_deref().unwrap_or("-");
    let sampled = line
        .b3
        .sampled
        .map_or("-".to_string(), |s| if s { "1" } else { "0" }.to_string());
    let start_us = line.start.timestamp_micros();
    let end_us = line.end.timestamp_micros();
    format!(
        "<{PRI}>{timestamp} {hostname} nginx_spectre[{pid}]: spectre/zipkin \
         {trace} {span} {parent} {flags} {sampled} {start_us} {end_us}, \
         client: {client_ip}, server: , cache_status: {cache_status}, \
         request: \"{method} {uri} HTTP/1.1\"",
        trace = line.b3.trace_id,
        span = line.b3.span_id,
        parent = line.b3.parent_span_id.as_deref().unwrap_or("-"),
        client_ip = line.client_ip,
        cache_status = line.cache_status,
        method = line.method,
        uri = line.uri,
    )
}

#[derive(Debug, Clone)]
pub struct SyslogTraceSink {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    socket: UdpSocket,
    relay_addr: SocketAddr,
    hostname: String,
    pid: u32,
}

impl SyslogTraceSink {
    pub async fn connect(config: &SyslogConfig) -> Result<Self, SyslogTraceError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(SyslogTraceError::Bind)?;
        let relay_addr = SocketAddr::new(config.host, config.port);
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "casper".to_string());
        Ok(Self {
            inner: Arc::new(Inner {
                socket,
                relay_addr,
                hostname,
                pid: std::process::id(),
            }),
        })
    }

    pub fn emit(&self, line: &TraceLine<'_>) {
        let payload = render(&self.inner.hostname, self.inner.pid, line);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(error) = inner
                .socket
                .send_to(payload.as_bytes(), inner.relay_addr)
                .await
            {
                tracing::debug!(%error, "failed to send trace line, dropping");
            }
        });
    }
}
