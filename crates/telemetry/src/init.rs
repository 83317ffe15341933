use displaydoc::Display;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Debug, Error, Display)]
pub enum TelemetryError {
    /// failed to parse tracing filter directives: {0}
    FilterDirective(#[from] tracing_subscriber::filter::ParseError),
    /// global subscriber already set
    AlreadySet,
}

/// Installs the global `tracing` subscriber used by the whole process:
/// an `EnvFilter` seeded from [`Config::level`] plus a human-readable
/// formatting layer, and hooks `log`-crate panics into `tracing`.
///
/// Mirrors the teacher's `telemetry::init_telemetry`, minus the
/// OpenTelemetry OTLP exporter pipeline: Casper's metrics and traces
/// leave the process over the bespoke UDP wire formats in
/// [`crate::metrics_relay`] and [`crate::syslog_trace`] instead of OTLP,
/// so there is nothing here for an OTLP layer to attach to.
pub fn init_telemetry(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.level)?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|_| TelemetryError::AlreadySet)?;

    log_panics::init();
    Ok(())
}
