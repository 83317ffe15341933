pub mod b3;
pub mod config;
pub mod init;
pub mod make_span;
pub mod metrics_relay;
pub mod request_id;
pub mod syslog_trace;

pub use config::Config;
pub use init::init_telemetry;
