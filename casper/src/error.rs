use axum_core::response::IntoResponse;
use displaydoc::Display;
use http::StatusCode;
use thiserror::Error;

/// Casper's own error taxonomy (`spec.md` §7), converging into one
/// HTTP-facing type. `UpstreamTransport`/`UpstreamNon2xx`/`StorageRead`/
/// `StorageWrite` never reach here: they are already synthesized as
/// ordinary [`crate::types::response::StoredResponse`]s by
/// [`crate::upstream::UpstreamClient`] and [`crate::cache::storage::Storage`]
/// respectively, so the cache path always fails open toward the client.
#[derive(Debug, Error, Display)]
pub enum CasperError {
    /// {0}
    ClientMalformed(String),
    /// destination config absent for `{0}`
    ConfigMissing(String),
    /// {0}
    MiddlewareInternal(String),
}

impl CasperError {
    fn status(&self) -> StatusCode {
        match self {
            Self::ClientMalformed(_) => StatusCode::BAD_REQUEST,
            Self::ConfigMissing(_) | Self::MiddlewareInternal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CasperError {
    fn into_response(self) -> axum_core::response::Response {
        match &self {
            Self::ClientMalformed(msg) => tracing::debug!(error = %msg, "malformed request"),
            Self::ConfigMissing(msg) => tracing::warn!(error = %msg, "destination config missing"),
            Self::MiddlewareInternal(msg) => tracing::error!(error = %msg, "middleware failure"),
        }
        let status = self.status();
        (status, self.to_string()).into_response()
    }
}
