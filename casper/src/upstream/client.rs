use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::types::response::StoredResponse;

/// Forwards requests to the resolved upstream host, classifying
/// transport failures into the synthetic HTTP-shaped outcomes `spec.md`
/// §4.6 mandates so callers never have to distinguish "upstream said
/// 502" from "we couldn't reach it".
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Forwards one request. `timeout` is the destination's
    /// `http.timeout_ms` (`spec.md` §4.1, default 60s).
    pub async fn forward(
        &self,
        method: Method,
        absolute_uri: &str,
        headers: HeaderMap,
        body: Bytes,
        timeout: Duration,
    ) -> StoredResponse {
        let mut builder = self
            .http
            .request(method, absolute_uri)
            .headers(headers)
            .timeout(timeout);
        if !body.is_empty() {
            builder = builder.body(body);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let headers = response_headers(response.headers());
                match response.bytes().await {
                    Ok(body) => StoredResponse { status, headers, body },
                    Err(error) => synthesize_error(absolute_uri, &error),
                }
            }
            Err(error) => synthesize_error(absolute_uri, &error),
        }
    }
}

fn response_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn synthesize_error(uri: &str, error: &reqwest::Error) -> StoredResponse {
    let status: u16 = if error.is_timeout() {
        504
    } else if error.is_connect() {
        502
    } else {
        500
    };
    let body = format!("Error requesting {uri}: {error}");
    StoredResponse {
        status,
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: Bytes::from(body),
    }
}
