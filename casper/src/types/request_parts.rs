use bytes::Bytes;
use http::HeaderMap;

/// The raw inbound request data middlewares need but the pipeline driver
/// doesn't otherwise thread through [`super::RequestContext`] — headers
/// and body are read once by C12 and handed to the chain alongside the
/// context (`spec.md` §4.9 "`on_request(req, ctx)`").
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub headers: HeaderMap,
    pub body: Bytes,
}
