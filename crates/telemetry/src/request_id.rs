use http::HeaderValue;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// `tower_http::request_id::MakeRequestId` impl that stamps every
/// request with a UUIDv7 (time-ordered, so request ids sort roughly by
/// arrival time in logs).
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestId;

impl MakeRequestId for MakeRequestId {
    fn make_request_id<B>(
        &mut self,
        _request: &http::Request<B>,
    ) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}
