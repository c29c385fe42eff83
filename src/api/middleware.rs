//! Request tracking.
//!
//! Every request gets an id, client-supplied or generated, available to
//! handlers through extensions and echoed on the response.

use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

/// Header carrying the request id on both requests and responses.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request ID wrapper for extracting in handlers
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    fn for_request(request: &Request) -> Self {
        let id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        RequestId(id)
    }
}

/// Tag the request with an id and echo it back on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::for_request(&request);
    let id = request_id.0.clone();
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    // A client-supplied id can contain bytes that are invalid in a header
    // value; skip the echo rather than fail the response.
    if let Ok(value) = id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
