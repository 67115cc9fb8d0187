use axum::{extract::Extension, http::Request};
use metrics::counter;
use tower_http::request_id::RequestId;

use crate::error::ErrorKind;

pub(crate) fn request_id_from_extension(
    request_id: Option<Extension<RequestId>>,
) -> Option<String> {
    request_id.and_then(|id| request_id_value(&id))
}

pub(crate) fn request_id_from_request<B>(req: &Request<B>) -> Option<String> {
    req.extensions()
        .get::<RequestId>()
        .and_then(request_id_value)
}

fn request_id_value(id: &RequestId) -> Option<String> {
    id.header_value().to_str().ok().map(str::to_string)
}

pub(crate) fn record_error_metrics(kind: ErrorKind) {
    counter!("conductor_errors_total", "kind" => kind.as_str()).increment(1);
}
