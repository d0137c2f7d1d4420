use poem::http::{header, StatusCode};
use poem::Response;
use serde_json::Value;

use crate::controller::Served;
use crate::error::ImageError;

/// Variants are immutable for a given url, so they can be cached forever.
const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// A standard JSON response with the content type set to application/json
pub fn json_response(status: StatusCode, data: Option<Value>) -> Response {
    let payload = json!({
        "status": status.as_u16(),
        "data": data,
    });

    Response::builder()
        .status(status)
        .content_type("application/json")
        .body(payload.to_string())
}

pub fn image_response(served: Served) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .content_type(served.format.mime_type())
        .header(header::CACHE_CONTROL, IMAGE_CACHE_CONTROL)
        .body(served.data)
}

pub fn error_response(err: ImageError) -> Response {
    let status = err.status();
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    }

    json_response(
        status,
        Some(json!({
            "message": err.to_string(),
        })),
    )
}
