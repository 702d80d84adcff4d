//! Response bodies and the mapping from errors to HTTP replies

use crate::error::BgRemovalError;
use crate::types::ImageDimensions;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

/// One image inside a [`RemovalEnvelope`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// Standard base64 of the encoded image
    pub data: String,
    /// `PNG`, `JPEG` or `WEBP`
    pub format: String,
    pub size: ImageDimensions,
}

/// Body of a successful `/remove-background` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalEnvelope {
    pub success: bool,
    pub original_image: ImagePayload,
    pub processed_image: ImagePayload,
    pub message: String,
}

impl RemovalEnvelope {
    pub const MESSAGE: &'static str = "Background removed successfully";

    #[must_use]
    pub fn new(original_image: ImagePayload, processed_image: ImagePayload) -> Self {
        Self {
            success: true,
            original_image,
            processed_image,
            message: Self::MESSAGE.to_string(),
        }
    }
}

/// Body of every error reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

fn detail_reply(status: StatusCode, detail: impl Into<String>) -> Response {
    let body = ErrorBody {
        detail: detail.into(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

/// HTTP status for a pipeline error
#[must_use]
pub fn status_of(err: &BgRemovalError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// `{"detail": ...}` reply for a pipeline error
#[must_use]
pub fn error_reply(err: &BgRemovalError) -> Response {
    let status = status_of(err);
    if status.is_server_error() {
        tracing::error!("Error processing image: {err}");
    } else {
        tracing::info!(status = status.as_u16(), "Rejected request: {err}");
    }
    detail_reply(status, err.to_string())
}

/// Map framework rejections onto `{"detail": ...}` replies
///
/// Bodies tripping the multipart length limit are answered like oversized
/// uploads.
pub async fn handle_rejection(err: Rejection, limit_mb: u64) -> Result<Response, Infallible> {
    let reply = if err.is_not_found() {
        detail_reply(StatusCode::NOT_FOUND, "Not Found")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        detail_reply(
            StatusCode::BAD_REQUEST,
            format!("File too large. Maximum size is {limit_mb}MB."),
        )
    } else if let Some(e) = err.find::<warp::reject::MissingHeader>() {
        detail_reply(StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidHeader>() {
        detail_reply(StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::LengthRequired>() {
        detail_reply(StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::UnsupportedMediaType>() {
        detail_reply(StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        detail_reply(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    } else {
        tracing::error!("Unhandled rejection: {err:?}");
        detail_reply(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    };
    Ok(reply)
}
