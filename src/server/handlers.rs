//! Request handlers
//!
//! Handlers never reject: every pipeline error is turned into a
//! `{"detail": ...}` reply here, so the rejection handler only deals with
//! routing and body-limit failures.

use super::multipart::{RemovalForm, UploadedFile};
use super::pages;
use super::responses::{error_reply, ImagePayload, RemovalEnvelope};
use super::AppState;
use crate::error::Result;
use crate::processor::{dimensions_of, run_blocking, ProcessedUpload};
use crate::services::{upload, ImageIOService};
use crate::tracing_config::spans;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, Instrument};
use uuid::Uuid;
use warp::multipart::FormData;
use warp::reply::Response;
use warp::Reply;

pub(super) async fn index(state: Arc<AppState>) -> std::result::Result<Response, Infallible> {
    Ok(pages::demo_page(&state.demo_page).await)
}

pub(super) async fn api_info() -> std::result::Result<Response, Infallible> {
    Ok(warp::reply::json(&pages::api_info()).into_response())
}

pub(super) async fn health() -> std::result::Result<Response, Infallible> {
    Ok(warp::reply::json(&pages::health()).into_response())
}

/// `POST /remove-background`: JSON envelope with both images in base64
pub(super) async fn remove_background_json(
    form: FormData,
    state: Arc<AppState>,
) -> std::result::Result<Response, Infallible> {
    let request_id = Uuid::new_v4().to_string();
    let span = spans::request(&request_id, "/remove-background");

    let reply = json_reply(form, &state).instrument(span).await;
    Ok(reply.unwrap_or_else(|e| error_reply(&e)))
}

async fn json_reply(form: FormData, state: &AppState) -> Result<Response> {
    let (_, processed) = process_form(form, state).await?;
    let envelope = run_blocking(move || build_envelope(&processed)).await?;
    info!("Background removal completed successfully");
    Ok(warp::reply::json(&envelope).into_response())
}

/// `POST /remove-background-binary`: the cutout as a PNG attachment
pub(super) async fn remove_background_binary(
    form: FormData,
    state: Arc<AppState>,
) -> std::result::Result<Response, Infallible> {
    let request_id = Uuid::new_v4().to_string();
    let span = spans::request(&request_id, "/remove-background-binary");

    let reply = binary_reply(form, &state).instrument(span).await;
    Ok(reply.unwrap_or_else(|e| error_reply(&e)))
}

async fn binary_reply(form: FormData, state: &AppState) -> Result<Response> {
    let (file, processed) = process_form(form, state).await?;
    let result = processed.result;
    let png = run_blocking(move || ImageIOService::encode_png(&result)).await?;
    let disposition = format!(
        "attachment; filename={}",
        upload::result_filename(file.filename.as_deref())
    );
    info!(bytes = png.len(), "Background removal completed successfully");

    let reply = warp::reply::with_header(png, "content-type", "image/png");
    Ok(warp::reply::with_header(reply, "content-disposition", disposition).into_response())
}

/// Read the form and run the pipeline; the returned upload has its bytes
/// moved out
async fn process_form(form: FormData, state: &AppState) -> Result<(UploadedFile, ProcessedUpload)> {
    let (mut file, params) = RemovalForm::read(form).await?.into_parts()?;
    info!(
        filename = file.filename.as_deref().unwrap_or_default(),
        model = %params.model,
        alpha_matting = params.matting.alpha_matting,
        "Processing file"
    );

    let bytes = std::mem::take(&mut file.bytes);
    let processed = state
        .processor
        .process_upload(bytes, file.content_type.as_deref(), &params)
        .await?;
    Ok((file, processed))
}

fn build_envelope(processed: &ProcessedUpload) -> Result<RemovalEnvelope> {
    let (original_bytes, original_format) = ImageIOService::encode_original(&processed.original)?;
    let processed_bytes = ImageIOService::encode_png(&processed.result)?;

    Ok(RemovalEnvelope::new(
        ImagePayload {
            data: ImageIOService::to_base64(&original_bytes),
            format: ImageIOService::format_name(original_format).to_string(),
            size: dimensions_of(&processed.original.image),
        },
        ImagePayload {
            data: ImageIOService::to_base64(&processed_bytes),
            format: "PNG".to_string(),
            size: dimensions_of(&processed.result),
        },
    ))
}
