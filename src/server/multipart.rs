//! Multipart form reading and form field parsing

use crate::error::{BgRemovalError, Result};
use crate::types::{MattingOptions, RemovalParams, DEFAULT_MODEL};
use bytes::BufMut;
use futures::TryStreamExt;
use std::collections::HashMap;
use warp::multipart::{FormData, Part};

/// Name of the form part carrying the image
pub const FILE_FIELD: &str = "file";

/// The `file` part of a removal form
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub filename: Option<String>,
    /// Content type declared on the part, not sniffed
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A fully read removal form
#[derive(Debug, Default)]
pub struct RemovalForm {
    pub file: Option<UploadedFile>,
    /// Text fields by name; later duplicates win
    pub fields: HashMap<String, String>,
}

impl RemovalForm {
    /// Drain every part of `form` into memory
    ///
    /// # Errors
    /// - `InvalidParameter` when the body is not a well-formed multipart stream
    /// - `InvalidParameter` when a text field is not UTF-8
    pub async fn read(form: FormData) -> Result<Self> {
        let mut form = std::pin::pin!(form);
        let mut parsed = Self::default();

        while let Some(part) = form.try_next().await.map_err(malformed)? {
            let name = part.name().to_string();
            if name == FILE_FIELD {
                let filename = part.filename().map(str::to_string);
                let content_type = part.content_type().map(str::to_string);
                let bytes = read_part(part).await?;
                parsed.file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes,
                });
            } else {
                let bytes = read_part(part).await?;
                let value = String::from_utf8(bytes).map_err(|_| {
                    BgRemovalError::invalid_parameter(format!("{name} is not valid UTF-8"))
                })?;
                parsed.fields.insert(name, value);
            }
        }

        Ok(parsed)
    }

    /// Split the form into the upload and its removal parameters
    ///
    /// # Errors
    /// - `InvalidParameter` when `file` is missing or a field does not parse
    pub fn into_parts(self) -> Result<(UploadedFile, RemovalParams)> {
        let params = parse_params(&self.fields)?;
        let file = self
            .file
            .ok_or_else(|| BgRemovalError::invalid_parameter("file field is required"))?;
        Ok((file, params))
    }
}

async fn read_part(part: Part) -> Result<Vec<u8>> {
    part.stream()
        .try_fold(Vec::new(), |mut buffer, chunk| async move {
            buffer.put(chunk);
            Ok(buffer)
        })
        .await
        .map_err(malformed)
}

fn malformed(e: warp::Error) -> BgRemovalError {
    BgRemovalError::invalid_parameter(format!("Malformed multipart body: {e}"))
}

/// Build [`RemovalParams`] from text fields, applying form defaults
///
/// # Errors
/// - `InvalidParameter` for unparsable booleans or integers, or thresholds
///   outside 1-255
pub fn parse_params(fields: &HashMap<String, String>) -> Result<RemovalParams> {
    let defaults = MattingOptions::default();
    let field = |name: &str| fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

    let model = field("model").unwrap_or(DEFAULT_MODEL).to_string();
    let alpha_matting = match field("alpha_matting") {
        Some(raw) => parse_bool("alpha_matting", raw)?,
        None => defaults.alpha_matting,
    };
    let post_process_mask = match field("post_process_mask") {
        Some(raw) => parse_bool("post_process_mask", raw)?,
        None => defaults.post_process_mask,
    };
    let int = |name: &str, default: i64| match field(name) {
        Some(raw) => parse_int(name, raw),
        None => Ok(default),
    };

    RemovalParams::from_raw(
        model,
        alpha_matting,
        int("alpha_matting_foreground_threshold", i64::from(defaults.foreground_threshold))?,
        int("alpha_matting_background_threshold", i64::from(defaults.background_threshold))?,
        int("alpha_matting_erode_size", i64::from(defaults.erode_size))?,
        post_process_mask,
    )
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(BgRemovalError::invalid_parameter(format!(
            "{name} must be a boolean, got '{raw}'"
        ))),
    }
}

fn parse_int(name: &str, raw: &str) -> Result<i64> {
    raw.parse().map_err(|_| {
        BgRemovalError::invalid_parameter(format!("{name} must be an integer, got '{raw}'"))
    })
}
