//! Request-scoped types shared by the pipeline and the HTTP layer

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};

/// Model used when a request does not name one
pub const DEFAULT_MODEL: &str = "isnet-general-use";

/// Largest accepted `alpha_matting_erode_size`
pub const MAX_ERODE_SIZE: u32 = 255;

/// Width and height of an image in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Length of the longer side
    #[must_use]
    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }
}

impl From<(u32, u32)> for ImageDimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Matting and mask refinement options handed to the removal primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MattingOptions {
    /// Refine the cutout edge with trimap-based alpha matting
    pub alpha_matting: bool,
    /// Mask values above this are certain foreground (1-255)
    pub foreground_threshold: u8,
    /// Mask values below this are certain background (1-255)
    pub background_threshold: u8,
    /// Side of the square structuring element eroding both certain regions
    pub erode_size: u32,
    /// Clean the predicted mask (opening, blur, threshold) before the cutout
    pub post_process_mask: bool,
}

impl Default for MattingOptions {
    fn default() -> Self {
        Self {
            alpha_matting: true,
            foreground_threshold: 232,
            background_threshold: 50,
            erode_size: 20,
            post_process_mask: true,
        }
    }
}

/// Per-request processing parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalParams {
    /// Model identifier, e.g. `isnet-general-use`
    pub model: String,
    pub matting: MattingOptions,
}

impl Default for RemovalParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            matting: MattingOptions::default(),
        }
    }
}

impl RemovalParams {
    /// Build parameters from raw form values, checking threshold bounds
    ///
    /// # Errors
    /// - Threshold outside 1-255
    /// - Erode size outside 0-[`MAX_ERODE_SIZE`]
    /// - Empty model name
    pub fn from_raw(
        model: String,
        alpha_matting: bool,
        foreground_threshold: i64,
        background_threshold: i64,
        erode_size: i64,
        post_process_mask: bool,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(BgRemovalError::invalid_parameter("model must not be empty"));
        }

        let matting = MattingOptions {
            alpha_matting,
            foreground_threshold: threshold("alpha_matting_foreground_threshold", foreground_threshold)?,
            background_threshold: threshold("alpha_matting_background_threshold", background_threshold)?,
            erode_size: erode(erode_size)?,
            post_process_mask,
        };

        Ok(Self { model, matting })
    }
}

fn threshold(name: &str, value: i64) -> Result<u8> {
    match u8::try_from(value) {
        Ok(v) if v >= 1 => Ok(v),
        _ => Err(BgRemovalError::invalid_parameter(format!(
            "{name} must be between 1 and 255, got {value}"
        ))),
    }
}

fn erode(value: i64) -> Result<u32> {
    match u32::try_from(value) {
        Ok(v) if v <= MAX_ERODE_SIZE => Ok(v),
        _ => Err(BgRemovalError::invalid_parameter(format!(
            "alpha_matting_erode_size must be between 0 and {MAX_ERODE_SIZE}, got {value}"
        ))),
    }
}
