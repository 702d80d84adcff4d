//! Inference seams between the pipeline and a concrete model runtime

use crate::error::Result;
use async_trait::async_trait;
use image::{GrayImage, RgbImage};
use std::sync::Arc;

/// A loaded segmentation model
///
/// Implementations must be shareable across requests; interior locking is
/// up to the backend.
pub trait SegmentationSession: Send + Sync {
    /// Identifier of the model this session runs
    fn model_name(&self) -> &str;

    /// Predict an 8-bit foreground mask with the same dimensions as `image`
    ///
    /// # Errors
    /// - Tensor conversion failures
    /// - Model runtime failures
    /// - Unexpected output shapes
    fn predict_mask(&self, image: &RgbImage) -> Result<GrayImage>;
}

/// Creates sessions for model identifiers
#[async_trait]
pub trait SessionLoader: Send + Sync {
    /// Load the model named `model_id`
    ///
    /// # Errors
    /// - Unknown model identifier
    /// - Model file missing or download failure
    /// - Runtime session creation failure
    async fn load(&self, model_id: &str) -> Result<Arc<dyn SegmentationSession>>;
}
