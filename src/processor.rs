//! Background removal processor
//!
//! Drives one upload through the pipeline: upload checks, decode,
//! preprocessing, removal with bounded retries and a last-resort fallback
//! model, then postprocessing. Every CPU-heavy stage runs on the blocking
//! thread pool.

use crate::{
    config::{ServerConfig, DEFAULT_MAX_DIMENSION, DEFAULT_MAX_UPLOAD_BYTES, FALLBACK_MODEL},
    error::{BgRemovalError, Result},
    inference::SegmentationSession,
    removal::remove_background,
    services::{upload, DecodedImage, ImageIOService},
    session_cache::SessionCache,
    tracing_config::spans,
    types::{ImageDimensions, MattingOptions, RemovalParams},
    utils::{ImagePostprocessor, ImagePreprocessor, ResultValidator},
};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn, Instrument};

/// Settings of the removal pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Primary attempts before the fallback runs
    pub max_attempts: usize,
    /// Model used by the fallback attempt
    pub fallback_model: String,
    /// Longest side before downsampling
    pub max_dimension: u32,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            fallback_model: FALLBACK_MODEL.to_string(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl From<&ServerConfig> for ProcessorConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            fallback_model: config.fallback_model.clone(),
            max_dimension: config.max_dimension,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// States of the retry/fallback control flow
#[derive(Debug)]
pub enum RemovalState {
    /// Running primary attempt `n` (1-based)
    Attempting(usize),
    /// Primary attempts exhausted; running the fallback model
    Fallback,
    /// A result was produced
    Succeeded(RemovalOutcome),
    /// The fallback failed too; carries the last underlying error
    Failed(BgRemovalError),
}

/// Result of [`BackgroundRemovalProcessor::remove_with_retry`]
#[derive(Debug, Clone)]
pub struct RemovalOutcome {
    /// RGBA cutout at the size of the input
    pub image: DynamicImage,
    /// Primary attempts made
    pub attempts: usize,
    /// Whether the fallback model produced the result
    pub used_fallback: bool,
}

/// A fully processed upload
#[derive(Debug, Clone)]
pub struct ProcessedUpload {
    /// The decoded upload as received
    pub original: DecodedImage,
    /// The cutout at the original size, alpha edge refined
    pub result: DynamicImage,
    pub attempts: usize,
    pub used_fallback: bool,
}

/// Background removal processor shared by all requests
#[derive(Debug)]
pub struct BackgroundRemovalProcessor {
    cache: Arc<SessionCache>,
    config: ProcessorConfig,
}

impl BackgroundRemovalProcessor {
    #[must_use]
    pub fn new(cache: Arc<SessionCache>, config: ProcessorConfig) -> Self {
        Self { cache, config }
    }

    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    #[must_use]
    pub fn session_cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Run the complete pipeline for one upload
    ///
    /// # Errors
    /// - `InvalidContentType`, `PayloadTooLarge`, `CorruptImage` for bad uploads
    /// - `ModelLoad` when the requested model cannot be loaded
    /// - `BackgroundRemoval` when retries and fallback are exhausted
    #[instrument(skip(self, bytes, params), fields(size = bytes.len(), model = %params.model))]
    pub async fn process_upload(
        &self,
        bytes: Vec<u8>,
        content_type: Option<&str>,
        params: &RemovalParams,
    ) -> Result<ProcessedUpload> {
        let start = Instant::now();
        upload::check_content_type(content_type)?;
        upload::check_size(bytes.len(), self.config.max_upload_bytes)?;

        let max_dimension = self.config.max_dimension;
        let (original, working, original_dimensions) = run_blocking(move || {
            let decoded = ImageIOService::decode(&bytes)?;
            let dims = (decoded.image.width(), decoded.image.height());
            let _span = spans::preprocessing(dims, max_dimension).entered();
            let (working, original_dimensions) =
                ImagePreprocessor::preprocess(decoded.image.clone(), max_dimension);
            Ok((decoded, working, original_dimensions))
        })
        .await?;

        let outcome = self.remove_with_retry(Arc::new(working), params).await?;

        let result = run_blocking(move || {
            let _span = spans::postprocessing("restore_and_refine").entered();
            Ok(ImagePostprocessor::postprocess(outcome.image, original_dimensions, true))
        })
        .await?;

        info!(
            dimensions = %original_dimensions,
            attempts = outcome.attempts,
            used_fallback = outcome.used_fallback,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Upload processed"
        );

        Ok(ProcessedUpload {
            original,
            result,
            attempts: outcome.attempts,
            used_fallback: outcome.used_fallback,
        })
    }

    /// Remove the background with up to `max_attempts` validated attempts,
    /// then one unvalidated attempt with the fallback model
    ///
    /// # Errors
    /// - `ModelLoad` for the requested model (not retried)
    /// - `BackgroundRemoval` carrying the last error when the fallback fails
    pub async fn remove_with_retry(
        &self,
        image: Arc<DynamicImage>,
        params: &RemovalParams,
    ) -> Result<RemovalOutcome> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut state = RemovalState::Attempting(1);

        loop {
            state = match state {
                RemovalState::Attempting(attempt) => {
                    let session = self.cache.get_or_create(&params.model).await?;
                    let next = if attempt < max_attempts {
                        RemovalState::Attempting(attempt + 1)
                    } else {
                        RemovalState::Fallback
                    };

                    match attempt_removal(session, Arc::clone(&image), params.matting, attempt).await {
                        Ok(result) if ResultValidator::is_valid(&result) => {
                            RemovalState::Succeeded(RemovalOutcome {
                                image: result,
                                attempts: attempt,
                                used_fallback: false,
                            })
                        },
                        Ok(_) => {
                            warn!(attempt, "Result failed validation, retrying");
                            next
                        },
                        Err(e) => {
                            warn!(attempt, "Removal attempt failed: {e}");
                            next
                        },
                    }
                },
                RemovalState::Fallback => {
                    warn!(
                        model = %self.config.fallback_model,
                        "Primary attempts exhausted, running fallback model"
                    );
                    match self.fallback(Arc::clone(&image), params.matting).await {
                        Ok(result) => RemovalState::Succeeded(RemovalOutcome {
                            image: result,
                            attempts: max_attempts,
                            used_fallback: true,
                        }),
                        Err(e) => RemovalState::Failed(e),
                    }
                },
                RemovalState::Succeeded(outcome) => {
                    debug!(attempts = outcome.attempts, used_fallback = outcome.used_fallback, "Removal succeeded");
                    return Ok(outcome);
                },
                RemovalState::Failed(e) => {
                    return Err(BgRemovalError::background_removal(e.to_string()));
                },
            };
        }
    }

    async fn fallback(&self, image: Arc<DynamicImage>, matting: MattingOptions) -> Result<DynamicImage> {
        let session = self.cache.get_or_create(&self.config.fallback_model).await?;
        attempt_removal(session, image, matting, 0).await
    }
}

/// One removal call on the blocking pool; `attempt` 0 marks the fallback
async fn attempt_removal(
    session: Arc<dyn SegmentationSession>,
    image: Arc<DynamicImage>,
    matting: MattingOptions,
    attempt: usize,
) -> Result<DynamicImage> {
    let span = spans::inference_attempt(session.model_name(), attempt);
    run_blocking(move || remove_background(session.as_ref(), &image, &matting))
        .instrument(span)
        .await
}

/// Run `work` on the blocking thread pool inside the caller's span
///
/// # Errors
/// - Whatever `work` returns
/// - `Internal` when the blocking task panics or is cancelled
pub async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(work))
        .await
        .map_err(|e| BgRemovalError::internal(format!("Blocking task failed: {e}")))?
}

/// Dimensions helper for envelopes
#[must_use]
pub fn dimensions_of(image: &DynamicImage) -> ImageDimensions {
    ImageDimensions::new(image.width(), image.height())
}
