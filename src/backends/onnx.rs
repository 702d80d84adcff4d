//! ONNX Runtime backend for the segmentation models
//!
//! Sessions are built once per model by [`OnnxSessionLoader`] and then shared
//! between requests. `ort` needs exclusive access to run a session, so each
//! [`OnnxSession`] serializes its own inference calls.

use crate::config::{ExecutionProvider, ServerConfig};
use crate::download::ModelDownloader;
use crate::error::{BgRemovalError, Result};
use crate::inference::{SegmentationSession, SessionLoader};
use crate::models::{ModelKind, PreprocessingConfig};
use crate::utils::{ImagePostprocessor, ImagePreprocessor};
use async_trait::async_trait;
use image::{GrayImage, RgbImage};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Runtime options applied to every session a loader builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeSettings {
    pub execution_provider: ExecutionProvider,
    /// Threads within operations (0 = all cores)
    pub intra_threads: usize,
    /// Threads between operations (0 = a quarter of the cores)
    pub inter_threads: usize,
}

impl RuntimeSettings {
    fn resolved_threads(self) -> (usize, usize) {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra = if self.intra_threads > 0 { self.intra_threads } else { cores };
        let inter = if self.inter_threads > 0 {
            self.inter_threads
        } else {
            (cores / 4).max(1)
        };
        (intra, inter)
    }
}

/// A loaded ONNX segmentation model
#[derive(Debug)]
pub struct OnnxSession {
    name: String,
    preprocessing: PreprocessingConfig,
    session: Mutex<Session>,
}

impl OnnxSession {
    /// Build a session for `kind` from the model file at `path`
    ///
    /// # Errors
    /// - Session builder or execution provider setup failures
    /// - Invalid or unreadable model file
    pub fn from_file(kind: ModelKind, path: &Path, settings: RuntimeSettings) -> Result<Self> {
        let load_start = Instant::now();
        let (intra_threads, inter_threads) = settings.resolved_threads();

        let builder = Session::builder()
            .map_err(|e| BgRemovalError::model_load(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| BgRemovalError::model_load(format!("Failed to set optimization level: {e}")))?;

        let session = configure_providers(builder, settings.execution_provider)?
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::model_load(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgRemovalError::model_load(format!("Failed to set inter threads: {e}")))?
            .commit_from_file(path)
            .map_err(|e| {
                BgRemovalError::model_load(format!(
                    "Failed to create session from {}: {e}",
                    path.display()
                ))
            })?;

        log::debug!("Session configuration:");
        log::debug!("  - Requested provider: {}", settings.execution_provider);
        log::debug!("  - Threading: {intra_threads} intra-op, {inter_threads} inter-op");
        log::info!(
            "Loaded model {kind} in {:.0}ms",
            load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            name: kind.id().to_string(),
            preprocessing: kind.preprocessing(),
            session: Mutex::new(session),
        })
    }
}

impl SegmentationSession for OnnxSession {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn predict_mask(&self, image: &RgbImage) -> Result<GrayImage> {
        let inference_start = Instant::now();
        let tensor = ImagePreprocessor::to_model_tensor(image, &self.preprocessing);
        log::debug!("Starting inference with input shape: {:?}", tensor.dim());

        let input_value = Value::from_array(tensor)
            .map_err(|e| BgRemovalError::inference(format!("Failed to convert input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| BgRemovalError::internal("ONNX session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        // Positional access: the first output is the finest prediction
        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensors found"))?;
        let prediction = outputs
            .get(first_key)
            .ok_or_else(|| BgRemovalError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| BgRemovalError::inference(format!("Failed to extract output tensor: {e}")))?;

        let (width, height) = image.dimensions();
        let mask = ImagePostprocessor::mask_from_prediction(prediction, width, height)?;

        log::debug!(
            "Inference with {} complete: {:.2}ms",
            self.name,
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(mask)
    }
}

/// Register the requested execution providers on `builder`
///
/// Unavailable accelerators fall back to CPU with a warning.
fn configure_providers(builder: SessionBuilder, provider: ExecutionProvider) -> Result<SessionBuilder> {
    let cuda = CUDAExecutionProvider::default();
    let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
    let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
    let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

    let providers = match provider {
        ExecutionProvider::Cpu => {
            log::info!("Using CPU execution provider");
            Vec::new()
        },
        ExecutionProvider::Auto => {
            let mut providers = Vec::new();
            if cuda_available {
                log::info!("CUDA execution provider is available and will be used");
                providers.push(cuda.build());
            }
            if coreml_available {
                log::info!("CoreML execution provider is available and will be used");
                providers.push(coreml.build());
            }
            if providers.is_empty() {
                log::debug!("No hardware acceleration available, using CPU");
            }
            providers
        },
        ExecutionProvider::Cuda if cuda_available => {
            log::info!("Using CUDA execution provider");
            vec![cuda.build()]
        },
        ExecutionProvider::CoreMl if coreml_available => {
            log::info!("Using CoreML execution provider");
            vec![coreml.build()]
        },
        ExecutionProvider::Cuda | ExecutionProvider::CoreMl => {
            log::warn!("{provider} execution provider requested but not available, falling back to CPU");
            Vec::new()
        },
    };

    if providers.is_empty() {
        return Ok(builder);
    }
    builder.with_execution_providers(providers).map_err(|e| {
        BgRemovalError::model_load(format!("Failed to set {provider} execution providers: {e}"))
    })
}

/// Loads [`OnnxSession`]s for catalogue models, downloading files as needed
#[derive(Debug, Clone)]
pub struct OnnxSessionLoader {
    downloader: ModelDownloader,
    settings: RuntimeSettings,
}

impl OnnxSessionLoader {
    #[must_use]
    pub fn new(downloader: ModelDownloader, settings: RuntimeSettings) -> Self {
        Self { downloader, settings }
    }

    /// Loader for the model directory and runtime options of `config`
    ///
    /// # Errors
    /// - Failed to create the download client
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let downloader = ModelDownloader::new(&config.model_dir, config.allow_download)?;
        Ok(Self::new(
            downloader,
            RuntimeSettings {
                execution_provider: config.execution_provider,
                intra_threads: config.intra_threads,
                inter_threads: config.inter_threads,
            },
        ))
    }
}

#[async_trait]
impl SessionLoader for OnnxSessionLoader {
    async fn load(&self, model_id: &str) -> Result<Arc<dyn SegmentationSession>> {
        let kind = ModelKind::from_id(model_id)?;
        let path = self.downloader.ensure_model(kind).await?;
        let settings = self.settings;

        let session = tokio::task::spawn_blocking(move || OnnxSession::from_file(kind, &path, settings))
            .await
            .map_err(|e| BgRemovalError::model_load(format!("Model loading task failed: {e}")))??;

        Ok(Arc::new(session))
    }
}
