#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Background Removal API
//!
//! An HTTP service that removes image backgrounds with U2-Net and IS-Net
//! segmentation models running on ONNX Runtime.
//!
//! ## Features
//!
//! - **Two endpoints**: a JSON envelope with base64 images, or the PNG cutout
//!   as an attachment
//! - **Known models**: `u2net`, `u2netp`, `u2net_human_seg`, `silueta`,
//!   `isnet-general-use`, `isnet-anime`, downloaded on first use
//! - **Session caching**: one session per model, created once with a load timeout
//! - **Alpha matting**: trimap refinement of the cutout edge
//! - **Retries**: results failing the alpha heuristic are retried, then a
//!   fallback model runs
//! - **Hardware Acceleration**: CUDA, `CoreML`, and CPU execution providers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_api::{server, OnnxSessionLoader, ServerConfig, SessionLoader};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::builder().port(8000).build()?;
//! let loader: Arc<dyn SessionLoader> = Arc::new(OnnxSessionLoader::from_config(&config)?);
//! server::serve(&config, loader).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `cli` (default): the `bgremove-server` binary and subscriber setup
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`: JSON log output

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod removal;
pub mod server;
pub mod services;
pub mod session_cache;
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use config::{ExecutionProvider, ServerConfig, ServerConfigBuilder};
pub use download::ModelDownloader;
pub use error::{BgRemovalError, Result};
pub use inference::{SegmentationSession, SessionLoader};
pub use models::{ModelKind, PreprocessingConfig};
pub use processor::{BackgroundRemovalProcessor, ProcessedUpload, ProcessorConfig, RemovalOutcome};
pub use removal::remove_background;
pub use server::{routes, AppState, ErrorBody, ImagePayload, RemovalEnvelope};
pub use services::{DecodedImage, ImageIOService};
pub use session_cache::{SessionCache, SessionCacheStats};
pub use tracing_config::{spans, TracingConfig, TracingFormat};
pub use types::{ImageDimensions, MattingOptions, RemovalParams};
pub use utils::{ImagePostprocessor, ImagePreprocessor, ResultValidator, ValidationVerdict};
