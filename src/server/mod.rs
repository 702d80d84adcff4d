//! HTTP surface of the service
//!
//! Routes are matched on path before method, so a known path with the wrong
//! method answers 405 while an unknown path answers 404.

mod handlers;
pub mod multipart;
pub mod pages;
pub mod responses;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::inference::SessionLoader;
use crate::processor::{BackgroundRemovalProcessor, ProcessorConfig};
use crate::session_cache::SessionCache;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use warp::{Filter, Rejection, Reply};

pub use multipart::{parse_params, RemovalForm, UploadedFile};
pub use responses::{ErrorBody, ImagePayload, RemovalEnvelope};

/// Multipart bodies may exceed the upload limit by this much before the
/// framework rejects them, leaving room for boundaries and text fields
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// State shared by every request
#[derive(Debug)]
pub struct AppState {
    pub processor: Arc<BackgroundRemovalProcessor>,
    pub demo_page: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    #[must_use]
    pub fn new(processor: Arc<BackgroundRemovalProcessor>, demo_page: PathBuf) -> Self {
        let max_upload_bytes = processor.config().max_upload_bytes;
        Self {
            processor,
            demo_page,
            max_upload_bytes,
        }
    }

    /// Build the state for `config` on top of `loader`
    #[must_use]
    pub fn from_config(config: &ServerConfig, loader: Arc<dyn SessionLoader>) -> Self {
        let cache = Arc::new(SessionCache::new(loader, config.model_load_timeout));
        let processor = Arc::new(BackgroundRemovalProcessor::new(cache, ProcessorConfig::from(config)));
        Self::new(processor, config.demo_page.clone())
    }
}

/// Every route of the service with rejection mapping and CORS applied
pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let limit_mb = (state.max_upload_bytes / (1024 * 1024)) as u64;
    let form_limit = state.max_upload_bytes as u64 + FORM_OVERHEAD_BYTES;
    let with_state = warp::any().map(move || Arc::clone(&state));

    let index = warp::path::end()
        .and(warp::get())
        .and(with_state.clone())
        .and_then(handlers::index);

    let api = warp::path!("api").and(warp::get()).and_then(handlers::api_info);

    let health = warp::path!("health").and(warp::get()).and_then(handlers::health);

    let remove_json = warp::path!("remove-background")
        .and(warp::post())
        .and(warp::multipart::form().max_length(form_limit))
        .and(with_state.clone())
        .and_then(handlers::remove_background_json);

    let remove_binary = warp::path!("remove-background-binary")
        .and(warp::post())
        .and(warp::multipart::form().max_length(form_limit))
        .and(with_state)
        .and_then(handlers::remove_background_binary);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    index
        .or(api)
        .or(health)
        .or(remove_json)
        .or(remove_binary)
        .recover(move |err| responses::handle_rejection(err, limit_mb))
        .with(cors)
        .with(warp::trace::request())
}

/// Preload configured models, then serve until the process is stopped
///
/// # Errors
/// - A preloaded model fails to load
pub async fn serve(config: &ServerConfig, loader: Arc<dyn SessionLoader>) -> Result<()> {
    let state = Arc::new(AppState::from_config(config, loader));

    if !config.preload_models.is_empty() {
        state
            .processor
            .session_cache()
            .preload(&config.preload_models)
            .await?;
    }

    let addr = config.socket_addr();
    info!(%addr, model_dir = %config.model_dir.display(), "Background removal API listening");
    warp::serve(routes(state)).run(addr).await;
    Ok(())
}
