//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bgremove_api::{
    AppState, BgRemovalError, ImageIOService, Result, SegmentationSession, ServerConfig,
    SessionLoader,
};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const BOUNDARY: &str = "----bgremove-test-boundary";

/// Session predicting a centred disc, or failing with `error`
pub struct DiscSession {
    name: String,
    error: Option<String>,
    calls: AtomicUsize,
    last_input: Mutex<Option<(u32, u32)>>,
}

impl DiscSession {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            error: None,
            calls: AtomicUsize::new(0),
            last_input: Mutex::new(None),
        })
    }

    pub fn failing(name: &str, error: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            error: Some(error.to_string()),
            calls: AtomicUsize::new(0),
            last_input: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Dimensions of the most recent image handed to the session
    pub fn last_input(&self) -> Option<(u32, u32)> {
        *self.last_input.lock().unwrap()
    }
}

impl SegmentationSession for DiscSession {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn predict_mask(&self, image: &RgbImage) -> Result<GrayImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = Some(image.dimensions());
        if let Some(error) = &self.error {
            return Err(BgRemovalError::inference(error.clone()));
        }

        let (width, height) = image.dimensions();
        let radius = f64::from(width.min(height)) / 3.0;
        let (cx, cy) = (f64::from(width) / 2.0, f64::from(height) / 2.0);
        Ok(GrayImage::from_fn(width, height, |x, y| {
            let dx = f64::from(x) + 0.5 - cx;
            let dy = f64::from(y) + 0.5 - cy;
            if dx * dx + dy * dy <= radius * radius {
                Luma([255])
            } else {
                Luma([0])
            }
        }))
    }
}

/// Loader over a fixed set of sessions
#[derive(Default)]
pub struct StaticLoader {
    sessions: HashMap<String, Arc<DiscSession>>,
    loads: AtomicUsize,
}

impl StaticLoader {
    pub fn with(mut self, session: Arc<DiscSession>) -> Self {
        self.sessions.insert(session.model_name().to_string(), session);
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionLoader for StaticLoader {
    async fn load(&self, model_id: &str) -> Result<Arc<dyn SegmentationSession>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .get(model_id)
            .map(|s| Arc::clone(s) as Arc<dyn SegmentationSession>)
            .ok_or_else(|| BgRemovalError::model_load(format!("Unknown model '{model_id}'")))
    }
}

/// Application state with the default models backed by disc sessions
pub fn default_state() -> (Arc<AppState>, Arc<DiscSession>) {
    let primary = DiscSession::new("isnet-general-use");
    let loader = StaticLoader::default()
        .with(Arc::clone(&primary))
        .with(DiscSession::new("u2net"));
    (state(loader, &ServerConfig::default()), primary)
}

pub fn state(loader: StaticLoader, config: &ServerConfig) -> Arc<AppState> {
    Arc::new(AppState::from_config(config, Arc::new(loader)))
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 160, 90])));
    ImageIOService::encode_png(&image).unwrap()
}

/// Builder for `multipart/form-data` request bodies
#[derive(Default)]
pub struct Form {
    body: Vec<u8>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
        self
    }

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}
