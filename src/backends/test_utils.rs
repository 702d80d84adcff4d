//! Test utilities and mock sessions for exercising the pipeline
//!
//! These mocks stand in for ONNX Runtime so the cache, retry logic and
//! removal primitive can be tested without model files.

use crate::{
    error::{BgRemovalError, Result},
    inference::{SegmentationSession, SessionLoader},
};
use async_trait::async_trait;
use image::{GrayImage, Luma, RgbImage};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a mock session does on a call
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Opaque disc in the centre, transparent elsewhere
    Disc,
    /// All-zero mask (the result fails validation)
    Empty,
    /// Inference error with the given message
    Fail(String),
}

/// Mock segmentation session driven by a script of behaviors
///
/// Each call consumes the next behavior; the last one repeats forever.
#[derive(Debug)]
pub struct MockSession {
    name: String,
    script: Mutex<VecDeque<MockBehavior>>,
    calls: AtomicUsize,
}

impl MockSession {
    /// Session that always predicts a disc
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::scripted(name, vec![MockBehavior::Disc])
    }

    #[must_use]
    pub fn scripted(name: &str, script: Vec<MockBehavior>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `predict_mask` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_behavior(&self) -> MockBehavior {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or(MockBehavior::Disc)
        }
    }
}

/// Hard-edged disc mask with radius of a third of the shorter side
#[must_use]
pub fn disc_mask(width: u32, height: u32) -> GrayImage {
    let center_x = width as f32 / 2.0;
    let center_y = height as f32 / 2.0;
    let radius = width.min(height) as f32 / 3.0;

    GrayImage::from_fn(width, height, |x, y| {
        let dx = x as f32 + 0.5 - center_x;
        let dy = y as f32 + 0.5 - center_y;
        if (dx * dx + dy * dy).sqrt() < radius {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

impl SegmentationSession for MockSession {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn predict_mask(&self, image: &RgbImage) -> Result<GrayImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = image.dimensions();
        match self.next_behavior() {
            MockBehavior::Disc => Ok(disc_mask(width, height)),
            MockBehavior::Empty => Ok(GrayImage::new(width, height)),
            MockBehavior::Fail(message) => Err(BgRemovalError::inference(message)),
        }
    }
}

/// Mock loader that hands out preconfigured sessions
#[derive(Default)]
pub struct MockLoader {
    sessions: HashMap<String, Arc<MockSession>>,
    load_delay: Option<Duration>,
    loads: AtomicUsize,
}

impl MockLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for a model id
    #[must_use]
    pub fn with_session(mut self, session: MockSession) -> Self {
        self.sessions
            .insert(session.name.clone(), Arc::new(session));
        self
    }

    /// Sleep this long inside every load
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Number of loads performed
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// The registered session for `model_id`
    pub fn session(&self, model_id: &str) -> Arc<MockSession> {
        Arc::clone(&self.sessions[model_id])
    }
}

#[async_trait]
impl SessionLoader for MockLoader {
    async fn load(&self, model_id: &str) -> Result<Arc<dyn SegmentationSession>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        match self.sessions.get(model_id) {
            Some(session) => Ok(Arc::clone(session) as Arc<dyn SegmentationSession>),
            None => Err(BgRemovalError::model_load(format!(
                "Unknown model '{model_id}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_advances_and_repeats_last() {
        let session = MockSession::scripted(
            "u2net",
            vec![MockBehavior::Empty, MockBehavior::Fail("boom".into()), MockBehavior::Disc],
        );
        let image = RgbImage::new(9, 9);

        assert!(session.predict_mask(&image).unwrap().pixels().all(|p| p[0] == 0));
        assert!(session.predict_mask(&image).is_err());
        assert_eq!(session.predict_mask(&image).unwrap().get_pixel(4, 4)[0], 255);
        assert_eq!(session.predict_mask(&image).unwrap().get_pixel(0, 0)[0], 0);
        assert_eq!(session.calls(), 4);
    }

    #[tokio::test]
    async fn test_loader_counts_loads() {
        let loader = MockLoader::new().with_session(MockSession::new("u2net"));
        assert!(loader.load("u2net").await.is_ok());
        assert!(loader.load("missing").await.is_err());
        assert_eq!(loader.loads(), 2);
    }
}
