//! Process-wide cache of model sessions
//!
//! Each model id maps to an initialize-once cell. The first caller for an id
//! runs the (slow) load under a timeout while concurrent callers for the same
//! id wait on the cell; later callers get the cached handle. A failed,
//! timed-out or cancelled load leaves no entry behind, so the next request
//! tries again.

use crate::error::{BgRemovalError, Result};
use crate::inference::{SegmentationSession, SessionLoader};
use crate::tracing_config::spans;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::Instrument;

type SessionCell = Arc<OnceCell<Arc<dyn SegmentationSession>>>;

/// Session cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCacheStats {
    /// Number of loaded sessions
    pub cached_sessions: usize,
    /// Lookups answered without loading
    pub cache_hits: u64,
    /// Lookups that performed a load
    pub cache_misses: u64,
    /// Loads that failed or timed out
    pub load_failures: u64,
}

/// Cache of model sessions keyed by model id
pub struct SessionCache {
    loader: Arc<dyn SessionLoader>,
    load_timeout: Duration,
    entries: Mutex<HashMap<String, SessionCell>>,
    hits: AtomicU64,
    misses: AtomicU64,
    load_failures: AtomicU64,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("load_timeout", &self.load_timeout)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SessionCache {
    #[must_use]
    pub fn new(loader: Arc<dyn SessionLoader>, load_timeout: Duration) -> Self {
        Self {
            loader,
            load_timeout,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
        }
    }

    /// Return the session for `model_id`, loading it on first use
    ///
    /// # Errors
    /// - `ModelLoad` when the loader fails or exceeds the load timeout
    pub async fn get_or_create(&self, model_id: &str) -> Result<Arc<dyn SegmentationSession>> {
        let cell = self.cell(model_id)?;

        if let Some(session) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(session));
        }

        let loaded_here = AtomicBool::new(false);
        let mut pending = PendingLoad {
            cache: self,
            model_id,
            cell: &cell,
            loading: &loaded_here,
            finished: false,
        };
        let result = cell
            .get_or_try_init(|| async {
                loaded_here.store(true, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.load(model_id).await
            })
            .await;
        pending.finished = true;

        match result {
            Ok(session) => {
                if !loaded_here.load(Ordering::Relaxed) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Arc::clone(session))
            },
            Err(e) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                self.forget_failed(model_id, &cell);
                Err(e)
            },
        }
    }

    /// Load every id in `model_ids`, stopping at the first failure
    ///
    /// # Errors
    /// - The first `ModelLoad` error encountered
    pub async fn preload<S: AsRef<str>>(&self, model_ids: &[S]) -> Result<()> {
        for model_id in model_ids {
            self.get_or_create(model_id.as_ref()).await?;
        }
        Ok(())
    }

    /// Whether a loaded session exists for `model_id`
    #[must_use]
    pub fn contains(&self, model_id: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.get(model_id).is_some_and(|cell| cell.initialized()))
            .unwrap_or(false)
    }

    #[must_use]
    pub fn stats(&self) -> SessionCacheStats {
        let cached_sessions = self
            .entries
            .lock()
            .map(|entries| entries.values().filter(|cell| cell.initialized()).count())
            .unwrap_or(0);

        SessionCacheStats {
            cached_sessions,
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
        }
    }

    fn cell(&self, model_id: &str) -> Result<SessionCell> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BgRemovalError::internal("Session cache lock poisoned"))?;
        Ok(Arc::clone(entries.entry(model_id.to_string()).or_default()))
    }

    async fn load(&self, model_id: &str) -> Result<Arc<dyn SegmentationSession>> {
        let start = Instant::now();
        let span = spans::model_loading(model_id);

        let session = async {
            tracing::info!("Loading model session");
            tokio::time::timeout(self.load_timeout, self.loader.load(model_id))
                .await
                .map_err(|_| {
                    BgRemovalError::model_load(format!(
                        "Loading model '{model_id}' timed out after {}s",
                        self.load_timeout.as_secs_f64()
                    ))
                })?
                .map_err(|e| match e {
                    BgRemovalError::ModelLoad(_) => e,
                    other => BgRemovalError::model_load(other.to_string()),
                })
        }
        .instrument(span)
        .await;

        match &session {
            Ok(_) => tracing::info!(
                model = model_id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Model session ready"
            ),
            Err(e) => tracing::error!(model = model_id, "Model session failed to load: {e}"),
        }
        session
    }

    fn forget_failed(&self, model_id: &str, cell: &SessionCell) {
        if let Ok(mut entries) = self.entries.lock() {
            let stale = entries
                .get(model_id)
                .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized());
            if stale {
                entries.remove(model_id);
            }
        }
    }

    /// Like [`Self::forget_failed`], but keeps the entry while another
    /// caller still holds the cell and may take over the load
    fn forget_cancelled(&self, model_id: &str, cell: &SessionCell) {
        if let Ok(mut entries) = self.entries.lock() {
            let stale = entries.get(model_id).is_some_and(|current| {
                Arc::ptr_eq(current, cell) && !current.initialized() && Arc::strong_count(current) <= 2
            });
            if stale {
                tracing::debug!(model = model_id, "Model load cancelled");
                entries.remove(model_id);
            }
        }
    }
}

/// Removes the entry of a load this caller started if the lookup is
/// dropped before the load finishes
struct PendingLoad<'a> {
    cache: &'a SessionCache,
    model_id: &'a str,
    cell: &'a SessionCell,
    loading: &'a AtomicBool,
    finished: bool,
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if !self.finished && self.loading.load(Ordering::Relaxed) {
            self.cache.forget_cancelled(self.model_id, self.cell);
        }
    }
}
