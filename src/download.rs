//! Model file provisioning
//!
//! Models live as `<model_dir>/<id>.onnx`. A missing file is downloaded from the
//! model release into a `.part` file first and renamed into place once complete,
//! so a crashed download never leaves a truncated model behind.

use crate::error::{BgRemovalError, Result};
use crate::models::ModelKind;
use futures::TryStreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Downloads and locates model files
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
    model_dir: PathBuf,
    allow_download: bool,
}

impl ModelDownloader {
    /// Create a downloader rooted at `model_dir`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new<P: Into<PathBuf>>(model_dir: P, allow_download: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            model_dir: model_dir.into(),
            allow_download,
        })
    }

    #[must_use]
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Local path of a model file, whether or not it exists yet
    #[must_use]
    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.model_dir.join(kind.file_name())
    }

    /// Return the local model file, downloading it first when missing
    ///
    /// # Errors
    /// - Model missing and downloads disabled
    /// - Network or file system errors during download
    pub async fn ensure_model(&self, kind: ModelKind) -> Result<PathBuf> {
        let path = self.model_path(kind);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(model = %kind, path = %path.display(), "Model file present");
            return Ok(path);
        }

        if !self.allow_download {
            return Err(BgRemovalError::model_load(format!(
                "Model file {} not found and downloads are disabled",
                path.display()
            )));
        }

        tokio::fs::create_dir_all(&self.model_dir)
            .await
            .map_err(|e| BgRemovalError::file_io_error("create model directory", &self.model_dir, &e))?;

        let url = kind.download_url();
        tracing::info!(model = %kind, url = %url, "Downloading model");
        let part_path = path.with_extension("onnx.part");

        match self.download_file(&url, &part_path).await {
            Ok(bytes) => {
                tokio::fs::rename(&part_path, &path)
                    .await
                    .map_err(|e| BgRemovalError::file_io_error("move downloaded model", &path, &e))?;
                tracing::info!(model = %kind, bytes, "Model downloaded");
                Ok(path)
            },
            Err(e) => {
                if let Err(cleanup_err) = tokio::fs::remove_file(&part_path).await {
                    tracing::debug!("No partial download to clean up: {cleanup_err}");
                }
                Err(e)
            },
        }
    }

    /// Stream a URL to `local_path`, returning the number of bytes written
    async fn download_file(&self, url: &str, local_path: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(&format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(BgRemovalError::network_error(
                &format!("Failed to download {url}"),
                format!("HTTP {}", response.status()),
            ));
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let written = tokio::io::copy(&mut stream, &mut file)
            .await
            .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush file", local_path, &e))?;

        Ok(written)
    }
}
