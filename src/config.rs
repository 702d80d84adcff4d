//! Configuration types for the background removal service

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Model the fallback attempt uses when every primary attempt failed
pub const FALLBACK_MODEL: &str = "u2net";

/// Default upload limit (50 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Default longest side before an input is downsampled
pub const DEFAULT_MAX_DIMENSION: u32 = 4000;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown execution provider '{other}' (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// Configuration for the HTTP service and its removal pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    pub host: IpAddr,
    /// Port to bind
    pub port: u16,
    /// Directory holding `<model>.onnx` files
    pub model_dir: PathBuf,
    /// Download missing models on first use
    pub allow_download: bool,
    /// Model used by the last-resort fallback attempt
    pub fallback_model: String,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Longest image side before downsampling
    pub max_dimension: u32,
    /// Upper bound for creating a model session
    #[serde(with = "duration_secs")]
    pub model_load_timeout: Duration,
    /// Primary attempts before the fallback runs
    pub max_attempts: usize,
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,
    /// Demo page served on `GET /` when the file exists
    pub demo_page: PathBuf,
    /// Models loaded at startup instead of on first request
    pub preload_models: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            model_dir: default_model_dir(),
            allow_download: true,
            fallback_model: FALLBACK_MODEL.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
            model_load_timeout: Duration::from_secs(60),
            max_attempts: 2,
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
            demo_page: PathBuf::from("demo.html"),
            preload_models: Vec::new(),
        }
    }
}

/// `$U2NET_HOME`, else `~/.u2net`, else `./.u2net`
#[must_use]
pub fn default_model_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("U2NET_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".u2net")
}

impl ServerConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_api::ServerConfig;
    ///
    /// let config = ServerConfig::builder()
    ///     .port(9000)
    ///     .max_attempts(3)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.socket_addr().port(), 9000);
    /// ```
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Socket address the server binds to
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Zero upload limit, dimension limit, attempts or timeout
    /// - Empty fallback model name
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(BgRemovalError::config_value_error(
                "max_upload_bytes",
                self.max_upload_bytes,
                ">= 1",
            ));
        }
        if self.max_dimension == 0 {
            return Err(BgRemovalError::config_value_error(
                "max_dimension",
                self.max_dimension,
                ">= 1",
            ));
        }
        if self.max_attempts == 0 {
            return Err(BgRemovalError::config_value_error(
                "max_attempts",
                self.max_attempts,
                ">= 1",
            ));
        }
        if self.model_load_timeout.is_zero() {
            return Err(BgRemovalError::invalid_config(
                "model_load_timeout must be greater than zero",
            ));
        }
        if self.fallback_model.trim().is_empty() {
            return Err(BgRemovalError::invalid_config(
                "fallback_model must not be empty",
            ));
        }
        Ok(())
    }

    /// Apply `BGREMOVE_*` environment overrides on top of this configuration
    ///
    /// Recognised variables: `BGREMOVE_HOST`, `BGREMOVE_PORT`,
    /// `BGREMOVE_MODEL_DIR`, `BGREMOVE_MAX_UPLOAD_MB`, `BGREMOVE_MAX_DIMENSION`,
    /// `BGREMOVE_MODEL_LOAD_TIMEOUT_SECS`, `BGREMOVE_EXECUTION_PROVIDER`.
    ///
    /// # Errors
    /// - A variable is set but cannot be parsed
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("BGREMOVE_HOST") {
            self.host = parse_env("BGREMOVE_HOST", &host)?;
        }
        if let Some(port) = lookup("BGREMOVE_PORT") {
            self.port = parse_env("BGREMOVE_PORT", &port)?;
        }
        if let Some(dir) = lookup("BGREMOVE_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(mb) = lookup("BGREMOVE_MAX_UPLOAD_MB") {
            let mb: usize = parse_env("BGREMOVE_MAX_UPLOAD_MB", &mb)?;
            self.max_upload_bytes = mb * 1024 * 1024;
        }
        if let Some(dim) = lookup("BGREMOVE_MAX_DIMENSION") {
            self.max_dimension = parse_env("BGREMOVE_MAX_DIMENSION", &dim)?;
        }
        if let Some(secs) = lookup("BGREMOVE_MODEL_LOAD_TIMEOUT_SECS") {
            self.model_load_timeout =
                Duration::from_secs(parse_env("BGREMOVE_MODEL_LOAD_TIMEOUT_SECS", &secs)?);
        }
        if let Some(provider) = lookup("BGREMOVE_EXECUTION_PROVIDER") {
            self.execution_provider = provider.parse()?;
        }
        Ok(self)
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        BgRemovalError::invalid_config(format!("{key}={value} could not be parsed: {e}"))
    })
}

/// Builder for `ServerConfig`
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = dir.into();
        self
    }

    #[must_use]
    pub fn allow_download(mut self, allow: bool) -> Self {
        self.config.allow_download = allow;
        self
    }

    #[must_use]
    pub fn fallback_model<S: Into<String>>(mut self, model: S) -> Self {
        self.config.fallback_model = model.into();
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn max_dimension(mut self, dimension: u32) -> Self {
        self.config.max_dimension = dimension;
        self
    }

    #[must_use]
    pub fn model_load_timeout(mut self, timeout: Duration) -> Self {
        self.config.model_load_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set intra threads to `threads` and inter threads to half of it (0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn demo_page<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.demo_page = path.into();
        self
    }

    #[must_use]
    pub fn preload_models(mut self, models: Vec<String>) -> Self {
        self.config.preload_models = models;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule of [`ServerConfig::validate`] is violated
    pub fn build(self) -> Result<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(crate) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.max_dimension, 4000);
        assert_eq!(config.model_load_timeout, Duration::from_secs(60));
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.fallback_model, "u2net");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_validation() {
        assert!(ServerConfig::builder().max_attempts(0).build().is_err());
        assert!(ServerConfig::builder().max_dimension(0).build().is_err());
        assert!(ServerConfig::builder()
            .model_load_timeout(Duration::ZERO)
            .build()
            .is_err());

        let config = ServerConfig::builder().num_threads(8).build().unwrap();
        assert_eq!(config.intra_threads, 8);
        assert_eq!(config.inter_threads, 4);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BGREMOVE_PORT", "9090"),
            ("BGREMOVE_MAX_UPLOAD_MB", "10"),
            ("BGREMOVE_EXECUTION_PROVIDER", "CPU"),
            ("BGREMOVE_MODEL_LOAD_TIMEOUT_SECS", "5"),
        ]
        .into_iter()
        .collect();

        let config = ServerConfig::default()
            .with_overrides(|key| vars.get(key).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.model_load_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_env_override_parse_error() {
        let err = ServerConfig::default()
            .with_overrides(|key| (key == "BGREMOVE_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("BGREMOVE_PORT"));
    }

    #[test]
    fn test_execution_provider_round_trip_names() {
        for provider in [
            ExecutionProvider::Auto,
            ExecutionProvider::Cpu,
            ExecutionProvider::Cuda,
            ExecutionProvider::CoreMl,
        ] {
            assert_eq!(provider.to_string().parse::<ExecutionProvider>().unwrap(), provider);
        }
        assert!("tpu".parse::<ExecutionProvider>().is_err());
    }
}
