//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::{ExecutionProvider, ServerConfig};
use anyhow::{Context, Result};
use std::net::IpAddr;
use std::time::Duration;

/// Convert CLI arguments to a validated `ServerConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Defaults, then `BGREMOVE_*` variables, then explicit flags
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServerConfig> {
        let base = ServerConfig::default()
            .with_env_overrides()
            .context("Invalid BGREMOVE_* environment variable")?;

        let mut builder = ServerConfig::builder()
            .host(base.host)
            .port(cli.port.unwrap_or(base.port))
            .model_dir(cli.model_dir.clone().unwrap_or(base.model_dir))
            .allow_download(base.allow_download && !cli.no_download)
            .fallback_model(cli.fallback_model.clone())
            .max_upload_bytes(
                cli.max_upload_mb
                    .map_or(base.max_upload_bytes, |mb| mb * 1024 * 1024),
            )
            .max_dimension(cli.max_dimension.unwrap_or(base.max_dimension))
            .model_load_timeout(
                cli.model_load_timeout
                    .map_or(base.model_load_timeout, Duration::from_secs),
            )
            .max_attempts(cli.max_attempts)
            .execution_provider(base.execution_provider)
            .num_threads(cli.threads)
            .demo_page(cli.demo_page.clone())
            .preload_models(cli.preload.clone());

        if let Some(host) = &cli.host {
            let host: IpAddr = host
                .parse()
                .with_context(|| format!("Invalid host address '{host}'"))?;
            builder = builder.host(host);
        }
        if let Some(provider) = &cli.execution_provider {
            let provider: ExecutionProvider = provider.parse()?;
            builder = builder.execution_provider(provider);
        }

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "bgremove-server",
            "--host",
            "127.0.0.1",
            "--port",
            "9100",
            "--execution-provider",
            "cpu",
            "--threads",
            "4",
            "--max-upload-mb",
            "10",
            "--no-download",
        ])
        .unwrap();

        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9100");
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.intra_threads, 4);
        assert_eq!(config.inter_threads, 2);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(!config.allow_download);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cli = Cli::try_parse_from(["bgremove-server", "--execution-provider", "tpu"]).unwrap();
        assert!(CliConfigBuilder::from_cli(&cli).is_err());

        let cli = Cli::try_parse_from(["bgremove-server", "--max-attempts", "0"]).unwrap();
        assert!(CliConfigBuilder::from_cli(&cli).is_err());

        let cli = Cli::try_parse_from(["bgremove-server", "--host", "not-an-ip"]).unwrap();
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }
}
