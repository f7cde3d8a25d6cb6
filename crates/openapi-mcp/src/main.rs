//! `openapi-mcp`: expose every operation of an `OpenAPI` document as an MCP tool.
//!
//! Serves MCP over stdin/stdout; logs go to stderr.

mod config;
mod server;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use rmcp::ServiceExt as _;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};
use unrelated_openapi_tools::{ConfigLayer, LayeredConfig, OpenApiToolset, SpecFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "openapi-mcp")]
#[command(about = "Serve an OpenAPI document as MCP tools over stdio")]
#[command(version)]
struct Cli {
    /// Spec reference: http(s) URL, file:// URL or local path
    #[arg(long)]
    spec: Option<String>,

    /// Spec format; guessed from the extension or content when omitted
    #[arg(long)]
    format: Option<SpecFormat>,

    /// Call the real API instead of returning mock data (`--real-api=false` forces mock mode)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    real_api: Option<bool>,

    /// Base URL for real calls (overrides the spec's servers)
    #[arg(long)]
    base_url: Option<String>,

    /// JSON config file; a missing file is ignored
    #[arg(long, default_value = "mcp_config.json")]
    config: PathBuf,

    /// Directory searched for current.json / current.yaml when no spec is set
    #[arg(long)]
    spec_dir: Option<PathBuf>,

    /// Timeout for spec fetches and real API calls
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log filter (`RUST_LOG` syntax)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

impl Cli {
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            spec: self.spec.clone(),
            format: self.format,
            use_real_api: self.real_api,
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
            spec_dir: self.spec_dir.clone(),
            ..ConfigLayer::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format)?;

    let layers = LayeredConfig {
        cli: cli.layer(),
        file: config::load_file(&cli.config)?,
        env: config::env_layer()?,
    };
    let convention = layers.locate_spec_in_dir();
    let startup = layers
        .resolve(convention.as_deref())
        .context("resolve configuration")?;

    let toolset = OpenApiToolset::load(&startup)
        .await
        .with_context(|| format!("load OpenAPI spec {}", startup.spec.describe()))?;

    let service = server::OpenApiServer::new(toolset)
        .serve(rmcp::transport::io::stdio())
        .await
        .context("start MCP server on stdio")?;
    service.waiting().await.context("MCP server task failed")?;
    Ok(())
}

fn init_tracing(filter: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(filter).with_context(|| format!("invalid log filter '{filter}'"))?;
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_layer_only_sets_given_flags() {
        let cli = Cli::parse_from(["openapi-mcp", "--spec", "pizza.json", "--timeout-secs", "5"]);
        let layer = cli.layer();
        assert_eq!(layer.spec.as_deref(), Some("pizza.json"));
        assert_eq!(layer.timeout_secs, Some(5));
        assert_eq!(layer.use_real_api, None);
        assert_eq!(layer.format, None);
    }

    #[test]
    fn real_api_flag_can_force_mock_mode() {
        let cli = Cli::parse_from(["openapi-mcp", "--real-api=false"]);
        assert_eq!(cli.layer().use_real_api, Some(false));

        let layers = LayeredConfig {
            cli: ConfigLayer {
                spec: Some("pizza.json".to_string()),
                ..cli.layer()
            },
            file: ConfigLayer {
                use_real_api: Some(true),
                ..ConfigLayer::default()
            },
            env: ConfigLayer::default(),
        };
        assert!(!layers.resolve(None).unwrap().use_real_api);
    }

    #[test]
    fn cli_parses_format_and_real_api() {
        let cli = Cli::parse_from([
            "openapi-mcp",
            "--format",
            "yaml",
            "--real-api",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.format, Some(SpecFormat::Yaml));
        assert_eq!(cli.layer().use_real_api, Some(true));
        assert!(cli.spec_dir.is_none());
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.config, PathBuf::from("mcp_config.json"));
    }
}
