use anyhow::Context as _;
use std::path::Path;
use unrelated_openapi_tools::ConfigLayer;

/// Read the JSON config file layer. A missing file is an empty layer.
pub fn load_file(path: &Path) -> anyhow::Result<ConfigLayer> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}", path.display());
            return Ok(ConfigLayer::default());
        }
        Err(e) => return Err(e).with_context(|| format!("read config {}", path.display())),
    };
    let layer: ConfigLayer =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(layer)
}

pub fn env_layer() -> anyhow::Result<ConfigLayer> {
    ConfigLayer::from_env_vars(|key| std::env::var(key).ok()).context("read environment")
}
