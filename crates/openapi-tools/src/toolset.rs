//! The embedding surface: a loaded spec compiled into invocable tools.
//!
//! [`OpenApiToolset::load`] runs the whole startup pipeline once (resolve, parse, compile,
//! pick an executor). After that the toolset is immutable and cheap to clone; concurrent
//! [`OpenApiToolset::invoke_tool`] calls share nothing but the executor.

use crate::binder::{self, BoundRequest};
use crate::compiler::{self, ToolSchema};
use crate::config::StartupConfig;
use crate::error::{InvocationError, LoadError, Result};
use crate::executor::mock::MockExecutor;
use crate::executor::real::RealExecutor;
use crate::executor::{ExecutionMode, Executor};
use crate::model::OperationRegistry;
use crate::parser::parse_spec;
use crate::shaper::{self, ResponseEnvelope};
use crate::source::{self, SpecReference};
use reqwest::Client;
use rmcp::model::Tool;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use url::Url;

struct Inner {
    registry: OperationRegistry,
    tools: Vec<ToolSchema>,
    executor: Arc<dyn Executor>,
}

/// Compiled tools for one spec plus the executor chosen at startup.
#[derive(Clone)]
pub struct OpenApiToolset {
    inner: Arc<Inner>,
}

impl fmt::Debug for OpenApiToolset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenApiToolset")
            .field("title", &self.inner.registry.title)
            .field("tools", &self.inner.tools.len())
            .field("mode", &self.inner.executor.mode())
            .finish_non_exhaustive()
    }
}

impl OpenApiToolset {
    /// Resolve, parse and compile the configured spec.
    ///
    /// # Errors
    ///
    /// Any [`LoadError`] from the pipeline. In real mode, a missing or non-absolute base URL
    /// is a [`LoadError::Config`].
    pub async fn load(config: &StartupConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| LoadError::Config(format!("Failed to build HTTP client: {e}")))?;

        let raw = source::load(&config.spec, config.format, &client, config.timeout).await?;
        source::verify_hash(
            &raw.text,
            config.spec_hash.as_deref(),
            config.spec_hash_policy,
            &raw.location,
        )?;
        let registry = parse_spec(&raw)?;

        let executor: Arc<dyn Executor> = if config.use_real_api {
            let base_url = match config.base_url.as_deref() {
                Some(url) => url.to_string(),
                None => {
                    let server = registry.server_url.as_deref().ok_or_else(|| {
                        LoadError::Config(
                            "Real API mode needs a base URL: the spec declares no servers \
                             (set OPENAPI_BASE_URL)"
                                .to_string(),
                        )
                    })?;
                    resolve_base_url(server, &config.spec)?
                }
            };
            Arc::new(RealExecutor::new(
                &base_url,
                config.default_headers.clone(),
                config.auth.clone(),
                config.timeout,
            )?)
        } else {
            Arc::new(MockExecutor::default())
        };

        let toolset = Self::from_registry(registry, executor)?;
        tracing::info!(
            "Compiled {} tools from '{}' ({} mode)",
            toolset.inner.tools.len(),
            toolset.inner.registry.title,
            match toolset.mode() {
                ExecutionMode::Mock => "mock",
                ExecutionMode::Real => "real",
            }
        );
        Ok(toolset)
    }

    /// Compile an already parsed registry against a caller-supplied executor.
    ///
    /// # Errors
    ///
    /// [`LoadError::ParamCollision`] if any operation fails to compile.
    pub fn from_registry(registry: OperationRegistry, executor: Arc<dyn Executor>) -> Result<Self> {
        let tools = registry
            .operations()
            .iter()
            .map(compiler::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                tools,
                executor,
            }),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &OperationRegistry {
        &self.inner.registry
    }

    /// Tool schemas in spec order.
    #[must_use]
    pub fn list_tools(&self) -> &[ToolSchema] {
        &self.inner.tools
    }

    #[must_use]
    pub fn mcp_tools(&self) -> Vec<Tool> {
        self.inner.tools.iter().map(ToolSchema::to_tool).collect()
    }

    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolSchema> {
        self.inner.tools.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.inner.executor.mode()
    }

    /// Bind arguments for a tool without executing it.
    ///
    /// # Errors
    ///
    /// [`InvocationError::UnknownTool`] or any binding error.
    pub fn bind(
        &self,
        name: &str,
        arguments: &Value,
    ) -> std::result::Result<BoundRequest, InvocationError> {
        let schema = self
            .tool(name)
            .ok_or_else(|| InvocationError::UnknownTool(name.to_string()))?;
        binder::bind(schema, arguments)
    }

    /// Bind, execute and shape one call. Failures are reported inside the envelope.
    pub async fn invoke_tool(&self, name: &str, arguments: Value) -> ResponseEnvelope {
        let request = match self.bind(name, &arguments) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Rejected call to '{name}': {e}");
                return shaper::failure(name, &e);
            }
        };
        let Some(operation) = self.inner.registry.get(name) else {
            return shaper::failure(name, &InvocationError::UnknownTool(name.to_string()));
        };

        let result = self.inner.executor.execute(operation, &request).await;
        if let Err(e) = &result {
            tracing::warn!("Tool '{name}' failed: {e}");
        }
        shaper::shape(name, result)
    }
}

/// Turn a spec server URL into an absolute base URL.
///
/// Relative server URLs are joined against the spec's own URL; for file and inline specs they
/// cannot be resolved.
///
/// # Errors
///
/// [`LoadError::Config`] if the result is not an absolute http(s) URL.
pub fn resolve_base_url(server_url: &str, spec: &SpecReference) -> Result<String> {
    if server_url.starts_with("http://") || server_url.starts_with("https://") {
        return Ok(server_url.to_string());
    }

    if let SpecReference::Url(spec_url) = spec {
        let resolved: Url = spec_url.join(server_url).map_err(|e| {
            LoadError::Config(format!(
                "Invalid server URL '{server_url}': {e} (set OPENAPI_BASE_URL explicitly)"
            ))
        })?;
        return Ok(resolved.to_string());
    }

    Err(LoadError::Config(format!(
        "Invalid server URL '{server_url}': must be an absolute http(s) URL \
         (set OPENAPI_BASE_URL explicitly)"
    )))
}
