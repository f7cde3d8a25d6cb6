//! MCP server handler over a compiled [`OpenApiToolset`].
//!
//! rmcp runs each request on its own task, so a slow upstream call never holds up other
//! `tools/call` requests on the same session.

use rmcp::model::{
    CallToolRequestParams, CallToolResult, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::Value;
use std::future::Future;
use unrelated_openapi_tools::OpenApiToolset;

#[derive(Debug, Clone)]
pub struct OpenApiServer {
    toolset: OpenApiToolset,
}

impl OpenApiServer {
    pub fn new(toolset: OpenApiToolset) -> Self {
        tracing::info!(
            "Serving {} tools from '{}'",
            toolset.list_tools().len(),
            toolset.registry().title
        );
        Self { toolset }
    }
}

impl ServerHandler for OpenApiServer {
    fn get_info(&self) -> ServerInfo {
        let registry = self.toolset.registry();
        let version = registry
            .version
            .as_deref()
            .map(|v| format!(" v{v}"))
            .unwrap_or_default();
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "openapi-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some(registry.title.clone()),
                ..Default::default()
            },
            instructions: Some(format!(
                "Tools generated from '{}'{version}. Every call returns a JSON envelope with \
                 `success` and a one-sentence `context`.",
                registry.title
            )),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.toolset.mcp_tools(),
            ..Default::default()
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let arguments = request.arguments.map_or(Value::Null, Value::Object);
            let envelope = self.toolset.invoke_tool(&request.name, arguments).await;
            Ok(envelope.to_call_tool_result())
        }
    }
}
