//! HTTP method semantics for generated tools.
//!
//! Tool annotations follow RFC 9110 method properties so clients can tell read-only lookups
//! from state-changing calls.

use crate::model::HttpMethod;
use rmcp::model::ToolAnnotations;

/// MCP tool annotations for an operation's HTTP method.
///
/// `openWorldHint` is always `true`: every tool stands for an external API call, even when the
/// mock executor answers it.
#[must_use]
pub fn annotations_for_method(method: HttpMethod) -> ToolAnnotations {
    let (read_only, destructive, idempotent) = match method {
        HttpMethod::Get => (true, false, Some(true)),
        HttpMethod::Post => (false, false, Some(false)),
        HttpMethod::Put | HttpMethod::Delete => (false, true, Some(true)),
        // PATCH may or may not be idempotent; do not guess.
        HttpMethod::Patch => (false, true, None),
    };

    ToolAnnotations {
        title: None,
        read_only_hint: Some(read_only),
        destructive_hint: Some(destructive),
        idempotent_hint: idempotent,
        open_world_hint: Some(true),
    }
}
