//! Tool schema compiler: [`Operation`] → [`ToolSchema`].
//!
//! Compilation is a pure function. Parameters and top-level body properties are flattened
//! into one argument namespace; two sources claiming the same name is a load-time error.

use crate::error::{LoadError, Result};
use crate::model::{BodyShape, FieldType, HttpMethod, Operation, ParamLocation};
use crate::semantics::annotations_for_method;
use rmcp::model::{JsonObject, Tool};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Argument name used when the whole request body is a single field.
pub const WHOLE_BODY_FIELD: &str = "body";

/// Where a bound argument ends up in the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Path,
    Query,
    Header,
    /// One top-level property of a JSON object body.
    Body,
    /// The entire request body (non-object JSON, or opaque content).
    WholeBody,
}

impl From<ParamLocation> for FieldSource {
    fn from(loc: ParamLocation) -> Self {
        match loc {
            ParamLocation::Path => Self::Path,
            ParamLocation::Query => Self::Query,
            ParamLocation::Header => Self::Header,
        }
    }
}

impl fmt::Display for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
            Self::WholeBody => "whole body",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputField {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub source: FieldSource,
    pub description: Option<String>,
    /// Advertised in the schema only; the binder never injects defaults.
    pub default: Option<Value>,
}

/// Caller-facing description of one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub method: HttpMethod,
    pub path: String,
    pub fields: Vec<InputField>,
    /// Media type of the request body, when the operation declares one.
    pub body_media_type: Option<String>,
    pub body_required: bool,
    pub deprecated: bool,
}

impl ToolSchema {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&InputField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of required fields, in field order.
    #[must_use]
    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// JSON Schema for the tool input.
    #[must_use]
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required: Vec<Value> = Vec::new();

        for field in &self.fields {
            let mut prop = field.field_type.json_schema();
            if let Some(description) = &field.description {
                prop["description"] = json!(description);
            }
            if let Some(default) = &field.default {
                prop["default"] = default.clone();
            }
            properties.insert(field.name.clone(), prop);

            if field.required {
                required.push(json!(field.name));
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = Value::Array(required);
        }
        schema
    }

    /// Render as an MCP tool definition.
    #[must_use]
    pub fn to_tool(&self) -> Tool {
        let schema_obj = self
            .json_schema()
            .as_object()
            .cloned()
            .unwrap_or_else(JsonObject::new);
        let mut tool = Tool::new(
            self.name.clone(),
            self.description.clone(),
            Arc::new(schema_obj),
        );
        tool.annotations = Some(annotations_for_method(self.method));
        tool
    }
}

/// Compile an operation into its tool schema.
///
/// # Errors
///
/// Returns [`LoadError::ParamCollision`] when two source fields share an argument name.
pub fn compile(op: &Operation) -> Result<ToolSchema> {
    let mut fields: Vec<InputField> = Vec::new();

    for param in &op.parameters {
        fields.push(InputField {
            name: param.name.clone(),
            field_type: param.field_type.clone(),
            required: param.location == ParamLocation::Path || param.required,
            source: param.location.into(),
            description: param.description.clone(),
            default: param.default.clone(),
        });
    }

    if let Some(body) = &op.request_body {
        match &body.shape {
            BodyShape::Fields(props) => {
                fields.extend(props.iter().map(|p| InputField {
                    name: p.name.clone(),
                    field_type: p.field_type.clone(),
                    required: p.required,
                    source: FieldSource::Body,
                    description: p.description.clone(),
                    default: p.default.clone(),
                }));
            }
            BodyShape::Whole(field_type) => fields.push(InputField {
                name: WHOLE_BODY_FIELD.to_string(),
                field_type: field_type.clone(),
                required: body.required,
                source: FieldSource::WholeBody,
                description: Some(format!("Request body ({})", body.media_type)),
                default: None,
            }),
            BodyShape::Opaque => fields.push(InputField {
                name: WHOLE_BODY_FIELD.to_string(),
                field_type: FieldType::String,
                required: body.required,
                source: FieldSource::WholeBody,
                description: Some(format!("Raw request body ({})", body.media_type)),
                default: None,
            }),
        }
    }

    let mut seen: HashMap<&str, FieldSource> = HashMap::new();
    for field in &fields {
        if let Some(first) = seen.insert(field.name.as_str(), field.source) {
            return Err(LoadError::ParamCollision(format!(
                "argument '{}' of {} {} is declared by both {} and {}",
                field.name, op.method, op.path, first, field.source
            )));
        }
    }

    Ok(ToolSchema {
        name: op.name.clone(),
        description: tool_description(op),
        method: op.method,
        path: op.path.clone(),
        fields,
        body_media_type: op.request_body.as_ref().map(|b| b.media_type.clone()),
        body_required: op.request_body.as_ref().is_some_and(|b| b.required),
        deprecated: op.deprecated,
    })
}

fn tool_description(op: &Operation) -> String {
    op.summary
        .clone()
        .or_else(|| op.description.clone())
        .unwrap_or_else(|| format!("Invoke {} {}", op.method, op.path))
}
