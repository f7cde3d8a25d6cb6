//! Typed operation model built by the parser.
//!
//! Everything here is constructed once at load time and is immutable afterwards. The raw spec
//! tree never leaves the parser; downstream components only see these records.

use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::sync::LazyLock;

/// `{name}` placeholders in path templates and server URLs.
pub(crate) static PLACEHOLDER_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\{([^}]+)\}").expect("valid placeholder regex"));

/// Supported HTTP methods. Anything else in a path item is skipped by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "patch" => Some(Self::Patch),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    #[must_use]
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
        })
    }
}

/// Declared type of a parameter or body field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// Ordered sequence; element type when `items` declares one.
    Array(Option<Box<FieldType>>),
    Object,
}

impl FieldType {
    /// Type name as used in error messages (`array<integer>`, `string`, ...).
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Array(None) => "array".to_string(),
            Self::Array(Some(item)) => format!("array<{}>", item.name()),
            Self::Object => "object".to_string(),
        }
    }

    /// JSON Schema fragment for this type.
    #[must_use]
    pub fn json_schema(&self) -> Value {
        match self {
            Self::String => json!({ "type": "string" }),
            Self::Integer => json!({ "type": "integer" }),
            Self::Number => json!({ "type": "number" }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Array(None) => json!({ "type": "array" }),
            Self::Array(Some(item)) => json!({ "type": "array", "items": item.json_schema() }),
            Self::Object => json!({ "type": "object" }),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A path, query or header parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    /// Declared `required` flag (path parameters are required regardless, see the compiler).
    pub required: bool,
    pub field_type: FieldType,
    pub description: Option<String>,
    pub default: Option<Value>,
}

/// One top-level property of a JSON request body.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub description: Option<String>,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyShape {
    /// JSON object body with named top-level properties.
    Fields(Vec<SchemaField>),
    /// JSON body that is not an object with properties (array, free-form object, scalar).
    Whole(FieldType),
    /// Non-JSON media type; accepts raw string content.
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    pub media_type: String,
    pub required: bool,
    pub shape: BodyShape,
}

impl RequestBody {
    #[must_use]
    pub fn is_json(&self) -> bool {
        !matches!(self.shape, BodyShape::Opaque)
    }
}

/// One API endpoint + method pair; the unit of tool generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Unique tool name (operationId or generated fallback, de-duplicated).
    pub name: String,
    pub operation_id: Option<String>,
    pub method: HttpMethod,
    pub path: String,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub deprecated: bool,
    pub tags: Vec<String>,
}

impl Operation {
    /// `GET /pets/{petId}` style label for logs and fallbacks.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Placeholder names in the path template, in order of appearance.
    #[must_use]
    pub fn placeholders(&self) -> Vec<String> {
        path_placeholders(&self.path)
    }
}

/// Extract `{name}` placeholders from a path template.
#[must_use]
pub fn path_placeholders(path: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(path)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// All operations of a loaded spec plus document-level metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRegistry {
    pub title: String,
    pub version: Option<String>,
    /// First `servers` entry with variables substituted; may be relative.
    pub server_url: Option<String>,
    operations: Vec<Operation>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new(
        title: String,
        version: Option<String>,
        server_url: Option<String>,
        operations: Vec<Operation>,
    ) -> Self {
        Self {
            title,
            version,
            server_url,
            operations,
        }
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
