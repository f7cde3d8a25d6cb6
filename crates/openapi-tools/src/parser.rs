//! Spec parser: raw JSON/YAML text → [`OperationRegistry`].
//!
//! The parser walks the generic document tree rather than a strict typed model so that
//! partially specified schemas (missing `type`, unknown keywords, 3.1 type arrays) are
//! tolerated. Structural problems fail with [`LoadError::SpecParse`] and a JSON pointer.

use crate::error::{LoadError, Result};
use crate::model::{
    BodyShape, FieldType, HttpMethod, Operation, OperationRegistry, ParamLocation, Parameter,
    PLACEHOLDER_RE, RequestBody, SchemaField, path_placeholders,
};
use crate::resolver::{DocId, RefResolver};
use crate::source::{RawSpec, SpecFormat};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

const MAX_TOOL_NAME_LEN: usize = 64;
const MAX_SCHEMA_DEPTH: usize = 8;

static NON_ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("valid name regex"));

/// Path item keys that are not operations but are still part of the 3.x grammar.
const PATH_ITEM_KEYS: [&str; 5] = ["parameters", "summary", "description", "servers", "$ref"];
const UNSUPPORTED_METHODS: [&str; 3] = ["head", "options", "trace"];

/// Parse raw spec text into the immutable operation registry.
///
/// # Errors
///
/// Returns [`LoadError::SpecParse`] for malformed documents, Swagger 2.0 input, missing
/// `paths`, nameless parameters and unresolvable or cyclic `$ref`s.
pub fn parse_spec(raw: &RawSpec) -> Result<OperationRegistry> {
    let root = parse_tree(&raw.text, raw.format)?;
    let Some(root_obj) = root.as_object() else {
        return Err(LoadError::parse("", "document root must be an object"));
    };

    if root_obj.contains_key("swagger") {
        return Err(LoadError::parse(
            "/swagger",
            "Swagger 2.0 documents are not supported (OpenAPI 3.x required)",
        ));
    }

    let title = root_obj
        .get("info")
        .and_then(|i| i.get("title"))
        .and_then(Value::as_str)
        .unwrap_or("API")
        .to_string();
    let version = root_obj
        .get("info")
        .and_then(|i| i.get("version"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let server_url = first_server_url(root_obj);

    let paths = match root_obj.get("paths") {
        Some(Value::Object(paths)) => paths.clone(),
        Some(_) => return Err(LoadError::parse("/paths", "'paths' must be an object")),
        None => return Err(LoadError::parse("/paths", "missing required 'paths' object")),
    };

    let resolver = RefResolver::new(raw.doc.clone(), root);
    let mut operations = Vec::new();
    let mut names: HashSet<String> = HashSet::new();

    for (path, item) in &paths {
        if path.starts_with("x-") {
            continue;
        }
        let item_loc = format!("/paths/{}", escape_pointer(path));
        let (item_doc, item) = resolver.resolve(resolver.root_doc(), item, &item_loc)?;
        let Some(item) = item.as_object() else {
            return Err(LoadError::parse(item_loc, "path item must be an object"));
        };

        let shared_params = parameter_list(item, &item_loc)?;

        for (key, op_node) in item {
            if PATH_ITEM_KEYS.contains(&key.as_str()) || key.starts_with("x-") {
                continue;
            }
            let Some(method) = HttpMethod::parse(key) else {
                if UNSUPPORTED_METHODS.contains(&key.to_ascii_lowercase().as_str()) {
                    tracing::debug!(path = %path, method = %key, "Skipping unsupported HTTP method");
                } else {
                    tracing::debug!(path = %path, key = %key, "Ignoring unknown path item field");
                }
                continue;
            };

            let op_loc = format!("{item_loc}/{}", escape_pointer(key));
            let Some(op) = op_node.as_object() else {
                return Err(LoadError::parse(op_loc, "operation must be an object"));
            };

            let operation = parse_operation(
                &resolver,
                &item_doc,
                method,
                path,
                op,
                &shared_params,
                &op_loc,
                &mut names,
            )?;
            tracing::debug!(
                tool = %operation.name,
                method = %operation.method,
                path = %operation.path,
                "Registered operation"
            );
            operations.push(operation);
        }
    }

    tracing::info!(
        "Parsed {} operations from '{}' ({})",
        operations.len(),
        raw.location,
        title
    );

    Ok(OperationRegistry::new(title, version, server_url, operations))
}

fn parse_tree(text: &str, format: SpecFormat) -> Result<Value> {
    match format {
        SpecFormat::Json => serde_json::from_str(text)
            .map_err(|e| LoadError::parse("", format!("malformed JSON: {e}"))),
        SpecFormat::Yaml => serde_yaml::from_str(text)
            .map_err(|e| LoadError::parse("", format!("malformed YAML: {e}"))),
    }
}

/// `servers[0].url` with `{variable}`s replaced by their declared defaults.
fn first_server_url(root: &Map<String, Value>) -> Option<String> {
    let server = root.get("servers")?.as_array()?.first()?;
    let url = server.get("url")?.as_str()?.trim();
    if url.is_empty() {
        return None;
    }
    let vars = server.get("variables").and_then(Value::as_object);
    let substituted = PLACEHOLDER_RE.replace_all(url, |caps: &regex::Captures<'_>| {
        vars.and_then(|v| v.get(&caps[1]))
            .and_then(|v| v.get("default"))
            .and_then(Value::as_str)
            .map_or_else(|| caps[0].to_string(), str::to_string)
    });
    Some(substituted.into_owned())
}

/// Raw (unresolved) entries of a `parameters` array.
fn parameter_list(node: &Map<String, Value>, location: &str) -> Result<Vec<(String, Value)>> {
    match node.get("parameters") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, p)| (format!("{location}/parameters/{i}"), p.clone()))
            .collect()),
        Some(_) => Err(LoadError::parse(
            format!("{location}/parameters"),
            "'parameters' must be an array",
        )),
    }
}

#[allow(clippy::too_many_arguments)]
fn parse_operation(
    resolver: &RefResolver,
    doc: &DocId,
    method: HttpMethod,
    path: &str,
    op: &Map<String, Value>,
    shared_params: &[(String, Value)],
    op_loc: &str,
    names: &mut HashSet<String>,
) -> Result<Operation> {
    let own_params = parameter_list(op, op_loc)?;
    let mut parameters = merge_parameters(resolver, doc, shared_params, &own_params)?;

    for placeholder in path_placeholders(path) {
        let declared = parameters
            .iter()
            .any(|p| p.location == ParamLocation::Path && p.name == placeholder);
        if !declared {
            tracing::debug!(
                path = %path,
                param = %placeholder,
                "Adding implicit path parameter for undeclared placeholder"
            );
            parameters.push(Parameter {
                name: placeholder,
                location: ParamLocation::Path,
                required: true,
                field_type: FieldType::String,
                description: None,
                default: None,
            });
        }
    }

    let request_body = match op.get("requestBody") {
        Some(node) => parse_request_body(resolver, doc, node, &format!("{op_loc}/requestBody"))?,
        None => None,
    };

    let operation_id = op
        .get("operationId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let base_name = operation_id
        .clone()
        .unwrap_or_else(|| generate_canonical_name(method.as_str(), path));
    let name = reserve_unique_tool_name(names, &base_name);
    if name != base_name {
        tracing::warn!(
            "Tool name '{}' already taken; {} {} registered as '{}'",
            base_name,
            method,
            path,
            name
        );
    }

    Ok(Operation {
        name,
        operation_id,
        method,
        path: path.to_string(),
        parameters,
        request_body,
        summary: non_blank(op.get("summary")),
        description: non_blank(op.get("description")),
        deprecated: op
            .get("deprecated")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        tags: op
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

fn non_blank(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Path-level parameters first, then operation-level ones. An operation-level parameter with
/// the same name and location replaces the inherited one in place.
fn merge_parameters(
    resolver: &RefResolver,
    doc: &DocId,
    shared: &[(String, Value)],
    own: &[(String, Value)],
) -> Result<Vec<Parameter>> {
    let mut merged: Vec<Parameter> = Vec::new();
    let mut index: HashMap<(ParamLocation, String), usize> = HashMap::new();

    for (loc, node) in shared.iter().chain(own) {
        let Some(param) = parse_parameter(resolver, doc, node, loc)? else {
            continue;
        };
        let key = (param.location, param.name.clone());
        if let Some(i) = index.get(&key).copied() {
            merged[i] = param;
        } else {
            index.insert(key, merged.len());
            merged.push(param);
        }
    }

    Ok(merged)
}

fn parse_parameter(
    resolver: &RefResolver,
    doc: &DocId,
    node: &Value,
    location: &str,
) -> Result<Option<Parameter>> {
    let (param_doc, node) = resolver.resolve(doc, node, location)?;
    let Some(obj) = node.as_object() else {
        return Err(LoadError::parse(location, "parameter must be an object"));
    };

    let Some(name) = obj
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
    else {
        return Err(LoadError::parse(location, "parameter is missing 'name'"));
    };

    let param_location = match obj.get("in").and_then(Value::as_str) {
        Some("path") => ParamLocation::Path,
        Some("query") => ParamLocation::Query,
        Some("header") => ParamLocation::Header,
        Some("cookie") => {
            tracing::debug!(param = %name, "Ignoring cookie parameter");
            return Ok(None);
        }
        Some(other) => {
            tracing::warn!(param = %name, "Ignoring parameter with unknown location '{other}'");
            return Ok(None);
        }
        None => {
            tracing::warn!(param = %name, "Parameter has no 'in'; treating it as a query parameter");
            ParamLocation::Query
        }
    };

    let schema_loc = format!("{location}/schema");
    let (field_type, default) = match obj.get("schema") {
        Some(schema) => {
            let (schema_doc, schema) = resolver.resolve(&param_doc, schema, &schema_loc)?;
            (
                field_type(resolver, &schema_doc, &schema, &schema_loc, 0)?,
                schema.get("default").cloned(),
            )
        }
        None => (FieldType::String, None),
    };

    Ok(Some(Parameter {
        name: name.to_string(),
        location: param_location,
        required: obj.get("required").and_then(Value::as_bool).unwrap_or(false),
        field_type,
        description: non_blank(obj.get("description")),
        default,
    }))
}

fn parse_request_body(
    resolver: &RefResolver,
    doc: &DocId,
    node: &Value,
    location: &str,
) -> Result<Option<RequestBody>> {
    let (body_doc, node) = resolver.resolve(doc, node, location)?;
    let Some(obj) = node.as_object() else {
        return Err(LoadError::parse(location, "requestBody must be an object"));
    };
    let required = obj.get("required").and_then(Value::as_bool).unwrap_or(false);

    let Some(content) = obj.get("content").and_then(Value::as_object) else {
        tracing::warn!("requestBody at '{location}' has no content; ignoring it");
        return Ok(None);
    };

    let media_type = content
        .keys()
        .find(|k| k.eq_ignore_ascii_case("application/json"))
        .or_else(|| content.keys().find(|k| is_json_media_type(k)))
        .or_else(|| content.keys().next());
    let Some(media_type) = media_type.cloned() else {
        tracing::warn!("requestBody at '{location}' has empty content; ignoring it");
        return Ok(None);
    };

    if !is_json_media_type(&media_type) {
        return Ok(Some(RequestBody {
            media_type,
            required,
            shape: BodyShape::Opaque,
        }));
    }

    let media_loc = format!("{location}/content/{}", escape_pointer(&media_type));
    let schema_loc = format!("{media_loc}/schema");
    let Some(schema) = content.get(&media_type).and_then(|m| m.get("schema")) else {
        return Ok(Some(RequestBody {
            media_type,
            required,
            shape: BodyShape::Whole(FieldType::Object),
        }));
    };

    let (schema_doc, schema) = resolver.resolve(&body_doc, schema, &schema_loc)?;
    let shape = match schema.get("properties").and_then(Value::as_object) {
        Some(properties) if is_object_schema(&schema) => {
            let required_names: HashSet<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            let mut fields = Vec::with_capacity(properties.len());
            for (name, prop) in properties {
                let prop_loc = format!("{schema_loc}/properties/{}", escape_pointer(name));
                let (prop_doc, prop) = resolver.resolve(&schema_doc, prop, &prop_loc)?;
                fields.push(SchemaField {
                    name: name.clone(),
                    field_type: field_type(resolver, &prop_doc, &prop, &prop_loc, 0)?,
                    required: required_names.contains(name.as_str()),
                    description: non_blank(prop.get("description")),
                    default: prop.get("default").cloned(),
                });
            }
            BodyShape::Fields(fields)
        }
        _ => BodyShape::Whole(field_type(resolver, &schema_doc, &schema, &schema_loc, 0)?),
    };

    Ok(Some(RequestBody {
        media_type,
        required,
        shape,
    }))
}

fn is_object_schema(schema: &Value) -> bool {
    match declared_type(schema) {
        Some(t) => t == "object",
        None => true,
    }
}

/// `application/json`, `text/json`, or any `+json` structured syntax suffix.
fn is_json_media_type(media_type: &str) -> bool {
    match media_type.parse::<mime::Mime>() {
        Ok(m) => m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON),
        Err(_) => media_type.to_ascii_lowercase().contains("json"),
    }
}

/// `type` as a single string. 3.1 type arrays yield their first non-`null` entry.
fn declared_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(s) => Some(s.as_str()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    }
}

/// Map a (resolved) schema node to a [`FieldType`]. Unknown or absent types are strings.
fn field_type(
    resolver: &RefResolver,
    doc: &DocId,
    schema: &Value,
    location: &str,
    depth: usize,
) -> Result<FieldType> {
    if !schema.is_object() {
        return Ok(FieldType::String);
    }

    let ty = match declared_type(schema) {
        Some(t) => t,
        None if schema.get("properties").is_some() => "object",
        None if schema.get("items").is_some() => "array",
        None => "string",
    };

    Ok(match ty {
        "integer" => FieldType::Integer,
        "number" => FieldType::Number,
        "boolean" => FieldType::Boolean,
        "object" => FieldType::Object,
        "array" => {
            let items = match schema.get("items") {
                Some(items) if depth < MAX_SCHEMA_DEPTH => {
                    let items_loc = format!("{location}/items");
                    let (items_doc, items) = resolver.resolve(doc, items, &items_loc)?;
                    Some(Box::new(field_type(
                        resolver,
                        &items_doc,
                        &items,
                        &items_loc,
                        depth + 1,
                    )?))
                }
                _ => None,
            };
            FieldType::Array(items)
        }
        _ => FieldType::String,
    })
}

/// Generate a canonical tool name from method and path (`get_pet_petId`).
fn generate_canonical_name(method: &str, path: &str) -> String {
    let name = format!("{}_{}", method.to_lowercase(), path);
    let name = PLACEHOLDER_RE.replace_all(&name, "_$1");
    let name = NON_ALNUM_RE.replace_all(&name, "_");
    let mut name = name.trim_matches('_').to_string();
    if name.len() > MAX_TOOL_NAME_LEN {
        name.truncate(MAX_TOOL_NAME_LEN);
        name = name.trim_end_matches('_').to_string();
    }
    name
}

fn reserve_unique_tool_name(tool_names: &mut HashSet<String>, base: &str) -> String {
    let base = base.to_string();
    if tool_names.insert(base.clone()) {
        return base;
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if tool_names.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
