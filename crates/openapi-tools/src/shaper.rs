//! Response shaper: executor result → uniform [`ResponseEnvelope`].
//!
//! The envelope always carries `success` and a one-sentence `context`. A successful result puts
//! its payload under a key picked from the tool name; a failed one carries `error` instead.

use crate::error::InvocationError;
use crate::executor::ExecutionResult;
use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::{Map, Value};

/// Payload key used when no keyword matches the tool name.
pub const DEFAULT_PAYLOAD_KEY: &str = "data";

/// Tool-name keyword → payload key, checked in order.
const PAYLOAD_KEYS: [(&str, &str); 8] = [
    ("menu", "menu"),
    ("order", "order"),
    ("track", "order"),
    ("pet", "pet"),
    ("weather", "weather"),
    ("forecast", "weather"),
    ("product", "products"),
    ("cart", "cart"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

impl From<&InvocationError> for ErrorDetail {
    fn from(e: &InvocationError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub context: String,
    payload: Option<(String, Value)>,
    error: Option<ErrorDetail>,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn ok(key: impl Into<String>, payload: Value, context: String) -> Self {
        Self {
            success: true,
            context,
            payload: Some((key.into(), payload)),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: ErrorDetail, context: String) -> Self {
        Self {
            success: false,
            context,
            payload: None,
            error: Some(error),
        }
    }

    /// `(key, payload)` of a successful envelope.
    #[must_use]
    pub fn payload(&self) -> Option<(&str, &Value)> {
        self.payload.as_ref().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn error(&self) -> Option<&ErrorDetail> {
        self.error.as_ref()
    }

    /// Flat JSON form: `{success, context, <key>: payload}` or `{success, context, error}`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "success": self.success, "context": self.context })
        })
    }

    /// MCP tool result: JSON text plus structured content; `isError` mirrors `!success`.
    #[must_use]
    pub fn to_call_tool_result(&self) -> CallToolResult {
        let value = self.to_value();
        let text = serde_json::to_string(&value).unwrap_or_else(|_| value.to_string());
        CallToolResult {
            content: vec![Content::text(text)],
            structured_content: Some(value),
            is_error: Some(!self.success),
            meta: None,
        }
    }
}

impl Serialize for ResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("success", &self.success)?;
        map.serialize_entry("context", &self.context)?;
        if let Some((key, payload)) = &self.payload {
            map.serialize_entry(key, payload)?;
        }
        if let Some(error) = &self.error {
            map.serialize_entry("error", error)?;
        }
        map.end()
    }
}

/// Payload key for a tool, from keywords in its name.
#[must_use]
pub fn payload_key(tool_name: &str) -> &'static str {
    let lower = tool_name.to_ascii_lowercase();
    PAYLOAD_KEYS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map_or(DEFAULT_PAYLOAD_KEY, |(_, key)| *key)
}

/// Wrap an executor result.
#[must_use]
pub fn shape(tool_name: &str, result: ExecutionResult) -> ResponseEnvelope {
    match result {
        Ok(output) => {
            let key = payload_key(tool_name);
            let context = success_context(tool_name, key, &output.payload);
            ResponseEnvelope::ok(key, output.payload, context)
        }
        Err(e) => failure(tool_name, &e),
    }
}

/// Envelope for an error raised before or during execution.
#[must_use]
pub fn failure(tool_name: &str, error: &InvocationError) -> ResponseEnvelope {
    ResponseEnvelope::failed(error.into(), failure_context(tool_name, error))
}

fn failure_context(tool: &str, error: &InvocationError) -> String {
    match error {
        InvocationError::UnknownTool(name) => format!("No tool named '{name}' is available."),
        InvocationError::MissingArgument(field) => {
            format!("The call to {tool} is missing the required argument '{field}'.")
        }
        InvocationError::TypeMismatch {
            field, expected, ..
        } => format!("Argument '{field}' for {tool} must be {expected}."),
        InvocationError::UnknownArgument(field) => {
            format!("{tool} does not accept an argument named '{field}'.")
        }
        InvocationError::Upstream { status, .. } => {
            format!("The API rejected the {tool} call with status {status}.")
        }
        InvocationError::Network(_) => {
            format!("The API could not be reached while calling {tool}.")
        }
    }
}

fn success_context(tool: &str, key: &str, payload: &Value) -> String {
    match payload {
        Value::Object(obj) => object_context(tool, key, obj),
        Value::Array(items) => format!("{tool} returned {} {}.", items.len(), noun(key, items.len())),
        _ => format!("Completed {tool}."),
    }
}

fn object_context(tool: &str, key: &str, obj: &Map<String, Value>) -> String {
    let text = |k: &str| obj.get(k).map(display_scalar);

    if let (Some(id), Some(total)) = (text("order_id"), obj.get("total_price").and_then(Value::as_f64)) {
        let item = text("pizza").or_else(|| text("item")).unwrap_or_else(|| "item".to_string());
        match obj.get("status").and_then(Value::as_str) {
            Some("unavailable") => {
                return format!("Order {id} could not be fulfilled: {item} is not on the menu.");
            }
            Some("invalid_quantity") => {
                let quantity = text("quantity").unwrap_or_else(|| "null".to_string());
                return format!(
                    "Order {id} could not be placed: quantity {quantity} is not a positive \
                     whole number."
                );
            }
            _ => {}
        }
        let quantity = text("quantity").unwrap_or_else(|| "1".to_string());
        let size = text("size").map(|s| format!("{s} ")).unwrap_or_default();
        return format!("Order {id} confirmed: {quantity} x {size}{item}, total ${total:.2}.");
    }

    if let (Some(id), Some(status)) = (text("order_id"), obj.get("status").and_then(Value::as_str)) {
        return format!("Order {id} is {}.", status.replace('_', " "));
    }

    if let (Some(location), Some(current)) = (text("location"), obj.get("current")) {
        let temperature = current.get("temperature").map(display_scalar);
        let description = current.get("description").map(display_scalar);
        let units = text("units").unwrap_or_else(|| "metric".to_string());
        return match (description, temperature) {
            (Some(d), Some(t)) => format!("Current weather in {location}: {d}, {t} degrees ({units})."),
            _ => format!("Current weather in {location}."),
        };
    }

    if let (Some(cart), Some(count)) = (text("cart_id"), text("total_items")) {
        return format!("Cart {cart} now holds {count} item(s).");
    }

    if let Some(total) = obj.get("total").and_then(Value::as_u64) {
        let count = usize::try_from(total).unwrap_or(usize::MAX);
        let field = obj
            .iter()
            .find(|(_, v)| v.is_array())
            .map(|(k, _)| k.as_str());
        let noun = match (key, field) {
            (DEFAULT_PAYLOAD_KEY, Some(field)) => field,
            _ => noun(key, count),
        };
        return format!("Found {total} {noun}.");
    }

    let id = text("id").or_else(|| text("order_id")).or_else(|| text("cart_id"));
    match (id, text("name")) {
        (Some(id), Some(name)) => format!("Completed {tool}: {name} (id {id})."),
        (Some(id), None) => format!("Completed {tool} (id {id})."),
        (None, Some(name)) => format!("Completed {tool}: {name}."),
        (None, None) => format!("Completed {tool}."),
    }
}

fn noun(key: &str, count: usize) -> &'static str {
    let plural = count != 1;
    match (key, plural) {
        ("menu", true) => "pizzas",
        ("menu", false) => "pizza",
        ("pet", true) => "pets",
        ("pet", false) => "pet",
        ("products", true) => "products",
        ("products", false) => "product",
        ("order", true) => "orders",
        ("order", false) => "order",
        (_, true) => "items",
        (_, false) => "item",
    }
}

fn display_scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutionMode, ExecutionOutput};
    use serde_json::json;

    fn ok(payload: Value) -> ExecutionResult {
        Ok(ExecutionOutput {
            status: 200,
            payload,
            mode: ExecutionMode::Mock,
        })
    }

    #[test]
    fn payload_keys_follow_tool_name_keywords() {
        assert_eq!(payload_key("getMenu"), "menu");
        assert_eq!(payload_key("placeOrder"), "order");
        assert_eq!(payload_key("trackDelivery"), "order");
        assert_eq!(payload_key("findPetsByStatus"), "pet");
        assert_eq!(payload_key("get_forecast"), "weather");
        assert_eq!(payload_key("listProducts"), "products");
        assert_eq!(payload_key("addToCart"), "cart");
        assert_eq!(payload_key("deleteUser"), "data");
    }

    #[test]
    fn order_confirmation_context() {
        let env = shape(
            "placeOrder",
            ok(json!({
                "order_id": "ORD-1000",
                "pizza": "Pepperoni",
                "size": "large",
                "quantity": 2,
                "total_price": 31.98,
                "status": "confirmed",
            })),
        );
        assert!(env.success);
        assert_eq!(
            env.context,
            "Order ORD-1000 confirmed: 2 x large Pepperoni, total $31.98."
        );
        let value = env.to_value();
        assert_eq!(value["order"]["total_price"], json!(31.98));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn rejected_quantity_context() {
        let env = shape(
            "placeOrder",
            ok(json!({
                "order_id": "ORD-1001",
                "pizza": "Pepperoni",
                "quantity": -2,
                "total_price": 0.0,
                "status": "invalid_quantity",
            })),
        );
        assert_eq!(
            env.context,
            "Order ORD-1001 could not be placed: quantity -2 is not a positive whole number."
        );
    }

    #[test]
    fn collection_and_identifier_contexts() {
        let env = shape("getMenu", ok(json!({ "pizzas": [1, 2, 3], "total": 3 })));
        assert_eq!(env.context, "Found 3 pizzas.");

        let env = shape("findPetsByStatus", ok(json!([{ "id": 1 }, { "id": 2 }])));
        assert_eq!(env.context, "findPetsByStatus returned 2 pets.");

        let env = shape("getOrder", ok(json!({ "order_id": "ORD-7", "status": "out_for_delivery" })));
        assert_eq!(env.context, "Order ORD-7 is out for delivery.");

        let env = shape("getPetById", ok(json!({ "id": 9, "name": "Pet_9" })));
        assert_eq!(env.context, "Completed getPetById: Pet_9 (id 9).");

        let env = shape("addToCart", ok(json!({ "cart_id": "cart_1", "items": [], "total_items": 3 })));
        assert_eq!(env.context, "Cart cart_1 now holds 3 item(s).");

        let env = shape("addPet", ok(json!({ "id": 100, "name": "Rex", "photoUrls": [] })));
        assert_eq!(env.context, "Completed addPet: Rex (id 100).");

        let env = shape("search", ok(json!({ "results": [1, 2], "total": 2 })));
        assert_eq!(env.context, "Found 2 results.");

        let env = shape("deleteUser", ok(Value::Null));
        assert_eq!(env.context, "Completed deleteUser.");
        assert_eq!(env.payload(), Some(("data", &Value::Null)));

        let env = shape(
            "getWeather",
            ok(json!({
                "location": "Paris",
                "units": "metric",
                "current": { "temperature": 21, "description": "Sunny" },
            })),
        );
        assert_eq!(env.context, "Current weather in Paris: Sunny, 21 degrees (metric).");
    }

    #[test]
    fn failures_carry_kind_and_plain_context() {
        let env = shape(
            "placeOrder",
            Err(InvocationError::MissingArgument("pizza".to_string())),
        );
        assert!(!env.success);
        assert!(env.payload().is_none());
        let error = env.error().unwrap();
        assert_eq!(error.kind, "MissingArgumentError");
        assert!(error.message.contains("pizza"));
        assert!(env.context.contains("'pizza'"));

        let value = env.to_value();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"]["kind"], "MissingArgumentError");
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn every_error_kind_gets_a_context() {
        let errors = [
            InvocationError::UnknownTool("nope".into()),
            InvocationError::MissingArgument("a".into()),
            InvocationError::TypeMismatch {
                field: "a".into(),
                expected: "integer".into(),
                received: json!("x"),
            },
            InvocationError::UnknownArgument("a".into()),
            InvocationError::Upstream {
                status: 500,
                body: json!({}),
            },
            InvocationError::Network("refused".into()),
        ];
        for e in &errors {
            let env = failure("tool", e);
            assert!(!env.context.is_empty());
            assert_eq!(env.error().unwrap().kind, e.kind());
        }
    }

    #[test]
    fn call_tool_result_mirrors_success() {
        let env = shape("getMenu", ok(json!({ "pizzas": [], "total": 0 })));
        let result = env.to_call_tool_result();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.structured_content, Some(env.to_value()));

        let env = failure("x", &InvocationError::UnknownTool("x".into()));
        assert_eq!(env.to_call_tool_result().is_error, Some(true));
    }
}
