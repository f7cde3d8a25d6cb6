//! Mock executor: deterministic fake responses without network access.
//!
//! Generators are looked up through a [`MockRegistry`] keyed on the lower-cased operation name
//! and path. The first matching route wins; unmatched operations fall back to an echo of the
//! bound arguments. Identifiers come from an injected [`SequenceGenerator`], and everything
//! else a generator derives is a pure function of its input.

use super::domains;
use super::{ExecutionMode, ExecutionOutput, ExecutionResult, Executor};
use crate::binder::{BoundRequest, value_to_string};
use crate::model::{HttpMethod, Operation};
use async_trait::async_trait;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of mock identifiers. Implementations must never hand out the same id twice.
pub trait SequenceGenerator: Send + Sync {
    fn next_id(&self) -> u64;
}

/// Process-wide counter backed by an [`AtomicU64`].
#[derive(Debug)]
pub struct AtomicSequence {
    next: AtomicU64,
}

impl AtomicSequence {
    pub const DEFAULT_START: u64 = 1000;

    #[must_use]
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl Default for AtomicSequence {
    fn default() -> Self {
        Self::starting_at(Self::DEFAULT_START)
    }
}

impl SequenceGenerator for AtomicSequence {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Everything a generator may look at for one invocation.
pub struct MockContext<'a> {
    pub operation: &'a Operation,
    pub request: &'a BoundRequest,
    sequence: &'a dyn SequenceGenerator,
}

impl<'a> MockContext<'a> {
    #[must_use]
    pub fn new(
        operation: &'a Operation,
        request: &'a BoundRequest,
        sequence: &'a dyn SequenceGenerator,
    ) -> Self {
        Self {
            operation,
            request,
            sequence,
        }
    }

    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.sequence.next_id()
    }

    /// First argument present under any of `names`.
    #[must_use]
    pub fn arg(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .find_map(|n| self.request.arguments.get(*n))
            .filter(|v| !v.is_null())
    }

    /// Scalar argument rendered as a string.
    #[must_use]
    pub fn str_arg(&self, names: &[&str]) -> Option<String> {
        self.arg(names)
            .filter(|v| !v.is_array() && !v.is_object())
            .map(value_to_string)
    }

    #[must_use]
    pub fn u64_arg(&self, names: &[&str]) -> Option<u64> {
        match self.arg(names)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.operation.method
    }
}

/// Produces a payload for one family of operations.
pub trait MockGenerator: Send + Sync {
    fn generate(&self, ctx: &MockContext<'_>) -> Value;
}

impl<F> MockGenerator for F
where
    F: Fn(&MockContext<'_>) -> Value + Send + Sync,
{
    fn generate(&self, ctx: &MockContext<'_>) -> Value {
        self(ctx)
    }
}

/// Match rule: every keyword must occur in the operation key; `methods` (when non-empty)
/// restricts the HTTP method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockRoute {
    keywords: Vec<String>,
    methods: Vec<HttpMethod>,
}

impl MockRoute {
    #[must_use]
    pub fn keywords(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_ascii_lowercase()).collect(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn methods(mut self, methods: &[HttpMethod]) -> Self {
        self.methods = methods.to_vec();
        self
    }

    #[must_use]
    pub fn matches(&self, key: &str, method: HttpMethod) -> bool {
        (self.methods.is_empty() || self.methods.contains(&method))
            && self.keywords.iter().all(|k| key.contains(k.as_str()))
    }
}

/// Normalized lookup key for an operation: `"<name> <path>"`, lower-cased.
#[must_use]
pub fn operation_key(op: &Operation) -> String {
    format!("{} {}", op.name, op.path).to_ascii_lowercase()
}

struct RegisteredGenerator {
    label: &'static str,
    route: MockRoute,
    generator: Arc<dyn MockGenerator>,
}

/// Ordered (route → generator) table with an echo fallback.
pub struct MockRegistry {
    entries: Vec<RegisteredGenerator>,
    fallback: Arc<dyn MockGenerator>,
}

impl fmt::Debug for MockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRegistry")
            .field(
                "routes",
                &self.entries.iter().map(|e| e.label).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl MockRegistry {
    /// Registry with no routes; everything echoes.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            fallback: Arc::new(echo),
        }
    }

    /// Registry preloaded with the built-in domain generators.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        domains::register_builtin(&mut registry);
        registry
    }

    /// Append a route. Earlier registrations take precedence.
    pub fn register(
        &mut self,
        label: &'static str,
        route: MockRoute,
        generator: impl MockGenerator + 'static,
    ) -> &mut Self {
        self.entries.push(RegisteredGenerator {
            label,
            route,
            generator: Arc::new(generator),
        });
        self
    }

    /// Label of the route that handles `op`, or `"echo"`.
    #[must_use]
    pub fn route_for(&self, op: &Operation) -> &'static str {
        self.lookup(op).map_or("echo", |e| e.label)
    }

    fn lookup(&self, op: &Operation) -> Option<&RegisteredGenerator> {
        let key = operation_key(op);
        self.entries
            .iter()
            .find(|e| e.route.matches(&key, op.method))
    }

    fn generator_for(&self, op: &Operation) -> &dyn MockGenerator {
        self.lookup(op)
            .map_or(self.fallback.as_ref(), |e| e.generator.as_ref())
    }
}

/// Default generator: echoes the coerced arguments with a placeholder id.
fn echo(ctx: &MockContext<'_>) -> Value {
    json!({
        "id": format!("mock-{}", ctx.next_id()),
        "message": "Operation successful",
        "operation": ctx.operation.name,
        "data": Value::Object(ctx.request.arguments.clone()),
    })
}

pub struct MockExecutor {
    registry: MockRegistry,
    sequence: Arc<dyn SequenceGenerator>,
}

impl fmt::Debug for MockExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockExecutor")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new(
            MockRegistry::with_builtin(),
            Arc::new(AtomicSequence::default()),
        )
    }
}

impl MockExecutor {
    #[must_use]
    pub fn new(registry: MockRegistry, sequence: Arc<dyn SequenceGenerator>) -> Self {
        Self { registry, sequence }
    }

    /// Built-in generators with a caller-supplied id sequence.
    #[must_use]
    pub fn with_sequence(sequence: Arc<dyn SequenceGenerator>) -> Self {
        Self::new(MockRegistry::with_builtin(), sequence)
    }

    #[must_use]
    pub fn registry(&self) -> &MockRegistry {
        &self.registry
    }
}

#[async_trait]
impl Executor for MockExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Mock
    }

    async fn execute(&self, operation: &Operation, request: &BoundRequest) -> ExecutionResult {
        tracing::debug!(
            tool = %operation.name,
            route = self.registry.route_for(operation),
            "Generating mock response"
        );
        let ctx = MockContext::new(operation, request, self.sequence.as_ref());
        let payload = self.registry.generator_for(operation).generate(&ctx);
        Ok(ExecutionOutput {
            status: 200,
            payload,
            mode: ExecutionMode::Mock,
        })
    }
}

/// Stable pseudo-random bucket in `0..buckets` derived from SHA-256 of `seed`.
#[must_use]
pub fn stable_bucket(seed: &str, buckets: u64) -> u64 {
    if buckets == 0 {
        return 0;
    }
    let digest = Sha256::digest(seed.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % buckets
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::ParamLocation;
    use serde_json::Map;
    use std::sync::Mutex;

    /// Deterministic sequence for tests.
    #[derive(Debug, Default)]
    pub(crate) struct FixedSequence {
        pub(crate) ids: Mutex<Vec<u64>>,
    }

    impl FixedSequence {
        pub(crate) fn new(ids: &[u64]) -> Self {
            let mut ids = ids.to_vec();
            ids.reverse();
            Self {
                ids: Mutex::new(ids),
            }
        }
    }

    impl SequenceGenerator for FixedSequence {
        fn next_id(&self) -> u64 {
            self.ids.lock().unwrap().pop().unwrap_or(0)
        }
    }

    pub(crate) fn operation(name: &str, method: HttpMethod, path: &str) -> Operation {
        Operation {
            name: name.to_string(),
            operation_id: Some(name.to_string()),
            method,
            path: path.to_string(),
            parameters: Vec::new(),
            request_body: None,
            summary: None,
            description: None,
            deprecated: false,
            tags: Vec::new(),
        }
    }

    pub(crate) fn request(op: &Operation, arguments: Value) -> BoundRequest {
        let arguments: Map<String, Value> = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        BoundRequest {
            method: op.method,
            resolved_path: op.path.clone(),
            query_params: Vec::new(),
            headers: Default::default(),
            body: None,
            body_media_type: None,
            arguments,
        }
    }

    #[test]
    fn atomic_sequence_is_monotonic_across_threads() {
        let seq = Arc::new(AtomicSequence::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || (0..100).map(|_| seq.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(all[0], 1000);
        assert_eq!(all[799], 1799);
    }

    #[test]
    fn routes_match_on_keywords_and_method() {
        let route = MockRoute::keywords(&["order"]).methods(&[HttpMethod::Post]);
        assert!(route.matches("placeorder /orders", HttpMethod::Post));
        assert!(!route.matches("placeorder /orders", HttpMethod::Get));
        assert!(!route.matches("getmenu /menu", HttpMethod::Post));

        let route = MockRoute::keywords(&["pet", "status"]);
        assert!(route.matches("findpetsbystatus /pet/findbystatus", HttpMethod::Get));
        assert!(!route.matches("getpetbyid /pet/{petid}", HttpMethod::Get));
    }

    #[test]
    fn builtin_routes_are_selected_in_order() {
        let registry = MockRegistry::with_builtin();
        let cases = [
            ("getMenu", HttpMethod::Get, "/menu", "menu"),
            ("placeOrder", HttpMethod::Post, "/orders", "order"),
            ("getOrder", HttpMethod::Get, "/orders/{orderId}", "track"),
            ("trackDelivery", HttpMethod::Get, "/delivery/{id}", "track"),
            ("addPet", HttpMethod::Post, "/pet", "pet_add"),
            ("findPetsByStatus", HttpMethod::Get, "/pet/findByStatus", "pet_status"),
            ("getPetById", HttpMethod::Get, "/pet/{petId}", "pet_get"),
            ("getForecast", HttpMethod::Get, "/forecast", "weather"),
            ("listProducts", HttpMethod::Get, "/products", "products"),
            ("addToCart", HttpMethod::Post, "/cart/items", "cart"),
            ("deleteUser", HttpMethod::Delete, "/users/{id}", "echo"),
        ];
        for (name, method, path, expected) in cases {
            assert_eq!(
                registry.route_for(&operation(name, method, path)),
                expected,
                "{name}"
            );
        }
    }

    #[tokio::test]
    async fn custom_routes_take_precedence_in_registration_order() {
        let mut registry = MockRegistry::empty();
        registry
            .register("first", MockRoute::keywords(&["user"]), |_: &MockContext<'_>| {
                json!({ "from": "first" })
            })
            .register("second", MockRoute::keywords(&["user"]), |_: &MockContext<'_>| {
                json!({ "from": "second" })
            });
        let executor = MockExecutor::new(registry, Arc::new(FixedSequence::new(&[])));

        let op = operation("getUser", HttpMethod::Get, "/users/{id}");
        let out = executor.execute(&op, &request(&op, json!({}))).await.unwrap();
        assert_eq!(out.payload, json!({ "from": "first" }));
        assert_eq!(out.mode, ExecutionMode::Mock);
        assert_eq!(out.status, 200);
    }

    #[tokio::test]
    async fn echo_fallback_uses_injected_sequence() {
        let executor = MockExecutor::with_sequence(Arc::new(FixedSequence::new(&[7, 8])));
        let mut op = operation("deleteUser", HttpMethod::Delete, "/users/{id}");
        op.parameters.push(crate::model::Parameter {
            name: "id".to_string(),
            location: ParamLocation::Path,
            required: true,
            field_type: crate::model::FieldType::String,
            description: None,
            default: None,
        });

        let req = request(&op, json!({ "id": "u-1" }));
        let first = executor.execute(&op, &req).await.unwrap().payload;
        let second = executor.execute(&op, &req).await.unwrap().payload;
        assert_eq!(
            first,
            json!({
                "id": "mock-7",
                "message": "Operation successful",
                "operation": "deleteUser",
                "data": { "id": "u-1" },
            })
        );
        assert_eq!(second["id"], "mock-8");
    }

    #[test]
    fn stable_bucket_is_deterministic_and_bounded() {
        for seed in ["a", "ORD-1000", "Paris"] {
            let b = stable_bucket(seed, 5);
            assert!(b < 5);
            assert_eq!(b, stable_bucket(seed, 5));
        }
        assert_eq!(stable_bucket("x", 0), 0);
    }
}
