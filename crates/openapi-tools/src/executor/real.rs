//! Real executor: performs the bound request against the upstream API with reqwest.

use super::{ExecutionMode, ExecutionOutput, ExecutionResult, Executor};
use crate::binder::BoundRequest;
use crate::config::AuthConfig;
use crate::error::{InvocationError, LoadError};
use crate::model::Operation;
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct RealExecutor {
    client: Client,
    base_url: Url,
    default_headers: BTreeMap<String, String>,
    auth: AuthConfig,
    timeout: Duration,
}

impl RealExecutor {
    /// # Errors
    ///
    /// Returns [`LoadError::Config`] if `base_url` is not an absolute http(s) URL or the HTTP
    /// client cannot be built.
    pub fn new(
        base_url: &str,
        default_headers: BTreeMap<String, String>,
        auth: AuthConfig,
        timeout: Duration,
    ) -> Result<Self, LoadError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| LoadError::Config(format!("Invalid base URL '{base_url}': {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(LoadError::Config(format!(
                "Invalid base URL '{base_url}': must be an absolute http(s) URL"
            )));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| LoadError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: parsed,
            default_headers,
            auth,
            timeout,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_url(
        &self,
        path: &str,
        query_params: &[(String, String)],
    ) -> Result<Url, InvocationError> {
        let url = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        let mut url = Url::parse(&url)
            .map_err(|e| InvocationError::Network(format!("Invalid request URL: {e}")))?;

        let auth_pair = match &self.auth {
            AuthConfig::Query { name, value } => Some((name.as_str(), value.as_str())),
            _ => None,
        };
        if !query_params.is_empty() || auth_pair.is_some() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query_params {
                pairs.append_pair(k, v);
            }
            if let Some((k, v)) = auth_pair {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Default headers, then auth, then bound headers. A later layer replaces an earlier
    /// value for the same (case-insensitive) name.
    fn merged_headers(
        &self,
        bound: &BTreeMap<String, String>,
    ) -> Result<HeaderMap, InvocationError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.default_headers {
            insert_header(&mut headers, name, value, false)?;
        }
        match &self.auth {
            AuthConfig::Bearer { token } => {
                let value = format!("Bearer {token}");
                insert_header(&mut headers, AUTHORIZATION.as_str(), &value, true)?;
            }
            AuthConfig::Header { name, value } => insert_header(&mut headers, name, value, true)?,
            AuthConfig::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                let value = format!("Basic {encoded}");
                insert_header(&mut headers, AUTHORIZATION.as_str(), &value, true)?;
            }
            // Query auth is applied during URL building.
            AuthConfig::Query { .. } | AuthConfig::None => {}
        }
        for (name, value) in bound {
            insert_header(&mut headers, name, value, false)?;
        }
        Ok(headers)
    }

    fn apply_body(
        request: reqwest::RequestBuilder,
        mut headers: HeaderMap,
        body: Option<&Value>,
        media_type: Option<&str>,
    ) -> Result<reqwest::RequestBuilder, InvocationError> {
        let Some(body) = body else {
            return Ok(request.headers(headers));
        };
        match (body, media_type) {
            (Value::String(raw), Some(mt)) if !is_json_like(mt) => {
                insert_header(&mut headers, CONTENT_TYPE.as_str(), mt, false)?;
                Ok(request.headers(headers).body(raw.clone()))
            }
            (_, Some(mt)) if mt != "application/json" => {
                insert_header(&mut headers, CONTENT_TYPE.as_str(), mt, false)?;
                Ok(request.headers(headers).body(body.to_string()))
            }
            _ => Ok(request.headers(headers).json(body)),
        }
    }
}

fn insert_header(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    sensitive: bool,
) -> Result<(), InvocationError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| InvocationError::Network(format!("Invalid header name '{name}': {e}")))?;
    let mut header_value = HeaderValue::from_str(value).map_err(|e| {
        InvocationError::Network(format!("Invalid value for header '{name}': {e}"))
    })?;
    header_value.set_sensitive(sensitive);
    headers.insert(header_name, header_value);
    Ok(())
}

fn is_json_like(media_type: &str) -> bool {
    media_type
        .parse::<mime::Mime>()
        .is_ok_and(|m| m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON))
}

#[async_trait]
impl Executor for RealExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Real
    }

    async fn execute(&self, operation: &Operation, request: &BoundRequest) -> ExecutionResult {
        let url = self.build_url(&request.resolved_path, &request.query_params)?;
        tracing::debug!(
            tool = %operation.name,
            method = %request.method,
            url = %redact_url(&url),
            "Calling upstream API"
        );

        let headers = self.merged_headers(&request.headers)?;
        let builder = Self::apply_body(
            self.client
                .request(request.method.to_reqwest(), url)
                .timeout(self.timeout),
            headers,
            request.body.as_ref(),
            request.body_media_type.as_deref(),
        )?;

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                InvocationError::Network(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs()
                ))
            } else {
                InvocationError::Network(sanitize_reqwest_error(&e))
            }
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| InvocationError::Network(sanitize_reqwest_error(&e)))?;
        let body = decode_body(&bytes, content_type.as_deref());

        if !status.is_success() {
            tracing::debug!(tool = %operation.name, status = status.as_u16(), "Upstream returned an error");
            return Err(InvocationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let payload = match body {
            Value::String(text) => json!({ "text": text }),
            other => other,
        };
        Ok(ExecutionOutput {
            status: status.as_u16(),
            payload,
            mode: ExecutionMode::Real,
        })
    }
}

/// JSON when the bytes parse as JSON, a string for other UTF-8 text, a base64 object for
/// binary, `null` for an empty body.
fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())),
        Err(_) => json!({
            "encoding": "base64",
            "mimeType": content_type,
            "data": base64::engine::general_purpose::STANDARD.encode(bytes),
        }),
    }
}

/// URL without credentials, query or fragment.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::mock::tests::operation;
    use crate::model::HttpMethod;
    use axum::Json;
    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::{Path, RawQuery};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{any, get};
    use serde_json::Map;

    async fn echo(
        method: axum::http::Method,
        RawQuery(query): RawQuery,
        headers: HeaderMap,
        body: Bytes,
    ) -> Json<Value> {
        let headers: Map<String, Value> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or_default())))
            .collect();
        Json(json!({
            "method": method.as_str(),
            "query": query,
            "headers": headers,
            "body": String::from_utf8_lossy(&body),
        }))
    }

    /// Every value received per header name.
    async fn header_lists(headers: HeaderMap) -> Json<Value> {
        let lists: Map<String, Value> = headers
            .keys()
            .map(|name| {
                let values: Vec<Value> = headers
                    .get_all(name)
                    .iter()
                    .map(|v| json!(v.to_str().unwrap_or_default()))
                    .collect();
                (name.to_string(), Value::Array(values))
            })
            .collect();
        Json(Value::Object(lists))
    }

    async fn spawn_server() -> (String, tokio::sync::oneshot::Sender<()>) {
        let app = Router::new()
            .route("/echo/{id}", any(echo))
            .route(
                "/missing",
                get(|| async { (StatusCode::NOT_FOUND, Json(json!({ "error": "nope" }))) }),
            )
            .route("/headers", get(header_lists))
            .route("/plain", get(|| async { "hello" }))
            .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
            .route("/binary", get(|| async { vec![0xffu8, 0xfe, 0x00] }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .route("/path/{value}", get(|Path(value): Path<String>| async move { Json(json!({ "value": value })) }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });
        (format!("http://{addr}"), tx)
    }

    fn bound(method: HttpMethod, path: &str) -> BoundRequest {
        BoundRequest {
            method,
            resolved_path: path.to_string(),
            query_params: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
            body_media_type: None,
            arguments: Map::new(),
        }
    }

    fn executor(base: &str, auth: AuthConfig) -> RealExecutor {
        let mut defaults = BTreeMap::new();
        defaults.insert("x-default".to_string(), "d".to_string());
        RealExecutor::new(base, defaults, auth, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn sends_path_query_headers_and_json_body() {
        let (base, shutdown) = spawn_server().await;
        let exec = executor(&base, AuthConfig::Bearer { token: "tok".into() });

        let mut req = bound(HttpMethod::Post, "/echo/42");
        req.query_params = vec![
            ("tag".to_string(), "a b".to_string()),
            ("tag".to_string(), "c&d".to_string()),
        ];
        req.headers.insert("x-trace".to_string(), "t-1".to_string());
        req.body = Some(json!({ "quantity": 2 }));
        req.body_media_type = Some("application/json".to_string());

        let op = operation("echo", HttpMethod::Post, "/echo/{id}");
        let out = exec.execute(&op, &req).await.unwrap();
        assert_eq!(out.status, 200);
        assert_eq!(out.mode, ExecutionMode::Real);
        assert_eq!(out.payload["method"], "POST");
        assert_eq!(out.payload["query"], "tag=a+b&tag=c%26d");
        assert_eq!(out.payload["headers"]["x-trace"], "t-1");
        assert_eq!(out.payload["headers"]["x-default"], "d");
        assert_eq!(out.payload["headers"]["authorization"], "Bearer tok");
        assert_eq!(out.payload["headers"]["content-type"], "application/json");
        assert_eq!(out.payload["body"], r#"{"quantity":2}"#);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn header_layers_merge_with_later_layers_winning() {
        let (base, shutdown) = spawn_server().await;
        let mut defaults = BTreeMap::new();
        defaults.insert("X-Client".to_string(), "default".to_string());
        defaults.insert("Authorization".to_string(), "Token default".to_string());
        defaults.insert("x-keep".to_string(), "kept".to_string());
        let exec = RealExecutor::new(
            &base,
            defaults,
            AuthConfig::Bearer { token: "tok".into() },
            Duration::from_secs(2),
        )
        .unwrap();

        let mut req = bound(HttpMethod::Get, "/headers");
        req.headers.insert("x-client".to_string(), "bound".to_string());

        let op = operation("headers", HttpMethod::Get, "/headers");
        let out = exec.execute(&op, &req).await.unwrap();
        assert_eq!(out.payload["x-client"], json!(["bound"]));
        assert_eq!(out.payload["authorization"], json!(["Bearer tok"]));
        assert_eq!(out.payload["x-keep"], json!(["kept"]));

        let _ = shutdown.send(());
    }

    #[test]
    fn merged_headers_hold_one_value_per_name() {
        let mut defaults = BTreeMap::new();
        defaults.insert("Content-Type".to_string(), "text/plain".to_string());
        defaults.insert("X-Client".to_string(), "default".to_string());
        let exec = RealExecutor::new(
            "http://127.0.0.1:9",
            defaults,
            AuthConfig::Basic {
                username: "u".into(),
                password: "p".into(),
            },
            Duration::from_secs(1),
        )
        .unwrap();

        let mut bound_headers = BTreeMap::new();
        bound_headers.insert("x-client".to_string(), "bound".to_string());
        let headers = exec.merged_headers(&bound_headers).unwrap();
        assert_eq!(headers.get_all("x-client").iter().count(), 1);
        assert_eq!(headers["x-client"], "bound");
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(headers[AUTHORIZATION], "Basic dTpw");
        assert!(headers[AUTHORIZATION].is_sensitive());

        let mut bad = BTreeMap::new();
        bad.insert("bad header".to_string(), "x".to_string());
        assert_eq!(exec.merged_headers(&bad).unwrap_err().kind(), "NetworkError");
    }

    #[tokio::test]
    async fn query_auth_and_raw_bodies() {
        let (base, shutdown) = spawn_server().await;
        let exec = executor(
            &base,
            AuthConfig::Query {
                name: "api_key".into(),
                value: "secret".into(),
            },
        );

        let mut req = bound(HttpMethod::Put, "/echo/1");
        req.body = Some(json!("a,b\n1,2"));
        req.body_media_type = Some("text/csv".to_string());

        let op = operation("upload", HttpMethod::Put, "/echo/{id}");
        let out = exec.execute(&op, &req).await.unwrap();
        assert_eq!(out.payload["query"], "api_key=secret");
        assert_eq!(out.payload["headers"]["content-type"], "text/csv");
        assert_eq!(out.payload["body"], "a,b\n1,2");

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn non_2xx_is_upstream_error_with_body() {
        let (base, shutdown) = spawn_server().await;
        let exec = executor(&base, AuthConfig::None);
        let op = operation("missing", HttpMethod::Get, "/missing");

        let err = exec
            .execute(&op, &bound(HttpMethod::Get, "/missing"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            InvocationError::Upstream {
                status: 404,
                body: json!({ "error": "nope" }),
            }
        );

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn decodes_text_empty_and_binary_bodies() {
        let (base, shutdown) = spawn_server().await;
        let exec = executor(&base, AuthConfig::None);
        let op = operation("x", HttpMethod::Get, "/x");

        let out = exec.execute(&op, &bound(HttpMethod::Get, "/plain")).await.unwrap();
        assert_eq!(out.payload, json!({ "text": "hello" }));

        let out = exec.execute(&op, &bound(HttpMethod::Get, "/empty")).await.unwrap();
        assert_eq!(out.status, 204);
        assert_eq!(out.payload, Value::Null);

        let out = exec.execute(&op, &bound(HttpMethod::Get, "/binary")).await.unwrap();
        assert_eq!(out.payload["encoding"], "base64");

        let out = exec
            .execute(&op, &bound(HttpMethod::Get, "/path/a%20b"))
            .await
            .unwrap();
        assert_eq!(out.payload["value"], "a b");

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn timeouts_and_connection_failures_are_network_errors() {
        let (base, shutdown) = spawn_server().await;
        let exec = RealExecutor::new(&base, BTreeMap::new(), AuthConfig::None, Duration::from_millis(200))
            .unwrap();
        let op = operation("slow", HttpMethod::Get, "/slow");
        let err = exec
            .execute(&op, &bound(HttpMethod::Get, "/slow"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NetworkError");
        let _ = shutdown.send(());

        let exec = executor("http://user:pw@127.0.0.1:1", AuthConfig::None);
        let err = exec
            .execute(&op, &bound(HttpMethod::Get, "/x?token=abc"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NetworkError");
        assert!(!err.to_string().contains("pw"));
    }

    #[test]
    fn rejects_non_http_base_urls() {
        assert!(
            RealExecutor::new("ftp://example.com", BTreeMap::new(), AuthConfig::None, Duration::from_secs(1))
                .is_err()
        );
        assert!(
            RealExecutor::new("/relative", BTreeMap::new(), AuthConfig::None, Duration::from_secs(1))
                .is_err()
        );
    }

    #[test]
    fn redacts_credentials_and_query() {
        let url = Url::parse("https://user:pw@example.com/a?key=secret#frag").unwrap();
        assert_eq!(redact_url(&url), "https://example.com/a");
    }
}
