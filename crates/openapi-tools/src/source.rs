//! Spec source resolution: reference string → raw spec text.
//!
//! A reference is one of:
//! - an `http(s)://` URL (fetched with a bounded timeout)
//! - a `file://` URL or a local path
//! - inline document content (embedding use)

use crate::config::HashPolicy;
use crate::error::{LoadError, Result};
use crate::resolver::DocId;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// File names tried (in order) inside the configured spec directory.
pub const CURRENT_SPEC_FILES: [&str; 3] = ["current.json", "current.yaml", "current.yml"];

/// Serialization format of a spec document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecFormat {
    Json,
    #[serde(alias = "yml")]
    Yaml,
}

impl FromStr for SpecFormat {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(LoadError::Config(format!(
                "Unsupported spec format '{other}' (expected json or yaml)"
            ))),
        }
    }
}

impl fmt::Display for SpecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Yaml => f.write_str("yaml"),
        }
    }
}

/// Where a spec document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecReference {
    Url(Url),
    File(PathBuf),
    Inline(String),
}

impl SpecReference {
    /// Classify a reference string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is empty or looks like a URL but does not parse.
    pub fn parse(reference: &str) -> Result<Self> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(LoadError::SpecNotFound(
                "empty spec reference".to_string(),
            ));
        }

        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = Url::parse(trimmed).map_err(|e| {
                LoadError::Config(format!("Invalid OpenAPI spec URL '{trimmed}': {e}"))
            })?;
            return Ok(Self::Url(url));
        }

        if trimmed.starts_with("file://") {
            let url = Url::parse(trimmed).map_err(|e| {
                LoadError::Config(format!("Invalid OpenAPI spec file URL '{trimmed}': {e}"))
            })?;
            let path = url.to_file_path().map_err(|()| {
                LoadError::Config(format!(
                    "Invalid file URL (cannot convert to path): {trimmed}"
                ))
            })?;
            return Ok(Self::File(path));
        }

        if trimmed.starts_with('{') || trimmed.contains('\n') {
            return Ok(Self::Inline(reference.to_string()));
        }

        Ok(Self::File(PathBuf::from(trimmed)))
    }

    /// Short human-readable location (inline content is not echoed).
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Url(u) => u.to_string(),
            Self::File(p) => p.display().to_string(),
            Self::Inline(_) => "<inline>".to_string(),
        }
    }

    fn extension_format(&self) -> Option<SpecFormat> {
        let ext = match self {
            Self::Url(u) => Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase),
            Self::File(p) => p
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase),
            Self::Inline(_) => None,
        }?;
        match ext.as_str() {
            "json" => Some(SpecFormat::Json),
            "yaml" | "yml" => Some(SpecFormat::Yaml),
            _ => None,
        }
    }
}

/// Raw spec text ready for parsing.
#[derive(Debug, Clone)]
pub struct RawSpec {
    pub text: String,
    pub format: SpecFormat,
    /// Document identity used to resolve relative `$ref`s.
    pub doc: DocId,
    /// Human-readable location for logs and errors.
    pub location: String,
}

/// Look for the well-known "current spec" file inside `dir`.
#[must_use]
pub fn current_spec_in(dir: &Path) -> Option<PathBuf> {
    CURRENT_SPEC_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Load the raw spec text for a reference.
///
/// # Errors
///
/// - [`LoadError::SpecNotFound`] if a local file does not exist
/// - [`LoadError::SpecFetch`] if a URL fetch fails, times out, or returns non-2xx
pub async fn load(
    reference: &SpecReference,
    hint: Option<SpecFormat>,
    client: &Client,
    timeout: Duration,
) -> Result<RawSpec> {
    match reference {
        SpecReference::Url(url) => {
            tracing::info!("Fetching OpenAPI spec from {url}");
            let (text, content_type) = fetch(client, url, timeout).await?;
            let format = hint
                .or_else(|| reference.extension_format())
                .or_else(|| format_from_content_type(content_type.as_deref()))
                .unwrap_or_else(|| sniff_format(&text));
            Ok(RawSpec {
                text,
                format,
                doc: DocId::Url(url.clone()),
                location: url.to_string(),
            })
        }
        SpecReference::File(path) => {
            tracing::info!("Loading OpenAPI spec from {}", path.display());
            let text = match std::fs::read_to_string(path) {
                Ok(t) => t,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(LoadError::SpecNotFound(format!(
                        "OpenAPI spec not found: {}",
                        path.display()
                    )));
                }
                Err(e) => {
                    return Err(LoadError::SpecFetch {
                        location: path.display().to_string(),
                        message: e.to_string(),
                    });
                }
            };
            let format = hint
                .or_else(|| reference.extension_format())
                .unwrap_or_else(|| sniff_format(&text));
            Ok(RawSpec {
                text,
                format,
                doc: DocId::file(path.clone()),
                location: path.display().to_string(),
            })
        }
        SpecReference::Inline(text) => Ok(RawSpec {
            format: hint.unwrap_or_else(|| sniff_format(text)),
            text: text.clone(),
            doc: DocId::Inline,
            location: "<inline>".to_string(),
        }),
    }
}

async fn fetch(client: &Client, url: &Url, timeout: Duration) -> Result<(String, Option<String>)> {
    let fetch_err = |message: String| LoadError::SpecFetch {
        location: url.to_string(),
        message,
    };

    let resp = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                fetch_err(format!("timed out after {}s", timeout.as_secs()))
            } else {
                fetch_err(crate::executor::real::sanitize_reqwest_error(&e))
            }
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(fetch_err(format!("server responded with {status}")));
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let text = resp
        .text()
        .await
        .map_err(|e| fetch_err(format!("failed to read body: {e}")))?;

    Ok((text, content_type))
}

fn format_from_content_type(content_type: Option<&str>) -> Option<SpecFormat> {
    let ct = content_type?.to_ascii_lowercase();
    if ct.contains("yaml") {
        Some(SpecFormat::Yaml)
    } else if ct.contains("json") {
        Some(SpecFormat::Json)
    } else {
        None
    }
}

/// Guess the format from content: JSON documents start with `{` or `[`.
#[must_use]
pub fn sniff_format(text: &str) -> SpecFormat {
    match text.trim_start().chars().next() {
        Some('{' | '[') => SpecFormat::Json,
        _ => SpecFormat::Yaml,
    }
}

/// Check the spec text against an optional `sha256:<hex>` pin.
///
/// # Errors
///
/// Returns [`LoadError::HashMismatch`] when the digest differs and the policy is `Fail`.
pub fn verify_hash(
    text: &str,
    expected: Option<&str>,
    policy: HashPolicy,
    location: &str,
) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    if policy == HashPolicy::Ignore {
        return Ok(());
    }

    let actual = format!("sha256:{}", hex::encode(Sha256::digest(text.as_bytes())));
    if actual.eq_ignore_ascii_case(expected.trim()) {
        return Ok(());
    }

    match policy {
        HashPolicy::Fail => Err(LoadError::HashMismatch {
            expected: expected.to_string(),
            actual,
        }),
        HashPolicy::Warn => {
            tracing::warn!(
                "Spec hash mismatch for '{}'. Expected: {}, Got: {}",
                location,
                expected,
                actual
            );
            Ok(())
        }
        HashPolicy::Ignore => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn classifies_references() {
        assert!(matches!(
            SpecReference::parse("https://example.com/openapi.json").unwrap(),
            SpecReference::Url(_)
        ));
        assert_eq!(
            SpecReference::parse("./specs/pizza.yaml").unwrap(),
            SpecReference::File(PathBuf::from("./specs/pizza.yaml"))
        );
        assert!(matches!(
            SpecReference::parse(r#"{"openapi":"3.0.0"}"#).unwrap(),
            SpecReference::Inline(_)
        ));
        assert!(matches!(
            SpecReference::parse("openapi: 3.0.0\npaths: {}\n").unwrap(),
            SpecReference::Inline(_)
        ));
        assert!(matches!(
            SpecReference::parse("   "),
            Err(LoadError::SpecNotFound(_))
        ));
    }

    #[test]
    fn sniffs_format() {
        assert_eq!(sniff_format("  {\"a\": 1}"), SpecFormat::Json);
        assert_eq!(sniff_format("openapi: 3.0.0"), SpecFormat::Yaml);
        assert_eq!(
            format_from_content_type(Some("application/x-yaml")),
            Some(SpecFormat::Yaml)
        );
        assert_eq!(format_from_content_type(Some("text/plain")), None);
    }

    #[test]
    fn current_spec_prefers_json_then_yaml() {
        let dir = tempdir().unwrap();
        assert!(current_spec_in(dir.path()).is_none());

        fs::write(dir.path().join("current.yml"), "openapi: 3.0.0").unwrap();
        assert_eq!(
            current_spec_in(dir.path()).unwrap(),
            dir.path().join("current.yml")
        );

        fs::write(dir.path().join("current.json"), "{}").unwrap();
        assert_eq!(
            current_spec_in(dir.path()).unwrap(),
            dir.path().join("current.json")
        );
    }

    #[tokio::test]
    async fn missing_file_is_spec_not_found() {
        let client = Client::new();
        let err = load(
            &SpecReference::File(PathBuf::from("/definitely/not/here.json")),
            None,
            &client,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "SpecNotFoundError");
    }

    #[tokio::test]
    async fn file_format_follows_hint_then_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spec.yaml");
        fs::write(&path, "{\"openapi\": \"3.0.0\"}").unwrap();
        let client = Client::new();

        let raw = load(
            &SpecReference::File(path.clone()),
            None,
            &client,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(raw.format, SpecFormat::Yaml);

        let raw = load(
            &SpecReference::File(path),
            Some(SpecFormat::Json),
            &client,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(raw.format, SpecFormat::Json);
    }

    #[tokio::test]
    async fn unreachable_url_is_spec_fetch_error() {
        let client = Client::new();
        let url = Url::parse("http://127.0.0.1:1/openapi.json").unwrap();
        let err = load(
            &SpecReference::Url(url),
            None,
            &client,
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "SpecFetchError");
    }

    #[test]
    fn hash_policy() {
        let text = "openapi: 3.0.0";
        let good = format!("sha256:{}", hex::encode(Sha256::digest(text.as_bytes())));

        verify_hash(text, Some(&good), HashPolicy::Fail, "t").unwrap();
        verify_hash(text, None, HashPolicy::Fail, "t").unwrap();
        verify_hash(text, Some("sha256:00"), HashPolicy::Warn, "t").unwrap();
        verify_hash(text, Some("sha256:00"), HashPolicy::Ignore, "t").unwrap();
        assert!(matches!(
            verify_hash(text, Some("sha256:00"), HashPolicy::Fail, "t"),
            Err(LoadError::HashMismatch { .. })
        ));
    }
}
