//! `$ref` resolver for spec documents.
//!
//! Supports:
//! - Local refs (`#/...`)
//! - File refs (`./common.yaml#/...`, `/abs/path/spec.yaml#/...`, `file:///...#/...`)
//!
//! Resolution is **relative to the document that contains the `$ref`**, so callers pass the
//! current document id along with the node being resolved. Remote (`http(s)`) documents other
//! than the root are not fetched: parsing stays synchronous and offline.

use crate::error::{LoadError, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    Url(Url),
    File(PathBuf),
    Inline,
}

impl DocId {
    #[must_use]
    pub fn file(path: PathBuf) -> Self {
        DocId::File(canonicalize_best_effort(path))
    }

    fn display(&self) -> String {
        match self {
            DocId::Url(u) => u.to_string(),
            DocId::File(p) => p.display().to_string(),
            DocId::Inline => "<inline>".to_string(),
        }
    }
}

fn strip_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

fn canonicalize_best_effort(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

/// Returns the `$ref` string if `node` is a reference object.
#[must_use]
pub fn ref_of(node: &Value) -> Option<&str> {
    node.as_object()?.get("$ref")?.as_str()
}

#[derive(Debug)]
pub struct RefResolver {
    root_doc: DocId,
    docs: RwLock<HashMap<DocId, Arc<Value>>>,
}

impl RefResolver {
    #[must_use]
    pub fn new(root_doc: DocId, root: Value) -> Self {
        let mut docs = HashMap::new();
        docs.insert(root_doc.clone(), Arc::new(root));
        Self {
            root_doc,
            docs: RwLock::new(docs),
        }
    }

    #[must_use]
    pub fn root_doc(&self) -> &DocId {
        &self.root_doc
    }

    /// The root document tree.
    #[must_use]
    pub fn root(&self) -> Arc<Value> {
        self.docs
            .read()
            .get(&self.root_doc)
            .cloned()
            .unwrap_or_else(|| Arc::new(Value::Null))
    }

    /// Follow `$ref` chains until a non-reference node is reached.
    ///
    /// Returns the document the final node lives in (for resolving nested refs) and the node.
    /// `location` is the JSON pointer of `node`, used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::SpecParse`] for unresolvable, unsupported or cyclic references.
    pub fn resolve(&self, current_doc: &DocId, node: &Value, location: &str) -> Result<(DocId, Value)> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut doc = current_doc.clone();
        let mut cur = node.clone();

        while let Some(reference) = ref_of(&cur).map(str::to_string) {
            let (target_doc, pointer) = Self::parse_ref(&doc, &reference, location)?;
            let key = Self::canonical_ref_key(&target_doc, pointer.as_deref());
            if !seen.insert(key) {
                return Err(LoadError::parse(
                    location,
                    format!("cyclic $ref detected while resolving '{reference}'"),
                ));
            }

            let doc_value = self.load_doc(&target_doc, location)?;
            cur = match pointer {
                Some(ptr) => doc_value.pointer(&ptr).cloned().ok_or_else(|| {
                    LoadError::parse(
                        location,
                        format!(
                            "unresolved $ref '{reference}' (doc {}, missing pointer '{ptr}')",
                            target_doc.display()
                        ),
                    )
                })?,
                None => (*doc_value).clone(),
            };
            doc = target_doc;
        }

        Ok((doc, cur))
    }

    fn parse_ref(current_doc: &DocId, reference: &str, location: &str) -> Result<(DocId, Option<String>)> {
        let (doc_part, frag) = match reference.split_once('#') {
            Some((d, f)) => (d, Some(f)),
            None => (reference, None),
        };

        let ptr = match frag {
            Some("") | None => None,
            Some(f) if f.starts_with('/') => Some(f.to_string()),
            Some(_) => {
                return Err(LoadError::parse(
                    location,
                    format!(
                        "unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}"
                    ),
                ));
            }
        };

        let target = Self::resolve_doc(current_doc, doc_part, location)?;
        Ok((target, ptr))
    }

    fn resolve_doc(current_doc: &DocId, doc_part: &str, location: &str) -> Result<DocId> {
        if doc_part.is_empty() {
            return Ok(current_doc.clone());
        }

        if doc_part.starts_with("http://") || doc_part.starts_with("https://") {
            let url = Url::parse(doc_part)
                .map_err(|e| LoadError::parse(location, format!("bad $ref URL '{doc_part}': {e}")))?;
            return Ok(DocId::Url(strip_fragment(url)));
        }

        if doc_part.starts_with("file://") {
            let url = Url::parse(doc_part).map_err(|e| {
                LoadError::parse(location, format!("bad $ref file URL '{doc_part}': {e}"))
            })?;
            let path = url.to_file_path().map_err(|()| {
                LoadError::parse(location, format!("bad $ref file URL (not a path): {doc_part}"))
            })?;
            return Ok(DocId::file(path));
        }

        match current_doc {
            DocId::Url(base) => {
                let joined = base.join(doc_part).map_err(|e| {
                    LoadError::parse(
                        location,
                        format!("failed to resolve relative $ref '{doc_part}' against {base}: {e}"),
                    )
                })?;
                Ok(DocId::Url(strip_fragment(joined)))
            }
            DocId::File(base) => {
                let resolved = if Path::new(doc_part).is_absolute() {
                    PathBuf::from(doc_part)
                } else {
                    base.parent()
                        .unwrap_or_else(|| Path::new("."))
                        .join(doc_part)
                };
                Ok(DocId::file(resolved))
            }
            DocId::Inline => Ok(DocId::file(PathBuf::from(doc_part))),
        }
    }

    fn canonical_ref_key(target_doc: &DocId, pointer: Option<&str>) -> String {
        let mut key = match target_doc {
            DocId::Url(u) => format!("url:{u}"),
            DocId::File(p) => format!("file:{}", p.display()),
            DocId::Inline => "inline:".to_string(),
        };
        if let Some(ptr) = pointer {
            key.push('#');
            key.push_str(ptr);
        }
        key
    }

    fn load_doc(&self, doc: &DocId, location: &str) -> Result<Arc<Value>> {
        if let Some(v) = self.docs.read().get(doc).cloned() {
            return Ok(v);
        }

        let content = match doc {
            DocId::File(path) => std::fs::read_to_string(path).map_err(|e| {
                LoadError::parse(
                    location,
                    format!("failed to read referenced file {}: {e}", path.display()),
                )
            })?,
            DocId::Url(url) => {
                return Err(LoadError::parse(
                    location,
                    format!("remote $ref documents are not supported: {url}"),
                ));
            }
            DocId::Inline => {
                return Err(LoadError::parse(location, "inline document is not loaded"));
            }
        };

        let parsed: Value = serde_json::from_str(&content)
            .or_else(|_| serde_yaml::from_str(&content))
            .map_err(|e| {
                LoadError::parse(
                    location,
                    format!("failed to parse referenced document {}: {e}", doc.display()),
                )
            })?;

        let parsed = Arc::new(parsed);
        self.docs.write().insert(doc.clone(), Arc::clone(&parsed));
        Ok(parsed)
    }
}
