//! Startup configuration.
//!
//! Settings come from three layers (CLI, config file, environment) plus a directory
//! convention for the spec itself. Each layer is read by the caller into a [`ConfigLayer`];
//! [`LayeredConfig::resolve`] is a pure merge producing one immutable [`StartupConfig`].

use crate::error::{LoadError, Result};
use crate::source::{SpecFormat, SpecReference, current_spec_in};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Hash verification policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Log warning if hash doesn't match.
    #[default]
    Warn,
    /// Fail startup if hash doesn't match.
    Fail,
    /// Ignore hash verification.
    Ignore,
}

/// Outbound authentication for the real executor.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Header {
        name: String,
        value: String,
    },
    Basic {
        username: String,
        password: String,
    },
    /// API key passed as a query parameter.
    Query {
        name: String,
        value: String,
    },
}

/// One configuration source. Every field is optional; `None` means "not set here".
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigLayer {
    #[serde(default, alias = "specPath", alias = "spec_path")]
    pub spec: Option<String>,
    #[serde(default)]
    pub format: Option<SpecFormat>,
    #[serde(default, alias = "use_real_api")]
    pub use_real_api: Option<bool>,
    #[serde(default, alias = "base_url")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default, alias = "timeout_secs")]
    pub timeout_secs: Option<u64>,
    #[serde(default, alias = "spec_dir")]
    pub spec_dir: Option<PathBuf>,
    #[serde(default)]
    pub spec_hash: Option<String>,
    #[serde(default)]
    pub spec_hash_policy: Option<HashPolicy>,
}

impl ConfigLayer {
    /// Build the environment layer from a variable lookup.
    ///
    /// Reads `OPENAPI_SPEC`, `OPENAPI_SPEC_FORMAT`, `USE_REAL_API`, `OPENAPI_BASE_URL` and
    /// `OPENAPI_SPEC_DIR`.
    /// Unrecognized `USE_REAL_API` values are ignored with a warning.
    pub fn from_env_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let format = non_empty("OPENAPI_SPEC_FORMAT")
            .map(|v| v.parse::<SpecFormat>())
            .transpose()?;

        let use_real_api = non_empty("USE_REAL_API").and_then(|v| {
            match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                other => {
                    tracing::warn!("Ignoring unrecognized USE_REAL_API value '{other}'");
                    None
                }
            }
        });

        Ok(Self {
            spec: non_empty("OPENAPI_SPEC"),
            format,
            use_real_api,
            base_url: non_empty("OPENAPI_BASE_URL"),
            spec_dir: non_empty("OPENAPI_SPEC_DIR").map(PathBuf::from),
            ..Self::default()
        })
    }
}

/// The three configuration layers, highest precedence first.
#[derive(Debug, Clone, Default)]
pub struct LayeredConfig {
    pub cli: ConfigLayer,
    pub file: ConfigLayer,
    pub env: ConfigLayer,
}

macro_rules! first_set {
    ($self:ident, $field:ident) => {
        $self
            .cli
            .$field
            .clone()
            .or_else(|| $self.file.$field.clone())
            .or_else(|| $self.env.$field.clone())
    };
}

impl LayeredConfig {
    /// Spec directory for the `current.*` convention, if any layer sets one.
    #[must_use]
    pub fn spec_dir(&self) -> Option<PathBuf> {
        first_set!(self, spec_dir)
    }

    /// Merge the layers into one [`StartupConfig`].
    ///
    /// `convention` is the spec found by probing the spec directory; it is consulted only when
    /// no layer names a spec. Callers do the lookup (see [`LayeredConfig::locate_spec_in_dir`]) so
    /// this merge stays free of I/O.
    ///
    /// # Errors
    ///
    /// - [`LoadError::SpecNotFound`] when no layer and no convention file yields a spec
    /// - [`LoadError::Config`] for an unusable timeout
    pub fn resolve(&self, convention: Option<&Path>) -> Result<StartupConfig> {
        let spec = match first_set!(self, spec) {
            Some(reference) => SpecReference::parse(&reference)?,
            None => match convention {
                Some(path) => SpecReference::File(path.to_path_buf()),
                None => {
                    return Err(LoadError::SpecNotFound(
                        "no spec configured (set --spec, the config file 'spec', OPENAPI_SPEC, \
                         or place current.json/current.yaml in the spec directory)"
                            .to_string(),
                    ));
                }
            },
        };

        let timeout_secs = first_set!(self, timeout_secs).unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(LoadError::Config("timeoutSecs must be > 0".to_string()));
        }

        Ok(StartupConfig {
            spec,
            format: first_set!(self, format),
            use_real_api: first_set!(self, use_real_api).unwrap_or(false),
            base_url: first_set!(self, base_url),
            default_headers: first_set!(self, headers).unwrap_or_default(),
            auth: first_set!(self, auth).unwrap_or_default(),
            timeout: Duration::from_secs(timeout_secs),
            spec_hash: first_set!(self, spec_hash),
            spec_hash_policy: first_set!(self, spec_hash_policy).unwrap_or_default(),
        })
    }

    /// Search the configured spec directory for a `current.*` file.
    #[must_use]
    pub fn locate_spec_in_dir(&self) -> Option<PathBuf> {
        self.spec_dir().and_then(|dir| current_spec_in(&dir))
    }
}

/// Fully resolved, immutable startup configuration.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub spec: SpecReference,
    pub format: Option<SpecFormat>,
    pub use_real_api: bool,
    /// Overrides the spec's `servers[0].url`.
    pub base_url: Option<String>,
    pub default_headers: BTreeMap<String, String>,
    pub auth: AuthConfig,
    pub timeout: Duration,
    pub spec_hash: Option<String>,
    pub spec_hash_policy: HashPolicy,
}

impl StartupConfig {
    /// Mock-mode defaults for a spec reference.
    #[must_use]
    pub fn new(spec: SpecReference) -> Self {
        Self {
            spec,
            format: None,
            use_real_api: false,
            base_url: None,
            default_headers: BTreeMap::new(),
            auth: AuthConfig::None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            spec_hash: None,
            spec_hash_policy: HashPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> ConfigLayer {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ConfigLayer::from_env_vars(|k| map.get(k).cloned()).unwrap()
    }

    #[test]
    fn cli_beats_file_beats_env() {
        let layers = LayeredConfig {
            cli: ConfigLayer {
                spec: Some("cli.yaml".into()),
                ..ConfigLayer::default()
            },
            file: ConfigLayer {
                spec: Some("file.yaml".into()),
                use_real_api: Some(true),
                ..ConfigLayer::default()
            },
            env: env(&[
                ("OPENAPI_SPEC", "env.yaml"),
                ("USE_REAL_API", "no"),
                ("OPENAPI_BASE_URL", "http://env.local"),
            ]),
        };
        let cfg = layers.resolve(None).unwrap();
        assert_eq!(cfg.spec, SpecReference::File(PathBuf::from("cli.yaml")));
        assert!(cfg.use_real_api);
        assert_eq!(cfg.base_url.as_deref(), Some("http://env.local"));
        assert_eq!(cfg.timeout, Duration::from_secs(30));
    }

    #[test]
    fn env_layer_parses_flags() {
        let layer = env(&[("USE_REAL_API", "YES"), ("OPENAPI_SPEC_FORMAT", "yml")]);
        assert_eq!(layer.use_real_api, Some(true));
        assert_eq!(layer.format, Some(SpecFormat::Yaml));

        let layer = env(&[("USE_REAL_API", "maybe"), ("OPENAPI_SPEC", "  ")]);
        assert_eq!(layer.use_real_api, None);
        assert_eq!(layer.spec, None);

        assert!(
            ConfigLayer::from_env_vars(|k| {
                (k == "OPENAPI_SPEC_FORMAT").then(|| "xml".to_string())
            })
            .is_err()
        );
    }

    #[test]
    fn file_spec_dir_beats_env_spec_dir() {
        let env_layer = env(&[("OPENAPI_SPEC_DIR", "/env/specs")]);
        assert_eq!(env_layer.spec_dir, Some(PathBuf::from("/env/specs")));

        let layers = LayeredConfig {
            file: ConfigLayer {
                spec_dir: Some(PathBuf::from("/file/specs")),
                ..ConfigLayer::default()
            },
            env: env_layer.clone(),
            ..LayeredConfig::default()
        };
        assert_eq!(layers.spec_dir(), Some(PathBuf::from("/file/specs")));

        let layers = LayeredConfig {
            env: env_layer,
            ..LayeredConfig::default()
        };
        assert_eq!(layers.spec_dir(), Some(PathBuf::from("/env/specs")));
    }

    #[test]
    fn convention_used_only_without_explicit_spec() {
        let convention = PathBuf::from("/specs/current.json");
        let cfg = LayeredConfig::default()
            .resolve(Some(&convention))
            .unwrap();
        assert_eq!(cfg.spec, SpecReference::File(convention.clone()));

        let layers = LayeredConfig {
            env: env(&[("OPENAPI_SPEC", "https://example.com/openapi.json")]),
            ..LayeredConfig::default()
        };
        let cfg = layers.resolve(Some(&convention)).unwrap();
        assert!(matches!(cfg.spec, SpecReference::Url(_)));
    }

    #[test]
    fn no_spec_anywhere_is_not_found() {
        let err = LayeredConfig::default().resolve(None).unwrap_err();
        assert_eq!(err.kind(), "SpecNotFoundError");
    }

    #[test]
    fn file_layer_accepts_legacy_keys() {
        let layer: ConfigLayer = serde_json::from_str(
            r#"{"spec_path": "pizza.json", "use_real_api": true, "auth": {"type": "bearer", "token": "t"}}"#,
        )
        .unwrap();
        assert_eq!(layer.spec.as_deref(), Some("pizza.json"));
        assert_eq!(layer.use_real_api, Some(true));
        assert_eq!(
            layer.auth,
            Some(AuthConfig::Bearer {
                token: "t".to_string()
            })
        );

        let layer: ConfigLayer = serde_json::from_str(
            r#"{"specPath": "a.yaml", "useRealApi": false, "specHashPolicy": "fail", "timeoutSecs": 5}"#,
        )
        .unwrap();
        assert_eq!(layer.spec.as_deref(), Some("a.yaml"));
        assert_eq!(layer.spec_hash_policy, Some(HashPolicy::Fail));
        assert_eq!(layer.timeout_secs, Some(5));
    }

    #[test]
    fn zero_timeout_is_config_error() {
        let layers = LayeredConfig {
            cli: ConfigLayer {
                spec: Some("a.json".into()),
                timeout_secs: Some(0),
                ..ConfigLayer::default()
            },
            ..LayeredConfig::default()
        };
        assert_eq!(layers.resolve(None).unwrap_err().kind(), "ConfigError");
    }
}
