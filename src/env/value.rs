//! Value kinds and registered entries.

use super::generator::{Generator, is_frozen};
use super::store::EnvStore;
use crate::error::{EnvError, EnvResult};
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// How an entry obtains its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    /// A literal scalar.
    Constant,
    /// A `namespace.key` pointer into the reference store.
    Global,
    /// A generator spec.
    Auto,
}

impl ValueKind {
    /// Registration order. Fixed so that duplicate-key errors are deterministic.
    pub const ALL: [ValueKind; 3] = [ValueKind::Constant, ValueKind::Global, ValueKind::Auto];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Constant => "constant",
            ValueKind::Global => "global",
            ValueKind::Auto => "auto",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EnvError::UnknownValueKind(s.to_string()))
    }
}

#[derive(Debug)]
enum Resolver {
    Constant,
    Global {
        namespace: String,
        key: String,
        store: Arc<EnvStore>,
    },
    Auto(Generator),
}

/// One `(namespace, key)` registration inside an [`EnvStore`].
///
/// The resolved value is computed on first access and cached for the
/// lifetime of the entry, so generators run at most once.
#[derive(Debug)]
pub struct EnvEntry {
    kind: ValueKind,
    raw: Value,
    resolver: Resolver,
    resolved: OnceLock<Value>,
}

impl EnvEntry {
    /// Validate `raw` for `kind` and build an unresolved entry.
    pub(crate) fn new(
        namespace: &str,
        key: &str,
        raw: Value,
        kind: ValueKind,
        ref_store: Option<&Arc<EnvStore>>,
    ) -> EnvResult<Self> {
        let resolver = match kind {
            ValueKind::Constant => {
                if raw.is_object() || raw.is_array() {
                    return Err(EnvError::InvalidConstant {
                        namespace: namespace.to_string(),
                        key: key.to_string(),
                    });
                }
                Resolver::Constant
            }
            ValueKind::Global => {
                let store = ref_store.ok_or_else(|| EnvError::unsupported_global(namespace))?;
                let (ref_namespace, ref_key) = split_reference(&raw).ok_or_else(|| {
                    EnvError::InvalidGlobalReference {
                        namespace: namespace.to_string(),
                        key: key.to_string(),
                        value: match &raw {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        },
                    }
                })?;
                Resolver::Global {
                    namespace: ref_namespace,
                    key: ref_key,
                    store: Arc::clone(store),
                }
            }
            ValueKind::Auto => Resolver::Auto(Generator::identify(&raw)?),
        };
        Ok(Self {
            kind,
            raw,
            resolver,
            resolved: OnceLock::new(),
        })
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// The value as written in the source document.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// True for `auto` entries whose generated value is exported as a constant.
    pub fn is_frozen_auto(&self) -> bool {
        self.kind == ValueKind::Auto && is_frozen(&self.raw)
    }

    /// Resolve the entry, reusing the cached value when present.
    pub fn resolve(&self) -> EnvResult<&Value> {
        if let Some(value) = self.resolved.get() {
            return Ok(value);
        }
        let value = match &self.resolver {
            Resolver::Constant => self.raw.clone(),
            Resolver::Global {
                namespace,
                key,
                store,
            } => store.get_env(namespace, key)?.clone(),
            Resolver::Auto(generator) => Value::String(generator.resolve(&self.raw)?),
        };
        Ok(self.resolved.get_or_init(|| value))
    }
}

/// Split `"namespace.key"` into its two components.
fn split_reference(raw: &Value) -> Option<(String, String)> {
    let mut parts = raw.as_str()?.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(namespace), Some(key), None) => Some((namespace.to_string(), key.to_string())),
        _ => None,
    }
}
