//! Error types for environment resolution and merging.

use thiserror::Error;

/// Errors raised while building, resolving, merging or exporting env stores.
///
/// None of these are recoverable inside the crate: they propagate to the
/// caller, which owns user-facing formatting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvError {
    #[error("unknown section '{section}', expects one of {{{expected}}}")]
    UnknownConfigSection { section: String, expected: String },

    #[error("unknown value type: {0}")]
    UnknownValueKind(String),

    #[error("namespace '{0}' already exists in env store")]
    NamespaceExists(String),

    #[error("key '{key}' already exists in namespace '{namespace}'")]
    KeyAlreadyExists { namespace: String, key: String },

    #[error("'global' is not supported in this section, namespace {namespace}")]
    UnsupportedGlobalReference { namespace: String },

    #[error(
        "invalid value '{value}' for '{key}' in namespace '{namespace}', \
         expecting a global variable reference like 'NAMESPACE.KEY'"
    )]
    InvalidGlobalReference {
        namespace: String,
        key: String,
        value: String,
    },

    #[error("invalid constant for '{key}' in namespace '{namespace}', expecting a scalar")]
    InvalidConstant { namespace: String, key: String },

    #[error("unknown namespace '{0}'")]
    UnknownNamespace(String),

    #[error("unknown key '{key}' in namespace '{namespace}'")]
    UnknownKey { namespace: String, key: String },

    #[error("unknown server '{0}'")]
    UnknownServer(String),

    #[error("invalid field content for generation method '{method}': {reason}")]
    InvalidGenerationData { method: String, reason: String },

    #[error("impossible to identify the generation method of '{0}'")]
    UnidentifiableGenerationMethod(String),

    #[error("malformed document at '{path}': expected {expected}")]
    MalformedDocument { path: String, expected: String },
}

impl EnvError {
    pub(crate) fn key_exists(namespace: &str, key: &str) -> Self {
        Self::KeyAlreadyExists {
            namespace: namespace.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn unsupported_global(namespace: &str) -> Self {
        Self::UnsupportedGlobalReference {
            namespace: namespace.to_string(),
        }
    }

    pub(crate) fn malformed(path: impl Into<String>, expected: &str) -> Self {
        Self::MalformedDocument {
            path: path.into(),
            expected: expected.to_string(),
        }
    }
}

/// Result type for env store operations.
pub type EnvResult<T> = std::result::Result<T, EnvError>;
