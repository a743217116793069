//! Transform catalog: named encode/decode stage pairs and the registry
//! that maps chain names to their specifications.
//!
//! A transform is a pure function pair applied to a key or a value. Specs
//! are registered once at process start and never mutated; the registry is
//! then shared freely (stage functions are plain `fn` pointers, so a spec
//! carries no state of its own).

pub mod builtin;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

use thiserror::Error;

use crate::options::TransformOptions;
use crate::payload::Payload;
use crate::pipeline::{ChainKey, CompiledPipeline};

/// Which path of the pipeline a chain governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Key,
    Value,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Key => f.write_str("key"),
            Axis::Value => f.write_str("value"),
        }
    }
}

/// Axes a transform may legally appear on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    KeyOnly,
    ValueOnly,
    Both,
}

impl Applicability {
    pub fn covers(self, axis: Axis) -> bool {
        matches!(
            (self, axis),
            (Applicability::Both, _)
                | (Applicability::KeyOnly, Axis::Key)
                | (Applicability::ValueOnly, Axis::Value)
        )
    }
}

/// Grammar token class of a transform, used by chain validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Namespace prefixing; at most one, first in a key chain.
    Prefix,
    /// Order-preserving key encoding; any number, mid-chain.
    Encoding,
    /// One-way key digest; terminal in a key chain.
    Digest,
    /// Key length truncation; terminal in a key chain.
    Truncate,
    /// Structured-to-bytes serialization stage.
    Serial,
    /// Bytes-to-bytes compression stage.
    Compress,
    /// Authenticating wrap; terminal in a value chain.
    Mac,
}

/// Key stage: pure `String -> String`.
pub type KeyStageFn = fn(&str, &TransformOptions) -> Result<String, TransformError>;

/// Value stage: pure `Payload -> Payload`.
pub type ValueStageFn = fn(Payload, &TransformOptions) -> Result<Payload, TransformError>;

/// Configuration-time errors. All of these surface during decorator
/// construction, before any backend I/O.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown transform `{0}`")]
    UnknownTransform(String),

    #[error("transform `{0}` is already registered")]
    DuplicateTransform(String),

    #[error("invalid {axis} chain [{chain}]: {reason}")]
    InvalidChainGrammar {
        axis: Axis,
        chain: String,
        reason: String,
    },

    #[error("missing option `{option}` required by transform `{transform}` in the {axis} chain")]
    MissingOption {
        option: String,
        transform: String,
        axis: Axis,
    },

    #[error("irreversible transform `{0}` cannot appear in a value chain")]
    IrreversibleInValueChain(String),
}

/// Runtime errors raised by individual stages.
///
/// Decode-side failures on backend-returned data are reported by the store
/// as corruption; encode-side failures are rejected input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("input exceeds maximum size")]
    InputTooLarge,

    #[error("frame is truncated")]
    TruncatedFrame,

    #[error("decompression ratio exceeds safety limit")]
    DecompressionBomb,

    #[error("decompression failed")]
    DecompressionFailed,

    #[error("integrity check failed")]
    ChecksumMismatch,

    #[error("authentication verification failed")]
    MacMismatch,

    #[error("transform `{transform}` expects a {expected} payload")]
    PayloadTypeMismatch {
        transform: &'static str,
        expected: &'static str,
    },

    #[error("stored key does not carry namespace prefix `{0}`")]
    PrefixMissing(String),

    #[error("key is not valid {0}")]
    KeyEncodingInvalid(&'static str),

    #[error("option `{0}` is not configured")]
    OptionUnavailable(&'static str),
}

/// Specification of one named transform.
///
/// Stage slots are `None` on axes the transform does not serve; a transform
/// whose encode has no matching decode is irreversible.
#[derive(Debug, Clone)]
pub struct TransformSpec {
    pub name: &'static str,
    pub applies_to: Applicability,
    pub token: Token,
    /// Option names this transform requires at construction time.
    pub requires: &'static [&'static str],
    pub key_encode: Option<KeyStageFn>,
    pub key_decode: Option<KeyStageFn>,
    pub value_encode: Option<ValueStageFn>,
    pub value_decode: Option<ValueStageFn>,
}

impl TransformSpec {
    /// Whether any encode direction lacks its inverse.
    pub fn irreversible(&self) -> bool {
        (self.key_encode.is_some() && self.key_decode.is_none())
            || (self.value_encode.is_some() && self.value_decode.is_none())
    }

    /// Whether the transform can encode on the given axis.
    pub fn encodes_on(&self, axis: Axis) -> bool {
        match axis {
            Axis::Key => self.key_encode.is_some(),
            Axis::Value => self.value_encode.is_some(),
        }
    }
}

/// Static catalog mapping transform names to specs, plus the compiled-chain
/// cache for this catalog.
///
/// Registration happens before the registry is shared; lookups and chain
/// compilation afterwards take `&self` and are safe from any thread.
pub struct Registry {
    specs: HashMap<&'static str, Arc<TransformSpec>>,
    pub(crate) chain_cache: Mutex<HashMap<ChainKey, Arc<CompiledPipeline>>>,
}

impl Registry {
    /// An empty catalog, for callers composing their own transform set.
    pub fn new() -> Self {
        Registry {
            specs: HashMap::new(),
            chain_cache: Mutex::new(HashMap::new()),
        }
    }

    /// The built-in catalog. Feature-gated transforms are present only when
    /// their feature is enabled; naming an absent one fails lookup.
    pub fn with_builtins() -> Self {
        let mut registry = Registry::new();
        for spec in builtin::builtin_specs() {
            // Built-in names are distinct by construction.
            let _ = registry.register(spec);
        }
        registry
    }

    /// Add a spec to the catalog.
    pub fn register(&mut self, spec: TransformSpec) -> Result<(), ConfigError> {
        if self.specs.contains_key(spec.name) {
            return Err(ConfigError::DuplicateTransform(spec.name.to_string()));
        }
        self.specs.insert(spec.name, Arc::new(spec));
        Ok(())
    }

    /// Resolve a transform by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<TransformSpec>, ConfigError> {
        self.specs
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownTransform(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

static DEFAULT_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::with_builtins);

/// Process-wide registry of built-in transforms.
pub fn default_registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_key(key: &str, _opts: &TransformOptions) -> Result<String, TransformError> {
        Ok(key.to_string())
    }

    fn test_spec(name: &'static str) -> TransformSpec {
        TransformSpec {
            name,
            applies_to: Applicability::KeyOnly,
            token: Token::Encoding,
            requires: &[],
            key_encode: Some(identity_key),
            key_decode: Some(identity_key),
            value_encode: None,
            value_decode: None,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        registry.register(test_spec("mirror")).unwrap();

        assert!(registry.contains("mirror"));
        assert_eq!(registry.lookup("mirror").unwrap().name, "mirror");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = Registry::new();
        registry.register(test_spec("mirror")).unwrap();

        let result = registry.register(test_spec("mirror"));
        assert_eq!(
            result,
            Err(ConfigError::DuplicateTransform("mirror".to_string()))
        );
    }

    #[test]
    fn test_unknown_lookup_rejected() {
        let registry = Registry::new();
        assert_eq!(
            registry.lookup("nope").unwrap_err(),
            ConfigError::UnknownTransform("nope".to_string())
        );
    }

    #[test]
    fn test_builtin_catalog_contents() {
        let registry = Registry::with_builtins();
        for name in ["serialize", "hex", "prefix", "digest", "truncate"] {
            assert!(registry.contains(name), "missing builtin `{name}`");
        }
        #[cfg(feature = "compression")]
        assert!(registry.contains("compress"));
        #[cfg(feature = "hmac")]
        assert!(registry.contains("hmac"));
    }

    #[test]
    fn test_irreversibility_detection() {
        let registry = Registry::with_builtins();
        assert!(registry.lookup("digest").unwrap().irreversible());
        assert!(registry.lookup("truncate").unwrap().irreversible());
        assert!(!registry.lookup("prefix").unwrap().irreversible());
        assert!(!registry.lookup("serialize").unwrap().irreversible());
    }

    #[test]
    fn test_applicability_covers() {
        assert!(Applicability::Both.covers(Axis::Key));
        assert!(Applicability::Both.covers(Axis::Value));
        assert!(Applicability::KeyOnly.covers(Axis::Key));
        assert!(!Applicability::KeyOnly.covers(Axis::Value));
        assert!(!Applicability::ValueOnly.covers(Axis::Key));
    }
}
