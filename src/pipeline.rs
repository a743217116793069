//! Chain compilation: from lists of transform names to a reusable
//! encode/decode stage pair per axis.
//!
//! The compiler resolves every name against a registry, checks the chain
//! grammar and reversibility rules, and produces a [`CompiledPipeline`]:
//! ordered stage lists that the hot path folds over, with no registry
//! lookups and no re-validation per call. A pipeline is a pure function of
//! its chain definitions, so each registry caches compiled chains by their
//! canonical name tuple and hands out shared `Arc`s.
//!
//! Options stay outside the cache on purpose: two decorators with the same
//! chains but different secrets share one compiled pipeline and pass their
//! own validated options into every fold.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::grammar;
use crate::options::TransformOptions;
use crate::payload::Payload;
use crate::transform::{Axis, ConfigError, Registry, TransformError, TransformSpec};

/// Canonical cache key: the (key-chain, value-chain) name tuple.
pub(crate) type ChainKey = (Vec<String>, Vec<String>);

/// One required option and the chain member that demands it.
#[derive(Debug, Clone)]
struct Requirement {
    option: &'static str,
    transform: &'static str,
    axis: Axis,
}

/// Compiled form of one (key-chain, value-chain) pair.
///
/// Holds no mutable state; a single instance may be invoked concurrently
/// from any number of callers.
#[derive(Debug)]
pub struct CompiledPipeline {
    key_stages: Vec<Arc<TransformSpec>>,
    value_stages: Vec<Arc<TransformSpec>>,
    requirements: Vec<Requirement>,
    consumed: BTreeSet<&'static str>,
}

impl CompiledPipeline {
    /// Encode a key: left-to-right fold of key stages in chain order.
    pub fn encode_key(&self, key: &str, opts: &TransformOptions) -> Result<String, TransformError> {
        let mut key = key.to_owned();
        for spec in &self.key_stages {
            if let Some(encode) = spec.key_encode {
                key = encode(&key, opts)?;
            }
        }
        Ok(key)
    }

    /// Decode a key: fold of decodes over the reversed chain.
    ///
    /// A chain containing a one-way stage (digest, truncate) yields stored
    /// identifiers as-is: nothing earlier in the chain can see its
    /// pre-image again, so no partial unwinding is attempted.
    pub fn decode_key(&self, key: &str, opts: &TransformOptions) -> Result<String, TransformError> {
        if self
            .key_stages
            .iter()
            .any(|s| s.key_encode.is_some() && s.key_decode.is_none())
        {
            return Ok(key.to_owned());
        }
        let mut key = key.to_owned();
        for spec in self.key_stages.iter().rev() {
            if let Some(decode) = spec.key_decode {
                key = decode(&key, opts)?;
            }
        }
        Ok(key)
    }

    /// Encode a value: left-to-right fold of value stages in chain order.
    pub fn encode_value(
        &self,
        mut payload: Payload,
        opts: &TransformOptions,
    ) -> Result<Payload, TransformError> {
        for spec in &self.value_stages {
            if let Some(encode) = spec.value_encode {
                payload = encode(payload, opts)?;
            }
        }
        Ok(payload)
    }

    /// Decode a value: fold of decodes over the reversed chain. Every value
    /// stage has a decode; the compiler rejects chains where one doesn't.
    pub fn decode_value(
        &self,
        mut payload: Payload,
        opts: &TransformOptions,
    ) -> Result<Payload, TransformError> {
        for spec in self.value_stages.iter().rev() {
            if let Some(decode) = spec.value_decode {
                payload = decode(payload, opts)?;
            }
        }
        Ok(payload)
    }

    /// Check that every required option is present. Runs once, at
    /// decorator construction.
    pub fn validate_options(&self, opts: &TransformOptions) -> Result<(), ConfigError> {
        for requirement in &self.requirements {
            if !opts.provides(requirement.option) {
                return Err(ConfigError::MissingOption {
                    option: requirement.option.to_string(),
                    transform: requirement.transform.to_string(),
                    axis: requirement.axis,
                });
            }
        }
        Ok(())
    }

    /// Union of required option names across all member transforms.
    pub fn required_options(&self) -> BTreeSet<&'static str> {
        self.requirements.iter().map(|r| r.option).collect()
    }

    /// Option-bag keys consumed by any stage; these are stripped before a
    /// bag is forwarded to the backend.
    pub fn consumed_option_keys(&self) -> &BTreeSet<&'static str> {
        &self.consumed
    }

    pub fn key_stage_count(&self) -> u32 {
        self.key_stages.len() as u32
    }

    pub fn value_stage_count(&self) -> u32 {
        self.value_stages.len() as u32
    }
}

fn resolve_chain<N: AsRef<str>>(
    registry: &Registry,
    names: &[N],
) -> Result<Vec<Arc<TransformSpec>>, ConfigError> {
    names
        .iter()
        .map(|name| registry.lookup(name.as_ref()))
        .collect()
}

impl Registry {
    /// Compile a (key-chain, value-chain) pair against this catalog.
    ///
    /// Check order: unknown names first, then value-chain reversibility,
    /// then applicability and token grammar per axis. Option presence is
    /// deliberately not checked here - it belongs to the decorator holding
    /// the options, via [`CompiledPipeline::validate_options`].
    pub fn compile<K: AsRef<str>, V: AsRef<str>>(
        &self,
        key_chain: &[K],
        value_chain: &[V],
    ) -> Result<CompiledPipeline, ConfigError> {
        let key_stages = resolve_chain(self, key_chain)?;
        let value_stages = resolve_chain(self, value_chain)?;

        for spec in &value_stages {
            if spec.irreversible() {
                return Err(ConfigError::IrreversibleInValueChain(spec.name.to_string()));
            }
        }

        grammar::validate_chain(Axis::Key, &key_stages)?;
        grammar::validate_chain(Axis::Value, &value_stages)?;

        let mut requirements = Vec::new();
        let mut consumed = BTreeSet::new();
        for (axis, stages) in [(Axis::Key, &key_stages), (Axis::Value, &value_stages)] {
            for spec in stages.iter() {
                for &option in spec.requires {
                    requirements.push(Requirement {
                        option,
                        transform: spec.name,
                        axis,
                    });
                    consumed.insert(option);
                }
            }
        }

        Ok(CompiledPipeline {
            key_stages,
            value_stages,
            requirements,
            consumed,
        })
    }

    /// Compile through this registry's chain cache.
    ///
    /// The first caller for a given chain tuple compiles and publishes
    /// under the cache lock; later callers (and concurrent racers) get the
    /// shared `Arc`. A poisoned cache falls back to uncached compilation
    /// rather than failing the construction.
    pub fn compile_cached<K: AsRef<str>, V: AsRef<str>>(
        &self,
        key_chain: &[K],
        value_chain: &[V],
    ) -> Result<Arc<CompiledPipeline>, ConfigError> {
        let cache_key: ChainKey = (
            key_chain.iter().map(|n| n.as_ref().to_owned()).collect(),
            value_chain.iter().map(|n| n.as_ref().to_owned()).collect(),
        );

        match self.chain_cache.lock() {
            Ok(mut cache) => {
                if let Some(pipeline) = cache.get(&cache_key) {
                    return Ok(Arc::clone(pipeline));
                }
                let compiled = Arc::new(self.compile(key_chain, value_chain)?);
                cache.insert(cache_key, Arc::clone(&compiled));
                Ok(compiled)
            }
            Err(_) => Ok(Arc::new(self.compile(key_chain, value_chain)?)),
        }
    }

    #[cfg(test)]
    pub(crate) fn cached_chain_count(&self) -> usize {
        self.chain_cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NO_KEYS: [&str; 0] = [];

    #[test]
    fn test_unknown_transform_fails_compilation() {
        let registry = Registry::with_builtins();
        let err = registry
            .compile(&["prefix", "bogus"], &NO_KEYS)
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownTransform("bogus".to_string()));
    }

    #[test]
    fn test_irreversible_in_value_chain_rejected() {
        let registry = Registry::with_builtins();
        let err = registry.compile(&NO_KEYS, &["digest"]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::IrreversibleInValueChain("digest".to_string())
        );
    }

    #[test]
    fn test_grammar_violation_rejected() {
        let registry = Registry::with_builtins();
        let err = registry
            .compile(&["digest", "prefix"], &NO_KEYS)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChainGrammar { .. }));
    }

    #[test]
    fn test_key_fold_order_and_reverse_decode() {
        let registry = Registry::with_builtins();
        let pipeline = registry.compile(&["prefix", "hex"], &NO_KEYS).unwrap();
        let opts = TransformOptions::new().with_prefix("app:");

        // prefix runs first, hex second.
        let encoded = pipeline.encode_key("a", &opts).unwrap();
        assert_eq!(encoded, hex::encode(b"app:a"));

        // decode unwinds in reverse order.
        assert_eq!(pipeline.decode_key(&encoded, &opts).unwrap(), "a");
    }

    #[test]
    fn test_irreversible_key_stage_passes_through_on_decode() {
        let registry = Registry::with_builtins();
        let pipeline = registry.compile(&["prefix", "digest"], &NO_KEYS).unwrap();
        let opts = TransformOptions::new().with_prefix("app:");

        let encoded = pipeline.encode_key("a", &opts).unwrap();
        // The digest is terminal and one-way: decoding yields the stored
        // digest itself (the prefix stage never sees its own output back).
        assert_eq!(pipeline.decode_key(&encoded, &opts).unwrap(), encoded);
    }

    #[test]
    fn test_value_roundtrip_through_serialize() {
        let registry = Registry::with_builtins();
        let pipeline = registry.compile(&NO_KEYS, &["serialize"]).unwrap();
        let opts = TransformOptions::new();

        let value = Payload::Json(json!({"x": 1}));
        let encoded = pipeline.encode_value(value.clone(), &opts).unwrap();
        assert!(matches!(encoded, Payload::Bytes(_)));
        assert_eq!(pipeline.decode_value(encoded, &opts).unwrap(), value);
    }

    #[cfg(all(feature = "compression", feature = "hmac"))]
    #[test]
    fn test_full_value_chain_roundtrip() {
        let registry = Registry::with_builtins();
        let pipeline = registry
            .compile(&NO_KEYS, &["serialize", "compress", "hmac"])
            .unwrap();
        let opts = TransformOptions::new().with_secret("s");

        let value = Payload::Json(json!(["a", {"b": 2}, null]));
        let encoded = pipeline.encode_value(value.clone(), &opts).unwrap();
        assert_eq!(pipeline.decode_value(encoded, &opts).unwrap(), value);
    }

    #[cfg(feature = "hmac")]
    #[test]
    fn test_missing_option_names_everything() {
        let registry = Registry::with_builtins();
        let pipeline = registry
            .compile(&NO_KEYS, &["serialize", "hmac"])
            .unwrap();

        let err = pipeline
            .validate_options(&TransformOptions::new())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingOption {
                option: "secret".to_string(),
                transform: "hmac".to_string(),
                axis: Axis::Value,
            }
        );
    }

    #[cfg(feature = "hmac")]
    #[test]
    fn test_required_and_consumed_options() {
        let registry = Registry::with_builtins();
        let pipeline = registry
            .compile(&["prefix", "truncate"], &["serialize", "hmac"])
            .unwrap();

        let required = pipeline.required_options();
        assert!(required.contains("prefix"));
        assert!(required.contains("max_key_length"));
        assert!(required.contains("secret"));
        assert_eq!(pipeline.consumed_option_keys(), &required);
    }

    #[test]
    fn test_cache_returns_shared_pipeline() {
        let registry = Registry::with_builtins();
        let first = registry
            .compile_cached(&["prefix"], &["serialize"])
            .unwrap();
        let second = registry
            .compile_cached(&["prefix"], &["serialize"])
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.cached_chain_count(), 1);

        let other = registry.compile_cached(&["hex"], &["serialize"]).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.cached_chain_count(), 2);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let registry = Registry::with_builtins();
        let a = registry.compile(&["prefix", "hex"], &["serialize"]).unwrap();
        let b = registry.compile(&["prefix", "hex"], &["serialize"]).unwrap();
        let opts = TransformOptions::new().with_prefix("app:");

        for key in ["", "a", "user/42", "日本語"] {
            assert_eq!(
                a.encode_key(key, &opts).unwrap(),
                b.encode_key(key, &opts).unwrap()
            );
        }
        let value = Payload::Json(json!({"n": [1, 2, 3]}));
        assert_eq!(
            a.encode_value(value.clone(), &opts).unwrap(),
            b.encode_value(value, &opts).unwrap()
        );
    }

    #[test]
    fn test_empty_chains_are_identity() {
        let registry = Registry::with_builtins();
        let pipeline = registry.compile(&NO_KEYS, &NO_KEYS).unwrap();
        let opts = TransformOptions::new();

        assert_eq!(pipeline.encode_key("k", &opts).unwrap(), "k");
        assert_eq!(pipeline.decode_key("k", &opts).unwrap(), "k");
        let bytes = Payload::Bytes(vec![1, 2, 3]);
        assert_eq!(pipeline.encode_value(bytes.clone(), &opts).unwrap(), bytes);
        assert_eq!(pipeline.decode_value(bytes.clone(), &opts).unwrap(), bytes);
    }
}
