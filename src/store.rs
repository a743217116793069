//! The store decorator: a backend's operation surface with a compiled
//! transformation pipeline interposed.
//!
//! A [`Store`] owns a backend and one [`CompiledPipeline`] fixed at
//! construction. Writes encode keys and (unless raw) values on the way in;
//! reads decode on the way out. All configuration problems - unknown
//! transforms, grammar violations, missing options - surface from the
//! constructor, before the backend sees a single call.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Deserialize;
use thiserror::Error;

use crate::metrics::OperationMetrics;
use crate::options::{backend_options, CallOptions, OptionBag, TransformOptions};
use crate::payload::Payload;
use crate::pipeline::CompiledPipeline;
use crate::transform::{default_registry, ConfigError, Registry, TransformError};

/// Operation contract a storage engine must implement.
///
/// Backends operate on already-encoded keys and values and know nothing of
/// the pipeline above them. Each method receives the caller's option bag
/// with pipeline-only keys already stripped. Atomicity of [`Backend::create`]
/// is a backend property; this layer adds no concurrency guarantees.
pub trait Backend {
    type Error: std::error::Error + Send + Sync + 'static;

    fn exists(&self, id: &str, opts: &OptionBag) -> Result<bool, Self::Error>;

    /// Absent is `None`, never an error.
    fn load(&self, id: &str, opts: &OptionBag) -> Result<Option<Payload>, Self::Error>;

    fn store(&self, id: &str, value: Payload, opts: &OptionBag) -> Result<(), Self::Error>;

    /// Remove and return the prior value, if any.
    fn delete(&self, id: &str, opts: &OptionBag) -> Result<Option<Payload>, Self::Error>;

    /// Atomic insert-if-absent; returns whether the insert happened.
    fn create(&self, id: &str, value: Payload, opts: &OptionBag) -> Result<bool, Self::Error>;

    fn increment(&self, id: &str, amount: i64, opts: &OptionBag) -> Result<i64, Self::Error>;

    fn clear(&self) -> Result<(), Self::Error>;

    fn close(&self) -> Result<(), Self::Error>;

    fn iter_keys(&self) -> Box<dyn Iterator<Item = Result<String, Self::Error>> + '_>;

    fn iter_values(&self) -> Box<dyn Iterator<Item = Result<Payload, Self::Error>> + '_>;

    fn iter_entries(&self)
        -> Box<dyn Iterator<Item = Result<(String, Payload), Self::Error>> + '_>;
}

/// Runtime errors surfaced by a [`Store`].
///
/// Backend failures pass through unmodified; pipeline failures are split
/// into corruption (decode of backend-returned data failed) and rejected
/// input (encode failed).
#[derive(Debug, Error)]
pub enum StoreError<E: std::error::Error> {
    /// A stored payload (or enumerated key) failed to decode - tampering,
    /// bit rot, or a foreign writer.
    #[error("corrupt stored value: {0}")]
    CorruptValue(TransformError),

    /// The input could not be encoded.
    #[error("encode failed: {0}")]
    Encode(TransformError),

    #[error(transparent)]
    Backend(E),
}

/// Construction-time configuration for a [`Store`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Ordered transform names applied to keys.
    pub key_chain: Vec<String>,
    /// Ordered transform names applied to values.
    pub value_chain: Vec<String>,
    /// Options required by member transforms.
    pub options: TransformOptions,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_chain<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.key_chain = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value_chain<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.value_chain = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = Some(prefix.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<crate::options::Secret>) -> Self {
        self.options.secret = Some(secret.into());
        self
    }

    pub fn with_max_key_length(mut self, max: usize) -> Self {
        self.options.max_key_length = Some(max);
        self
    }
}

/// Backend decorator applying a compiled pipeline around every operation.
#[derive(Debug)]
pub struct Store<B: Backend> {
    backend: B,
    pipeline: Arc<CompiledPipeline>,
    options: TransformOptions,
    /// Last operation metrics (interior mutability for observability)
    last_metrics: Arc<Mutex<OperationMetrics>>,
}

impl<B: Backend> Store<B> {
    /// Build a store against the built-in transform catalog.
    pub fn new(backend: B, config: StoreConfig) -> Result<Self, ConfigError> {
        Self::with_registry(backend, config, default_registry())
    }

    /// Build a store against a caller-supplied transform catalog.
    ///
    /// Compilation goes through the registry's chain cache; identical chain
    /// tuples share one compiled pipeline. Every configuration error in
    /// the taxonomy surfaces here.
    pub fn with_registry(
        backend: B,
        config: StoreConfig,
        registry: &Registry,
    ) -> Result<Self, ConfigError> {
        let pipeline = registry.compile_cached(&config.key_chain, &config.value_chain)?;
        pipeline.validate_options(&config.options)?;
        Ok(Store {
            backend,
            pipeline,
            options: config.options,
            last_metrics: Arc::new(Mutex::new(OperationMetrics::new())),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn pipeline(&self) -> &CompiledPipeline {
        &self.pipeline
    }

    /// Get metrics from the most recent operation
    pub fn get_last_metrics(&self) -> OperationMetrics {
        self.last_metrics
            .lock()
            .map(|metrics| metrics.clone())
            .unwrap_or_else(|_| OperationMetrics::new())
    }

    fn raw(opts: Option<&CallOptions>) -> bool {
        opts.map(|o| o.raw).unwrap_or(false)
    }

    fn bag(&self, opts: Option<&CallOptions>) -> OptionBag {
        backend_options(opts, self.pipeline.consumed_option_keys())
    }

    fn encode_key_timed(&self, key: &str) -> Result<(String, u64), StoreError<B::Error>> {
        let start = Instant::now();
        let id = self
            .pipeline
            .encode_key(key, &self.options)
            .map_err(StoreError::Encode)?;
        Ok((id, start.elapsed().as_micros() as u64))
    }

    fn record(&self, metrics: OperationMetrics) {
        if let Ok(mut slot) = self.last_metrics.lock() {
            *slot = metrics;
        }
    }

    /// Whether a key is present.
    pub fn exists(&self, key: &str, opts: Option<&CallOptions>) -> Result<bool, StoreError<B::Error>> {
        let (id, key_micros) = self.encode_key_timed(key)?;
        let bag = self.bag(opts);
        self.record(
            OperationMetrics::new().with_key(key_micros, self.pipeline.key_stage_count()),
        );
        self.backend.exists(&id, &bag).map_err(StoreError::Backend)
    }

    /// Write a value, returning the original (untransformed) value.
    pub fn put(
        &self,
        key: &str,
        value: Payload,
        opts: Option<&CallOptions>,
    ) -> Result<Payload, StoreError<B::Error>> {
        let (id, key_micros) = self.encode_key_timed(key)?;

        let start = Instant::now();
        let (stored, value_stages) = if Self::raw(opts) {
            (value.clone(), 0)
        } else {
            let encoded = self
                .pipeline
                .encode_value(value.clone(), &self.options)
                .map_err(StoreError::Encode)?;
            (encoded, self.pipeline.value_stage_count())
        };
        let value_micros = start.elapsed().as_micros() as u64;
        self.record(
            OperationMetrics::new()
                .with_key(key_micros, self.pipeline.key_stage_count())
                .with_value(value_micros, value_stages, stored.byte_len()),
        );

        let bag = self.bag(opts);
        self.backend
            .store(&id, stored, &bag)
            .map_err(StoreError::Backend)?;
        Ok(value)
    }

    /// Insert-if-absent; returns whether the insert happened. Atomicity is
    /// the backend's, not added here.
    pub fn create(
        &self,
        key: &str,
        value: Payload,
        opts: Option<&CallOptions>,
    ) -> Result<bool, StoreError<B::Error>> {
        let (id, _) = self.encode_key_timed(key)?;
        let stored = if Self::raw(opts) {
            value
        } else {
            self.pipeline
                .encode_value(value, &self.options)
                .map_err(StoreError::Encode)?
        };
        let bag = self.bag(opts);
        self.backend
            .create(&id, stored, &bag)
            .map_err(StoreError::Backend)
    }

    /// Read a key. Absent propagates as `None`, never as an error.
    pub fn get(
        &self,
        key: &str,
        opts: Option<&CallOptions>,
    ) -> Result<Option<Payload>, StoreError<B::Error>> {
        let (id, key_micros) = self.encode_key_timed(key)?;
        let bag = self.bag(opts);
        let loaded = self.backend.load(&id, &bag).map_err(StoreError::Backend)?;
        self.decode_loaded(loaded, key_micros, opts)
    }

    /// Remove a key, returning its prior value decoded (unless raw).
    pub fn delete(
        &self,
        key: &str,
        opts: Option<&CallOptions>,
    ) -> Result<Option<Payload>, StoreError<B::Error>> {
        let (id, key_micros) = self.encode_key_timed(key)?;
        let bag = self.bag(opts);
        let removed = self
            .backend
            .delete(&id, &bag)
            .map_err(StoreError::Backend)?;
        self.decode_loaded(removed, key_micros, opts)
    }

    fn decode_loaded(
        &self,
        loaded: Option<Payload>,
        key_micros: u64,
        opts: Option<&CallOptions>,
    ) -> Result<Option<Payload>, StoreError<B::Error>> {
        let Some(payload) = loaded else {
            self.record(
                OperationMetrics::new().with_key(key_micros, self.pipeline.key_stage_count()),
            );
            return Ok(None);
        };
        if Self::raw(opts) {
            self.record(
                OperationMetrics::new().with_key(key_micros, self.pipeline.key_stage_count()),
            );
            return Ok(Some(payload));
        }

        let start = Instant::now();
        let decoded = self
            .pipeline
            .decode_value(payload, &self.options)
            .map_err(StoreError::CorruptValue)?;
        self.record(
            OperationMetrics::new()
                .with_key(key_micros, self.pipeline.key_stage_count())
                .with_value(
                    start.elapsed().as_micros() as u64,
                    self.pipeline.value_stage_count(),
                    decoded.byte_len(),
                ),
        );
        Ok(Some(decoded))
    }

    /// Add to an integer slot; the value axis is untouched.
    pub fn increment(
        &self,
        key: &str,
        amount: i64,
        opts: Option<&CallOptions>,
    ) -> Result<i64, StoreError<B::Error>> {
        let (id, _) = self.encode_key_timed(key)?;
        let bag = self.bag(opts);
        self.backend
            .increment(&id, amount, &bag)
            .map_err(StoreError::Backend)
    }

    pub fn clear(&self) -> Result<(), StoreError<B::Error>> {
        self.backend.clear().map_err(StoreError::Backend)
    }

    pub fn close(&self) -> Result<(), StoreError<B::Error>> {
        self.backend.close().map_err(StoreError::Backend)
    }

    /// Lazily enumerate keys at the semantic level, in backend order.
    pub fn iter_keys(&self) -> impl Iterator<Item = Result<String, StoreError<B::Error>>> + '_ {
        self.backend.iter_keys().map(move |item| {
            item.map_err(StoreError::Backend).and_then(|id| {
                self.pipeline
                    .decode_key(&id, &self.options)
                    .map_err(StoreError::CorruptValue)
            })
        })
    }

    /// Lazily enumerate values, decoding each exactly once.
    ///
    /// Raw bypass is not supported for enumeration; values are always
    /// decoded.
    pub fn iter_values(&self) -> impl Iterator<Item = Result<Payload, StoreError<B::Error>>> + '_ {
        self.backend.iter_values().map(move |item| {
            item.map_err(StoreError::Backend).and_then(|payload| {
                self.pipeline
                    .decode_value(payload, &self.options)
                    .map_err(StoreError::CorruptValue)
            })
        })
    }

    /// Lazily enumerate entries, decoding each pair exactly once, in
    /// backend order. Raw bypass is not supported for enumeration.
    pub fn iter_entries(
        &self,
    ) -> impl Iterator<Item = Result<(String, Payload), StoreError<B::Error>>> + '_ {
        self.backend.iter_entries().map(move |item| {
            item.map_err(StoreError::Backend).and_then(|(id, payload)| {
                let key = self
                    .pipeline
                    .decode_key(&id, &self.options)
                    .map_err(StoreError::CorruptValue)?;
                let value = self
                    .pipeline
                    .decode_value(payload, &self.options)
                    .map_err(StoreError::CorruptValue)?;
                Ok((key, value))
            })
        })
    }

    /// Materialized [`Store::iter_keys`].
    pub fn keys(&self) -> Result<Vec<String>, StoreError<B::Error>> {
        self.iter_keys().collect()
    }

    /// Materialized [`Store::iter_values`].
    pub fn values(&self) -> Result<Vec<Payload>, StoreError<B::Error>> {
        self.iter_values().collect()
    }

    /// Materialized [`Store::iter_entries`].
    pub fn entries(&self) -> Result<Vec<(String, Payload)>, StoreError<B::Error>> {
        self.iter_entries().collect()
    }
}
