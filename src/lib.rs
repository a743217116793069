//! # storekit-core
//!
//! Chain-compiled key/value transformation pipelines in front of pluggable
//! storage backends.
//!
//! Configure an ordered chain of named transforms per axis (key, value);
//! the chain is validated against an ordering grammar and compiled once
//! into stage lists that every operation folds over. The resulting store
//! decorator exposes the backend's full operation surface at the
//! untransformed level: encode on the way in, decode on the way out, with
//! a per-call raw bypass for values.
//!
//! ## Features
//!
//! | Feature | Description | Default |
//! |:--------|:------------|:-------:|
//! | `compression` | LZ4 value stage via `lz4_flex` + xxHash3 frame checks | Yes |
//! | `hmac` | HMAC-SHA256 authenticating wrap via `ring` | Yes |
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use storekit_core::{MemoryBackend, Payload, Store, StoreConfig};
//!
//! let config = StoreConfig::new()
//!     .with_key_chain(["prefix"])
//!     .with_value_chain(["serialize"])
//!     .with_prefix("app:");
//!
//! let store = Store::new(MemoryBackend::new(), config).unwrap();
//!
//! // The backend sees key "app:greeting" and MessagePack bytes.
//! store
//!     .put("greeting", Payload::Json(json!({"text": "hi"})), None)
//!     .unwrap();
//!
//! assert_eq!(
//!     store.get("greeting", None).unwrap(),
//!     Some(Payload::Json(json!({"text": "hi"})))
//! );
//! ```
//!
//! ## With Tamper Detection
//!
//! ```rust,ignore
//! use storekit_core::{MemoryBackend, Payload, Store, StoreConfig};
//!
//! let config = StoreConfig::new()
//!     .with_value_chain(["serialize", "compress", "hmac"])
//!     .with_secret("use a real secret in production");
//!
//! let store = Store::new(MemoryBackend::new(), config)?;
//! // A flipped byte in the backend now surfaces as StoreError::CorruptValue
//! // on read, never as tampered data.
//! ```
//!
//! ## Guarantees
//!
//! - **Fail-fast configuration**: unknown transforms, grammar violations,
//!   missing options, and irreversible transforms in value chains are all
//!   rejected at construction, before any backend I/O.
//! - **Round-trip correctness**: decode is the exact left-inverse of encode
//!   for every reversible chain.
//! - **Specialize once**: chains compile to stage lists once per registry
//!   and are shared; the hot path never re-walks the catalog.
//! - **Concurrency**: compiled pipelines hold no mutable state and may be
//!   invoked from any number of threads.

// Metrics and observability
pub mod metrics;
pub use metrics::OperationMetrics;

// Semantic payloads crossing the pipeline
pub mod payload;
pub use payload::Payload;

// Typed transform configuration and per-call options
pub mod options;
pub use options::{CallOptions, OptionBag, Secret, TransformOptions};

// Transform catalog and built-ins
pub mod transform;
pub use transform::{
    default_registry, Applicability, Axis, ConfigError, Registry, Token, TransformError,
    TransformSpec,
};

// Chain grammar (internal: validation runs inside compilation)
mod grammar;

// Chain compilation
pub mod pipeline;
pub use pipeline::CompiledPipeline;

// The store decorator and backend contract
pub mod store;
pub use store::{Backend, Store, StoreConfig, StoreError};

// In-memory reference backend
pub mod memory;
pub use memory::{MemoryBackend, MemoryBackendError};
