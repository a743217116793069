//! Test fixtures and constants for storekit-core tests.

#![allow(dead_code)]

use std::sync::Mutex;

use serde_json::{json, Value};
use storekit_core::{Backend, MemoryBackend, MemoryBackendError, OptionBag, Payload};

// ============================================================================
// Common Test Data
// ============================================================================

/// Namespace used by prefix-chain scenarios
pub const APP_PREFIX: &str = "app:";

/// Secret used by hmac-chain scenarios
pub const TEST_SECRET: &str = "test-secret-material";

/// A structured value with a little bit of everything
pub fn sample_document() -> Value {
    json!({
        "x": 1,
        "name": "widget",
        "tags": ["a", "b"],
        "nested": {"ok": true, "count": 42}
    })
}

/// Highly compressible bytes
pub fn compressible_bytes(len: usize) -> Vec<u8> {
    vec![0x61; len]
}

/// Deterministic incompressible bytes (PCG, not crypto-secure)
pub fn incompressible_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = SimplePcg::new(seed);
    (0..len).map(|_| rng.next_byte()).collect()
}

struct SimplePcg {
    state: u64,
}

impl SimplePcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_byte(&mut self) -> u8 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let xor_shifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        (xor_shifted.rotate_right(rot) & 0xff) as u8
    }
}

// ============================================================================
// Recording Backend
// ============================================================================

/// A `MemoryBackend` wrapper that records the last id, value, and option
/// bag it received, so tests can assert what actually crossed the
/// decorator boundary.
#[derive(Default)]
pub struct SpyBackend {
    inner: MemoryBackend,
    last_id: Mutex<Option<String>>,
    last_value: Mutex<Option<Payload>>,
    last_bag: Mutex<Option<OptionBag>>,
}

impl SpyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_id(&self) -> Option<String> {
        self.last_id.lock().unwrap().clone()
    }

    pub fn last_value(&self) -> Option<Payload> {
        self.last_value.lock().unwrap().clone()
    }

    pub fn last_bag(&self) -> Option<OptionBag> {
        self.last_bag.lock().unwrap().clone()
    }

    fn record(&self, id: &str, value: Option<&Payload>, bag: &OptionBag) {
        *self.last_id.lock().unwrap() = Some(id.to_owned());
        *self.last_value.lock().unwrap() = value.cloned();
        *self.last_bag.lock().unwrap() = Some(bag.clone());
    }
}

impl Backend for SpyBackend {
    type Error = MemoryBackendError;

    fn exists(&self, id: &str, opts: &OptionBag) -> Result<bool, Self::Error> {
        self.record(id, None, opts);
        self.inner.exists(id, opts)
    }

    fn load(&self, id: &str, opts: &OptionBag) -> Result<Option<Payload>, Self::Error> {
        self.record(id, None, opts);
        self.inner.load(id, opts)
    }

    fn store(&self, id: &str, value: Payload, opts: &OptionBag) -> Result<(), Self::Error> {
        self.record(id, Some(&value), opts);
        self.inner.store(id, value, opts)
    }

    fn delete(&self, id: &str, opts: &OptionBag) -> Result<Option<Payload>, Self::Error> {
        self.record(id, None, opts);
        self.inner.delete(id, opts)
    }

    fn create(&self, id: &str, value: Payload, opts: &OptionBag) -> Result<bool, Self::Error> {
        self.record(id, Some(&value), opts);
        self.inner.create(id, value, opts)
    }

    fn increment(&self, id: &str, amount: i64, opts: &OptionBag) -> Result<i64, Self::Error> {
        self.record(id, None, opts);
        self.inner.increment(id, amount, opts)
    }

    fn clear(&self) -> Result<(), Self::Error> {
        self.inner.clear()
    }

    fn close(&self) -> Result<(), Self::Error> {
        self.inner.close()
    }

    fn iter_keys(&self) -> Box<dyn Iterator<Item = Result<String, Self::Error>> + '_> {
        self.inner.iter_keys()
    }

    fn iter_values(&self) -> Box<dyn Iterator<Item = Result<Payload, Self::Error>> + '_> {
        self.inner.iter_values()
    }

    fn iter_entries(
        &self,
    ) -> Box<dyn Iterator<Item = Result<(String, Payload), Self::Error>> + '_> {
        self.inner.iter_entries()
    }
}
