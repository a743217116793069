//! In-memory reference backend.
//!
//! A `BTreeMap` behind a `RwLock`: enough for tests, examples, and small
//! embedded uses. Iteration snapshots the map under the read lock, so the
//! yielded sequences are finite, in key order, and unaffected by writes
//! that happen mid-iteration.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::Value;
use thiserror::Error;

use crate::options::OptionBag;
use crate::payload::Payload;
use crate::store::Backend;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryBackendError {
    #[error("value at `{0}` is not an integer counter")]
    NotACounter(String),

    #[error("backend lock poisoned")]
    Poisoned,
}

/// Reference [`Backend`] storing encoded entries in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slots: RwLock<BTreeMap<String, Payload>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.read().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Backend for MemoryBackend {
    type Error = MemoryBackendError;

    fn exists(&self, id: &str, _opts: &OptionBag) -> Result<bool, Self::Error> {
        let slots = self.slots.read().map_err(|_| MemoryBackendError::Poisoned)?;
        Ok(slots.contains_key(id))
    }

    fn load(&self, id: &str, _opts: &OptionBag) -> Result<Option<Payload>, Self::Error> {
        let slots = self.slots.read().map_err(|_| MemoryBackendError::Poisoned)?;
        Ok(slots.get(id).cloned())
    }

    fn store(&self, id: &str, value: Payload, _opts: &OptionBag) -> Result<(), Self::Error> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| MemoryBackendError::Poisoned)?;
        slots.insert(id.to_owned(), value);
        Ok(())
    }

    fn delete(&self, id: &str, _opts: &OptionBag) -> Result<Option<Payload>, Self::Error> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| MemoryBackendError::Poisoned)?;
        Ok(slots.remove(id))
    }

    fn create(&self, id: &str, value: Payload, _opts: &OptionBag) -> Result<bool, Self::Error> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| MemoryBackendError::Poisoned)?;
        if slots.contains_key(id) {
            return Ok(false);
        }
        slots.insert(id.to_owned(), value);
        Ok(true)
    }

    fn increment(&self, id: &str, amount: i64, _opts: &OptionBag) -> Result<i64, Self::Error> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| MemoryBackendError::Poisoned)?;
        let current = match slots.get(id) {
            None => 0,
            Some(Payload::Json(Value::Number(n))) => n
                .as_i64()
                .ok_or_else(|| MemoryBackendError::NotACounter(id.to_owned()))?,
            Some(_) => return Err(MemoryBackendError::NotACounter(id.to_owned())),
        };
        let next = current + amount;
        slots.insert(id.to_owned(), Payload::Json(Value::from(next)));
        Ok(next)
    }

    fn clear(&self) -> Result<(), Self::Error> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| MemoryBackendError::Poisoned)?;
        slots.clear();
        Ok(())
    }

    fn close(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn iter_keys(&self) -> Box<dyn Iterator<Item = Result<String, Self::Error>> + '_> {
        match self.slots.read() {
            Ok(slots) => Box::new(slots.keys().cloned().collect::<Vec<_>>().into_iter().map(Ok)),
            Err(_) => Box::new(std::iter::once(Err(MemoryBackendError::Poisoned))),
        }
    }

    fn iter_values(&self) -> Box<dyn Iterator<Item = Result<Payload, Self::Error>> + '_> {
        match self.slots.read() {
            Ok(slots) => Box::new(
                slots
                    .values()
                    .cloned()
                    .collect::<Vec<_>>()
                    .into_iter()
                    .map(Ok),
            ),
            Err(_) => Box::new(std::iter::once(Err(MemoryBackendError::Poisoned))),
        }
    }

    fn iter_entries(
        &self,
    ) -> Box<dyn Iterator<Item = Result<(String, Payload), Self::Error>> + '_> {
        match self.slots.read() {
            Ok(slots) => Box::new(
                slots
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Vec<_>>()
                    .into_iter()
                    .map(Ok),
            ),
            Err(_) => Box::new(std::iter::once(Err(MemoryBackendError::Poisoned))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag() -> OptionBag {
        OptionBag::new()
    }

    #[test]
    fn test_store_load_delete() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.load("k", &bag()).unwrap(), None);

        backend
            .store("k", Payload::Bytes(vec![1, 2]), &bag())
            .unwrap();
        assert!(backend.exists("k", &bag()).unwrap());
        assert_eq!(
            backend.load("k", &bag()).unwrap(),
            Some(Payload::Bytes(vec![1, 2]))
        );

        assert_eq!(
            backend.delete("k", &bag()).unwrap(),
            Some(Payload::Bytes(vec![1, 2]))
        );
        assert_eq!(backend.delete("k", &bag()).unwrap(), None);
        assert!(!backend.exists("k", &bag()).unwrap());
    }

    #[test]
    fn test_create_inserts_only_when_absent() {
        let backend = MemoryBackend::new();
        assert!(backend.create("k", Payload::Bytes(vec![1]), &bag()).unwrap());
        assert!(!backend.create("k", Payload::Bytes(vec![2]), &bag()).unwrap());
        assert_eq!(
            backend.load("k", &bag()).unwrap(),
            Some(Payload::Bytes(vec![1]))
        );
    }

    #[test]
    fn test_increment_from_absent_and_existing() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.increment("hits", 3, &bag()).unwrap(), 3);
        assert_eq!(backend.increment("hits", -1, &bag()).unwrap(), 2);
    }

    #[test]
    fn test_increment_rejects_non_counter() {
        let backend = MemoryBackend::new();
        backend
            .store("k", Payload::Json(json!("text")), &bag())
            .unwrap();
        assert_eq!(
            backend.increment("k", 1, &bag()),
            Err(MemoryBackendError::NotACounter("k".to_string()))
        );
    }

    #[test]
    fn test_iteration_is_ordered_snapshot() {
        let backend = MemoryBackend::new();
        for key in ["b", "a", "c"] {
            backend
                .store(key, Payload::Bytes(key.as_bytes().to_vec()), &bag())
                .unwrap();
        }

        let keys: Vec<String> = backend.iter_keys().map(Result::unwrap).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        let entries: Vec<(String, Payload)> =
            backend.iter_entries().map(Result::unwrap).collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, "a");
    }

    #[test]
    fn test_clear_empties_the_map() {
        let backend = MemoryBackend::new();
        backend.store("k", Payload::Bytes(vec![1]), &bag()).unwrap();
        backend.clear().unwrap();
        assert!(backend.is_empty());
    }
}
