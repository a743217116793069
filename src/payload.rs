//! Semantic value representation crossing the pipeline.
//!
//! Values enter the decorator either as structured JSON or as raw octets.
//! Serialization stages move between the two forms; compression and MAC
//! stages operate on octets only. Keys travel as plain `String`s because a
//! key chain's final output must remain a primitive, comparable backend
//! identifier.

use serde_json::Value;

/// A value on the value axis of the pipeline.
///
/// `Json` is the untransformed (semantic) form; `Bytes` is what byte-level
/// stages produce and what backends ultimately persist. Stage functions are
/// pure `Payload -> Payload` maps; a stage handed the wrong variant reports
/// a payload type mismatch instead of panicking.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured value (maps, arrays, numbers, strings, booleans, null).
    Json(Value),
    /// Raw octets.
    Bytes(Vec<u8>),
}

impl Payload {
    /// Borrow the structured form, if this payload is structured.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Bytes(_) => None,
        }
    }

    /// Borrow the raw octets, if this payload is byte-valued.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Json(_) => None,
            Payload::Bytes(bytes) => Some(bytes),
        }
    }

    /// Byte length when byte-valued, used for size accounting.
    pub fn byte_len(&self) -> Option<u64> {
        self.as_bytes().map(|b| b.len() as u64)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}
