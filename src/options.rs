//! Typed transform configuration and the per-call option surface.
//!
//! The original options bag is split in two: [`TransformOptions`] holds the
//! construction-time values individual transforms declare as required
//! (validated once, when the decorator is built), and [`CallOptions`] holds
//! the per-call `raw` flag plus a free-form bag that is forwarded to the
//! backend after pipeline-only keys are filtered out.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Per-call key for the raw-bypass flag when supplied through a loose bag.
pub(crate) const RAW_KEY: &str = "raw";

/// Free-form option bag forwarded to backends.
pub type OptionBag = BTreeMap<String, serde_json::Value>;

/// MAC key material.
///
/// Zeroized on drop, and `Debug` never prints the bytes. `Clone` is kept so
/// configuration structs stay composable; the clone zeroizes independently.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(material: impl Into<Vec<u8>>) -> Self {
        Secret(material.into())
    }

    /// Borrow the raw key material for signing and verification.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl From<&str> for Secret {
    fn from(material: &str) -> Self {
        Secret(material.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Secret {
    fn from(material: &[u8]) -> Self {
        Secret(material.to_vec())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let material = String::deserialize(deserializer)?;
        Ok(Secret(material.into_bytes()))
    }
}

/// Construction-time options recognized by the built-in transforms.
///
/// Each field is required only by the transforms that declare it; the
/// pipeline compiler checks presence once, at decorator construction.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Namespace prepended to every key (`prefix` transform).
    pub prefix: Option<String>,

    /// MAC key material (`hmac` transform).
    pub secret: Option<Secret>,

    /// Upper bound on encoded key length in bytes (`truncate` transform).
    pub max_key_length: Option<usize>,
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<Secret>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_max_key_length(mut self, max: usize) -> Self {
        self.max_key_length = Some(max);
        self
    }

    /// Whether the named option carries a value.
    pub(crate) fn provides(&self, option: &str) -> bool {
        match option {
            "prefix" => self.prefix.is_some(),
            "secret" => self.secret.is_some(),
            "max_key_length" => self.max_key_length.is_some(),
            _ => false,
        }
    }
}

/// Per-call options accepted by every decorator operation.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Bypass value encode/decode for this call. Keys are always
    /// transformed: the transformed key is the addressing identifier.
    pub raw: bool,

    /// Extra keys passed through to the backend after filtering.
    pub extra: OptionBag,
}

impl CallOptions {
    /// Options requesting the raw-bypass path.
    pub fn raw() -> Self {
        CallOptions {
            raw: true,
            ..CallOptions::default()
        }
    }

    /// Attach a pass-through key for the backend.
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Build the bag forwarded to the backend: the caller's extra keys minus
/// the raw flag and every option key consumed by a pipeline stage.
pub(crate) fn backend_options(
    opts: Option<&CallOptions>,
    consumed: &BTreeSet<&'static str>,
) -> OptionBag {
    let mut bag = opts.map(|o| o.extra.clone()).unwrap_or_default();
    bag.remove(RAW_KEY);
    for key in consumed {
        bag.remove(*key);
    }
    bag
}
