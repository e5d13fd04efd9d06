//! Bidirectional transforms between rich values and cache-storable shapes.
//!
//! The cache layer stores whatever the fetch function resolves with. When the
//! rich success type is not what should be stored (class-like values, types
//! with non-serializable internals), a [`Schema`] re-shapes it: `encode` on
//! the write path, `decode` on every read.
//!
//! Round-tripping is a caller obligation: `decode(encode(x))` must
//! reconstruct an equivalent `x`. A transform failure is not an application
//! error - it surfaces as a defect at the boundary where it happened.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// A schema transform failed in one direction.
#[derive(Debug, Error)]
#[error("schema transform failed: {message}")]
pub struct DecodeError {
    /// What went wrong, in terms a log reader can act on.
    pub message: String,
}

impl DecodeError {
    /// Create a decode error with a descriptive message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A bidirectional transform between a rich value and its stored wire shape.
///
/// `encode` runs once per successful fetch, before the value reaches the
/// cache. `decode` runs on every read out of the cache.
pub trait Schema<Rich>: Send + Sync {
    /// The shape the cache stores. Cloned on every read.
    type Wire: Clone + Send + Sync + 'static;

    /// Re-shape a rich value for storage.
    fn encode(&self, rich: Rich) -> Result<Self::Wire, DecodeError>;

    /// Reconstruct the rich value from its stored shape.
    fn decode(&self, wire: Self::Wire) -> Result<Rich, DecodeError>;
}

/// The no-transform schema: wire and rich are the same type, both
/// directions are identity. This is the default when a descriptor has no
/// schema configured.
pub struct IdentitySchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> IdentitySchema<T> {
    /// Create the identity schema.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for IdentitySchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for IdentitySchema<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for IdentitySchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySchema").finish()
    }
}

impl<T> Schema<T> for IdentitySchema<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Wire = T;

    fn encode(&self, rich: T) -> Result<T, DecodeError> {
        Ok(rich)
    }

    fn decode(&self, wire: T) -> Result<T, DecodeError> {
        Ok(wire)
    }
}

/// A schema that stores values as `serde_json::Value`.
///
/// The stored shape is plain, inspectable, and independent of the rich
/// type's in-memory representation.
pub struct JsonSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSchema<T> {
    /// Create the JSON schema.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSchema<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonSchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchema").finish()
    }
}

impl<T> Schema<T> for JsonSchema<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Wire = serde_json::Value;

    fn encode(&self, rich: T) -> Result<serde_json::Value, DecodeError> {
        serde_json::to_value(&rich)
            .map_err(|e| DecodeError::new(format!("serialize for storage: {e}")))
    }

    fn decode(&self, wire: serde_json::Value) -> Result<T, DecodeError> {
        serde_json::from_value(wire)
            .map_err(|e| DecodeError::new(format!("reconstruct from storage: {e}")))
    }
}
