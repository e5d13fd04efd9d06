//! Structured error types for sluice.
//!
//! `SluiceError` covers the configuration and lifecycle failures of the
//! adapter itself. It deliberately does NOT cover effect failures - those
//! travel as a structured [`Cause`](crate::Cause) through the cache layer's
//! error channel and never collapse into this enum.
//!
//! # The Error Boundary Rule
//!
//! > **`anyhow::Error` is internal transport; `SluiceError` and `Cause` are
//! > the only externalized errors.**
//!
//! - Layer builders and defects use `anyhow` for ergonomics
//! - Everything the caller matches on is a pattern-matchable enum
//!
//! # Example
//!
//! ```ignore
//! match scope.runtime() {
//!     Ok(rt) => rt,
//!     Err(SluiceError::ScopeNotMounted) => panic!("hook used outside a provider"),
//!     Err(e) => return Err(e),
//! }
//! ```

use thiserror::Error;

/// Structured error type for sluice configuration and lifecycle operations.
///
/// These are programming or environment errors, not effect outcomes. An
/// effect that fails produces a `Cause`, never a `SluiceError`.
#[derive(Debug, Error)]
pub enum SluiceError {
    /// A hook was called on a scope that was never mounted.
    ///
    /// This is a configuration error: the caller forgot to mount a provider
    /// scope before using it. It is raised synchronously and is not a
    /// runtime condition to recover from.
    #[error("runtime scope has not been mounted; mount a provider before using hooks")]
    ScopeNotMounted,

    /// A hook was called on a scope that has already been unmounted.
    ///
    /// `Disposed` is terminal; scopes never resurrect a runtime.
    #[error("runtime scope has been disposed; hooks cannot outlive their provider")]
    ScopeDisposed,

    /// The runtime handle was used after `dispose()`.
    #[error("runtime has been disposed; capabilities are no longer available")]
    RuntimeDisposed,

    /// Building the capability set described by a layer failed.
    ///
    /// This is fatal to the owning scope. Retry policy, if any, belongs to
    /// the caller - sluice never retries capability construction.
    #[error("failed to build layer {layer}: {source}")]
    LayerBuild {
        /// The identity key of the layer that failed.
        layer: String,
        /// The underlying build error.
        source: anyhow::Error,
    },

    /// A registry entry exists under this layer key but holds a different
    /// capability type.
    ///
    /// Two layers sharing a key must construct the same capability type;
    /// anything else is a wiring bug.
    #[error("capability registry entry for layer {layer} holds a different type")]
    CapabilityTypeConflict {
        /// The identity key of the conflicting layer.
        layer: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_not_mounted_display() {
        let err = SluiceError::ScopeNotMounted;
        assert!(err.to_string().contains("not been mounted"));
    }

    #[test]
    fn test_layer_build_display() {
        let err = SluiceError::LayerBuild {
            layer: "database".into(),
            source: anyhow::anyhow!("connection refused"),
        };
        assert!(err.to_string().contains("database"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_is_pattern_matchable() {
        let err = SluiceError::CapabilityTypeConflict {
            layer: "client".into(),
        };
        match &err {
            SluiceError::CapabilityTypeConflict { layer } => assert_eq!(layer, "client"),
            _ => panic!("expected CapabilityTypeConflict"),
        }
    }

    #[test]
    fn test_error_can_be_downcast_from_anyhow() {
        let err: anyhow::Error = SluiceError::RuntimeDisposed.into();
        assert!(err.downcast_ref::<SluiceError>().is_some());
    }
}
