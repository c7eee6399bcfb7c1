//! Runtime configuration.
//!
//! Configuration is per runtime (one runtime per thread) and installed with
//! [`Runtime::configure`](crate::Runtime::configure). Every field has a
//! default, so a partial JSON document is enough:
//!
//! ```rust
//! use trellis_core::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_json(r#"{ "catch_panics": false }"#).unwrap();
//! assert!(!config.catch_panics);
//! assert!(config.eager_observed_bindings);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for the binding graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RuntimeConfig {
    /// Refresh a dirtied binding right away when its change signal has
    /// listeners. When disabled every binding stays dirty until read.
    pub eager_observed_bindings: bool,

    /// Emit a `tracing` warning for each detected binding loop.
    pub report_binding_loops: bool,

    /// Catch panics raised by bindings and signal handlers and treat them
    /// like errors. Disable to let panics unwind to the caller.
    pub catch_panics: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            eager_observed_bindings: true,
            report_binding_loops: true,
            catch_panics: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn fields_override_defaults() {
        let config =
            RuntimeConfig::from_json(r#"{ "eager_observed_bindings": false }"#).unwrap();
        assert!(!config.eager_observed_bindings);
        assert!(config.report_binding_loops);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(RuntimeConfig::from_json("{ not json").is_err());
    }
}
