//! Decoder configuration types
//!
//! The configuration names the trace files to decode and the signal catalogs to
//! decode them with. Both lists must be non-empty; validation happens before any
//! catalog is loaded or any trace is opened.

use crate::types::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the decoder library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Trace files to decode, in order
    #[serde(default)]
    pub inputs: Vec<PathBuf>,

    /// Signal catalogs (DBC/ARXML); earlier files win on duplicate frame IDs
    #[serde(default)]
    pub databases: Vec<PathBuf>,
}

impl DecoderConfig {
    /// Create a new, empty decoder configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a trace file
    pub fn add_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    /// Builder method: add a signal catalog
    pub fn add_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.databases.push(path.into());
        self
    }

    /// Check that both lists are non-empty
    pub fn validate(&self) -> Result<()> {
        Self::require_non_empty("inputs", &self.inputs)?;
        Self::require_non_empty("databases", &self.databases)
    }

    fn require_non_empty(key: &str, list: &[PathBuf]) -> Result<()> {
        if list.is_empty() {
            return Err(DecoderError::Configuration(format!(
                "expecting `{}` to not be of length zero",
                key
            )));
        }
        Ok(())
    }
}
