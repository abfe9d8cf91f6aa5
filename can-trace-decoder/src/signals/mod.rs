//! Signal catalogs and DBC/ARXML parsers
//!
//! This module contains parsers for signal definition files (DBC, ARXML)
//! and the in-memory catalog they produce.

pub mod arxml;
pub mod database;
pub mod dbc;

use crate::types::{DecoderError, Result};
use std::path::Path;
use std::sync::Arc;

// Re-export key types for convenience
pub use database::{
    ByteOrder, MessageDefinition, SignalCatalog, SignalDatabase, SignalDefinition, SignalNode,
    ValueType,
};

/// Load a signal catalog, choosing the parser from the file extension
pub fn load_catalog(path: &Path) -> Result<Arc<dyn SignalCatalog>> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());

    match extension.as_deref() {
        Some("dbc") => Ok(Arc::new(dbc::load_dbc_file(path)?)),
        Some("arxml") | Some("xml") => Ok(Arc::new(arxml::load_arxml_file(path)?)),
        _ => Err(DecoderError::Configuration(format!(
            "unsupported database format: {:?}",
            path
        ))),
    }
}
