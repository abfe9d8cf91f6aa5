//! Main decoder API
//!
//! This module provides the primary interface for the decoder library.
//! A [`Decoder`] validates a configuration, builds the schema registry once and
//! opens one trace iterator per input file against it.

use crate::config::DecoderConfig;
use crate::schema::SchemaRegistry;
use crate::trace::TraceIterator;
use crate::types::Result;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// The main decoder struct - entry point for all decoding operations
pub struct Decoder {
    registry: SchemaRegistry,
    inputs: Vec<PathBuf>,
}

impl Decoder {
    /// Validate the configuration and build the schema registry
    ///
    /// # Example
    /// ```no_run
    /// use can_trace_decoder::{Decoder, DecoderConfig};
    ///
    /// let config = DecoderConfig::new()
    ///     .add_database("powertrain.dbc")
    ///     .add_input("trace.bin");
    /// let decoder = Decoder::from_config(&config).unwrap();
    /// ```
    pub fn from_config(config: &DecoderConfig) -> Result<Self> {
        config.validate()?;
        let registry = SchemaRegistry::from_paths(&config.databases)?;

        Ok(Self {
            registry,
            inputs: config.inputs.clone(),
        })
    }

    /// Wrap an already-built registry
    pub fn with_registry(registry: SchemaRegistry, inputs: Vec<PathBuf>) -> Self {
        Self { registry, inputs }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Configured trace files, in order
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// Open a trace file and return an iterator over its messages
    ///
    /// # Example
    /// ```no_run
    /// use can_trace_decoder::{Decoder, DecoderConfig, TraceMessage};
    /// use std::path::Path;
    ///
    /// let config = DecoderConfig::new().add_database("powertrain.dbc").add_input("trace.bin");
    /// let decoder = Decoder::from_config(&config).unwrap();
    ///
    /// for message in decoder.decode_file(Path::new("trace.bin")).unwrap() {
    ///     match message {
    ///         Ok(TraceMessage::Event(event)) => println!("{} at {}", event.name(), event.timestamp),
    ///         Ok(_) => {}
    ///         Err(e) => eprintln!("Error: {}", e),
    ///     }
    /// }
    /// ```
    pub fn decode_file(&self, path: &Path) -> Result<TraceIterator<'_, BufReader<File>>> {
        TraceIterator::open(&self.registry, path)
    }

    /// Open every configured input, in order
    pub fn decode_inputs(&self) -> Result<Vec<TraceIterator<'_, BufReader<File>>>> {
        self.inputs.iter().map(|path| self.decode_file(path)).collect()
    }
}
