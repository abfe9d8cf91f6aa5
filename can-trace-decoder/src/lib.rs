//! CAN Trace Decoder Library
//!
//! Decodes binary CAN traces made of fixed 16-byte records into an ordered
//! stream of typed events, using signal definitions from DBC and ARXML files.
//!
//! # Architecture
//!
//! - Signal catalogs (DBC/ARXML) are loaded in order and merged by frame ID,
//!   first definition wins
//! - The schema registry derives one event schema per frame ID, or one per
//!   multiplexer value for multiplexed frames, plus a fixed `UNKNOWN` schema
//! - The trace iterator reads records and yields begin/event/end messages
//!
//! The registry is built once and is read-only afterwards, so any number of
//! iterators (one per trace file) can share it across threads.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_trace_decoder::{SchemaRegistry, TraceIterator, TraceMessage};
//! use std::path::{Path, PathBuf};
//!
//! let registry = SchemaRegistry::from_paths(&[
//!     PathBuf::from("powertrain.dbc"),
//!     PathBuf::from("body.arxml"),
//! ])
//! .unwrap();
//!
//! for message in TraceIterator::open(&registry, Path::new("trace.bin")).unwrap() {
//!     match message {
//!         Ok(TraceMessage::Event(event)) => {
//!             for (field, value) in event.fields() {
//!                 println!("{} {} = {}", event.timestamp, field, value);
//!             }
//!         }
//!         Ok(_) => {}
//!         Err(e) => eprintln!("Decode error: {}", e),
//!     }
//! }
//! ```

// Public modules
pub mod config;
pub mod decoder;
pub mod frame_decoder;
pub mod loader;
pub mod schema;
pub mod signals;
pub mod trace;
pub mod types;

// Re-export main types for convenience
pub use config::DecoderConfig;
pub use decoder::Decoder;
pub use frame_decoder::FrameDecoder;
pub use loader::{load_databases, DuplicateFrame, MergedIndex};
pub use schema::{EventSchema, RegistryEntry, SchemaRegistry};
pub use signals::{load_catalog, SignalCatalog, SignalDatabase};
pub use trace::TraceIterator;
pub use types::{
    DecoderError, FrameId, FrameRecord, OutputEvent, Result, SignalValues, TraceMessage,
    CLOCK_FREQUENCY_HZ, RECORD_SIZE,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        let schema = EventSchema::unknown();
        assert_eq!(schema.len(), 8);
        assert_eq!(RECORD_SIZE, 16);
        assert_eq!(CLOCK_FREQUENCY_HZ, 1000);
    }
}
