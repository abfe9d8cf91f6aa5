//! Core types for the CAN trace decoder library
//!
//! This module defines the error type, the raw frame record read from a trace
//! file, and the messages the trace iterator emits.

use crate::schema::EventSchema;
use byteorder::{ByteOrder, LittleEndian};
use chrono::Duration;

/// Frame identifier as stored in a trace record (standard and extended share this space)
pub type FrameId = i32;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Decoded signal values keyed by signal name
pub type SignalValues = std::collections::HashMap<String, f64>;

/// Trace clock frequency: timestamps are expressed in ticks of 1 ms
pub const CLOCK_FREQUENCY_HZ: u32 = 1000;

/// Size of one frame record in a trace file
pub const RECORD_SIZE: usize = 16;

/// Number of payload bytes in one frame record
pub const PAYLOAD_SIZE: usize = 8;

/// Errors that can occur while setting up or running a decode
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Schema error in message `{message}`: {reason}")]
    Schema { message: String, reason: String },

    #[error("Failed to decode frame 0x{frame_id:X}: {reason}")]
    Decode { frame_id: FrameId, reason: String },

    #[error("Truncated record at byte offset {offset}: expected 16 bytes, got {len}")]
    Truncated { offset: u64, len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecoderError {
    pub(crate) fn schema(message: impl Into<String>, reason: impl Into<String>) -> Self {
        DecoderError::Schema {
            message: message.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(frame_id: FrameId, reason: impl Into<String>) -> Self {
        DecoderError::Decode {
            frame_id,
            reason: reason.into(),
        }
    }

    /// True for failures raised while loading catalogs or building the registry,
    /// false for failures raised while iterating over a trace.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            DecoderError::Configuration(_) | DecoderError::Schema { .. }
        )
    }
}

/// One raw 16-byte record from a trace file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    /// Clock value in ticks (see [`CLOCK_FREQUENCY_HZ`])
    pub timestamp: i32,
    /// Catalog key of the frame
    pub frame_id: FrameId,
    /// Raw payload bytes
    pub payload: [u8; PAYLOAD_SIZE],
}

impl FrameRecord {
    /// Parse a record from its little-endian wire layout
    ///
    /// ```text
    /// [bytes 0 -  3] timestamp
    /// [bytes 4 -  7] frame ID
    /// [bytes 8 - 15] payload
    /// ```
    pub fn parse(bytes: &[u8; RECORD_SIZE]) -> Self {
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&bytes[8..RECORD_SIZE]);

        Self {
            timestamp: LittleEndian::read_i32(&bytes[0..4]),
            frame_id: LittleEndian::read_i32(&bytes[4..8]),
            payload,
        }
    }

    /// Serialize the record back into its wire layout
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        LittleEndian::write_i32(&mut bytes[0..4], self.timestamp);
        LittleEndian::write_i32(&mut bytes[4..8], self.frame_id);
        bytes[8..].copy_from_slice(&self.payload);
        bytes
    }
}

/// A decoded event bound to its event schema
#[derive(Debug, Clone, PartialEq)]
pub struct OutputEvent<'r> {
    /// Schema describing the field layout of this event
    pub schema: &'r EventSchema,
    /// Record timestamp, used as the ordering clock
    pub timestamp: i32,
    /// Frame identifier of the source record
    pub frame_id: FrameId,
    /// Field values in schema-declared order
    pub values: Vec<f64>,
}

impl<'r> OutputEvent<'r> {
    /// Name of the event schema (message name, or `UNKNOWN`)
    pub fn name(&self) -> &'r str {
        self.schema.name()
    }

    /// Look up a field value by name
    pub fn get(&self, field: &str) -> Option<f64> {
        self.schema
            .field_index(field)
            .and_then(|idx| self.values.get(idx).copied())
    }

    /// Iterate over `(field name, value)` pairs in schema order
    pub fn fields(&self) -> impl Iterator<Item = (&'r str, f64)> + '_ {
        self.schema
            .fields()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Clock value converted to a duration since the start of the trace clock
    pub fn elapsed(&self) -> Duration {
        Duration::milliseconds(i64::from(self.timestamp) * 1000 / i64::from(CLOCK_FREQUENCY_HZ))
    }
}

/// A single message produced by the trace iterator
#[derive(Debug, Clone, PartialEq)]
pub enum TraceMessage<'r> {
    /// Emitted once before any event
    StreamBeginning,
    /// One decoded frame record
    Event(OutputEvent<'r>),
    /// Emitted once after the last event
    StreamEnd,
}

impl<'r> TraceMessage<'r> {
    /// Get the event carried by this message, if any
    pub fn event(&self) -> Option<&OutputEvent<'r>> {
        match self {
            TraceMessage::Event(event) => Some(event),
            _ => None,
        }
    }
}
