//! Frame decoding
//!
//! Turns one frame record into an output event: unknown frames surface their raw
//! bytes, known frames are decoded by their owning catalog and bound to the
//! registered schema (resolved through the multiplexer value when needed).

use crate::schema::{EventSchema, RegistryEntry, SchemaRegistry, UNKNOWN_PAYLOAD_FIELDS};
use crate::types::{DecoderError, FrameId, FrameRecord, OutputEvent, Result, SignalValues};

/// Frame decoder - binds decoded frames to event schemas
pub struct FrameDecoder;

impl FrameDecoder {
    /// Decode a frame record against the registry
    ///
    /// # Errors
    /// * the owning catalog rejects the payload
    /// * the decoded multiplexer value has no registered schema
    pub fn decode<'r>(registry: &'r SchemaRegistry, record: &FrameRecord) -> Result<OutputEvent<'r>> {
        let frame_id = record.frame_id;

        let (schema, values) = match registry.lookup(frame_id) {
            None => {
                log::trace!("Unknown frame ID: 0x{:X}, emitting raw bytes", frame_id);
                return Ok(Self::unknown_event(registry.unknown_schema(), record));
            }
            Some(RegistryEntry::Single { catalog, schema }) => {
                let values = catalog.decode(frame_id, &record.payload)?;
                (schema, values)
            }
            Some(RegistryEntry::Multiplexed {
                catalog,
                key,
                schemas,
            }) => {
                let values = catalog.decode(frame_id, &record.payload)?;
                let selector = values.get(key).copied().ok_or_else(|| {
                    DecoderError::decode(frame_id, format!("multiplexer '{}' was not decoded", key))
                })?;
                let selector = Self::selector_value(frame_id, selector)?;
                let schema = schemas.get(&selector).ok_or_else(|| {
                    DecoderError::decode(
                        frame_id,
                        format!("no schema for multiplexer {} = {}", key, selector),
                    )
                })?;
                (schema, values)
            }
        };

        Ok(OutputEvent {
            schema,
            timestamp: record.timestamp,
            frame_id,
            values: Self::assign_fields(frame_id, schema, &values)?,
        })
    }

    /// `id` followed by the first seven payload bytes; the eighth byte is not surfaced
    fn unknown_event<'r>(schema: &'r EventSchema, record: &FrameRecord) -> OutputEvent<'r> {
        let mut values = Vec::with_capacity(schema.len());
        values.push(f64::from(record.frame_id));
        values.extend(
            record.payload[..UNKNOWN_PAYLOAD_FIELDS]
                .iter()
                .map(|&b| f64::from(b)),
        );

        OutputEvent {
            schema,
            timestamp: record.timestamp,
            frame_id: record.frame_id,
            values,
        }
    }

    /// Fill the schema fields, in order, from the decoded signal values
    fn assign_fields(frame_id: FrameId, schema: &EventSchema, values: &SignalValues) -> Result<Vec<f64>> {
        schema
            .fields()
            .iter()
            .map(|field| {
                values.get(field).copied().ok_or_else(|| {
                    DecoderError::decode(frame_id, format!("signal '{}' missing from decoded payload", field))
                })
            })
            .collect()
    }

    /// Multiplexer values are looked up as non-negative integers
    fn selector_value(frame_id: FrameId, value: f64) -> Result<u64> {
        if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
            Ok(value as u64)
        } else {
            Err(DecoderError::decode(
                frame_id,
                format!("multiplexer value {} is not a valid selector", value),
            ))
        }
    }
}
