//! In-memory signal catalog
//!
//! Holds the message definitions of one DBC/ARXML file and decodes raw payloads
//! into named, scaled signal values.

use crate::types::{DecoderError, FrameId, Result, SignalValues};
use std::collections::{BTreeMap, HashMap};

/// A signal catalog: the collaborator that owns message layouts and scaling
///
/// The schema builder only needs to enumerate message definitions and ask the
/// catalog to decode a payload; how signals are extracted is up to the catalog.
pub trait SignalCatalog: Send + Sync {
    /// Name of the file (or other source) this catalog was loaded from
    fn source(&self) -> &str;

    /// All message definitions, in declaration order
    fn messages(&self) -> &[MessageDefinition];

    /// Decode a payload of the given frame into signal values
    fn decode(&self, frame_id: FrameId, data: &[u8]) -> Result<SignalValues>;
}

/// A CAN message definition
#[derive(Debug, Clone)]
pub struct MessageDefinition {
    /// Frame identifier
    pub id: FrameId,
    /// Message name
    pub name: String,
    /// Message size in bytes; signals are only read from this many payload bytes
    pub size: usize,
    /// All signals in declaration order
    pub signals: Vec<SignalDefinition>,
    /// Plain/multiplexer structure of the signals
    pub signal_tree: Vec<SignalNode>,
}

impl MessageDefinition {
    /// Find a signal by name
    pub fn signal(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// The first multiplexer node of the signal tree, if any
    pub fn multiplexer(&self) -> Option<(&str, &BTreeMap<u64, Vec<String>>)> {
        self.signal_tree.iter().find_map(|node| match node {
            SignalNode::Multiplexer { key, values } => Some((key.as_str(), values)),
            SignalNode::Plain(_) => None,
        })
    }
}

/// One node of a message's signal tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalNode {
    /// A signal present in every instance of the frame
    Plain(String),
    /// A selector signal and the signals valid for each of its values
    Multiplexer {
        /// Name of the selector signal
        key: String,
        /// Selector value -> names of the signals specific to that value
        values: BTreeMap<u64, Vec<String>>,
    },
}

/// A CAN signal definition
#[derive(Debug, Clone)]
pub struct SignalDefinition {
    /// Signal name
    pub name: String,
    /// Start bit in the CAN frame (DBC numbering)
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Engineering unit (e.g., "km/h", "V")
    pub unit: Option<String>,
    /// Multiplexer values for which this signal is active (empty if not multiplexed)
    pub multiplexer_values: Vec<u64>,
}

impl SignalDefinition {
    /// Plain little-endian unsigned signal without scaling
    pub fn new(name: impl Into<String>, start_bit: u16, length: u16) -> Self {
        Self {
            name: name.into(),
            start_bit,
            length,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            factor: 1.0,
            offset: 0.0,
            unit: None,
            multiplexer_values: Vec::new(),
        }
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_scaling(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    pub fn multiplexed_on(mut self, values: Vec<u64>) -> Self {
        self.multiplexer_values = values;
        self
    }
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Signed,
    Unsigned,
}

/// Signal catalog loaded from one file
pub struct SignalDatabase {
    /// Source filename, used in log output and notices
    source: String,
    messages: Vec<MessageDefinition>,
    /// Frame ID -> index into `messages` (first definition wins)
    by_id: HashMap<FrameId, usize>,
}

impl SignalDatabase {
    /// Build a catalog from already-parsed message definitions
    pub fn from_messages(source: impl Into<String>, messages: Vec<MessageDefinition>) -> Self {
        let mut by_id = HashMap::new();
        for (idx, message) in messages.iter().enumerate() {
            by_id.entry(message.id).or_insert(idx);
        }

        Self {
            source: source.into(),
            messages,
            by_id,
        }
    }

    /// Get a message definition by frame ID
    pub fn get_message(&self, frame_id: FrameId) -> Option<&MessageDefinition> {
        self.by_id.get(&frame_id).map(|&idx| &self.messages[idx])
    }

    /// Extract and scale a single signal
    fn decode_signal(frame_id: FrameId, data: &[u8], signal: &SignalDefinition) -> Result<f64> {
        let bits = Self::extract_bits(frame_id, data, signal)?;
        let raw = match signal.value_type {
            ValueType::Unsigned => bits as f64,
            ValueType::Signed => sign_extend(bits, signal.length as usize) as f64,
        };
        Ok(signal.offset + signal.factor * raw)
    }

    /// Raw selector value; a negative signed selector matches no multiplexed signal
    fn selector(frame_id: FrameId, data: &[u8], signal: &SignalDefinition) -> Result<Option<u64>> {
        let bits = Self::extract_bits(frame_id, data, signal)?;
        Ok(match signal.value_type {
            ValueType::Unsigned => Some(bits),
            ValueType::Signed => u64::try_from(sign_extend(bits, signal.length as usize)).ok(),
        })
    }

    /// Extract the unscaled bit pattern of a signal, right-aligned
    fn extract_bits(frame_id: FrameId, data: &[u8], signal: &SignalDefinition) -> Result<u64> {
        let start_bit = signal.start_bit as usize;
        let length = signal.length as usize;

        if length == 0 || length > 64 {
            return Err(DecoderError::decode(
                frame_id,
                format!("signal '{}' has invalid length {}", signal.name, length),
            ));
        }

        match signal.byte_order {
            ByteOrder::LittleEndian => extract_little_endian(data, start_bit, length),
            ByteOrder::BigEndian => extract_big_endian(data, start_bit, length),
        }
        .ok_or_else(|| {
            DecoderError::decode(
                frame_id,
                format!(
                    "signal '{}' does not fit in a {}-byte payload",
                    signal.name,
                    data.len()
                ),
            )
        })
    }
}

impl SignalCatalog for SignalDatabase {
    fn source(&self) -> &str {
        &self.source
    }

    fn messages(&self) -> &[MessageDefinition] {
        &self.messages
    }

    fn decode(&self, frame_id: FrameId, data: &[u8]) -> Result<SignalValues> {
        let message = self.get_message(frame_id).ok_or_else(|| {
            DecoderError::decode(frame_id, format!("frame not defined in {}", self.source))
        })?;

        // Signals beyond the declared message length are not part of the frame
        let data = &data[..data.len().min(message.size)];

        // The selector decides which multiplexed signals are present
        let selector = match message.multiplexer() {
            Some((key, _)) => {
                let mux_signal = message.signal(key).ok_or_else(|| {
                    DecoderError::decode(frame_id, format!("multiplexer '{}' has no signal definition", key))
                })?;
                Self::selector(frame_id, data, mux_signal)?
            }
            None => None,
        };

        let mut values = SignalValues::with_capacity(message.signals.len());
        for signal in &message.signals {
            if !signal.multiplexer_values.is_empty() {
                match selector {
                    Some(current) if signal.multiplexer_values.contains(&current) => {}
                    _ => continue,
                }
            }
            let value = Self::decode_signal(frame_id, data, signal)?;
            values.insert(signal.name.clone(), value);
        }

        log::trace!("Decoded {} signals for {} (0x{:X})", values.len(), message.name, frame_id);
        Ok(values)
    }
}

/// Extract bits with little-endian (Intel) byte order
///
/// The start bit points to the LSB; bits are numbered LSB-first within each byte.
fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> Option<u64> {
    if start_bit + length > data.len() * 8 {
        return None;
    }

    let mut result: u64 = 0;
    for i in 0..length {
        let bit_pos = start_bit + i;
        let bit_value = (data[bit_pos / 8] >> (bit_pos % 8)) & 0x01;
        result |= (bit_value as u64) << i;
    }

    Some(result)
}

/// Extract bits with big-endian (Motorola) byte order
///
/// The start bit points to the MSB in DBC "sawtooth" numbering: bit 7 of byte 0
/// is followed by bit 6, ..., bit 0, then bit 7 of byte 1.
fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> Option<u64> {
    let mut result: u64 = 0;
    let mut pos = start_bit;

    for i in 0..length {
        let byte_idx = pos / 8;
        let bit_in_byte = pos % 8;
        let byte = *data.get(byte_idx)?;
        result = (result << 1) | ((byte >> bit_in_byte) & 0x01) as u64;

        if i + 1 < length {
            pos = if bit_in_byte == 0 { (byte_idx + 1) * 8 + 7 } else { pos - 1 };
        }
    }

    Some(result)
}

/// Sign-extend a value from N bits to 64 bits
fn sign_extend(value: u64, bit_length: usize) -> i64 {
    if bit_length >= 64 {
        return value as i64;
    }

    let sign_bit = 1u64 << (bit_length - 1);
    if (value & sign_bit) != 0 {
        (value | (!0u64 << bit_length)) as i64
    } else {
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multiplexed_message() -> MessageDefinition {
        let mut values = BTreeMap::new();
        values.insert(0, vec!["SignalA".to_string()]);
        values.insert(1, vec!["SignalB".to_string()]);

        MessageDefinition {
            id: 0x200,
            name: "MultiplexedMsg".to_string(),
            size: 8,
            signals: vec![
                SignalDefinition::new("Mode", 0, 8),
                SignalDefinition::new("SignalA", 8, 16).multiplexed_on(vec![0]),
                SignalDefinition::new("SignalB", 8, 16)
                    .with_scaling(0.1, 0.0)
                    .multiplexed_on(vec![1]),
                SignalDefinition::new("Counter", 24, 8),
            ],
            signal_tree: vec![
                SignalNode::Multiplexer {
                    key: "Mode".to_string(),
                    values,
                },
                SignalNode::Plain("Counter".to_string()),
            ],
        }
    }

    #[test]
    fn test_extract_little_endian_simple() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(extract_little_endian(&data, 0, 8), Some(0xAB));
        assert_eq!(extract_little_endian(&data, 0, 16), Some(0xCDAB));
        assert_eq!(extract_little_endian(&data, 4, 8), Some(0xDA));
    }

    #[test]
    fn test_extract_little_endian_out_of_range() {
        let data = [0xFF; 8];
        assert_eq!(extract_little_endian(&data, 60, 8), None);
    }

    #[test]
    fn test_extract_big_endian() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        // 8 bits, MSB at bit 7 of byte 0
        assert_eq!(extract_big_endian(&data, 7, 8), Some(0xAB));
        // 16 bits spanning bytes 0-1
        assert_eq!(extract_big_endian(&data, 7, 16), Some(0xABCD));
        // 4 bits, MSB at bit 3 of byte 1
        assert_eq!(extract_big_endian(&data, 11, 4), Some(0xD));
        // 12 bits starting at bit 3 of byte 0: 0xB (low nibble of 0xAB) then 0xCD
        assert_eq!(extract_big_endian(&data, 3, 12), Some(0xBCD));
        assert_eq!(extract_big_endian(&data, 31, 16), None);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0x7F, 8), 127);
        assert_eq!(sign_extend(0xFF, 8), -1);
        assert_eq!(sign_extend(0x8000, 16), -32768);
    }

    #[test]
    fn test_decode_plain_message() {
        let message = MessageDefinition {
            id: 0x123,
            name: "EngineData".to_string(),
            size: 8,
            signals: vec![
                SignalDefinition::new("EngineSpeed", 0, 16),
                SignalDefinition::new("EngineTemp", 16, 8).with_scaling(1.0, -40.0),
                SignalDefinition::new("Torque", 24, 8).with_value_type(ValueType::Signed),
            ],
            signal_tree: vec![
                SignalNode::Plain("EngineSpeed".to_string()),
                SignalNode::Plain("EngineTemp".to_string()),
                SignalNode::Plain("Torque".to_string()),
            ],
        };
        let db = SignalDatabase::from_messages("engine.dbc", vec![message]);

        let values = db
            .decode(0x123, &[0xE8, 0x03, 0x5A, 0xFE, 0, 0, 0, 0])
            .unwrap();
        assert_eq!(values["EngineSpeed"], 1000.0);
        assert_eq!(values["EngineTemp"], 50.0);
        assert_eq!(values["Torque"], -2.0);
    }

    #[test]
    fn test_decode_selects_multiplexed_signals() {
        let db = SignalDatabase::from_messages("mux.dbc", vec![multiplexed_message()]);

        let values = db.decode(0x200, &[0, 0x64, 0x00, 7, 0, 0, 0, 0]).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values["Mode"], 0.0);
        assert_eq!(values["SignalA"], 100.0);
        assert_eq!(values["Counter"], 7.0);
        assert!(!values.contains_key("SignalB"));

        let values = db.decode(0x200, &[1, 0x64, 0x00, 7, 0, 0, 0, 0]).unwrap();
        assert!((values["SignalB"] - 10.0).abs() < 1e-9);
        assert!(!values.contains_key("SignalA"));
    }

    #[test]
    fn test_decode_signal_outside_payload() {
        let message = MessageDefinition {
            id: 0x300,
            name: "FdMessage".to_string(),
            size: 16,
            signals: vec![SignalDefinition::new("Far", 80, 8)],
            signal_tree: vec![SignalNode::Plain("Far".to_string())],
        };
        let db = SignalDatabase::from_messages("fd.dbc", vec![message]);

        let err = db.decode(0x300, &[0; 8]).unwrap_err();
        assert!(matches!(err, DecoderError::Decode { frame_id: 0x300, .. }));
    }

    #[test]
    fn test_decode_full_width_unsigned() {
        let message = MessageDefinition {
            id: 0x1,
            name: "Wide".to_string(),
            size: 8,
            signals: vec![
                SignalDefinition::new("Big", 0, 64),
                SignalDefinition::new("BigSigned", 0, 64).with_value_type(ValueType::Signed),
            ],
            signal_tree: vec![
                SignalNode::Plain("Big".to_string()),
                SignalNode::Plain("BigSigned".to_string()),
            ],
        };
        let db = SignalDatabase::from_messages("wide.dbc", vec![message]);

        let values = db.decode(0x1, &[0, 0, 0, 0, 0, 0, 0, 0x80]).unwrap();
        assert_eq!(values["Big"], 9223372036854775808.0);
        assert!(values["Big"] > 0.0);
        assert_eq!(values["BigSigned"], -9223372036854775808.0);
    }

    #[test]
    fn test_negative_signed_selector_selects_nothing() {
        let mut message = multiplexed_message();
        message.signals[0] = SignalDefinition::new("Mode", 0, 8).with_value_type(ValueType::Signed);
        let db = SignalDatabase::from_messages("mux.dbc", vec![message]);

        let values = db.decode(0x200, &[0xFF, 0x64, 0x00, 7, 0, 0, 0, 0]).unwrap();
        assert_eq!(values["Mode"], -1.0);
        assert!(!values.contains_key("SignalA"));
        assert!(!values.contains_key("SignalB"));
        assert_eq!(values["Counter"], 7.0);
    }

    #[test]
    fn test_signal_beyond_message_size() {
        let message = MessageDefinition {
            id: 0x5,
            name: "Short".to_string(),
            size: 2,
            signals: vec![
                SignalDefinition::new("Inside", 8, 8),
                SignalDefinition::new("Outside", 16, 8),
            ],
            signal_tree: vec![
                SignalNode::Plain("Inside".to_string()),
                SignalNode::Plain("Outside".to_string()),
            ],
        };
        let db = SignalDatabase::from_messages("short.dbc", vec![message]);

        let err = db.decode(0x5, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap_err();
        assert!(matches!(err, DecoderError::Decode { frame_id: 0x5, .. }));
        assert!(err.to_string().contains("2-byte payload"));
    }

    #[test]
    fn test_first_definition_wins_within_catalog() {
        let first = MessageDefinition {
            id: 0x10,
            name: "First".to_string(),
            size: 8,
            signals: Vec::new(),
            signal_tree: Vec::new(),
        };
        let second = MessageDefinition {
            name: "Second".to_string(),
            ..first.clone()
        };
        let db = SignalDatabase::from_messages("dup.dbc", vec![first, second]);
        assert_eq!(db.get_message(0x10).unwrap().name, "First");
        assert_eq!(db.messages().len(), 2);
    }
}
