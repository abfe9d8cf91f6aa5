//! DBC file parser
//!
//! Parses Vector DBC files with the `can-dbc` crate and converts them into our
//! message definitions, including the plain/multiplexer signal tree.

use crate::signals::database::{
    ByteOrder, MessageDefinition, SignalDatabase, SignalDefinition, SignalNode, ValueType,
};
use crate::types::{DecoderError, FrameId, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// DBC marks extended identifiers with bit 31
const EXTENDED_ID_FLAG: u32 = 0x8000_0000;
const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// Parse a DBC file into a signal catalog
pub fn load_dbc_file(path: &Path) -> Result<SignalDatabase> {
    log::info!("Parsing DBC file: {:?}", path);

    let bytes = std::fs::read(path).map_err(|e| {
        DecoderError::Configuration(format!("database file {:?} couldn't be read: {}", path, e))
    })?;

    let source_filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.dbc")
        .to_string();

    let messages = parse_dbc(&bytes, &source_filename)?;
    log::info!("Parsed {} messages from {:?}", messages.len(), path);

    Ok(SignalDatabase::from_messages(source_filename, messages))
}

/// Parse DBC content into message definitions
pub fn parse_dbc(bytes: &[u8], source: &str) -> Result<Vec<MessageDefinition>> {
    // Non-UTF-8 files are usually Latin-1/Windows-1252
    let content = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            log::warn!("{} is not UTF-8, trying Latin-1 encoding", source);
            bytes.iter().map(|&b| b as char).collect()
        }
    };

    let dbc = can_dbc::DBC::from_slice(content.as_bytes()).map_err(|e| {
        DecoderError::Configuration(format!("failed to parse DBC file {}: {:?}", source, e))
    })?;

    dbc.messages().iter().map(convert_message).collect()
}

/// Map a raw DBC message ID to the identifier used in trace records
fn frame_id(raw: u32) -> FrameId {
    if raw & EXTENDED_ID_FLAG != 0 {
        (raw & EXTENDED_ID_MASK) as FrameId
    } else {
        raw as FrameId
    }
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(dbc_msg: &can_dbc::Message) -> Result<MessageDefinition> {
    let name = dbc_msg.message_name().to_string();
    let signals: Vec<SignalDefinition> = dbc_msg.signals().iter().map(convert_signal).collect();
    let signal_tree = build_signal_tree(&name, dbc_msg.signals())?;

    Ok(MessageDefinition {
        id: frame_id(dbc_msg.message_id().0),
        name,
        size: *dbc_msg.message_size() as usize,
        signals,
        signal_tree,
    })
}

/// Arrange the message's signals into plain signals and multiplexer nodes
///
/// Every `M` signal opens a multiplexer node; `mN` signals attach to value N of
/// the first one. An `MNm` signal is both a value-specific signal and a further
/// multiplexer, which the schema builder later rejects.
fn build_signal_tree(message: &str, signals: &[can_dbc::Signal]) -> Result<Vec<SignalNode>> {
    let mut tree = Vec::new();
    let mut first_mux: Option<usize> = None;

    for sig in signals {
        match sig.multiplexer_indicator() {
            can_dbc::MultiplexIndicator::Multiplexor
            | can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(_) => {
                first_mux.get_or_insert(tree.len());
                tree.push(SignalNode::Multiplexer {
                    key: sig.name().to_string(),
                    values: BTreeMap::new(),
                });
            }
            can_dbc::MultiplexIndicator::Plain => {
                tree.push(SignalNode::Plain(sig.name().to_string()));
            }
            can_dbc::MultiplexIndicator::MultiplexedSignal(_) => {}
        }
    }

    for sig in signals {
        let switch_value = match sig.multiplexer_indicator() {
            can_dbc::MultiplexIndicator::MultiplexedSignal(v)
            | can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(v) => *v,
            _ => continue,
        };

        let idx = first_mux.ok_or_else(|| {
            DecoderError::schema(
                message,
                format!("no multiplexer found for multiplexed signal '{}'", sig.name()),
            )
        })?;
        if let SignalNode::Multiplexer { values, .. } = &mut tree[idx] {
            values
                .entry(switch_value)
                .or_default()
                .push(sig.name().to_string());
        }
    }

    Ok(tree)
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(dbc_sig: &can_dbc::Signal) -> SignalDefinition {
    let byte_order = match dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    let value_type = match dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    let multiplexer_values = match dbc_sig.multiplexer_indicator() {
        can_dbc::MultiplexIndicator::MultiplexedSignal(v)
        | can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(v) => vec![*v],
        _ => Vec::new(),
    };

    SignalDefinition {
        name: dbc_sig.name().to_string(),
        start_bit: *dbc_sig.start_bit() as u16,
        length: *dbc_sig.signal_size() as u16,
        byte_order,
        value_type,
        factor: *dbc_sig.factor(),
        offset: *dbc_sig.offset(),
        unit: if dbc_sig.unit().is_empty() {
            None
        } else {
            Some(dbc_sig.unit().to_string())
        },
        multiplexer_values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalCatalog;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = r#"
VERSION ""

NS_ :

BS_:

BU_: ECU1 ECU2
"#;

    fn write_dbc(body: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(HEADER.as_bytes()).unwrap();
        temp_file.write_all(body.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_parse_simple_dbc() {
        let file = write_dbc(
            r#"
BO_ 291 EngineData: 8 ECU1
 SG_ EngineSpeed : 0|16@1+ (1,0) [0|8000] "rpm" ECU2
 SG_ EngineTemp : 16|8@1+ (1,-40) [-40|215] "C" ECU2

BO_ 512 BatteryStatus: 8 ECU1
 SG_ BatteryVoltage : 0|16@1+ (0.01,0) [0|16] "V" ECU2
"#,
        );

        let db = load_dbc_file(file.path()).unwrap();
        let messages = db.messages();
        assert_eq!(messages.len(), 2);

        let msg = &messages[0];
        assert_eq!(msg.id, 291);
        assert_eq!(msg.name, "EngineData");
        assert_eq!(msg.size, 8);
        assert_eq!(
            msg.signal_tree,
            vec![
                SignalNode::Plain("EngineSpeed".to_string()),
                SignalNode::Plain("EngineTemp".to_string()),
            ]
        );

        let sig = &msg.signals[1];
        assert_eq!(sig.start_bit, 16);
        assert_eq!(sig.length, 8);
        assert_eq!(sig.offset, -40.0);
        assert_eq!(sig.unit, Some("C".to_string()));
    }

    #[test]
    fn test_parse_multiplexed_signals() {
        let file = write_dbc(
            r#"
BO_ 512 MultiplexedMsg: 8 ECU1
 SG_ Mode M : 0|8@1+ (1,0) [0|3] "" ECU1
 SG_ SignalA m0 : 8|16@1+ (1,0) [0|100] "%" ECU1
 SG_ SignalB m1 : 8|16@1+ (0.1,0) [0|1000] "mV" ECU1
 SG_ Counter : 24|8@1+ (1,0) [0|255] "" ECU1
"#,
        );

        let db = load_dbc_file(file.path()).unwrap();
        let msg = &db.messages()[0];

        let (key, values) = msg.multiplexer().unwrap();
        assert_eq!(key, "Mode");
        assert_eq!(values.len(), 2);
        assert_eq!(values[&0], vec!["SignalA".to_string()]);
        assert_eq!(values[&1], vec!["SignalB".to_string()]);
        assert!(msg
            .signal_tree
            .contains(&SignalNode::Plain("Counter".to_string())));
        assert_eq!(msg.signal("SignalB").unwrap().multiplexer_values, vec![1]);
    }

    #[test]
    fn test_multiplexed_signal_without_multiplexer() {
        let file = write_dbc(
            r#"
BO_ 512 Broken: 8 ECU1
 SG_ SignalA m0 : 8|16@1+ (1,0) [0|100] "%" ECU1
"#,
        );

        let err = load_dbc_file(file.path()).err().unwrap();
        assert!(matches!(err, DecoderError::Schema { ref message, .. } if message == "Broken"));
    }

    #[test]
    fn test_extended_id_is_masked() {
        assert_eq!(frame_id(0x8000_0123), 0x123);
        assert_eq!(frame_id(0x9FFF_FFFF), 0x1FFF_FFFF);
        assert_eq!(frame_id(0x7FF), 0x7FF);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = load_dbc_file(Path::new("nonexistent.dbc")).err().unwrap();
        assert!(matches!(err, DecoderError::Configuration(_)));
    }
}
