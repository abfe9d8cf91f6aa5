//! ARXML (AUTOSAR XML) file parser using autosar-data crate
//!
//! Extracts plain I-SIGNAL-I-PDUs and MULTIPLEXED-I-PDUs mapped onto CAN frames.
//! Container PDUs are not supported.

use crate::signals::database::{
    ByteOrder, MessageDefinition, SignalDatabase, SignalDefinition, SignalNode, ValueType,
};
use crate::types::{DecoderError, FrameId, Result};
use autosar_data::{AutosarModel, Element, ElementName};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Parse an ARXML file into a signal catalog
pub fn load_arxml_file(path: &Path) -> Result<SignalDatabase> {
    log::info!("Parsing ARXML file with autosar-data: {:?}", path);

    if !path.exists() {
        return Err(DecoderError::Configuration(format!(
            "database file {:?} couldn't be read",
            path
        )));
    }

    let source_filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.arxml")
        .to_string();

    let model = AutosarModel::new();
    let (_file, warnings) = model.load_file(path, false).map_err(|e| {
        DecoderError::Configuration(format!("failed to load ARXML {:?}: {}", path, e))
    })?;
    for warning in warnings {
        log::warn!("ARXML warning: {}", warning);
    }

    let parser = ArxmlParser::new(&model);
    let messages = parser.parse()?;
    log::info!("Parsed {} messages from {:?}", messages.len(), path);

    Ok(SignalDatabase::from_messages(source_filename, messages))
}

struct ArxmlParser<'m> {
    model: &'m AutosarModel,
    /// PDU short name -> frame identifier
    pdu_frame_ids: HashMap<String, FrameId>,
    /// Short name -> element, for resolving references
    by_short_name: HashMap<String, Element>,
}

impl<'m> ArxmlParser<'m> {
    fn new(model: &'m AutosarModel) -> Self {
        let mut by_short_name = HashMap::new();
        for (_depth, element) in model.elements_dfs() {
            if let Some(name) = element.item_name() {
                by_short_name.entry(name).or_insert(element);
            }
        }

        let mut parser = Self {
            model,
            pdu_frame_ids: HashMap::new(),
            by_short_name,
        };
        parser.pdu_frame_ids = parser.map_pdus_to_frames();
        parser
    }

    fn parse(&self) -> Result<Vec<MessageDefinition>> {
        let mut messages = Vec::new();

        for (_depth, element) in self.model.elements_dfs() {
            let parsed = match element.element_name() {
                ElementName::ISignalIPdu => self.parse_signal_pdu(&element),
                ElementName::MultiplexedIPdu => self.parse_multiplexed_pdu(&element)?,
                _ => continue,
            };
            if let Some(message) = parsed {
                messages.push(message);
            }
        }

        Ok(messages)
    }

    /// CAN-FRAME-TRIGGERING carries IDENTIFIER + FRAME-REF; CAN-FRAME carries the
    /// PDU-TO-FRAME-MAPPINGs naming the PDUs sent in that frame.
    fn map_pdus_to_frames(&self) -> HashMap<String, FrameId> {
        let mut frame_ids = HashMap::new();
        for (_depth, element) in self.model.elements_dfs() {
            if element.element_name() != ElementName::CanFrameTriggering {
                continue;
            }
            let id = self.text(&element, "IDENTIFIER").and_then(|t| parse_can_id(&t));
            let frame = self.reference_name(&element, "FRAME-REF");
            if let (Some(id), Some(frame)) = (id, frame) {
                frame_ids.insert(frame, id);
            }
        }

        let mut pdu_frame_ids = HashMap::new();
        for (frame, id) in frame_ids {
            let Some(frame_element) = self.by_short_name.get(&frame) else {
                continue;
            };
            for mapping in descendants(frame_element, "PDU-TO-FRAME-MAPPING") {
                if let Some(pdu) = self.reference_name(&mapping, "PDU-REF") {
                    pdu_frame_ids.insert(pdu, id);
                }
            }
        }
        pdu_frame_ids
    }

    fn frame_id_for(&self, pdu: &str) -> Option<FrameId> {
        let id = self.pdu_frame_ids.get(pdu).copied();
        if id.is_none() {
            log::debug!("No CAN frame carries PDU {}, skipping", pdu);
        }
        id
    }

    fn parse_signal_pdu(&self, element: &Element) -> Option<MessageDefinition> {
        let name = element.item_name()?;
        let id = self.frame_id_for(&name)?;
        let signals = self.signal_mappings(element);
        if signals.is_empty() {
            return None;
        }

        Some(MessageDefinition {
            id,
            name,
            size: self.length(element).unwrap_or(8),
            signal_tree: signals
                .iter()
                .map(|s| SignalNode::Plain(s.name.clone()))
                .collect(),
            signals,
        })
    }

    /// A multiplexed PDU becomes a message with a synthetic `<pdu>_selector` signal,
    /// its static part as plain signals and one signal group per selector code.
    fn parse_multiplexed_pdu(&self, element: &Element) -> Result<Option<MessageDefinition>> {
        let Some(name) = element.item_name() else {
            return Ok(None);
        };
        let Some(id) = self.frame_id_for(&name) else {
            return Ok(None);
        };

        let selector_start = self
            .text(element, "SELECTOR-FIELD-START-POSITION")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(0);
        let selector_length = self
            .text(element, "SELECTOR-FIELD-LENGTH")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8);
        let selector_byte_order = match self.text(element, "SELECTOR-FIELD-BYTE-ORDER") {
            Some(order) if order.contains("MOST-SIGNIFICANT-BYTE-FIRST") => ByteOrder::BigEndian,
            _ => ByteOrder::LittleEndian,
        };
        let key = format!("{}_selector", name);

        let selector_bit = match selector_byte_order {
            ByteOrder::BigEndian => motorola_msb(selector_start, selector_length)
                .ok_or_else(|| DecoderError::schema(&name, "selector field does not fit in frame"))?,
            ByteOrder::LittleEndian => selector_start,
        };
        let mut signals = vec![
            SignalDefinition::new(key.clone(), selector_bit, selector_length)
                .with_byte_order(selector_byte_order),
        ];
        let mut tree = Vec::new();

        for part in descendants(element, "STATIC-PART") {
            for pdu in self.referenced_pdus(&part) {
                for signal in self.signal_mappings(&pdu) {
                    tree.push(SignalNode::Plain(signal.name.clone()));
                    signals.push(signal);
                }
            }
        }

        let mut values: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        for alternative in descendants(element, "DYNAMIC-PART-ALTERNATIVE") {
            let Some(code) = self
                .text(&alternative, "SELECTOR-FIELD-CODE")
                .and_then(|s| s.parse::<u64>().ok())
            else {
                log::warn!("Dynamic part of {} has no selector code, skipping", name);
                continue;
            };
            let names = values.entry(code).or_default();
            for pdu in self.referenced_pdus(&alternative) {
                for signal in self.signal_mappings(&pdu) {
                    names.push(signal.name.clone());
                    signals.push(signal.multiplexed_on(vec![code]));
                }
            }
        }
        tree.insert(0, SignalNode::Multiplexer { key, values });

        Ok(Some(MessageDefinition {
            id,
            size: self.length(element).unwrap_or(8),
            name,
            signals,
            signal_tree: tree,
        }))
    }

    fn referenced_pdus(&self, element: &Element) -> Vec<Element> {
        descendants(element, "I-PDU-REF")
            .iter()
            .filter_map(|r| reference_target(r))
            .filter_map(|pdu| self.by_short_name.get(&pdu).cloned())
            .collect()
    }

    fn signal_mappings(&self, pdu: &Element) -> Vec<SignalDefinition> {
        descendants(pdu, "I-SIGNAL-TO-I-PDU-MAPPING")
            .iter()
            .filter_map(|mapping| self.signal_mapping(mapping))
            .collect()
    }

    fn signal_mapping(&self, mapping: &Element) -> Option<SignalDefinition> {
        let Some(signal_name) = self.reference_name(mapping, "I-SIGNAL-REF") else {
            log::warn!("Signal mapping has no I-SIGNAL-REF, skipping");
            return None;
        };

        let start_position = self
            .text(mapping, "START-POSITION")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(0);
        let byte_order = match self.text(mapping, "PACKING-BYTE-ORDER") {
            Some(order) if order.contains("MOST-SIGNIFICANT-BYTE-FIRST") => ByteOrder::BigEndian,
            _ => ByteOrder::LittleEndian,
        };

        let i_signal = self.by_short_name.get(&signal_name);
        let length = i_signal
            .and_then(|s| self.length(s))
            .map(|l| l as u16)
            .unwrap_or(8);
        let (factor, offset) = i_signal
            .and_then(|s| self.linear_scaling(s))
            .unwrap_or((1.0, 0.0));

        // AUTOSAR start positions point to the LSB for both byte orders
        let start_bit = match byte_order {
            ByteOrder::BigEndian => match motorola_msb(start_position, length) {
                Some(bit) => bit,
                None => {
                    log::warn!("Signal {} does not fit in its PDU, skipping", signal_name);
                    return None;
                }
            },
            ByteOrder::LittleEndian => start_position,
        };

        Some(
            SignalDefinition::new(signal_name, start_bit, length)
                .with_byte_order(byte_order)
                .with_value_type(ValueType::Unsigned)
                .with_scaling(factor, offset),
        )
    }

    /// I-SIGNAL -> SYSTEM-SIGNAL -> COMPU-METHOD -> first COMPU-SCALE numerator (v0 + v1 * x)
    fn linear_scaling(&self, i_signal: &Element) -> Option<(f64, f64)> {
        let system_signal = self
            .reference_name(i_signal, "SYSTEM-SIGNAL-REF")
            .and_then(|n| self.by_short_name.get(&n))?;
        let compu_method = descendants(system_signal, "COMPU-METHOD-REF")
            .first()
            .and_then(reference_target)
            .and_then(|n| self.by_short_name.get(&n).cloned())?;

        let scale = descendants(&compu_method, "COMPU-SCALE").into_iter().next()?;
        let numerator = descendants(&scale, "COMPU-NUMERATOR").into_iter().next()?;
        let coefficients: Vec<f64> = descendants(&numerator, "V")
            .iter()
            .filter_map(character_text)
            .filter_map(|t| t.trim().parse::<f64>().ok())
            .collect();

        match coefficients.as_slice() {
            [offset, factor, ..] => Some((*factor, *offset)),
            _ => None,
        }
    }

    fn length(&self, element: &Element) -> Option<usize> {
        self.text(element, "LENGTH").and_then(|s| s.trim().parse().ok())
    }

    fn text(&self, element: &Element, name: &str) -> Option<String> {
        sub_element(element, name).as_ref().and_then(character_text)
    }

    fn reference_name(&self, element: &Element, name: &str) -> Option<String> {
        sub_element(element, name).as_ref().and_then(reference_target)
    }
}

/// Convert an LSB start position (sawtooth numbering) to the MSB position DBC uses
fn motorola_msb(lsb: u16, length: u16) -> Option<u16> {
    let mut pos = lsb;
    for _ in 1..length {
        pos = if pos % 8 == 7 { pos.checked_sub(15)? } else { pos + 1 };
    }
    Some(pos)
}

fn parse_can_id(text: &str) -> Option<FrameId> {
    let text = text.trim();
    let raw = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        text.parse::<u32>().ok()?
    };
    Some(raw as FrameId)
}

fn sub_element(element: &Element, name: &str) -> Option<Element> {
    let element_name = name.parse::<ElementName>().ok()?;
    element.get_sub_element(element_name)
}

/// All descendants of `element` with the given XML name, in document order
fn descendants(element: &Element, name: &str) -> Vec<Element> {
    let Ok(target) = name.parse::<ElementName>() else {
        log::warn!("Failed to parse element name '{}' into ElementName enum", name);
        return Vec::new();
    };

    let mut found = Vec::new();
    let mut stack: Vec<Element> = element.sub_elements().collect();
    stack.reverse();
    while let Some(current) = stack.pop() {
        if current.element_name() == target {
            found.push(current.clone());
        }
        let mut children: Vec<Element> = current.sub_elements().collect();
        children.reverse();
        stack.extend(children);
    }
    found
}

/// Character content as text, whatever its schema type (string, enum or number)
fn character_text(element: &Element) -> Option<String> {
    element.character_data().map(|c| c.to_string())
}

/// Last path segment of a reference, e.g. `/Pdus/EngineData` -> `EngineData`
fn reference_target(element: &Element) -> Option<String> {
    let path = character_text(element)?;
    path.rsplit('/').next().filter(|s| !s.is_empty()).map(str::to_string)
}
