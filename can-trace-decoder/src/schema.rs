//! Event schemas and the schema registry
//!
//! The registry is built once from a merged catalog index and is read-only
//! afterwards. Every known frame identifier maps either to one event schema or,
//! for multiplexed messages, to one schema per multiplexer value.

use crate::loader::{load_databases, DuplicateFrame, MergedIndex};
use crate::signals::{MessageDefinition, SignalCatalog, SignalDefinition, SignalNode};
use crate::types::{DecoderError, FrameId, Result};
use log::Log;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the schema used for frames absent from every catalog
pub const UNKNOWN_SCHEMA_NAME: &str = "UNKNOWN";

/// Number of payload bytes surfaced by unknown-frame events
pub const UNKNOWN_PAYLOAD_FIELDS: usize = 7;

/// Ordered list of named numeric fields describing one category of event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    name: String,
    fields: Vec<String>,
}

impl EventSchema {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Position of a field in the schema
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Schema for frames no catalog defines: `id`, then `byte 0`..`byte 6`
    pub fn unknown() -> Self {
        let mut fields = Vec::with_capacity(UNKNOWN_PAYLOAD_FIELDS + 1);
        fields.push("id".to_string());
        fields.extend((0..UNKNOWN_PAYLOAD_FIELDS).map(|i| format!("byte {}", i)));
        Self::new(UNKNOWN_SCHEMA_NAME, fields)
    }
}

/// Decoding information registered for one known frame identifier
pub enum RegistryEntry {
    /// A message without multiplexer: one schema
    Single {
        catalog: Arc<dyn SignalCatalog>,
        schema: EventSchema,
    },
    /// A multiplexed message: the schema depends on the decoded multiplexer value
    Multiplexed {
        catalog: Arc<dyn SignalCatalog>,
        /// Name of the multiplexer signal
        key: String,
        schemas: BTreeMap<u64, EventSchema>,
    },
}

impl RegistryEntry {
    /// Catalog that owns the message definition
    pub fn catalog(&self) -> &Arc<dyn SignalCatalog> {
        match self {
            RegistryEntry::Single { catalog, .. } | RegistryEntry::Multiplexed { catalog, .. } => {
                catalog
            }
        }
    }

    /// Build the entry for one message definition
    pub fn build(catalog: Arc<dyn SignalCatalog>, message: &MessageDefinition) -> Result<Self> {
        let mut plain: Vec<&str> = Vec::new();
        let mut multiplexer = None;

        for node in &message.signal_tree {
            match node {
                SignalNode::Plain(name) => plain.push(name),
                SignalNode::Multiplexer { key, values } => {
                    if multiplexer.is_some() {
                        return Err(DecoderError::schema(
                            &message.name,
                            "multiple multiplexers found",
                        ));
                    }
                    multiplexer = Some((key, values));
                }
            }
        }

        let Some((key, values)) = multiplexer else {
            return Ok(RegistryEntry::Single {
                catalog,
                schema: single_schema(message),
            });
        };

        if values.is_empty() {
            return Err(DecoderError::schema(&message.name, "no multiplexer found"));
        }

        // BTreeMap iteration builds the schemas in ascending value order
        let schemas = values
            .iter()
            .map(|(value, specific)| {
                let fields = std::iter::once(key.as_str())
                    .chain(specific.iter().map(String::as_str))
                    .chain(plain.iter().copied())
                    .map(str::to_string)
                    .collect();
                (*value, EventSchema::new(message.name.clone(), fields))
            })
            .collect();

        Ok(RegistryEntry::Multiplexed {
            catalog,
            key: key.clone(),
            schemas,
        })
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryEntry::Single { catalog, schema } => f
                .debug_struct("Single")
                .field("source", &catalog.source())
                .field("schema", schema)
                .finish(),
            RegistryEntry::Multiplexed {
                catalog,
                key,
                schemas,
            } => f
                .debug_struct("Multiplexed")
                .field("source", &catalog.source())
                .field("key", key)
                .field("schemas", schemas)
                .finish(),
        }
    }
}

/// Fields of a non-multiplexed message: every signal, ascending by start bit.
/// Signals sharing a start bit keep their declaration order.
fn single_schema(message: &MessageDefinition) -> EventSchema {
    let mut signals: Vec<&SignalDefinition> = message.signals.iter().collect();
    signals.sort_by_key(|s| s.start_bit);

    EventSchema::new(
        message.name.clone(),
        signals.iter().map(|s| s.name.clone()).collect(),
    )
}

/// Read-only frame identifier -> schema mapping shared by all trace iterators
#[derive(Debug)]
pub struct SchemaRegistry {
    entries: HashMap<FrameId, RegistryEntry>,
    unknown: EventSchema,
    duplicates: Vec<DuplicateFrame>,
}

impl SchemaRegistry {
    /// Build the registry from a merged catalog index
    pub fn build(index: MergedIndex) -> Result<Self> {
        let mut entries = HashMap::with_capacity(index.len());

        for (frame_id, indexed) in index.iter() {
            let message = indexed.message();
            let entry = RegistryEntry::build(Arc::clone(indexed.catalog()), message)?;
            match &entry {
                RegistryEntry::Single { schema, .. } => {
                    log::debug!(
                        "Created event schema '{}' for 0x{:X} ({} fields)",
                        message.name,
                        frame_id,
                        schema.len()
                    );
                }
                RegistryEntry::Multiplexed { key, schemas, .. } => {
                    log::debug!(
                        "Created {} event schemas '{}' for 0x{:X} multiplexed on {}",
                        schemas.len(),
                        message.name,
                        frame_id,
                        key
                    );
                }
            }
            entries.insert(frame_id, entry);
        }

        log::info!("Schema registry built: {} frame identifiers", entries.len());

        Ok(Self {
            entries,
            unknown: EventSchema::unknown(),
            duplicates: index.into_duplicates(),
        })
    }

    /// Merge the given catalogs and build the registry
    pub fn from_catalogs(catalogs: Vec<Arc<dyn SignalCatalog>>, logger: &dyn Log) -> Result<Self> {
        Self::build(MergedIndex::from_catalogs(catalogs, logger)?)
    }

    /// Load the catalogs at `paths`, merge them and build the registry
    ///
    /// Duplicate-frame notices go to the global logger.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self> {
        Self::from_paths_with_logger(paths, log::logger())
    }

    pub fn from_paths_with_logger(paths: &[PathBuf], logger: &dyn Log) -> Result<Self> {
        Self::build(load_databases(paths, logger)?)
    }

    /// Entry registered for a frame identifier, `None` for unknown frames
    pub fn lookup(&self, frame_id: FrameId) -> Option<&RegistryEntry> {
        self.entries.get(&frame_id)
    }

    /// Schema used for frames absent from every catalog
    pub fn unknown_schema(&self) -> &EventSchema {
        &self.unknown
    }

    /// Number of known frame identifiers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Known frame identifiers in ascending order
    pub fn frame_ids(&self) -> Vec<FrameId> {
        let mut ids: Vec<FrameId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Definitions skipped while merging catalogs
    pub fn duplicates(&self) -> &[DuplicateFrame] {
        &self.duplicates
    }
}
