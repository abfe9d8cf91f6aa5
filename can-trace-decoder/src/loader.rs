//! Database loader
//!
//! Loads signal catalogs in order and merges their message definitions into one
//! frame-identifier index. The earliest catalog defining a frame identifier wins;
//! later definitions are skipped with an informational notice.

use crate::signals::{load_catalog, MessageDefinition, SignalCatalog};
use crate::types::{DecoderError, FrameId, Result};
use log::{Level, Log, Record};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A message definition skipped because its frame identifier was already claimed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateFrame {
    pub frame_id: FrameId,
    /// Name of the skipped message
    pub message: String,
    /// Catalog the skipped message came from
    pub source: String,
    /// Catalog whose definition was kept
    pub kept_source: String,
}

/// A message definition together with the catalog that owns it
#[derive(Clone)]
pub struct IndexedMessage {
    catalog: Arc<dyn SignalCatalog>,
    index: usize,
}

impl IndexedMessage {
    pub fn catalog(&self) -> &Arc<dyn SignalCatalog> {
        &self.catalog
    }

    pub fn message(&self) -> &MessageDefinition {
        &self.catalog.messages()[self.index]
    }
}

/// Frame identifier -> owning catalog and message definition, merged across catalogs
pub struct MergedIndex {
    entries: BTreeMap<FrameId, IndexedMessage>,
    duplicates: Vec<DuplicateFrame>,
}

impl MergedIndex {
    /// Merge already-loaded catalogs, first writer wins
    ///
    /// Skipped duplicates are reported at INFO level through `logger`.
    pub fn from_catalogs(catalogs: Vec<Arc<dyn SignalCatalog>>, logger: &dyn Log) -> Result<Self> {
        if catalogs.is_empty() {
            return Err(DecoderError::Configuration(
                "expecting `databases` to not be of length zero".to_string(),
            ));
        }

        let mut entries: BTreeMap<FrameId, IndexedMessage> = BTreeMap::new();
        let mut duplicates = Vec::new();

        for catalog in catalogs {
            for (index, message) in catalog.messages().iter().enumerate() {
                if let Some(existing) = entries.get(&message.id) {
                    // Repeats inside one catalog are resolved by the catalog itself
                    if Arc::ptr_eq(&existing.catalog, &catalog) {
                        log::debug!(
                            "{} repeats frame 0x{:X} within {}, ignored",
                            message.name,
                            message.id,
                            catalog.source()
                        );
                        continue;
                    }
                    notice(
                        logger,
                        format_args!(
                            "{} already present in another database ({}), keeping the first definition",
                            message.name,
                            existing.catalog.source()
                        ),
                    );
                    duplicates.push(DuplicateFrame {
                        frame_id: message.id,
                        message: message.name.clone(),
                        source: catalog.source().to_string(),
                        kept_source: existing.catalog.source().to_string(),
                    });
                    continue;
                }

                entries.insert(
                    message.id,
                    IndexedMessage {
                        catalog: Arc::clone(&catalog),
                        index,
                    },
                );
            }
        }

        Ok(Self {
            entries,
            duplicates,
        })
    }

    /// Number of distinct frame identifiers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, frame_id: FrameId) -> Option<&IndexedMessage> {
        self.entries.get(&frame_id)
    }

    /// Entries in ascending frame identifier order
    pub fn iter(&self) -> impl Iterator<Item = (FrameId, &IndexedMessage)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    /// Definitions skipped during merging
    pub fn duplicates(&self) -> &[DuplicateFrame] {
        &self.duplicates
    }

    pub(crate) fn into_duplicates(self) -> Vec<DuplicateFrame> {
        self.duplicates
    }
}

/// Load the catalogs at `paths` in order and merge them
pub fn load_databases(paths: &[PathBuf], logger: &dyn Log) -> Result<MergedIndex> {
    if paths.is_empty() {
        return Err(DecoderError::Configuration(
            "expecting `databases` to not be of length zero".to_string(),
        ));
    }

    let catalogs = paths
        .iter()
        .map(|path| load_catalog(path))
        .collect::<Result<Vec<_>>>()?;

    MergedIndex::from_catalogs(catalogs, logger)
}

/// Emit an informational notice through the injected logger
fn notice(logger: &dyn Log, args: fmt::Arguments<'_>) {
    let record = Record::builder()
        .level(Level::Info)
        .target(module_path!())
        .args(args)
        .build();
    if logger.enabled(record.metadata()) {
        logger.log(&record);
    }
}
