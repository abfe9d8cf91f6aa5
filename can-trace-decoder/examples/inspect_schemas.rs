//! Print the event schemas derived from one or more signal databases
//!
//! Usage:
//!   inspect_schemas <db1.dbc> [<db2.arxml> ...]

use can_trace_decoder::{RegistryEntry, SchemaRegistry};
use std::env;
use std::path::PathBuf;

fn main() {
    env_logger::init();

    let paths: Vec<PathBuf> = env::args().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        eprintln!("Usage: inspect_schemas <database> [<database> ...]");
        std::process::exit(1);
    }

    let registry = match SchemaRegistry::from_paths(&paths) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    for frame_id in registry.frame_ids() {
        let Some(entry) = registry.lookup(frame_id) else {
            continue;
        };
        match entry {
            RegistryEntry::Single { catalog, schema } => {
                println!(
                    "0x{:03X} {} [{}]: {}",
                    frame_id,
                    schema.name(),
                    catalog.source(),
                    schema.fields().join(", ")
                );
            }
            RegistryEntry::Multiplexed {
                catalog,
                key,
                schemas,
            } => {
                println!("0x{:03X} multiplexed on {} [{}]", frame_id, key, catalog.source());
                for (value, schema) in schemas {
                    println!("    {} = {}: {}", key, value, schema.fields().join(", "));
                }
            }
        }
    }

    let unknown = registry.unknown_schema();
    println!("{}: {}", unknown.name(), unknown.fields().join(", "));

    for duplicate in registry.duplicates() {
        println!(
            "skipped 0x{:03X} {} from {} (kept {})",
            duplicate.frame_id, duplicate.message, duplicate.source, duplicate.kept_source
        );
    }
}
