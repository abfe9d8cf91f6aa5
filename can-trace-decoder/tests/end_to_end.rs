// End-to-end decoding of trace files against DBC catalogs on disk
use can_trace_decoder::{
    Decoder, DecoderConfig, DecoderError, FrameRecord, SchemaRegistry, TraceMessage,
};
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

const HEADER: &str = r#"
VERSION ""

NS_ :

BS_:

BU_: ECU1
"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn write_dbc(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    write_file(dir, name, format!("{}{}", HEADER, body).as_bytes())
}

fn record(timestamp: i32, frame_id: i32, payload: [u8; 8]) -> Vec<u8> {
    FrameRecord {
        timestamp,
        frame_id,
        payload,
    }
    .to_bytes()
    .to_vec()
}

const PRIMARY: &str = r#"
BO_ 16 Known: 8 ECU1
 SG_ B : 8|8@1+ (1,0) [0|255] "" ECU1
 SG_ A : 0|8@1+ (1,0) [0|255] "" ECU1

BO_ 48 Multiplexed: 8 ECU1
 SG_ Mode M : 0|8@1+ (1,0) [0|3] "" ECU1
 SG_ Temp m1 : 8|8@1+ (1,-40) [-40|215] "C" ECU1
 SG_ Speed m0 : 8|16@1+ (0.5,0) [0|1000] "km/h" ECU1
 SG_ Counter : 56|8@1+ (1,0) [0|255] "" ECU1
"#;

const SECONDARY: &str = r#"
BO_ 16 Shadow: 8 ECU1
 SG_ Other : 0|8@1+ (1,0) [0|255] "" ECU1

BO_ 64 Extra: 8 ECU1
 SG_ Level : 0|8@1+ (1,0) [0|255] "" ECU1
"#;

#[test]
fn known_then_unknown_frame() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let dbc = write_dbc(&dir, "primary.dbc", PRIMARY);

    let mut trace = record(10, 0x10, [1, 2, 0, 0, 0, 0, 0, 0]);
    trace.extend(record(20, 0x20, [11, 12, 13, 14, 15, 16, 17, 18]));
    let trace_path = write_file(&dir, "trace.bin", &trace);

    let config = DecoderConfig::new().add_database(&dbc).add_input(&trace_path);
    let decoder = Decoder::from_config(&config).unwrap();

    let mut iter = decoder.decode_file(&trace_path).unwrap();
    assert_eq!(iter.next().unwrap().unwrap(), TraceMessage::StreamBeginning);

    let msg = iter.next().unwrap().unwrap();
    let event = msg.event().unwrap();
    assert_eq!(event.name(), "Known");
    assert_eq!(event.fields().collect::<Vec<_>>(), vec![("A", 1.0), ("B", 2.0)]);
    assert_eq!(event.elapsed(), chrono::Duration::milliseconds(10));

    let msg = iter.next().unwrap().unwrap();
    let event = msg.event().unwrap();
    assert_eq!(event.name(), "UNKNOWN");
    assert_eq!(event.get("id"), Some(32.0));
    assert_eq!(
        event.values[1..].to_vec(),
        vec![11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0]
    );

    assert_eq!(iter.next().unwrap().unwrap(), TraceMessage::StreamEnd);
    for _ in 0..3 {
        assert!(iter.next().is_none());
    }
}

#[test]
fn multiplexed_frames_resolve_by_selector() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let dbc = write_dbc(&dir, "primary.dbc", PRIMARY);
    let registry = SchemaRegistry::from_paths(&[dbc]).unwrap();

    let mut trace = record(1, 0x30, [1, 60, 0, 0, 0, 0, 0, 5]);
    trace.extend(record(2, 0x30, [0, 200, 0, 0, 0, 0, 0, 6]));
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&trace).unwrap();
    file.flush().unwrap();

    let messages = can_trace_decoder::TraceIterator::open(&registry, file.path())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let events: Vec<_> = messages.iter().filter_map(|m| m.event()).collect();

    assert_eq!(
        events[0].fields().collect::<Vec<_>>(),
        vec![("Mode", 1.0), ("Temp", 20.0), ("Counter", 5.0)]
    );
    assert_eq!(
        events[1].fields().collect::<Vec<_>>(),
        vec![("Mode", 0.0), ("Speed", 100.0), ("Counter", 6.0)]
    );
}

#[test]
fn earlier_database_wins() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let primary = write_dbc(&dir, "primary.dbc", PRIMARY);
    let secondary = write_dbc(&dir, "secondary.dbc", SECONDARY);

    let registry = SchemaRegistry::from_paths(&[primary, secondary]).unwrap();

    assert_eq!(registry.frame_ids(), vec![0x10, 0x30, 0x40]);
    assert_eq!(registry.duplicates().len(), 1);
    assert_eq!(registry.duplicates()[0].message, "Shadow");
    assert_eq!(registry.duplicates()[0].kept_source, "primary.dbc");
}

#[test]
fn truncated_trace_fails_after_complete_records() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let dbc = write_dbc(&dir, "primary.dbc", PRIMARY);
    let registry = SchemaRegistry::from_paths(&[dbc]).unwrap();

    let mut trace = record(1, 0x10, [0; 8]);
    trace.extend(record(2, 0x10, [0; 8]));
    trace.truncate(16 + 9);
    let trace_path = write_file(&dir, "truncated.bin", &trace);

    let results: Vec<_> = can_trace_decoder::TraceIterator::open(&registry, &trace_path)
        .unwrap()
        .collect();
    assert_eq!(results.len(), 3);
    match &results[2] {
        Err(err @ DecoderError::Truncated { offset: 16, len: 9 }) => {
            assert!(!err.is_setup_error())
        }
        other => panic!("expected truncation, got {:?}", other),
    }
}

#[test]
fn registry_shared_across_threads() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let dbc = write_dbc(&dir, "primary.dbc", PRIMARY);
    let registry = SchemaRegistry::from_paths(&[dbc]).unwrap();

    let paths: Vec<PathBuf> = (0..4)
        .map(|n| {
            let mut trace = Vec::new();
            for i in 0..=n {
                trace.extend(record(i, 0x10, [i as u8, 0, 0, 0, 0, 0, 0, 0]));
            }
            write_file(&dir, &format!("trace{}.bin", n), &trace)
        })
        .collect();

    let counts: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = paths
            .iter()
            .map(|path| {
                let registry = &registry;
                scope.spawn(move || {
                    can_trace_decoder::TraceIterator::open(registry, path)
                        .unwrap()
                        .filter(|m| matches!(m, Ok(TraceMessage::Event(_))))
                        .count()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(counts, vec![1, 2, 3, 4]);
}
