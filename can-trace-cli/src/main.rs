//! CAN Trace Decoder CLI Application
//!
//! Command-line driver for the can-trace-decoder library:
//! - Loads signal databases (DBC/ARXML) into one schema registry
//! - Decodes every input trace against it, in parallel, streaming each one
//! - Prints the messages of each trace as text or JSON lines

use anyhow::{bail, Context, Result};
use can_trace_decoder::{SchemaRegistry, TraceIterator, TraceMessage};
use clap::Parser;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

mod config;
mod output;

use config::{AppConfig, OutputFormat};

/// CAN Trace Decoder - Decode binary CAN traces with DBC/ARXML signal databases
#[derive(Parser, Debug)]
#[command(name = "can-trace")]
#[command(about = "Decode binary CAN traces (16-byte records) with DBC/ARXML databases", long_about = None)]
#[command(version)]
struct Args {
    /// Trace file(s) to decode (can be repeated)
    #[arg(short, long, value_name = "FILE")]
    input: Vec<PathBuf>,

    /// Signal database file(s), DBC or ARXML (can be repeated; earlier files win)
    #[arg(short, long, value_name = "FILE")]
    database: Vec<PathBuf>,

    /// Path to configuration file (TOML) providing inputs/databases
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Maximum number of events to decode per input
    #[arg(long, value_name = "COUNT")]
    max_events: Option<usize>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("CAN Trace Decoder CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", can_trace_decoder::VERSION);

    let config = resolve_config(&args)?;
    run(&config, args.output.as_deref())
}

/// Merge the optional config file with command-line flags (flags extend the lists)
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    config.decoder.inputs.extend(args.input.iter().cloned());
    config.decoder.databases.extend(args.database.iter().cloned());
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if args.max_events.is_some() {
        config.output.max_events = args.max_events;
    }

    config.decoder.validate()?;
    Ok(config)
}

fn run(config: &AppConfig, output_path: Option<&Path>) -> Result<()> {
    let registry = SchemaRegistry::from_paths(&config.decoder.databases)
        .context("Failed to build schema registry")?;
    log::info!(
        "Signal databases loaded: {} frame IDs, {} duplicates skipped",
        registry.len(),
        registry.duplicates().len()
    );

    let mut out: Box<dyn Write> = match output_path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {:?}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let inputs = &config.decoder.inputs;
    let mut failures = 0;

    if let [path] = inputs.as_slice() {
        // A single input streams straight to the output
        if let Err(e) = decode_trace(&registry, path, config, &mut out) {
            failures += 1;
            log::error!("{:?}: {:#}", path, e);
        }
    } else {
        // Each input gets its own iterator and spool file; the registry is shared read-only
        let spools: Vec<Result<(File, Result<usize>)>> = inputs
            .par_iter()
            .map(|path| spool_trace(&registry, path, config))
            .collect();

        for (path, spool) in inputs.iter().zip(spools) {
            let (mut spool, result) = spool?;
            io::copy(&mut spool, &mut out)
                .with_context(|| format!("Failed to write output for {:?}", path))?;
            if let Err(e) = result {
                failures += 1;
                log::error!("{:?}: {:#}", path, e);
            }
        }
    }
    out.flush()?;

    if failures > 0 {
        bail!("{} of {} inputs failed to decode", failures, inputs.len());
    }
    Ok(())
}

/// Decode one trace into an anonymous temporary file, rewound for reading.
/// The decode result is returned alongside so partial output survives a failure.
fn spool_trace(registry: &SchemaRegistry, path: &Path, config: &AppConfig) -> Result<(File, Result<usize>)> {
    let mut spool = tempfile::tempfile().context("Failed to create spool file")?;
    let result = {
        let mut writer = BufWriter::new(&mut spool);
        let result = decode_trace(registry, path, config, &mut writer);
        writer.flush().context("Failed to write spool file")?;
        result
    };
    spool.seek(SeekFrom::Start(0))?;
    Ok((spool, result))
}

/// Decode one trace file, writing each rendered message as it is produced.
/// Returns the number of events written.
fn decode_trace<W: Write>(
    registry: &SchemaRegistry,
    path: &Path,
    config: &AppConfig,
    out: &mut W,
) -> Result<usize> {
    let stream = path.display().to_string();
    let format = config.output.format;
    let mut events = 0usize;

    let iter = TraceIterator::open(registry, path)
        .with_context(|| format!("Failed to open trace file {:?}", path))?;

    for message in iter {
        let message = message
            .with_context(|| format!("Failed to decode {:?} after {} events", path, events))?;
        if let TraceMessage::Event(_) = message {
            if config.output.max_events.is_some_and(|max| events >= max) {
                log::debug!("Reached {} events in {:?}, stopping", events, path);
                writeln!(out, "{}", output::render(format, &stream, &TraceMessage::StreamEnd)?)?;
                break;
            }
            events += 1;
        }
        writeln!(out, "{}", output::render(format, &stream, &message)?)?;
    }

    log::info!("Decoded {} events from {:?}", events, path);
    Ok(events)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
