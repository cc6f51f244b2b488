//! GoPro Meta command line tool
//!
//! Dumps the KLV tree of a GPMF metadata buffer, extracts its telemetry as
//! JSON, and answers "what was recorded at this playback time?" for a
//! telemetry JSON document.
//!
//! Usage: cargo run -p gopro-meta-cli -- <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use derive_more::{Display, Error, From};
use gopro_meta_gpmf::{GpmfError, Klv, ValueType};
use gopro_meta_telemetry::{LogLevel, StoreConfig, TelemetrySet, TelemetryStore};
use log::{debug, info, LevelFilter};
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Maximum number of values shown per record in `dump` output.
const MAX_VALUES_SHOWN: usize = 8;

/// Inspect GoPro telemetry: GPMF dumps, extraction, and playback-time queries.
#[derive(Parser)]
#[command(name = "gopro-meta", version, about)]
struct Args {
    /// Store configuration file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace), overrides the
    /// configuration file.
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the KLV tree of a raw GPMF metadata file.
    Dump {
        /// Path to the GPMF file.
        file: PathBuf,

        /// Show raw hex dump of every payload.
        #[arg(short = 'x', long)]
        hex: bool,

        /// Maximum number of top-level records to display.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract GPS and luminance samples from a raw GPMF file as JSON.
    Extract {
        /// Path to the GPMF file.
        file: PathBuf,

        /// Pretty-print the JSON output.
        #[arg(short, long)]
        pretty: bool,
    },
    /// Print the samples closest to a playback time from a telemetry JSON file.
    Query {
        /// Path to the telemetry JSON file.
        file: PathBuf,

        /// Playback time in seconds since the start of the video.
        #[arg(short, long)]
        at: f64,

        /// Pretty-print the JSON output.
        #[arg(short, long)]
        pretty: bool,
    },
}

#[derive(Debug, Display, Error, From)]
enum CliError {
    #[display("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[display("{}: invalid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[from]
    #[display("invalid GPMF data: {_0}")]
    Gpmf(GpmfError),
    #[display("failed to encode output: {source}")]
    Output { source: serde_json::Error },
}

fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(bytes: &[u8], path: &Path) -> Result<T, CliError> {
    serde_json::from_slice(bytes).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn load_config(path: &Path) -> Result<StoreConfig, CliError> {
    let mut config: StoreConfig = parse_json(&read_file(path)?, path)?;
    config.validate();
    Ok(config)
}

fn init_logging(level: LevelFilter) {
    let filter = tracing_subscriber::EnvFilter::new(level.as_str().to_lowercase());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();

    let config = match args.config.as_deref().map(load_config).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    init_logging(args.log_level.unwrap_or(config.log_level).as_level_filter());

    if let Err(e) = run(args.command, config) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Command, config: StoreConfig) -> Result<(), CliError> {
    match command {
        Command::Dump { file, hex, limit } => {
            let data = read_file(&file)?;
            let klvs = gopro_meta_gpmf::parse(&data)?;
            print_dump(&klvs, data.len(), hex, limit);
        }
        Command::Extract { file, pretty } => {
            let data = read_file(&file)?;
            let klvs = gopro_meta_gpmf::parse(&data)?;
            let telemetry = gopro_meta_gpmf::extract_telemetry(&klvs)?;
            info!(
                "Extracted {} GPS and {} luminance samples",
                telemetry.gps.len(),
                telemetry.luminance.len()
            );
            let set = TelemetrySet {
                gps: telemetry.gps,
                luminance: telemetry.luminance,
                ..TelemetrySet::default()
            };
            println!("{}", to_json(&set, pretty)?);
        }
        Command::Query { file, at, pretty } => {
            let set: TelemetrySet = parse_json(&read_file(&file)?, &file)?;
            let snapshot = query(set, config, at);
            println!("{}", to_json(&snapshot, pretty)?);
        }
    }
    Ok(())
}

/// Load `set` into a fresh store and take a snapshot at `seconds`.
///
/// A hue histogram that cannot be blended yields `color: null` in the
/// snapshot rather than an error, so one bad frame does not fail the query.
fn query(set: TelemetrySet, config: StoreConfig, seconds: f64) -> gopro_meta_telemetry::Snapshot {
    let mut store = TelemetryStore::new(config);
    store.load(set);
    store.set_video_current_time(seconds);
    debug!("Querying telemetry at {seconds:.3}s");
    store.snapshot()
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String, CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    json.map_err(|source| CliError::Output { source })
}

fn print_dump(klvs: &[Klv], file_size: usize, hex: bool, limit: Option<usize>) {
    println!("=== GPMF Metadata ===");
    println!("File size:        {file_size} bytes");
    println!("Top-level KLVs:   {}", klvs.len());
    println!();
    println!(
        "{:<24}  {:>8}  {:>5}  {:>6}  Data",
        "Key", "Type", "Size", "Repeat"
    );
    println!("{}", "-".repeat(72));

    let shown = limit.unwrap_or(klvs.len());
    for klv in klvs.iter().take(shown) {
        print_klv(klv, 0, hex);
    }
    if shown < klvs.len() {
        println!("... (truncated at {shown} records)");
    }

    println!("{}", "-".repeat(72));
}

fn print_klv(klv: &Klv, depth: usize, hex: bool) {
    let key = format!("{}{}", "  ".repeat(depth), klv.fourcc_str());
    println!(
        "{key:<24}  {ty:>8}  {size:>5}  {repeat:>6}  {data}",
        ty = klv.value_type.label(),
        size = klv.struct_size,
        repeat = klv.repeat,
        data = format_payload(klv, hex),
    );
    for child in &klv.children {
        print_klv(child, depth + 1, hex);
    }
}

fn format_payload(klv: &Klv, hex: bool) -> String {
    if klv.value_type == ValueType::Nested {
        return format!("({} children)", klv.children.len());
    }
    if klv.payload.is_empty() {
        return String::from("(no data)");
    }
    if !hex {
        if let Some(s) = klv.as_str() {
            return format!("{s:?}");
        }
        if let Some(values) = klv.as_f64s() {
            let mut out = values
                .iter()
                .take(MAX_VALUES_SHOWN)
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            if values.len() > MAX_VALUES_SHOWN {
                let _ = write!(out, " ... ({} values)", values.len());
            }
            return out;
        }
    }

    let mut out = String::with_capacity(klv.payload.len() * 3);
    for (i, b) in klv.payload.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
    out
}
