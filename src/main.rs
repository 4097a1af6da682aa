//! Heaplens - Hierarchical Heap-Allocation Analyzer
//!
//! Command-line entry point: loads a capture file, selects an observation
//! window and prints each heap's classifier tree.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use heaplens::report;
use heaplens_classifier::{ClassGrouping, Filter};
use heaplens_session::{SessionConfig, SessionRegistry};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

struct Options {
    capture_path: PathBuf,
    range: Option<(i64, i64)>,
    grouping: ClassGrouping,
    filter: Option<String>,
    regex: bool,
    csv_path: Option<PathBuf>,
}

fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to set tracing subscriber");
        return ExitCode::FAILURE;
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let options = match parse_args(std::env::args().skip(1))? {
        Some(options) => options,
        None => return Ok(()),
    };

    info!("heaplens v{}", VERSION);
    let capture = heaplens_capture::load_capture(&options.capture_path)
        .with_context(|| format!("loading {:?}", options.capture_path))?;

    let config = SessionConfig {
        default_grouping: options.grouping,
        ..SessionConfig::default()
    };
    let (min, max) = options.range.unwrap_or_else(|| full_range(&capture));
    let heap_count = capture.heap_ids().count();

    let mut registry = SessionRegistry::with_config(config);
    let id = registry.create_session(capture);
    let session = registry.session_mut(id)?;
    session.select_range(min, max)?;

    if let Some(text) = &options.filter {
        let filter = if options.regex {
            Filter::regex(text, false)
        } else {
            Filter::substring(text)
        };
        let heaps: Vec<u32> = session.heaps().map(|(raw, _)| raw).collect();
        for raw in heaps {
            session.set_filter(raw, filter.clone())?;
        }
    }

    info!(heaps = heap_count, min, max, "selection ready");

    let mut csv = match &options.csv_path {
        Some(path) => Some(
            std::fs::File::create(path).with_context(|| format!("creating {:?}", path))?,
        ),
        None => None,
    };

    let raw_ids: Vec<u32> = session.heaps().map(|(raw, _)| raw).collect();
    for raw in raw_ids {
        let (capture, heap_set) = session
            .capture_and_heap_mut(raw)
            .ok_or_else(|| anyhow::anyhow!("heap {} vanished", raw))?;
        println!("{}", report::render_heap(capture, heap_set));
        if let Some(file) = csv.as_mut() {
            report::write_csv(capture, heap_set, file)?;
        }
    }
    if let Some(path) = &options.csv_path {
        info!("CSV report written to {:?}", path);
    }
    Ok(())
}

/// Default window covering every timestamped event in the capture
fn full_range(capture: &heaplens_capture::Capture) -> (i64, i64) {
    let mut min = i64::MAX;
    let mut max = i64::MIN;
    for (_, instance) in capture.instances() {
        for time in [instance.alloc_time, instance.dealloc_time].into_iter().flatten() {
            min = min.min(time);
            max = max.max(time);
        }
    }
    if min > max {
        (0, 0)
    } else {
        (min, max)
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Option<Options>> {
    let mut capture_path = None;
    let mut range = None;
    let mut grouping = ClassGrouping::default();
    let mut filter = None;
    let mut regex = false;
    let mut csv_path = None;

    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            "--range" => {
                let min = next_value(&mut args, "--range")?.parse::<i64>()?;
                let max = next_value(&mut args, "--range")?.parse::<i64>()?;
                range = Some((min, max));
            }
            "--group" => {
                grouping = parse_grouping(&next_value(&mut args, "--group")?)?;
            }
            "--filter" => {
                filter = Some(next_value(&mut args, "--filter")?);
            }
            "--regex" => {
                regex = true;
            }
            "--csv" => {
                csv_path = Some(PathBuf::from(next_value(&mut args, "--csv")?));
            }
            other if other.starts_with('-') => {
                bail!("unknown option: {}", other);
            }
            _ => {
                if capture_path.is_some() {
                    bail!("more than one capture file given");
                }
                capture_path = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(capture_path) = capture_path else {
        print_usage();
        bail!("no capture file given");
    };
    Ok(Some(Options {
        capture_path,
        range,
        grouping,
        filter,
        regex,
        csv_path,
    }))
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow::anyhow!("missing value for {}", flag))
}

fn parse_grouping(name: &str) -> Result<ClassGrouping> {
    Ok(match name {
        "class" => ClassGrouping::ByClass,
        "package" => ClassGrouping::ByPackage,
        "callstack" => ClassGrouping::ByCallstack,
        "native-method" => ClassGrouping::NativeByAllocationMethod,
        "native-callstack" => ClassGrouping::NativeByCallstack,
        other => bail!(
            "unknown grouping: {} (expected class, package, callstack, native-method or native-callstack)",
            other
        ),
    })
}

fn print_usage() {
    println!("heaplens v{}", VERSION);
    println!("Usage: heaplens <capture.json> [options]");
    println!();
    println!("Options:");
    println!("  --range MIN MAX     observation window (default: full recording)");
    println!("  --group MODE        class | package | callstack | native-method | native-callstack");
    println!("  --filter TEXT       only show sets matching TEXT");
    println!("  --regex             treat the filter as a regular expression");
    println!("  --csv PATH          also write the flattened tree as CSV");
    println!("  -h, --help          show this help");
}
