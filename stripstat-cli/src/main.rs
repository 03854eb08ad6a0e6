//! stripstat command-line interface.
//!
//! Runs the noise and efficiency analysis over binary event files.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand, ValueEnum};

use std::path::{Path, PathBuf};
use std::time::Instant;
use stripstat_algorithms::{analyze_run, RunReport};
use stripstat_core::cluster::{AdjacencyPolicy, ClusteringMode};
use stripstat_core::hit::RawEvent;
use stripstat_io::{load_strip_map, EventFileReader, ReportWriter, RunConfigFile};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    StripstatIo(#[from] stripstat_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] stripstat_core::Error),
}

/// Handling of two-hit time groups on non-adjacent strips.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    /// Keep both hits as single-strip clusters
    Split,
    /// Drop the pair as incoherent
    Discard,
}

/// Clustering mode selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Strip adjacency over the whole partition
    Strip,
    /// Time-window grouping, then strip adjacency
    TimeWindow,
}

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Per-region metrics and per-strip rates as CSV
    Csv,
    /// Full report including distributions as JSON
    Json,
}

/// Strip detector noise and efficiency analysis.
#[derive(Parser)]
#[command(name = "stripstat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze event files, one run per file
    Analyze {
        /// Input event file(s)
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Run configuration (analysis parameters and detector regions)
        #[arg(short, long)]
        config: PathBuf,

        /// Channel mapping
        #[arg(short, long)]
        mapping: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Clustering time window (nanoseconds), overrides the configuration
        #[arg(long)]
        cluster_time_ns: Option<f64>,

        /// Clustering mode, overrides the configuration
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Non-adjacent pair policy, overrides the configuration
        #[arg(long, value_enum)]
        policy: Option<Policy>,

        /// Report format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: Format,
    },

    /// Show information about an event file
    Info {
        /// Input event file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Analyze {
            input,
            config,
            mapping,
            output,
            cluster_time_ns,
            mode,
            policy,
            format,
        } => {
            let run = RunConfigFile::from_file(&config)?;
            let mut analysis = run.analysis;
            if let Some(window) = cluster_time_ns {
                analysis.clustering = analysis.clustering.with_cluster_time_ns(window);
            }
            if let Some(mode) = mode {
                analysis.clustering = analysis.clustering.with_mode(match mode {
                    Mode::Strip => ClusteringMode::Strip,
                    Mode::TimeWindow => ClusteringMode::TimeWindow,
                });
            }
            if let Some(policy) = policy {
                analysis.clustering = analysis.clustering.with_adjacency(match policy {
                    Policy::Split => AdjacencyPolicy::SplitSingles,
                    Policy::Discard => AdjacencyPolicy::DiscardPair,
                });
            }
            analysis.validate()?;

            let geometry = run.geometry;
            let strip_map = load_strip_map(&mapping, &geometry)?;
            log::info!(
                "{} regions, {} mapped channels, cluster time {} ns",
                geometry.len(),
                strip_map.len(),
                analysis.clustering.cluster_time_ns
            );
            for chamber in geometry.chambers() {
                log::debug!(
                    "chamber {chamber}: {} partitions, {:.1} cm2",
                    geometry.partition_count(chamber),
                    geometry.total_area_cm2(chamber)
                );
            }

            std::fs::create_dir_all(&output)?;
            let start = Instant::now();
            let mut total_events = 0u64;

            for (index, path) in input.iter().enumerate() {
                log::info!("reading {}", path.display());
                let reader = EventFileReader::open(path)?;
                let report = analyze_run(&reader, &geometry, &strip_map, &analysis)?;
                total_events += report.counters.events_processed;

                let stem = path
                    .file_stem()
                    .map_or_else(|| format!("run{index}"), |s| s.to_string_lossy().into_owned());
                write_report(&report, &output, &stem, format, analysis.chip_size)?;
                print_summary(path, &report);
            }

            let elapsed = start.elapsed();
            println!(
                "Processed {} files ({} events) in {:.2}s",
                input.len(),
                total_events,
                elapsed.as_secs_f64()
            );
        }

        Commands::Info { input } => {
            let reader = EventFileReader::open(&input)?;
            let file_size = reader.file_size();

            println!("File: {}", input.display());
            println!(
                "Size: {} bytes ({:.2} MB)",
                file_size,
                file_size as f64 / 1_000_000.0
            );
            println!("Events: {}", reader.event_count());
            println!("Hits: {}", reader.hit_count());

            let (mut corrupted, mut malformed) = (0usize, 0usize);
            for event in reader.iter() {
                match event {
                    Ok(event) if event.is_corrupted() => corrupted += 1,
                    Ok(event) if event.validate().is_err() => malformed += 1,
                    Ok(_) => {}
                    Err(_) => malformed += 1,
                }
            }
            println!("Corrupted: {}", corrupted);
            println!("Malformed: {}", malformed);

            if let Some((lo, hi)) = reader.time_range() {
                println!("Time range: {:.1} - {:.1} ns", lo, hi);
            }
            if let Some(Ok(first)) = reader.iter().next() {
                let last = reader.iter().last().and_then(std::result::Result::ok);
                print_event_range(&first, last);
            }
        }
    }

    Ok(())
}

fn write_report(
    report: &RunReport,
    dir: &Path,
    stem: &str,
    format: Format,
    chip_size: u16,
) -> Result<()> {
    match format {
        Format::Csv => {
            let metrics = dir.join(format!("{stem}.csv"));
            ReportWriter::create(&metrics)?.write_metrics_csv(report)?;
            let strips = dir.join(format!("{stem}_strips.csv"));
            ReportWriter::create(&strips)?.write_strip_rates_csv(report, chip_size)?;
            log::info!("wrote {} and {}", metrics.display(), strips.display());
        }
        Format::Json => {
            let path = dir.join(format!("{stem}.json"));
            ReportWriter::create(&path)?.write_json(report)?;
            log::info!("wrote {}", path.display());
        }
    }
    Ok(())
}

fn print_summary(path: &Path, report: &RunReport) {
    let c = &report.counters;
    println!(
        "{}: {} events ({} corrupted, {} malformed)",
        path.display(),
        c.events_processed,
        c.events_corrupted,
        c.events_malformed
    );
    println!(
        "  {:<12} | {:>16} | {:>14} | {:>18}",
        "Region", "Efficiency", "Cluster size", "Rate (Hz/cm2)"
    );
    for r in &report.regions {
        let m = &r.metrics;
        println!(
            "  {:<12} | {:>7.4} ± {:<6.4} | {:>6.3} ± {:<5.3} | {:>8.3} ± {:<7.3}",
            r.name,
            m.efficiency,
            m.efficiency_error,
            m.cluster_size,
            m.cluster_size_error,
            m.rate,
            m.rate_error
        );
    }
    for chamber in &report.chambers {
        println!(
            "  chamber {}: {:.3} ± {:.3} Hz/cm2, cluster size {:.3} ± {:.3}",
            chamber.chamber,
            chamber.rate,
            chamber.rate_error,
            chamber.cluster_size,
            chamber.cluster_size_error
        );
    }
}

fn print_event_range(first: &RawEvent, last: Option<RawEvent>) {
    match last {
        Some(last) => println!(
            "Event numbers: {} - {}",
            first.event_number, last.event_number
        ),
        None => println!("First event number: {}", first.event_number),
    }
}
