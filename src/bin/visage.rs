//! Visage CLI - batch front-end for the metrics core
//!
//! Commands:
//! - transform: events NDJSON/JSON → window metrics
//! - aggregate: window metrics → k-anonymous, DP-noised group aggregates
//! - sequences: events → training sequences for the drop-off classifier
//! - defaults: print the current default privacy parameters

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use visage_metrics::config::{DetectorConfig, PrivacyDefaults, SequenceConfig};
use visage_metrics::error::MetricsError;
use visage_metrics::pipeline::{parse_events, parse_ndjson, run_pipeline_with_mask};
use visage_metrics::privacy::{dp_group_aggregate, LaplaceNoise};
use visage_metrics::sequences::{build_sequences, dropoff_labels, next_event_gaps};
use visage_metrics::synthesizer::FeatureMask;
use visage_metrics::types::{AggregationOp, AggregationRequest, MetricKind, WindowMetrics};
use visage_metrics::VERSION;

/// Visage - privacy-preserving behavioral quality metrics
#[derive(Parser)]
#[command(name = "visage")]
#[command(version = VERSION)]
#[command(about = "Transform UI interaction events into privacy-bounded metrics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform raw events into window metrics (batch mode)
    Transform {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Window length in seconds
        #[arg(long, default_value = "5.0")]
        window_sec: f64,

        /// Session inactivity gap in seconds
        #[arg(long, default_value = "1800.0")]
        session_gap_sec: f64,

        /// Zero the cursor-jitter term (ablation run)
        #[arg(long)]
        ablate_cursor: bool,

        /// Zero the scroll oscillation/velocity terms (ablation run)
        #[arg(long)]
        ablate_scroll: bool,
    },

    /// Aggregate window metrics under k-anonymity and differential privacy
    Aggregate {
        /// Window-metrics NDJSON file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Grouping columns
        #[arg(long, value_delimiter = ',', required = true)]
        group_by: Vec<String>,

        /// Target metric (UFI, RCS, MIV)
        #[arg(long)]
        metric: String,

        /// Aggregation operator (mean, sum, count)
        #[arg(long, default_value = "mean")]
        agg: String,

        /// Privacy budget
        #[arg(long, default_value = "1.0")]
        epsilon: f64,

        /// Minimum group size
        #[arg(long, default_value = "5")]
        k: usize,

        /// Lower clipping bound
        #[arg(long, default_value = "0.0")]
        clip_lo: f64,

        /// Upper clipping bound
        #[arg(long, default_value = "1.0")]
        clip_hi: f64,

        /// Seed the noise source (reproducible output; omit for OS entropy)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Build training sequences for the drop-off classifier
    Sequences {
        /// Input events file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Windows per sequence
        #[arg(long, default_value = "6")]
        seq_len: usize,

        /// Drop-off horizon in seconds
        #[arg(long, default_value = "10.0")]
        horizon_sec: f64,
    },

    /// Print the current default privacy parameters
    Defaults,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array
    Json,
    /// Pretty-printed JSON array
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), MetricsError> {
    match cli.command {
        Commands::Transform {
            input,
            output,
            input_format,
            output_format,
            window_sec,
            session_gap_sec,
            ablate_cursor,
            ablate_scroll,
        } => cmd_transform(
            &input,
            &output,
            input_format,
            output_format,
            window_sec,
            session_gap_sec,
            FeatureMask {
                cursor_jitter: !ablate_cursor,
                scroll_terms: !ablate_scroll,
            },
        ),

        Commands::Aggregate {
            input,
            group_by,
            metric,
            agg,
            epsilon,
            k,
            clip_lo,
            clip_hi,
            seed,
        } => cmd_aggregate(
            &input, group_by, &metric, &agg, epsilon, k, clip_lo, clip_hi, seed,
        ),

        Commands::Sequences {
            input,
            input_format,
            seq_len,
            horizon_sec,
        } => cmd_sequences(&input, input_format, seq_len, horizon_sec),

        Commands::Defaults => {
            println!(
                "{}",
                serde_json::to_string_pretty(&PrivacyDefaults::default())?
            );
            Ok(())
        }
    }
}

fn read_input(path: &Path) -> Result<String, MetricsError> {
    if path.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("reading from stdin (pipe NDJSON or press Ctrl-D to finish)");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn write_output(path: &Path, data: &str) -> Result<(), MetricsError> {
    if path.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(data.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    } else {
        Ok(fs::write(path, data)?)
    }
}

fn load_events(path: &Path, format: InputFormat) -> Result<(Vec<visage_metrics::RawEvent>, usize), MetricsError> {
    let input = read_input(path)?;
    match format {
        InputFormat::Ndjson => {
            let batch = parse_ndjson(&input);
            Ok((batch.events, batch.malformed))
        }
        InputFormat::Json => Ok((parse_events(&input)?, 0)),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_transform(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    window_sec: f64,
    session_gap_sec: f64,
    mask: FeatureMask,
) -> Result<(), MetricsError> {
    let (events, malformed) = load_events(input, input_format)?;
    if malformed > 0 {
        eprintln!("dropped {} malformed input lines", malformed);
    }
    if events.is_empty() {
        eprintln!("no events in input; nothing to do");
        return write_output(output, "");
    }

    let config = DetectorConfig {
        window_sec,
        session_gap_sec,
        ..DetectorConfig::default()
    };
    let result = run_pipeline_with_mask(events, &config, mask);
    if result.discarded > 0 {
        eprintln!(
            "discarded {} events with missing or unparseable timestamps",
            result.discarded
        );
    }
    eprintln!(
        "run {}: {} sessions' events -> {} windows",
        result.run_id,
        result.events.len(),
        result.windows.len()
    );

    let rendered = render(&result.metrics, output_format)?;
    write_output(output, &rendered)
}

#[allow(clippy::too_many_arguments)]
fn cmd_aggregate(
    input: &Path,
    group_by: Vec<String>,
    metric: &str,
    agg: &str,
    epsilon: f64,
    k: usize,
    clip_lo: f64,
    clip_hi: f64,
    seed: Option<u64>,
) -> Result<(), MetricsError> {
    // Validate the query surface before touching any data.
    let request = AggregationRequest {
        group_by,
        metric: metric.parse::<MetricKind>()?,
        agg: agg.parse::<AggregationOp>()?,
        epsilon,
        k,
        clip_lo,
        clip_hi,
    };

    let rows: Vec<WindowMetrics> = read_input(input)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    if rows.is_empty() {
        eprintln!("no metric rows in input; nothing to aggregate");
    }

    let mut noise = match seed {
        Some(seed) => LaplaceNoise::seeded(seed),
        None => LaplaceNoise::from_entropy(),
    };
    let results = dp_group_aggregate(&rows, &request, &mut noise)?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn cmd_sequences(
    input: &Path,
    input_format: InputFormat,
    seq_len: usize,
    horizon_sec: f64,
) -> Result<(), MetricsError> {
    let (events, malformed) = load_events(input, input_format)?;
    if malformed > 0 {
        eprintln!("dropped {} malformed input lines", malformed);
    }
    if events.is_empty() {
        eprintln!("no events in input; nothing to do");
        return Ok(());
    }

    let config = DetectorConfig::default();
    let result = run_pipeline_with_mask(events, &config, FeatureMask::default());
    let gaps = next_event_gaps(&result.events, &result.windows);
    let labels = dropoff_labels(&gaps, horizon_sec);
    let sequences = build_sequences(
        &result.windows,
        &labels,
        &SequenceConfig {
            seq_len,
            horizon_sec,
        },
    );

    eprintln!(
        "{} windows -> {} sequences of length {}",
        result.windows.len(),
        sequences.len(),
        seq_len
    );
    let mut stdout = io::stdout();
    for sequence in &sequences {
        serde_json::to_writer(&mut stdout, sequence)?;
        stdout.write_all(b"\n")?;
    }
    Ok(())
}

fn render<T: serde::Serialize>(records: &[T], format: OutputFormat) -> Result<String, MetricsError> {
    match format {
        OutputFormat::Ndjson => {
            let lines: Result<Vec<String>, _> =
                records.iter().map(serde_json::to_string).collect();
            Ok(lines?.join("\n"))
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}
