use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qrsbench_lib::commands::{self, CommandResult};
use qrsbench_lib::config::{clamp_tolerance, EvaluationConfig};
use qrsbench_lib::dataset::Dataset;
use qrsbench_lib::detector::Algorithm;
use qrsbench_lib::events::MatchPolicy;
use qrsbench_lib::metrics::DelayStats;
use qrsbench_lib::report::{RecordReport, COLUMNS, GLOBAL_ROW};

#[derive(Parser)]
#[command(name = "qrsbench")]
#[command(about = "Evaluate QRS detectors against annotated ECG databases", long_about = None)]
#[command(version)]
struct Cli {
    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Root of the frames/, annotations/ and perf/ directories
    #[arg(long, global = true, default_value = "output")]
    output: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate persisted detections and write performance tables
    Evaluate {
        /// Dataset name (case-insensitive)
        #[arg(short, long)]
        dataset: String,

        /// Algorithm name
        #[arg(short, long)]
        algorithm: String,

        /// Tolerance in ms, clamped to 0..=1000
        #[arg(short, long, default_value = "150", allow_negative_numbers = true)]
        tolerance: i64,

        /// Matching policy: shared or one-to-one
        #[arg(long, default_value = "shared")]
        policy: String,

        /// Records evaluated concurrently
        #[arg(short, long, default_value = "1")]
        workers: usize,

        /// Channel to evaluate instead of each record's first one
        #[arg(long)]
        channel: Option<String>,

        /// Checkpoint to a run ledger so an interrupted evaluation can resume
        #[arg(long)]
        checkpoint: bool,

        /// Run ledger path (defaults to the app data directory)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Compare algorithms on one dataset
    Compare {
        #[arg(short, long)]
        dataset: String,

        /// Tolerance in ms; defaults to the one operator tolerance on disk, not counting the fixed 25 and 50 ms tables
        #[arg(short, long)]
        tolerance: Option<u32>,

        /// Algorithms to compare (all when omitted)
        #[arg(short, long, value_delimiter = ',')]
        algorithms: Vec<String>,
    },

    /// Rank algorithms by mean F1 over the reference datasets
    Overview {
        #[arg(short, long, default_value = "150")]
        tolerance: u32,
    },

    /// Follow one algorithm across the noise stress test levels
    Noise {
        #[arg(short, long)]
        algorithm: String,

        #[arg(short, long, default_value = "150")]
        tolerance: u32,
    },

    /// Distribution of detection delays
    Delays {
        #[arg(short, long)]
        dataset: String,

        #[arg(short, long)]
        algorithm: String,

        #[arg(short, long, default_value = "150")]
        tolerance: u32,

        /// Single record instead of the pooled dataset
        #[arg(short, long)]
        record: Option<String>,
    },

    /// Inspect the run ledger
    Runs {
        /// Run ID to show in detail
        id: Option<String>,

        /// Check the recorded checksums of the run's files
        #[arg(long)]
        verify: bool,

        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List known datasets and algorithms
    List,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qrsbench=info,qrsbench_lib=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e.message());
        std::process::exit(1);
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) -> CommandResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}

fn run(cli: Cli) -> CommandResult<()> {
    let json = cli.json;
    let output = cli.output;

    match cli.command {
        Commands::Evaluate {
            dataset,
            algorithm,
            tolerance,
            policy,
            workers,
            channel,
            checkpoint,
            db,
        } => {
            let mut config = EvaluationConfig::from_names(&dataset, &algorithm, tolerance)?;
            config.output_root = output;
            config.policy = policy.parse::<MatchPolicy>()?;
            config.workers = workers;
            config.channel = channel;
            if checkpoint {
                config.checkpoint_db = Some(match db {
                    Some(path) => path,
                    None => qrsbench_lib::state::storage::default_db_path()?,
                });
            }

            let summary = commands::evaluate(&config)?;
            emit(json, &summary, |s| {
                for report in &s.reports {
                    println!("\n{} on {} at {} ms", s.algorithm, s.dataset, report.tolerance_ms);
                    print_header("record");
                    for row in &report.records {
                        print_row(&row.record_id, row);
                    }
                    print_row(GLOBAL_ROW, &report.global);
                }
                for path in &s.artifacts {
                    println!("wrote {}", path.display());
                }
            })
        }

        Commands::Compare {
            dataset,
            tolerance,
            algorithms,
        } => {
            let dataset: Dataset = dataset.parse()?;
            let algorithms = algorithms
                .iter()
                .map(|a| a.parse::<Algorithm>())
                .collect::<Result<Vec<_>, _>>()?;
            let comparison = commands::compare(&output, dataset, tolerance, &algorithms)?;
            emit(json, &comparison, |c| {
                println!("{} at {} ms", c.dataset, c.tolerance_ms);
                print_header("algorithm");
                for (algorithm, row) in &c.rows {
                    print_row(algorithm, row);
                }
                if !c.missing.is_empty() {
                    println!("not evaluated: {}", c.missing.join(", "));
                }
            })
        }

        Commands::Overview { tolerance } => {
            let summaries = commands::overview(&output, clamp_tolerance(tolerance as i64))?;
            emit(json, &summaries, |summaries| {
                println!("{:<28} {:>9} {:>9} {:>9}", "algorithm", "datasets", "F1(%)", "F(%)");
                for s in summaries {
                    println!(
                        "{:<28} {:>9} {:>9} {:>9}",
                        s.algorithm,
                        s.datasets_evaluated,
                        cell(s.mean_f1),
                        cell(s.mean_error_rate)
                    );
                }
            })
        }

        Commands::Noise {
            algorithm,
            tolerance,
        } => {
            let algorithm: Algorithm = algorithm.parse()?;
            let report = commands::noise(&output, algorithm, clamp_tolerance(tolerance as i64))?;
            emit(json, &report, |r| {
                println!("{} at {} ms", r.algorithm, r.tolerance_ms);
                print_header("level");
                for row in &r.baseline {
                    print_row(&format!("clean {}", row.record_id), row);
                }
                for level in &r.levels {
                    let label = format!("{} dB", level.snr_db);
                    match &level.global {
                        Some(row) => print_row(&label, row),
                        None => println!("{:<12} not evaluated", label),
                    }
                }
            })
        }

        Commands::Delays {
            dataset,
            algorithm,
            tolerance,
            record,
        } => {
            let dataset: Dataset = dataset.parse()?;
            let algorithm: Algorithm = algorithm.parse()?;
            let report = commands::delays(
                &output,
                dataset,
                algorithm,
                clamp_tolerance(tolerance as i64),
                record.as_deref(),
            )?;
            emit(json, &report, |r| {
                let scope = r.record_id.as_deref().unwrap_or("all records");
                println!("{} on {} ({}) at {} ms", r.algorithm, r.dataset, scope, r.tolerance_ms);
                match &r.stats {
                    Some(stats) => {
                        println!(
                            "n={} mean={:.2} std={:.2} median={:.1} min={} max={} samples",
                            stats.count, stats.mean, stats.std_dev, stats.median, stats.min, stats.max
                        );
                        println!(
                            "mean={:.1} ms std={:.1} ms",
                            DelayStats::to_ms(stats.mean, r.sampling_frequency_hz),
                            DelayStats::to_ms(stats.std_dev, r.sampling_frequency_hz)
                        );
                    }
                    None => println!("no matched beats"),
                }
                if let Some(mode) = r.histogram.mode() {
                    println!("most frequent delay: {} samples", mode);
                }
                if r.histogram.out_of_range > 0 {
                    println!("{} delays outside ±{} samples", r.histogram.out_of_range, r.histogram.radius);
                }
                for (delay, count) in r.histogram.bins().filter(|(_, count)| *count > 0) {
                    println!("{:>6} {}", delay, count);
                }
            })
        }

        Commands::Runs { id, verify, db } => match id {
            Some(id) => {
                let details = commands::get_run_with_artifacts(db.as_deref(), &id)?;
                let mismatched = if verify {
                    commands::verify_run_artifacts(db.as_deref(), &id)?
                } else {
                    Vec::new()
                };
                emit(json, &details, |d| {
                    println!(
                        "{} {} on {} at {} ms: {} ({}/{} records)",
                        d.run.id,
                        d.run.algorithm,
                        d.run.dataset,
                        d.run.tolerance_ms,
                        d.run.status.as_str(),
                        d.completed_records,
                        d.run.expected_records
                    );
                    for artifact in &d.artifacts {
                        println!("  {} {}", &artifact.sha256[..artifact.sha256.len().min(12)], artifact.path);
                    }
                })?;
                for path in &mismatched {
                    eprintln!("checksum mismatch: {}", path);
                }
                Ok(())
            }
            None => {
                let runs = commands::list_runs(db.as_deref())?;
                emit(json, &runs, |runs| {
                    for run in runs {
                        println!(
                            "{} {} {} on {} at {} ms ({})",
                            run.id,
                            run.created_at.format("%Y-%m-%d %H:%M"),
                            run.algorithm,
                            run.dataset,
                            run.tolerance_ms,
                            run.status.as_str()
                        );
                    }
                })
            }
        },

        Commands::List => emit(json, &commands::list(), |catalog| {
            println!("datasets:");
            for d in &catalog.datasets {
                println!("  {:<42} {:>4} Hz {:>3} records", d.name, d.sampling_frequency_hz, d.records);
            }
            println!("algorithms:");
            for a in &catalog.algorithms {
                println!("  {}", a);
            }
        }),
    }
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "nan".to_string(), |v| format!("{:.2}", v))
}

fn print_header(index: &str) {
    print!("{:<12}", index);
    for column in COLUMNS {
        print!(" {:>9}", column);
    }
    println!();
}

fn print_row(label: &str, row: &RecordReport) {
    println!(
        "{:<12} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
        label,
        row.beat_count,
        row.false_positive,
        row.false_negative,
        row.errors,
        cell(row.error_rate),
        cell(row.positive_predictivity),
        cell(row.sensitivity),
        cell(row.f1)
    );
}
