//! CLI entry point for the online clustering engine.
//!
//! Replays recorded embedding streams through the engine, generates
//! synthetic streams and shows the effective configuration.

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use links_cluster::exit_code::ExitCode;
use links_cluster::{Conversation, LinksCluster, Settings, StreamEvent, StreamGenerator};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

// JSON output structures
#[derive(Debug, Serialize)]
struct Assignment {
    line: usize,
    cluster: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ClusterSummary {
    index: usize,
    subclusters: usize,
    vectors: usize,
    conversations: Vec<Conversation>,
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
    processed: usize,
    skipped: usize,
    clusters: Vec<ClusterSummary>,
}

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Online clustering of embedding streams
#[derive(Parser)]
#[command(
    name = "links-cluster",
    version = env!("CARGO_PKG_VERSION"),
    about = "Online clustering of embedding streams",
    long_about = "Assign a stream of embedding vectors to identity clusters as they arrive and track when each identity was active.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log engine decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Cluster a recorded stream
    #[command(about = "Run a JSON-lines stream of vectors through the engine")]
    Replay {
        /// JSON-lines file with {"vector": [...], "timestamp": t}; `-` reads stdin
        #[arg(default_value = "-")]
        input: String,

        /// Output assignments and summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a synthetic stream
    #[command(about = "Write a synthetic stream of identities coming and going")]
    Simulate {
        /// Number of distinct identities
        #[arg(long, default_value_t = 3)]
        identities: usize,

        /// Vector dimension
        #[arg(long, default_value_t = 64)]
        dimension: usize,

        /// Number of visits to generate
        #[arg(long, default_value_t = 10)]
        visits: usize,

        /// Observations per visit
        #[arg(long, default_value_t = StreamGenerator::DEFAULT_VISIT_LENGTH)]
        visit_length: usize,

        /// Per-component noise amplitude
        #[arg(long, default_value_t = StreamGenerator::DEFAULT_NOISE)]
        noise: f32,

        /// Seconds between observations inside a visit
        #[arg(long, default_value_t = StreamGenerator::DEFAULT_STEP)]
        step: f64,

        /// Idle seconds after each visit (defaults to 4x the conversation threshold)
        #[arg(long)]
        idle_gap: Option<f64>,

        /// Seed for a reproducible stream
        #[arg(long)]
        seed: Option<u64>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the effective configuration
    #[command(about = "Print the effective settings as TOML")]
    Config,
}

fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(ExitCode::from_config_error(&e).into());
        }
    };

    init_tracing(cli.verbose || settings.debug);

    let result = match cli.command {
        Commands::Replay { input, json } => replay(&settings, &input, json),
        Commands::Simulate {
            identities,
            dimension,
            visits,
            visit_length,
            noise,
            step,
            idle_gap,
            seed,
            output,
        } => {
            let idle_gap = idle_gap.unwrap_or(4.0 * settings.clustering.conversation_threshold);
            let generator = match seed {
                Some(seed) => StreamGenerator::seeded(identities, dimension, seed),
                None => StreamGenerator::new(identities, dimension),
            }
            .with_visit_length(visit_length)
            .with_noise(noise)
            .with_step(step)
            .with_idle_gap(idle_gap);
            simulate(generator, visits, output)
        }
        Commands::Config => settings
            .to_toml()
            .map(|toml| print!("{toml}"))
            .map_err(anyhow::Error::from),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(ExitCode::from_anyhow(&e).into());
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn open_input(input: &str) -> anyhow::Result<Box<dyn BufRead>> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(input).with_context(|| format!("Failed to open '{input}'"))?;
    Ok(Box::new(BufReader::new(file)))
}

fn replay(settings: &Settings, input: &str, json: bool) -> anyhow::Result<()> {
    let mut engine = LinksCluster::new(settings.clustering.clone())?;
    let reader = open_input(input)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut processed = 0usize;
    let mut skipped = 0usize;
    for (number, line) in reader.lines().enumerate() {
        let line_number = number + 1;
        let line = line.with_context(|| format!("Failed to read line {line_number}"))?;
        if line.trim().is_empty() {
            continue;
        }

        let event: StreamEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping line {line_number}: {e}");
                skipped += 1;
                continue;
            }
        };

        let assigned = match engine.predict(&event.vector, event.timestamp) {
            Ok(assigned) => assigned,
            Err(e) if e.is_recoverable() => {
                warn!("Skipping line {line_number}: {e}");
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        processed += 1;

        let cluster = assigned.map(usize::from);
        if json {
            serde_json::to_writer(
                &mut out,
                &Assignment {
                    line: line_number,
                    cluster,
                },
            )?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}", describe_assignment(line_number, cluster))?;
        }
    }

    debug!("Replay finished: {processed} processed, {skipped} skipped");
    let summary = summarize(&engine, processed, skipped)?;
    if json {
        serde_json::to_writer(&mut out, &summary)?;
        writeln!(out)?;
    } else {
        write_summary(&mut out, &summary)?;
    }
    out.flush()?;

    info!(
        "Replayed {processed} vectors into {} clusters",
        engine.cluster_count()
    );
    Ok(())
}

/// Text-mode line for one replayed vector.
fn describe_assignment(line_number: usize, cluster: Option<usize>) -> String {
    match cluster {
        Some(index) => format!("line {line_number}: cluster {index}"),
        None => format!("line {line_number}: no assignment (first vector)"),
    }
}

fn summarize(engine: &LinksCluster, processed: usize, skipped: usize) -> anyhow::Result<ReplaySummary> {
    let mut clusters = Vec::with_capacity(engine.cluster_count());
    for (index, cluster) in engine.clusters().iter().enumerate() {
        clusters.push(ClusterSummary {
            index,
            subclusters: cluster.len(),
            vectors: cluster.vector_count(),
            conversations: engine.conversation_list(index)?,
        });
    }
    Ok(ReplaySummary {
        processed,
        skipped,
        clusters,
    })
}

fn write_summary(out: &mut impl Write, summary: &ReplaySummary) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{} vectors processed, {} skipped, {} clusters",
        summary.processed,
        summary.skipped,
        summary.clusters.len()
    )?;
    for cluster in &summary.clusters {
        writeln!(
            out,
            "cluster {}: {} subclusters, {} vectors",
            cluster.index, cluster.subclusters, cluster.vectors
        )?;
        for conversation in &cluster.conversations {
            writeln!(
                out,
                "  {:.1} - {:.1} ({:.1}s)",
                conversation.start(),
                conversation.end(),
                conversation.duration()
            )?;
        }
    }
    Ok(())
}

fn simulate(mut generator: StreamGenerator, visits: usize, output: Option<PathBuf>) -> anyhow::Result<()> {
    let writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create '{}'", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut out = BufWriter::new(writer);

    let events = generator.generate(visits);
    for event in &events {
        serde_json::to_writer(&mut out, event)?;
        writeln!(out)?;
    }
    out.flush()?;

    info!(
        "Generated {} observations from {} identities",
        events.len(),
        generator.identity_count()
    );
    Ok(())
}
