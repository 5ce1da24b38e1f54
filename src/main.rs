//! perchtrack - trajectory tracking and perch / takeoff extraction for motion-capture data.
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use perchtrack::{
    frames::{csv_reader::read_frames_csv, MemoryFrameSource},
    output::{read_target_track_files, CsvRecordSink},
    pipeline::{
        PerchAnalysis, PipelineConfig, PipelineReport, SeamCheck, ShardedPipeline,
        StimulusAnalysis, TrajectoryAnalysis,
    },
};

#[derive(Parser, Debug)]
#[command(name = "perchtrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Number of shards (overrides the configuration)
    #[arg(short, long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Track the unidentified markers and extract the target stimulus
    Stimulus {
        /// Long-form capture CSV (frame,timestamp,body,x,y,z)
        #[arg(short, long)]
        input: Utf8PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: Utf8PathBuf,

        /// Prefix of the output files (default: input file stem)
        #[arg(long)]
        stem: Option<String>,
    },

    /// Track the animal's rigid body and extract perches and takeoffs
    Perches {
        /// Long-form capture CSV (frame,timestamp,body,x,y,z)
        #[arg(short, long)]
        input: Utf8PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: Utf8PathBuf,

        /// Prefix of the output files (default: input file stem)
        #[arg(long)]
        stem: Option<String>,

        /// Classification table of a previous stimulus run
        #[arg(long, requires = "target_tracking")]
        target_classification: Option<Utf8PathBuf>,

        /// Target-tracking table of a previous stimulus run
        #[arg(long, requires = "target_classification")]
        target_tracking: Option<Utf8PathBuf>,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("loading configuration {path}"))?,
        None => PipelineConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.sharding = config.sharding.with_workers(workers);
        config.validate()?;
    }

    match cli.command {
        Commands::Stimulus {
            input,
            output,
            stem,
        } => {
            let analysis = StimulusAnalysis::new(&config.stimulus);
            run(&config, analysis, &input, &output, stem)?;
        }
        Commands::Perches {
            input,
            output,
            stem,
            target_classification,
            target_tracking,
        } => {
            let mut analysis = PerchAnalysis::new(&config.perches);
            if let (Some(classification), Some(tracking)) =
                (target_classification, target_tracking)
            {
                let target = read_target_track_files(&classification, &tracking)
                    .context("loading target track")?;
                analysis = analysis.with_target(target);
            }
            run(&config, analysis, &input, &output, stem)?;
        }
        Commands::ShowConfig => {
            println!("{:#?}", config.sharding);
            println!("# stimulus");
            println!("{:#}", config.stimulus.tracker);
            println!("{:#}", config.stimulus.classifier);
            println!("# perches");
            println!("{:#}", config.perches.tracker);
            println!("{:#}", config.perches.segments);
        }
    }

    Ok(())
}

fn run<A: TrajectoryAnalysis>(
    config: &PipelineConfig,
    analysis: A,
    input: &Utf8Path,
    output: &Utf8Path,
    stem: Option<String>,
) -> anyhow::Result<()> {
    let stem = stem
        .or_else(|| input.file_stem().map(str::to_owned))
        .unwrap_or_else(|| analysis.name().to_owned());

    let frames = read_frames_csv(input).with_context(|| format!("reading {input}"))?;
    info!(frames = frames.len(), %input, "loaded capture");
    let source = MemoryFrameSource::new(frames);

    let mut sink = CsvRecordSink::create(output, &stem, analysis.record_kinds())
        .with_context(|| format!("creating outputs in {output}"))?;
    let pipeline = ShardedPipeline::new(config.sharding.clone(), analysis)?;
    let report = pipeline.run(|_| Ok(source.clone()), &mut sink)?;

    summarize(&report);
    if !report.is_complete() {
        anyhow::bail!(
            "{} shard(s) failed, output is incomplete",
            report.failures().count()
        );
    }
    Ok(())
}

fn summarize(report: &PipelineReport) {
    for shard in report.reports() {
        info!(
            shard = %shard.shard,
            frames = shard.frames_read,
            trajectories = shard.trajectories_owned,
            records = shard.records_emitted,
            seam = ?shard.seam,
            "shard summary"
        );
        if shard.seam == SeamCheck::Unverified {
            warn!(shard = %shard.shard, "rows near the start of the shard were not verified");
        }
    }
    for failure in report.failures() {
        warn!(error = %failure, "incomplete shard");
    }
}
