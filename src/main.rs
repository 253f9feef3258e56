// Trick Trainer CLI
// Train, inspect log directories and scaffold configuration files

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use trick_trainer_lib::data::{load_directory, SchemaVariant};
use trick_trainer_lib::logger::init_logger;
use trick_trainer_lib::model::{BurnBackend, CpuTrainBackend};
use trick_trainer_lib::{run_pipeline, DataConfig, PipelineConfig};

#[derive(Parser)]
#[command(name = "Trick Trainer")]
#[command(bin_name = "trick-trainer")]
#[command(about = "Train the bike trick classifier from IMU logs")]
struct Cli {
    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Train(TrainArgs),
    Inspect(InspectArgs),
    InitConfig(InitConfigArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaArg {
    /// timestamp,pitch,roll,yaw,gForce,...
    Csv,
    /// IMU: pitch, roll, yaw
    Imu,
}

impl From<SchemaArg> for SchemaVariant {
    fn from(arg: SchemaArg) -> Self {
        match arg {
            SchemaArg::Csv => SchemaVariant::Csv,
            SchemaArg::Imu => SchemaVariant::ImuPrefixed,
        }
    }
}

#[derive(clap::Args)]
#[command(about = "Load, augment, train and export both model variants")]
struct TrainArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Log format; selects the matching timestep/feature preset
    #[arg(long, value_enum)]
    schema: Option<SchemaArg>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    augmentation_factor: Option<usize>,
}

#[derive(clap::Args)]
#[command(about = "Load a log directory and report what was found")]
struct InspectArgs {
    data_dir: PathBuf,

    #[arg(long, value_enum, default_value = "csv")]
    schema: SchemaArg,

    #[arg(long)]
    timesteps: Option<usize>,
}

#[derive(clap::Args)]
#[command(about = "Write a configuration file with default values")]
struct InitConfigArgs {
    path: PathBuf,

    #[arg(long, value_enum, default_value = "csv")]
    schema: SchemaArg,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.log_level);

    match cli.command {
        Commands::Train(args) => train(args),
        Commands::Inspect(args) => inspect(args),
        Commands::InitConfig(args) => init_config(args),
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(schema) = args.schema {
        let dir = config.data.dir.clone();
        config.data = DataConfig {
            dir,
            ..DataConfig::for_schema(schema.into())
        };
    }
    if let Some(dir) = args.data_dir {
        config.data.dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.export.output_dir = dir;
    }
    if let Some(seed) = args.seed {
        config.training.seed = Some(seed);
    }
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if let Some(factor) = args.augmentation_factor {
        config.augment.factor = factor;
    }

    let mut backend = BurnBackend::<CpuTrainBackend>::new(Default::default(), config.training.seed);
    let summary = run_pipeline(&config, &mut backend)?;

    log::info!(
        "Run {} finished: test accuracy {:.2}, best epoch {}",
        summary.run_id,
        summary.test.accuracy,
        summary.best_epoch
    );
    for export in &summary.exports {
        match (&export.artifact, &export.error) {
            (Some(artifact), _) => log::info!(
                "- {} ({}, sha256 {})",
                artifact.path.display(),
                export.variant.as_str(),
                artifact.sha256
            ),
            (None, Some(error)) => log::warn!("- {} failed: {}", export.variant.as_str(), error),
            (None, None) => {}
        }
    }

    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    let mut data = DataConfig::for_schema(args.schema.into());
    if let Some(timesteps) = args.timesteps {
        data.timesteps = timesteps;
    }

    let loaded = load_directory(&args.data_dir, &data)?;

    for (index, name) in loaded.label_map.names().iter().enumerate() {
        let count = loaded.dataset.iter().filter(|e| e.label == index).count();
        log::info!("{} = {} ({} files)", index, name, count);
    }
    for file in &loaded.report.files {
        log::info!(
            "{}: {} rows, {} skipped, {} padded, {} truncated",
            file.path.display(),
            file.usable_rows,
            file.skipped_lines,
            file.padded_rows,
            file.truncated_rows
        );
    }
    for path in loaded.report.degenerate_files() {
        log::warn!("{} has no usable rows", path.display());
    }

    Ok(())
}

fn init_config(args: InitConfigArgs) -> Result<()> {
    let config = PipelineConfig {
        data: DataConfig::for_schema(args.schema.into()),
        ..PipelineConfig::default()
    };
    config
        .save_to_file(&args.path)
        .with_context(|| format!("Failed to write {}", args.path.display()))?;
    log::info!("Wrote default configuration to {}", args.path.display());
    Ok(())
}
