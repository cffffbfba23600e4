// capture_finalize - finalize a captured photo or clip from the command line

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use capture_finalize::{CaptureFinalizer, FilterChain, FilterSpec, FinalizeConfig, Orientation, RawPhotoData};

#[derive(Parser)]
#[command(name = "capture_finalize", version, about = "Apply filters to captured photos and videos")]
struct Args {
    /// JSON settings file (scratch dir, export preset, default filters)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Filter to apply, repeatable: grayscale, sepia, invert, brightness=N, contrast=N, hue=N, blur=N
    #[arg(long = "filter", short = 'f', global = true)]
    filters: Vec<FilterSpec>,

    /// Print metrics as JSON when done
    #[arg(long, global = true, default_value_t = false)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Finalize a still capture into a JPEG or PNG
    Photo {
        input: PathBuf,
        output: PathBuf,

        /// Display orientation of the result (up, right, down, left, *-mirrored or 1-8)
        #[arg(long, default_value = "up")]
        orientation: Orientation,
    },
    /// Finalize a recorded clip; prints the resulting file path
    Video { input: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FinalizeConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FinalizeConfig::default(),
    };

    let finalizer = CaptureFinalizer::new(config);
    let filters = if args.filters.is_empty() {
        finalizer.default_filters()
    } else {
        FilterChain::from_specs(&args.filters)
    };
    info!("Filters: {:?}", filters);

    match args.command {
        Command::Photo { input, output, orientation } => {
            let raw = RawPhotoData::from_file(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let Some(artifact) = finalizer.finalize_photo(&raw, orientation, &filters) else {
                bail!("Could not finalize photo {}", input.display());
            };
            let Some(still) = artifact.image() else {
                bail!("Photo finalization produced a {} artifact", artifact.kind());
            };

            still
                .save(&output, finalizer.config().still.jpeg_quality)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("✓ {} ({}, {})", output.display(), still.extent(), still.orientation());
            println!("{}", output.display());
        }
        Command::Video { input } => {
            let Some(artifact) = finalizer.finalize_video(&input, filters).await else {
                bail!("Could not finalize video {}", input.display());
            };
            let Some(path) = artifact.video() else {
                bail!("Video finalization produced a {} artifact", artifact.kind());
            };
            println!("{}", path.display());
        }
    }

    if args.metrics {
        let snapshot = finalizer.metrics().snapshot();
        println!("{}", serde_json::to_string_pretty(&snapshot).context("Failed to serialize metrics")?);
    }

    Ok(())
}
