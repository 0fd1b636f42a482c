mod app;

use app::cli::{Cli, Commands, SegmentArgs};
use app::config::PartialSegmentationConfig;
use app::error::Result;
use app::logging;
use app::segmentation::Segmenter;
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run_app(cli) {
        error!("Command failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app(cli: Cli) -> Result<()> {
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;
    info!("graphcut v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    match cli.command {
        Commands::Segment(args) => segment(&args),
    }
}

fn segment(args: &SegmentArgs) -> Result<()> {
    let partial = match &args.config {
        Some(path) => PartialSegmentationConfig::from_file(path)?,
        None => PartialSegmentationConfig::default(),
    };
    let config = partial.merge_with_cli(args)?;

    info!("Loading image {:?}", args.input);
    let img = image::open(&args.input)?;
    let segmenter = Segmenter::new(&img, &config)?;

    if let Some(path) = &config.baseline {
        let baseline = segmenter.baseline()?;
        baseline.save_mask(path)?;
        info!("Unary-only mask written to {:?}", path);
    }

    if let Some(path) = &config.confidence {
        segmenter.save_confidence(path)?;
        info!("Likelihood maps written to {:?}", path);
    }

    let segmentation = segmenter.segment()?;
    segmentation.save_mask(&config.output)?;
    println!(
        "Segmented {}x{} image: {:.1}% foreground, energy {:.4}. Mask written to {}",
        segmentation.width,
        segmentation.height,
        100.0 * segmentation.foreground_fraction(),
        segmentation.energy,
        config.output.display()
    );
    Ok(())
}
