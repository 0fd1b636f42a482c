use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use super::config::Rect;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Foreground/background segmentation of images by binary graph cuts."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Segment an image into foreground and background from two seed boxes.
    Segment(SegmentArgs),
}

#[derive(Args, Debug)]
pub struct SegmentArgs {
    /// Input image (any format the `image` crate can decode).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output mask image; foreground pixels are white.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Also write the unary-only (per-pixel) classification to this path.
    #[arg(long, value_name = "PATH")]
    pub baseline: Option<PathBuf>,

    /// Also write the foreground and background likelihood maps, side by
    /// side, to this path.
    #[arg(long, value_name = "PATH")]
    pub confidence: Option<PathBuf>,

    /// Foreground seed box as X,Y,WIDTH,HEIGHT.
    #[arg(long, value_name = "X,Y,W,H")]
    pub foreground: Option<Rect>,

    /// Background seed box as X,Y,WIDTH,HEIGHT.
    #[arg(long, value_name = "X,Y,W,H")]
    pub background: Option<Rect>,

    /// Override the weight of the contrast-sensitive Potts term.
    #[arg(short, long, value_name = "FLOAT")]
    pub weight: Option<f64>,

    /// Override the contrast falloff of the Potts term.
    #[arg(long, value_name = "FLOAT")]
    pub contrast: Option<f64>,
}
