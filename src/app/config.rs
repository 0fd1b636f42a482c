use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use super::cli::SegmentArgs;
use super::error::{AppError, Result};

const DEFAULT_WEIGHT: f64 = 2.2;
const DEFAULT_CONTRAST: f64 = 0.5;
const DEFAULT_OUTPUT: &str = "segmentation.png";

/// Axis-aligned pixel box.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn fits_in(&self, width: u32, height: u32) -> bool {
        !self.is_empty()
            && self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }
}

impl FromStr for Rect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid box '{}': {}", s, e))?;
        match parts[..] {
            [x, y, width, height] => Ok(Rect { x, y, width, height }),
            _ => Err(format!("box '{}' must have the form X,Y,WIDTH,HEIGHT", s)),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialPairwiseConfig {
    weight: Option<f64>,
    contrast: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialSegmentationConfig {
    output: Option<PathBuf>,
    baseline: Option<PathBuf>,
    confidence: Option<PathBuf>,
    foreground: Option<Rect>,
    background: Option<Rect>,
    pairwise: Option<PartialPairwiseConfig>,
}

/// Fully resolved settings of one segmentation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationConfig {
    pub output: PathBuf,
    pub baseline: Option<PathBuf>,
    pub confidence: Option<PathBuf>,
    pub foreground: Rect,
    pub background: Rect,
    /// Weight `w` of the contrast-sensitive Potts term `w * exp(-contrast * |c1 - c2|^2)`.
    pub weight: f64,
    pub contrast: f64,
}

impl PartialSegmentationConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|source| AppError::FileParsing {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn merge_with_cli(self, args: &SegmentArgs) -> Result<SegmentationConfig> {
        let pairwise = self.pairwise.unwrap_or_default();
        let config = SegmentationConfig {
            output: args
                .output
                .clone()
                .or(self.output)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            baseline: args.baseline.clone().or(self.baseline),
            confidence: args.confidence.clone().or(self.confidence),
            foreground: args
                .foreground
                .or(self.foreground)
                .ok_or_else(|| AppError::Config("a foreground seed box is required".into()))?,
            background: args
                .background
                .or(self.background)
                .ok_or_else(|| AppError::Config("a background seed box is required".into()))?,
            weight: args.weight.or(pairwise.weight).unwrap_or(DEFAULT_WEIGHT),
            contrast: args.contrast.or(pairwise.contrast).unwrap_or(DEFAULT_CONTRAST),
        };
        if config.weight < 0.0 || config.contrast < 0.0 {
            return Err(AppError::Config(format!(
                "pairwise weight ({}) and contrast ({}) must be nonnegative",
                config.weight, config.contrast
            )));
        }
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args() -> SegmentArgs {
        SegmentArgs {
            input: PathBuf::from("in.png"),
            config: None,
            output: None,
            baseline: None,
            confidence: None,
            foreground: None,
            background: None,
            weight: None,
            contrast: None,
        }
    }

    #[test]
    fn rect_parses_from_comma_list() {
        assert_eq!(
            "200, 280,270,100".parse::<Rect>(),
            Ok(Rect { x: 200, y: 280, width: 270, height: 100 })
        );
        assert!("1,2,3".parse::<Rect>().is_err());
        assert!("1,2,a,4".parse::<Rect>().is_err());
    }

    #[test]
    fn rect_bounds_check() {
        let r = Rect { x: 2, y: 1, width: 3, height: 2 };
        assert!(r.fits_in(5, 3));
        assert!(!r.fits_in(4, 3));
        assert!(!Rect { x: 0, y: 0, width: 0, height: 2 }.fits_in(5, 5));
    }

    #[test]
    fn huge_box_is_rejected_without_overflow() {
        let r: Rect = "0,0,70000,70000".parse().unwrap();
        assert!(!r.is_empty());
        assert!(!r.fits_in(640, 480));
        assert!(!Rect { x: u32::MAX, y: 0, width: 1, height: 1 }.fits_in(640, 480));
    }

    #[test]
    fn file_values_fill_in_missing_cli_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
output = "mask.png"
confidence = "likelihoods.png"
foreground = {{ x = 1, y = 2, width = 3, height = 4 }}
background = {{ x = 5, y = 6, width = 7, height = 8 }}

[pairwise]
weight = 1.0
"#
        )
        .unwrap();

        let partial = PartialSegmentationConfig::from_file(file.path()).unwrap();
        let mut cli = args();
        cli.contrast = Some(0.25);
        cli.background = Some(Rect { x: 0, y: 0, width: 1, height: 1 });
        let config = partial.merge_with_cli(&cli).unwrap();

        assert_eq!(config.output, PathBuf::from("mask.png"));
        assert_eq!(config.foreground, Rect { x: 1, y: 2, width: 3, height: 4 });
        assert_eq!(config.background, Rect { x: 0, y: 0, width: 1, height: 1 });
        assert_eq!(config.weight, 1.0);
        assert_eq!(config.contrast, 0.25);
        assert_eq!(config.baseline, None);
        assert_eq!(config.confidence, Some(PathBuf::from("likelihoods.png")));
    }

    #[test]
    fn missing_seed_box_is_a_config_error() {
        let mut cli = args();
        cli.foreground = Some(Rect { x: 0, y: 0, width: 1, height: 1 });
        let result = PartialSegmentationConfig::default().merge_with_cli(&cli);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn defaults_apply_without_file() {
        let mut cli = args();
        cli.foreground = Some(Rect { x: 0, y: 0, width: 1, height: 1 });
        cli.background = Some(Rect { x: 1, y: 0, width: 1, height: 1 });
        let config = PartialSegmentationConfig::default()
            .merge_with_cli(&cli)
            .unwrap();
        assert_eq!(config.weight, DEFAULT_WEIGHT);
        assert_eq!(config.contrast, DEFAULT_CONTRAST);
        assert_eq!(config.output, PathBuf::from(DEFAULT_OUTPUT));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PartialSegmentationConfig::from_toml("colour = 3").is_err());
        assert!(PartialSegmentationConfig::from_toml("[pairwise]\nlambda = 1.0").is_err());
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut cli = args();
        cli.foreground = Some(Rect { x: 0, y: 0, width: 1, height: 1 });
        cli.background = Some(Rect { x: 1, y: 0, width: 1, height: 1 });
        cli.weight = Some(-1.0);
        let result = PartialSegmentationConfig::default().merge_with_cli(&cli);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
