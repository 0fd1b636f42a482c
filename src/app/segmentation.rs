use std::path::Path;
use std::sync::Arc;

use binary_graphcut::{BinaryGraphCutOptimizer, EdgeGraph, Energy, Label, Site};
use image::{DynamicImage, GenericImageView, ImageError, Luma};
use tracing::{debug, info};

use super::config::{Rect, SegmentationConfig};
use super::error::{AppError, Result};

type Color = [f64; 3];

const MIN_VARIANCE: f64 = 1e-4;

/// Isotropic Gaussian over RGB colours in `[0, 1]^3`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorModel {
    mean: Color,
    variance: f64,
}

impl ColorModel {
    pub fn fit(samples: &[Color]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mut mean = [0.0; 3];
        for c in samples {
            for i in 0..3 {
                mean[i] += c[i] / n;
            }
        }
        let variance = samples.iter().map(|c| squared_distance(c, &mean)).sum::<f64>() / (3.0 * n);
        Some(ColorModel {
            mean,
            variance: variance.max(MIN_VARIANCE),
        })
    }

    /// `-ln p(color)`.
    pub fn neg_log_likelihood(&self, color: &Color) -> Energy {
        1.5 * (2.0 * std::f64::consts::PI * self.variance).ln()
            + squared_distance(color, &self.mean) / (2.0 * self.variance)
    }
}

fn squared_distance(a: &Color, b: &Color) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Energy of a foreground/background labeling of an image: colour model
/// likelihoods as unary terms and a contrast-sensitive Potts model between
/// 4-neighbours.
pub struct ImageEnergy {
    pixels: Vec<Color>,
    foreground: ColorModel,
    background: ColorModel,
    weight: f64,
    contrast: f64,
}

impl ImageEnergy {
    pub fn single_energy(&self, site: Site, label: Label) -> Energy {
        let model = if label { &self.foreground } else { &self.background };
        model.neg_log_likelihood(&self.pixels[site])
    }

    pub fn dual_energy(&self, s1: Site, s2: Site, l1: Label, l2: Label) -> Energy {
        if l1 == l2 {
            0.0
        } else {
            let d = squared_distance(&self.pixels[s1], &self.pixels[s2]);
            self.weight * (-self.contrast * d).exp()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub width: u32,
    pub height: u32,
    pub labels: Vec<Label>,
    pub energy: Energy,
}

impl Segmentation {
    pub fn foreground_fraction(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().filter(|&&l| l).count() as f64 / self.labels.len() as f64
    }

    pub fn save_mask(&self, path: &Path) -> std::result::Result<(), ImageError> {
        let mask = image::GrayImage::from_fn(self.width, self.height, |x, y| {
            let site = (y * self.width + x) as usize;
            Luma([if self.labels[site] { 255 } else { 0 }])
        });
        mask.save(path)
    }
}

/// Min-max scales `values` to `0..=255`. A constant map is all black.
fn to_gray(values: &[f64]) -> Vec<u8> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    values
        .iter()
        .map(|&v| {
            if range > 0.0 {
                (255.0 * (v - min) / range).round() as u8
            } else {
                0
            }
        })
        .collect()
}

fn normalized_pixels(img: &DynamicImage) -> Vec<Color> {
    img.to_rgb8()
        .pixels()
        .map(|p| p.0.map(|c| c as f64 / 255.0))
        .collect()
}

fn box_samples(pixels: &[Color], width: u32, rect: &Rect) -> Vec<Color> {
    (rect.y..rect.y + rect.height)
        .flat_map(|y| (rect.x..rect.x + rect.width).map(move |x| (y * width + x) as usize))
        .map(|site| pixels[site])
        .collect()
}

pub struct Segmenter {
    energy: Arc<ImageEnergy>,
    width: u32,
    height: u32,
}

impl Segmenter {
    pub fn new(img: &DynamicImage, config: &SegmentationConfig) -> Result<Self> {
        let (width, height) = img.dimensions();
        for (name, rect) in [("foreground", &config.foreground), ("background", &config.background)] {
            if !rect.fits_in(width, height) {
                return Err(AppError::Config(format!(
                    "{} box {:?} does not fit in the {}x{} image",
                    name, rect, width, height
                )));
            }
        }

        let pixels = normalized_pixels(img);
        let fit = |rect: &Rect| {
            ColorModel::fit(&box_samples(&pixels, width, rect))
                .ok_or_else(|| AppError::Config(format!("seed box {:?} is empty", rect)))
        };
        let foreground = fit(&config.foreground)?;
        let background = fit(&config.background)?;
        debug!("Foreground model: {:?}", foreground);
        debug!("Background model: {:?}", background);

        Ok(Segmenter {
            energy: Arc::new(ImageEnergy {
                pixels,
                foreground,
                background,
                weight: config.weight,
                contrast: config.contrast,
            }),
            width,
            height,
        })
    }

    fn site_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// `p(color)` of every pixel under the foreground (`true`) or background
    /// colour model.
    pub fn likelihoods(&self, label: Label) -> Vec<f64> {
        (0..self.site_count())
            .map(|s| (-self.energy.single_energy(s, label)).exp())
            .collect()
    }

    /// Writes the foreground likelihood map and, to its right, the
    /// background map, each scaled to the full gray range.
    pub fn save_confidence(&self, path: &Path) -> std::result::Result<(), ImageError> {
        let foreground = to_gray(&self.likelihoods(true));
        let background = to_gray(&self.likelihoods(false));
        let maps = image::GrayImage::from_fn(2 * self.width, self.height, |x, y| {
            let (map, x) = if x < self.width {
                (&foreground, x)
            } else {
                (&background, x - self.width)
            };
            Luma([map[(y * self.width + x) as usize]])
        });
        maps.save(path)
    }

    fn run(&self, mut optimizer: BinaryGraphCutOptimizer) -> Result<Segmentation> {
        optimizer.optimize();
        let labels = optimizer.labeling();
        let energy = optimizer.energy(&labels)?;
        Ok(Segmentation {
            width: self.width,
            height: self.height,
            labels,
            energy,
        })
    }

    /// Graph cut over the 4-connected pixel grid.
    pub fn segment(&self) -> Result<Segmentation> {
        let unary = Arc::clone(&self.energy);
        let pairwise = Arc::clone(&self.energy);
        let optimizer = BinaryGraphCutOptimizer::builder(EdgeGraph::grid_4(
            self.width as usize,
            self.height as usize,
        ))
        .unary(move |s, l| unary.single_energy(s, l))
        .pairwise(move |s1, s2, l1, l2| pairwise.dual_energy(s1, s2, l1, l2))
        .build();
        let segmentation = self.run(optimizer)?;
        info!(
            energy = segmentation.energy,
            foreground = segmentation.foreground_fraction(),
            "Graph cut segmentation finished"
        );
        Ok(segmentation)
    }

    /// Per-pixel classification from the unary terms alone.
    pub fn baseline(&self) -> Result<Segmentation> {
        let unary = Arc::clone(&self.energy);
        let optimizer = BinaryGraphCutOptimizer::builder(EdgeGraph::with_sites(self.site_count()))
            .unary(move |s, l| unary.single_energy(s, l))
            .build();
        let segmentation = self.run(optimizer)?;
        info!(
            energy = segmentation.energy,
            foreground = segmentation.foreground_fraction(),
            "Unary-only classification finished"
        );
        Ok(segmentation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    fn config(weight: f64, contrast: f64) -> SegmentationConfig {
        SegmentationConfig {
            output: PathBuf::from("out.png"),
            baseline: None,
            confidence: None,
            foreground: Rect { x: 0, y: 0, width: 3, height: 6 },
            background: Rect { x: 5, y: 0, width: 3, height: 6 },
            weight,
            contrast,
        }
    }

    /// Left half reddish, right half bluish, optionally with one blue speck
    /// inside the red half.
    fn two_tone_image(speck: bool) -> DynamicImage {
        let img = RgbImage::from_fn(8, 6, |x, y| {
            if speck && (x, y) == (2, 3) {
                Rgb([20, 30, 200])
            } else if x < 4 {
                Rgb([200 + (y as u8) * 5, 30, 20])
            } else {
                Rgb([30, 20 + (x as u8) * 3, 210])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn color_model_fits_mean_and_variance() {
        let model = ColorModel::fit(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]).unwrap();
        assert_eq!(model.mean, [0.5, 0.5, 0.5]);
        assert!((model.variance - 0.25).abs() < 1e-12);
        assert!(model.neg_log_likelihood(&[0.5; 3]) < model.neg_log_likelihood(&[0.0; 3]));
        assert!(ColorModel::fit(&[]).is_none());
    }

    #[test]
    fn constant_region_gets_variance_floor() {
        let model = ColorModel::fit(&[[0.2, 0.3, 0.4]; 4]).unwrap();
        assert_eq!(model.variance, MIN_VARIANCE);
    }

    #[test]
    fn potts_term_decays_with_contrast() {
        let energy = ImageEnergy {
            pixels: vec![[0.0; 3], [0.0; 3], [1.0; 3]],
            foreground: ColorModel::fit(&[[1.0; 3]]).unwrap(),
            background: ColorModel::fit(&[[0.0; 3]]).unwrap(),
            weight: 2.0,
            contrast: 0.5,
        };
        assert_eq!(energy.dual_energy(0, 1, true, true), 0.0);
        assert_eq!(energy.dual_energy(0, 1, true, false), 2.0);
        assert!((energy.dual_energy(1, 2, false, true) - 2.0 * (-1.5f64).exp()).abs() < 1e-12);
        assert!(energy.single_energy(2, true) < energy.single_energy(2, false));
    }

    #[test]
    fn halves_are_separated() {
        let segmenter = Segmenter::new(&two_tone_image(false), &config(2.2, 0.5)).unwrap();
        let seg = segmenter.segment().unwrap();
        for y in 0..6u32 {
            for x in 0..8u32 {
                let site = (y * 8 + x) as usize;
                assert_eq!(seg.labels[site], x < 4, "pixel ({x}, {y})");
            }
        }
        assert!((seg.foreground_fraction() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn smoothing_absorbs_the_speck() {
        // Plain Potts strong enough to outweigh the speck's colour evidence.
        let segmenter = Segmenter::new(&two_tone_image(true), &config(50.0, 0.0)).unwrap();
        let baseline = segmenter.baseline().unwrap();
        assert!(!baseline.labels[3 * 8 + 2]);
        let cut = segmenter.segment().unwrap();
        assert!(cut.labels[3 * 8 + 2]);
        assert!(cut.energy <= segmenter_energy_of(&segmenter, &baseline.labels) + 1e-9);
    }

    fn segmenter_energy_of(segmenter: &Segmenter, labels: &[Label]) -> Energy {
        let e = &segmenter.energy;
        let graph = EdgeGraph::grid_4(8, 6);
        let unary: Energy = labels.iter().enumerate().map(|(s, &l)| e.single_energy(s, l)).sum();
        let pairwise: Energy = graph
            .edges()
            .map(|(a, b)| e.dual_energy(a, b, labels[a], labels[b]))
            .sum();
        unary + pairwise
    }

    #[test]
    fn seed_box_outside_image_is_rejected() {
        let mut cfg = config(1.0, 0.5);
        cfg.background = Rect { x: 6, y: 0, width: 3, height: 6 };
        let result = Segmenter::new(&two_tone_image(false), &cfg);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn oversized_seed_box_is_a_config_error() {
        let mut cfg = config(1.0, 0.5);
        cfg.foreground = "0,0,70000,70000".parse().unwrap();
        let result = Segmenter::new(&two_tone_image(false), &cfg);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn gray_scaling_spans_full_range() {
        assert_eq!(to_gray(&[2.0, 4.0, 3.0]), vec![0, 255, 128]);
        assert_eq!(to_gray(&[1.5; 3]), vec![0; 3]);
    }

    #[test]
    fn confidence_maps_follow_the_colour_models() {
        let segmenter = Segmenter::new(&two_tone_image(false), &config(2.2, 0.5)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confidence.png");
        segmenter.save_confidence(&path).unwrap();

        let maps = image::open(&path).unwrap().to_luma8();
        assert_eq!(maps.dimensions(), (16, 6));
        // (2, 2) and (6, 2) sit next to the mean colours of the two seed boxes.
        let fg = |x: u32| maps.get_pixel(x, 2).0[0];
        let bg = |x: u32| maps.get_pixel(8 + x, 2).0[0];
        assert!(fg(2) > 128, "foreground map at red pixel: {}", fg(2));
        assert!(fg(6) < 128, "foreground map at blue pixel: {}", fg(6));
        assert!(bg(6) > 128, "background map at blue pixel: {}", bg(6));
        assert!(bg(2) < 128, "background map at red pixel: {}", bg(2));
    }

    #[test]
    fn mask_is_written_as_grayscale() {
        let seg = Segmentation {
            width: 2,
            height: 1,
            labels: vec![true, false],
            energy: 0.0,
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        seg.save_mask(&path).unwrap();
        let mask = image::open(&path).unwrap().to_luma8();
        assert_eq!(mask.get_pixel(0, 0), &Luma([255]));
        assert_eq!(mask.get_pixel(1, 0), &Luma([0]));
    }
}
