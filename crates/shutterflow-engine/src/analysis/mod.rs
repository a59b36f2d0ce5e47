//! Heuristic photo analysis.
//!
//! [`FeatureExtractor`] turns a decoded photo into an [`ImageAnalysis`]
//! (brightness, contrast, saturation, composition, color, scene type) and
//! derives a first [`CameraParameters`] recommendation from it. Everything
//! here is deterministic and CPU-bound; callers on an async runtime should
//! run it on the blocking pool.

pub mod edges;

use std::collections::BTreeMap;
use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use tracing::debug;

use crate::error::{Result, ShutterflowError};
use crate::model::{
    CameraParameters, ColorSummary, ColorTemperature, CompositionSummary, FocusMode, GridRegion,
    ImageAnalysis, SceneMode, SceneType, WhiteBalance,
};

/// Below this brightness a photo is treated as a night scene.
pub const NIGHT_BRIGHTNESS: f64 = 0.3;

/// Above this brightness the recommendation pulls exposure down.
pub const BRIGHT_BRIGHTNESS: f64 = 0.7;

/// Edge-pixel ratio above which a scene is architecture.
pub const ARCHITECTURE_EDGE_RATIO: f64 = 0.10;

/// Edge-pixel ratio below which a scene is a portrait.
pub const PORTRAIT_EDGE_RATIO: f64 = 0.05;

/// Blue/red ratio above which a photo reads as cool.
const COOL_RATIO: f64 = 1.2;

/// Blue/red ratio below which a photo reads as warm.
const WARM_RATIO: f64 = 0.8;

/// Number of hue buckets in the 8-bit HSV convention.
const HUE_BUCKETS: usize = 180;

/// Analysis of a photo together with the parameters recommended for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    /// What the photo looks like.
    pub analysis: ImageAnalysis,
    /// Settings suggested to reproduce it.
    pub parameters: CameraParameters,
}

/// Extracts image features and recommends camera parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Creates a new extractor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decodes the photo at `path`, analyzes it and recommends parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::ImageDecodeError`] if the file cannot be
    /// read or decoded, or has no pixels.
    pub fn analyze_file(&self, path: &Path) -> Result<Recommendation> {
        let image = image::open(path)
            .map_err(|e| ShutterflowError::image_decode(path, e.to_string()))?;
        let analysis = self
            .analyze(&image)
            .map_err(|e| ShutterflowError::image_decode(path, e.to_string()))?;
        let parameters = self.recommend(&analysis);
        debug!(
            path = %path.display(),
            scene = %analysis.scene_type,
            brightness = analysis.brightness,
            "Photo analyzed"
        );
        Ok(Recommendation {
            analysis,
            parameters,
        })
    }

    /// Analyzes a decoded photo.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::InvalidImageError`] for an image with no
    /// pixels.
    pub fn analyze(&self, image: &DynamicImage) -> Result<ImageAnalysis> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ShutterflowError::invalid_image("image has no pixels"));
        }

        let rgb = image.to_rgb8();
        let gray = image.to_luma8();

        let stats = ChannelStats::of(&rgb);
        let brightness = (stats.mean.iter().sum::<f64>() / 3.0 / 255.0).clamp(0.0, 1.0);
        let contrast = (stats.std_dev.iter().sum::<f64>() / 3.0 / 255.0).clamp(0.0, 1.0);

        let color_summary = color_summary(&rgb, &stats);
        let edge_map = edges::detect_edges(&gray);
        let composition_summary = composition_summary(&edge_map);

        Ok(ImageAnalysis {
            exposure_estimate: exposure_estimate(&gray),
            brightness,
            contrast,
            saturation: color_summary.mean_saturation,
            scene_type: classify_scene(brightness, composition_summary.edge_pixel_ratio),
            composition_summary,
            color_summary,
        })
    }

    /// Recommends camera parameters for an analyzed photo.
    ///
    /// | scene | aperture | focus | ISO | scene mode |
    /// |---|---|---|---|---|
    /// | portrait | f/1.6 | auto | | portrait |
    /// | landscape | f/5.6 | infinity | | landscape |
    /// | night | f/1.6 | | 800 | night |
    /// | architecture | f/2.8 | auto | | auto |
    ///
    /// Exposure compensation is +1 for dark photos, -1 for bright ones and 0
    /// otherwise. White balance counters the color cast.
    #[must_use]
    pub fn recommend(&self, analysis: &ImageAnalysis) -> CameraParameters {
        let mut params = match analysis.scene_type {
            SceneType::Portrait => CameraParameters {
                aperture: Some("f/1.6".to_string()),
                focus_mode: Some(FocusMode::Auto),
                scene_mode: Some(SceneMode::Portrait),
                ..CameraParameters::default()
            },
            SceneType::Landscape => CameraParameters {
                aperture: Some("f/5.6".to_string()),
                focus_mode: Some(FocusMode::Infinity),
                scene_mode: Some(SceneMode::Landscape),
                ..CameraParameters::default()
            },
            SceneType::Night => CameraParameters {
                aperture: Some("f/1.6".to_string()),
                iso: Some(800),
                scene_mode: Some(SceneMode::Night),
                ..CameraParameters::default()
            },
            SceneType::Architecture => CameraParameters {
                aperture: Some("f/2.8".to_string()),
                focus_mode: Some(FocusMode::Auto),
                scene_mode: Some(SceneMode::Auto),
                ..CameraParameters::default()
            },
        };

        params.exposure_compensation = Some(if analysis.brightness < NIGHT_BRIGHTNESS {
            1.0
        } else if analysis.brightness > BRIGHT_BRIGHTNESS {
            -1.0
        } else {
            0.0
        });

        params.white_balance = Some(match analysis.color_summary.color_temperature {
            ColorTemperature::Cool => WhiteBalance::Cloudy,
            ColorTemperature::Warm => WhiteBalance::Daylight,
            ColorTemperature::Neutral => WhiteBalance::Auto,
        });

        params
    }
}

/// Classifies a scene. Darkness wins over edge density.
#[must_use]
pub fn classify_scene(brightness: f64, edge_pixel_ratio: f64) -> SceneType {
    if brightness < NIGHT_BRIGHTNESS {
        SceneType::Night
    } else if edge_pixel_ratio > ARCHITECTURE_EDGE_RATIO {
        SceneType::Architecture
    } else if edge_pixel_ratio < PORTRAIT_EDGE_RATIO {
        SceneType::Portrait
    } else {
        SceneType::Landscape
    }
}

/// Classifies the color cast from mean blue and red intensities.
#[must_use]
pub fn classify_temperature(mean_blue: f64, mean_red: f64) -> ColorTemperature {
    let ratio = mean_blue / (mean_red + 1e-6);
    if ratio > COOL_RATIO {
        ColorTemperature::Cool
    } else if ratio < WARM_RATIO {
        ColorTemperature::Warm
    } else {
        ColorTemperature::Neutral
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Per-channel mean and population standard deviation, in R, G, B order.
struct ChannelStats {
    mean: [f64; 3],
    std_dev: [f64; 3],
}

impl ChannelStats {
    fn of(rgb: &RgbImage) -> Self {
        let n = f64::from(rgb.width()) * f64::from(rgb.height());
        let mut sum = [0.0_f64; 3];
        let mut sum_sq = [0.0_f64; 3];
        for pixel in rgb.pixels() {
            for (c, &v) in pixel.0.iter().enumerate() {
                let v = f64::from(v);
                sum[c] += v;
                sum_sq[c] += v * v;
            }
        }

        let mut mean = [0.0; 3];
        let mut std_dev = [0.0; 3];
        for c in 0..3 {
            mean[c] = sum[c] / n;
            std_dev[c] = (sum_sq[c] / n - mean[c] * mean[c]).max(0.0).sqrt();
        }
        Self { mean, std_dev }
    }
}

/// Maps the mean gray level onto an exposure offset in `[-3, 3]`.
fn exposure_estimate(gray: &GrayImage) -> f64 {
    let n = f64::from(gray.width()) * f64::from(gray.height());
    let total: f64 = gray.as_raw().iter().map(|&v| f64::from(v)).sum();
    let normalized = total / n / 255.0;
    ((normalized - 0.5) * 6.0).clamp(-3.0, 3.0)
}

/// Converts one RGB pixel to 8-bit HSV (H in `0..180`, S and V in `0..=255`).
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (f64::from(r), f64::from(g), f64::from(b));
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = max - min;

    let s = if max > 0.0 { 255.0 * diff / max } else { 0.0 };

    let mut h = if diff <= 0.0 {
        0.0
    } else if (max - rf).abs() < f64::EPSILON {
        60.0 * (gf - bf) / diff
    } else if (max - gf).abs() < f64::EPSILON {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let hue = ((h / 2.0).round() as u16 % HUE_BUCKETS as u16) as u8;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let sat = s.round().min(255.0) as u8;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let val = max as u8;
    (hue, sat, val)
}

fn color_summary(rgb: &RgbImage, stats: &ChannelStats) -> ColorSummary {
    let n = f64::from(rgb.width()) * f64::from(rgb.height());
    let mut hue_histogram = [0_u64; HUE_BUCKETS];
    let mut sat_total = 0.0;
    let mut val_total = 0.0;

    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        let (h, s, v) = rgb_to_hsv(r, g, b);
        hue_histogram[usize::from(h)] += 1;
        sat_total += f64::from(s);
        val_total += f64::from(v);
    }

    // Ties resolve to the lowest hue.
    let mut dominant_hue = 0_u8;
    let mut best = 0_u64;
    for (hue, &count) in (0_u8..).zip(hue_histogram.iter()) {
        if count > best {
            best = count;
            dominant_hue = hue;
        }
    }

    ColorSummary {
        dominant_hue,
        mean_saturation: (sat_total / n / 255.0).clamp(0.0, 1.0),
        mean_value: (val_total / n / 255.0).clamp(0.0, 1.0),
        color_temperature: classify_temperature(stats.mean[2], stats.mean[0]),
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Sums edge intensity over a 3×3 grid and picks the dominant cell.
///
/// The last row and column absorb the remainder when the dimensions are not
/// divisible by three. On ties the first cell in row-major order wins, so a
/// photo with no edges at all reports `top_left`.
fn composition_summary(edge_map: &GrayImage) -> CompositionSummary {
    let (width, height) = edge_map.dimensions();
    let (third_w, third_h) = (width / 3, height / 3);
    let col_of = |x: u32| if third_w == 0 { 2 } else { (x / third_w).min(2) as usize };
    let row_of = |y: u32| if third_h == 0 { 2 } else { (y / third_h).min(2) as usize };

    let mut cells = [0_u64; 9];
    for (x, y, pixel) in edge_map.enumerate_pixels() {
        cells[row_of(y) * 3 + col_of(x)] += u64::from(pixel.0[0]);
    }

    let mut dominant_region = GridRegion::TopLeft;
    let mut best = cells[0];
    let mut edge_density = BTreeMap::new();
    for (&region, &sum) in GridRegion::ALL.iter().zip(cells.iter()) {
        edge_density.insert(region, sum);
        if sum > best {
            best = sum;
            dominant_region = region;
        }
    }

    let total = f64::from(width) * f64::from(height);
    let edge_pixel_ratio = edges::count_edges(edge_map) as f64 / total;

    CompositionSummary {
        dominant_region,
        edge_density,
        rule_of_thirds: dominant_region.is_corner(),
        edge_pixel_ratio,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use image::{ImageBuffer, Luma, Rgb};

    use super::*;

    fn uniform(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(48, 48, Rgb([r, g, b])))
    }

    fn stripes(size: u32, band: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_fn(size, size, |x, _| {
            if (x / band) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        }))
    }

    #[test]
    fn test_dark_photo_is_night_scene() {
        let extractor = FeatureExtractor::new();
        let analysis = extractor.analyze(&uniform(51, 51, 51)).unwrap();

        assert!((analysis.brightness - 0.2).abs() < 1e-9);
        assert_eq!(analysis.contrast, 0.0);
        assert_eq!(analysis.saturation, 0.0);
        assert!((analysis.exposure_estimate - -1.8).abs() < 1e-9);
        assert_eq!(analysis.scene_type, SceneType::Night);

        let params = extractor.recommend(&analysis);
        assert_eq!(params.aperture.as_deref(), Some("f/1.6"));
        assert_eq!(params.iso, Some(800));
        assert_eq!(params.exposure_compensation, Some(1.0));
        assert_eq!(params.scene_mode, Some(SceneMode::Night));
        assert_eq!(params.white_balance, Some(WhiteBalance::Auto));
        assert_eq!(params.focus_mode, None);
    }

    #[test]
    fn test_flat_mid_gray_is_portrait() {
        let extractor = FeatureExtractor::new();
        let analysis = extractor.analyze(&uniform(128, 128, 128)).unwrap();

        assert_eq!(analysis.scene_type, SceneType::Portrait);
        let params = extractor.recommend(&analysis);
        assert_eq!(params.aperture.as_deref(), Some("f/1.6"));
        assert_eq!(params.focus_mode, Some(FocusMode::Auto));
        assert_eq!(params.scene_mode, Some(SceneMode::Portrait));
        assert_eq!(params.exposure_compensation, Some(0.0));
        assert_eq!(params.iso, None);
    }

    #[test]
    fn test_busy_stripes_are_architecture() {
        let extractor = FeatureExtractor::new();
        let analysis = extractor.analyze(&stripes(64, 4)).unwrap();

        assert!(analysis.composition_summary.edge_pixel_ratio > ARCHITECTURE_EDGE_RATIO);
        assert_eq!(analysis.scene_type, SceneType::Architecture);

        let params = extractor.recommend(&analysis);
        assert_eq!(params.aperture.as_deref(), Some("f/2.8"));
        assert_eq!(params.scene_mode, Some(SceneMode::Auto));
    }

    #[test]
    fn test_moderate_stripes_are_landscape() {
        let extractor = FeatureExtractor::new();
        let analysis = extractor.analyze(&stripes(96, 12)).unwrap();

        let ratio = analysis.composition_summary.edge_pixel_ratio;
        assert!(ratio > PORTRAIT_EDGE_RATIO && ratio < ARCHITECTURE_EDGE_RATIO);
        assert_eq!(analysis.scene_type, SceneType::Landscape);

        let params = extractor.recommend(&analysis);
        assert_eq!(params.aperture.as_deref(), Some("f/5.6"));
        assert_eq!(params.focus_mode, Some(FocusMode::Infinity));
        assert_eq!(params.scene_mode, Some(SceneMode::Landscape));
    }

    #[test]
    fn test_darkness_beats_edge_density() {
        assert_eq!(classify_scene(0.29, 0.5), SceneType::Night);
        assert_eq!(classify_scene(0.3, 0.5), SceneType::Architecture);
        assert_eq!(classify_scene(0.5, 0.10), SceneType::Landscape);
        assert_eq!(classify_scene(0.5, 0.05), SceneType::Landscape);
        assert_eq!(classify_scene(0.5, 0.049), SceneType::Portrait);
    }

    #[test]
    fn test_bright_photo_pulls_exposure_down() {
        let extractor = FeatureExtractor::new();
        let analysis = extractor.analyze(&uniform(230, 230, 230)).unwrap();

        assert!(analysis.brightness > BRIGHT_BRIGHTNESS);
        assert_eq!(
            extractor.recommend(&analysis).exposure_compensation,
            Some(-1.0)
        );
    }

    #[test]
    fn test_color_temperature_drives_white_balance() {
        let extractor = FeatureExtractor::new();

        let warm = extractor.analyze(&uniform(200, 120, 60)).unwrap();
        assert_eq!(warm.color_summary.color_temperature, ColorTemperature::Warm);
        assert_eq!(
            extractor.recommend(&warm).white_balance,
            Some(WhiteBalance::Daylight)
        );

        let cool = extractor.analyze(&uniform(60, 120, 200)).unwrap();
        assert_eq!(cool.color_summary.color_temperature, ColorTemperature::Cool);
        assert_eq!(
            extractor.recommend(&cool).white_balance,
            Some(WhiteBalance::Cloudy)
        );
    }

    #[test]
    fn test_temperature_boundaries() {
        // No red and no blue reads as warm.
        assert_eq!(classify_temperature(0.0, 0.0), ColorTemperature::Warm);
        assert_eq!(classify_temperature(120.0, 100.0), ColorTemperature::Neutral);
        assert_eq!(classify_temperature(121.0, 100.0), ColorTemperature::Cool);
        assert_eq!(classify_temperature(79.0, 100.0), ColorTemperature::Warm);
        assert_eq!(classify_temperature(100.0, 100.0), ColorTemperature::Neutral);
    }

    #[test]
    fn test_hsv_conversion_matches_8bit_convention() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), (60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), (120, 255, 255));
        assert_eq!(rgb_to_hsv(128, 128, 128), (0, 0, 128));
        assert_eq!(rgb_to_hsv(0, 0, 0), (0, 0, 0));
    }

    #[test]
    fn test_dominant_hue_and_saturation() {
        let extractor = FeatureExtractor::new();
        let analysis = extractor.analyze(&uniform(0, 255, 0)).unwrap();

        assert_eq!(analysis.color_summary.dominant_hue, 60);
        assert_eq!(analysis.saturation, 1.0);
        assert_eq!(analysis.color_summary.mean_value, 1.0);
    }

    #[test]
    fn test_blank_photo_defaults_to_top_left() {
        let extractor = FeatureExtractor::new();
        let analysis = extractor.analyze(&uniform(128, 128, 128)).unwrap();
        let composition = &analysis.composition_summary;

        assert_eq!(composition.dominant_region, GridRegion::TopLeft);
        assert!(composition.rule_of_thirds);
        assert_eq!(composition.edge_density.len(), 9);
        assert!(composition.edge_density.values().all(|&v| v == 0));
    }

    #[test]
    fn test_subject_in_bottom_right_dominates() {
        let image = DynamicImage::ImageLuma8(ImageBuffer::from_fn(90, 90, |x, y| {
            if (65..85).contains(&x) && (65..85).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        }));
        let analysis = FeatureExtractor::new().analyze(&image).unwrap();
        let composition = &analysis.composition_summary;

        assert_eq!(composition.dominant_region, GridRegion::BottomRight);
        assert!(composition.rule_of_thirds);
        assert_eq!(composition.edge_density[&GridRegion::Center], 0);
    }

    #[test]
    fn test_subject_in_center_breaks_thirds() {
        let image = DynamicImage::ImageLuma8(ImageBuffer::from_fn(90, 90, |x, y| {
            if (35..55).contains(&x) && (35..55).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        }));
        let composition = FeatureExtractor::new()
            .analyze(&image)
            .unwrap()
            .composition_summary;

        assert_eq!(composition.dominant_region, GridRegion::Center);
        assert!(!composition.rule_of_thirds);
    }

    #[test]
    fn test_metrics_stay_in_range() {
        let extractor = FeatureExtractor::new();
        for image in [
            uniform(0, 0, 0),
            uniform(255, 255, 255),
            stripes(64, 4),
            uniform(255, 0, 128),
        ] {
            let analysis = extractor.analyze(&image).unwrap();
            for metric in [analysis.brightness, analysis.contrast, analysis.saturation] {
                assert!((0.0..=1.0).contains(&metric));
            }
            assert!((-3.0..=3.0).contains(&analysis.exposure_estimate));
        }
    }

    #[test]
    fn test_analyze_file_reports_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let err = FeatureExtractor::new().analyze_file(&path).unwrap_err();
        assert!(matches!(err, ShutterflowError::ImageDecodeError { .. }));

        let missing = FeatureExtractor::new()
            .analyze_file(&dir.path().join("missing.png"))
            .unwrap_err();
        assert!(matches!(missing, ShutterflowError::ImageDecodeError { .. }));
    }

    #[test]
    fn test_analyze_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("night.png");
        uniform(51, 51, 51).save(&path).unwrap();

        let recommendation = FeatureExtractor::new().analyze_file(&path).unwrap();
        assert_eq!(recommendation.analysis.scene_type, SceneType::Night);
        assert_eq!(recommendation.parameters.iso, Some(800));
    }
}
