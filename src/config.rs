use std::path::PathBuf;

use serde::Deserialize;

use crate::buffer::Region;
use crate::error::{MicrError, MicrResult};

/// Engine configuration, parsed once at init and immutable afterwards.
///
/// The recognized keys and their defaults follow the SDK sample config
/// (`debug_level: "info"`, `num_threads: -1`, `segmenter_accuracy: "high"`,
/// `interpolation: "bilinear"`, `min_score: 0.3`, `score_type: "min"`).
/// Unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debug_level: DebugLevel,
    pub debug_write_input_image_enabled: bool,
    pub debug_internal_data_path: PathBuf,
    /// Worker count for per-glyph classification; -1 means auto-detect.
    pub num_threads: i32,
    pub gpgpu_enabled: bool,
    pub segmenter_accuracy: SegmenterAccuracy,
    pub interpolation: Interpolation,
    /// Search region `[x, y, w, h]`; all-zero means the whole image.
    pub roi: [f32; 4],
    /// Bands and glyphs scoring below this are dropped / left unresolved.
    pub min_score: f32,
    /// Aggregation over the classifier's sub-detector scores. The ONNX
    /// backend runs a single detector, so all three policies coincide there.
    pub score_type: ScoreType,
    pub assets_folder: Option<PathBuf>,
    pub license_token_file: Option<PathBuf>,
    pub license_token_data: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_level: DebugLevel::Info,
            debug_write_input_image_enabled: false,
            debug_internal_data_path: PathBuf::from("."),
            num_threads: -1,
            gpgpu_enabled: true,
            segmenter_accuracy: SegmenterAccuracy::High,
            interpolation: Interpolation::Bilinear,
            roi: [0.0; 4],
            min_score: 0.3,
            score_type: ScoreType::Min,
            assets_folder: None,
            license_token_file: None,
            license_token_data: None,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> MicrResult<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| MicrError::config(format!("malformed config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MicrResult<()> {
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(MicrError::config(format!(
                "min_score {} outside [0, 1]",
                self.min_score
            )));
        }
        if self.roi.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(MicrError::config(format!(
                "roi {:?} must be finite and non-negative",
                self.roi
            )));
        }
        if self.num_threads < -1 {
            return Err(MicrError::config(format!(
                "num_threads {} (use -1 for auto)",
                self.num_threads
            )));
        }
        Ok(())
    }

    /// The configured ROI clamped to an image, `None` when the default
    /// all-zero ROI selects the whole image or the ROI misses it entirely.
    pub fn roi_region(&self, width: u32, height: u32) -> Option<Region> {
        let [x, y, w, h] = self.roi;
        if w <= 0.0 || h <= 0.0 {
            return None;
        }
        let requested = Region::new(x as u32, y as u32, w as u32, h as u32);
        requested.intersect(&Region::full(width, height))
    }

    /// Resolved classification worker count.
    pub fn worker_threads(&self) -> usize {
        if self.num_threads <= 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.num_threads as usize
        }
    }

    pub fn debug_enabled(&self) -> bool {
        matches!(self.debug_level, DebugLevel::Trace | DebugLevel::Debug)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Recall/speed trade-off for band location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmenterAccuracy {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    Bilinear,
}

impl Interpolation {
    pub(crate) fn filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Bilinear => image::imageops::FilterType::Triangle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreType {
    Min,
    Max,
    Avg,
}

impl ScoreType {
    pub(crate) fn aggregate(self, scores: &[f32]) -> f32 {
        if scores.is_empty() {
            return 0.0;
        }
        match self {
            Self::Min => scores.iter().copied().fold(f32::INFINITY, f32::min),
            Self::Max => scores.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            Self::Avg => scores.iter().sum::<f32>() / scores.len() as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_sample_config() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.num_threads, -1);
        assert!(config.gpgpu_enabled);
        assert_eq!(config.segmenter_accuracy, SegmenterAccuracy::High);
        assert_eq!(config.interpolation, Interpolation::Bilinear);
        assert_eq!(config.score_type, ScoreType::Min);
        assert!((config.min_score - 0.3).abs() < 1e-6);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = Config::from_json(r#"{"min_score": 0.5, "future_knob": true}"#).unwrap();
        assert!((config.min_score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_min_score_is_rejected() {
        assert!(matches!(
            Config::from_json(r#"{"min_score": 1.5}"#),
            Err(MicrError::Config { .. })
        ));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            Config::from_json("{not json"),
            Err(MicrError::Config { .. })
        ));
    }

    #[test]
    fn zero_roi_means_whole_image() {
        let config = Config::default();
        assert_eq!(config.roi_region(640, 480), None);
    }

    #[test]
    fn oversized_roi_components_degrade_to_no_roi() {
        let config =
            Config::from_json(r#"{"roi": [4200000000.0, 0, 4200000000.0, 10]}"#).unwrap();
        assert_eq!(config.roi_region(640, 480), None);
    }

    #[test]
    fn roi_is_clamped_to_image_bounds() {
        let config = Config::from_json(r#"{"roi": [600, 0, 100, 100]}"#).unwrap();
        let region = config.roi_region(640, 480).unwrap();
        assert_eq!((region.x, region.width), (600, 40));
        let config = Config::from_json(r#"{"roi": [700, 0, 100, 100]}"#).unwrap();
        assert_eq!(config.roi_region(640, 480), None);
    }

    #[test]
    fn score_aggregation_policies() {
        let scores = [0.2, 0.8, 0.5];
        assert!((ScoreType::Min.aggregate(&scores) - 0.2).abs() < 1e-6);
        assert!((ScoreType::Max.aggregate(&scores) - 0.8).abs() < 1e-6);
        assert!((ScoreType::Avg.aggregate(&scores) - 0.5).abs() < 1e-6);
    }
}
