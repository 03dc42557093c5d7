//! Standalone MICR recognition pipeline.
//!
//! Takes a decoded raster image, finds the MICR band, segments it into
//! glyphs, classifies each glyph against the E-13B / CMC-7 alphabet and
//! returns a confidence-scored, JSON-serializable result. Configuration is a
//! single JSON object matching the SDK sample's key set; the classifier
//! backend (built-in template matcher or an ONNX model from the assets
//! folder) is picked at init time.

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine as _;
use image::GrayImage;
use tracing::instrument;

pub mod alphabet;
mod assembler;
pub mod buffer;
pub mod classifier;
pub mod config;
mod error;
pub mod locator;
mod result;
pub mod segmenter;
mod util;

use classifier::{ClassifierBackend, ExecutionProvider, OnnxClassifier, TemplateClassifier};
use config::Config;

pub use buffer::{ImageBuffer, PixelFormat, Region};
pub use error::{MicrError, MicrResult};
pub use result::*;

pub use ort as runtime;

const GLYPH_MODEL_FILE: &str = "models/micr_glyph.onnx";

pub struct MicrEngineBuilder {
    json: Option<String>,
    num_threads: Option<i32>,
    min_score: Option<f32>,
    assets_folder: Option<PathBuf>,
    strict_acceleration: bool,
}

impl MicrEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON configuration object; unknown keys are ignored, missing keys take
    /// the sample defaults.
    pub fn config_json(mut self, json: impl Into<String>) -> Self {
        self.json = Some(json.into());
        self
    }

    pub fn num_threads(mut self, threads: i32) -> Self {
        self.num_threads = Some(threads);
        self
    }

    pub fn min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn assets_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.assets_folder = Some(path.into());
        self
    }

    /// Fail init instead of falling back to CPU when `gpgpu_enabled`
    /// acceleration is unavailable.
    pub fn strict_acceleration(mut self, strict: bool) -> Self {
        self.strict_acceleration = strict;
        self
    }

    #[instrument(skip(self))]
    pub fn build(self) -> MicrResult<MicrEngine> {
        let mut config = match &self.json {
            Some(json) => Config::from_json(json)?,
            None => Config::default(),
        };
        if let Some(threads) = self.num_threads {
            config.num_threads = threads;
        }
        if let Some(min_score) = self.min_score {
            config.min_score = min_score;
        }
        if let Some(assets) = self.assets_folder {
            config.assets_folder = Some(assets);
        }
        config.validate()?;

        check_license_passthrough(&config);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads())
            .build()
            .map_err(|e| MicrError::resource(format!("worker pool: {e}")))?;
        let backend = init_backend(&config, self.strict_acceleration)?;
        log::info!(
            "engine ready: backend={}, workers={}",
            backend.name(),
            config.worker_threads()
        );

        Ok(MicrEngine {
            config,
            state: EngineState::Ready,
            backend: Some(backend),
            pool: Some(pool),
        })
    }
}

impl Default for MicrEngineBuilder {
    fn default() -> Self {
        Self {
            json: None,
            num_threads: None,
            min_score: None,
            assets_folder: None,
            strict_acceleration: false,
        }
    }
}

/// The token keys are carried and sanity-checked but never enforced;
/// licensing proper lives outside this pipeline.
fn check_license_passthrough(config: &Config) {
    if let Some(file) = &config.license_token_file {
        match std::fs::read_to_string(file) {
            Ok(token) => log::debug!("license token file loaded ({} bytes)", token.len()),
            Err(e) => log::warn!(
                "license token file {} unreadable ({e}); continuing as trial",
                file.display()
            ),
        }
    }
    if let Some(data) = &config.license_token_data {
        if base64::engine::general_purpose::STANDARD
            .decode(data)
            .is_err()
        {
            log::warn!("license token data is not valid base64; continuing as trial");
        }
    }
}

fn init_backend(
    config: &Config,
    strict_acceleration: bool,
) -> MicrResult<Arc<dyn ClassifierBackend>> {
    let gpu_available = cfg!(any(
        feature = "cuda",
        feature = "tensorrt",
        feature = "directml",
        feature = "coreml"
    ));
    if config.gpgpu_enabled && !gpu_available {
        if strict_acceleration {
            return Err(MicrError::resource(
                "gpgpu_enabled but no acceleration feature compiled in".to_string(),
            ));
        }
        log::debug!("gpgpu_enabled but no acceleration feature compiled in; using CPU");
    }
    let providers: &[ExecutionProvider] = if config.gpgpu_enabled {
        classifier::DEFAULT_PROVIDERS
    } else {
        &[ExecutionProvider::Default]
    };

    if let Some(assets) = &config.assets_folder {
        let model_path = assets.join(GLYPH_MODEL_FILE);
        if model_path.is_file() {
            match OnnxClassifier::init(model_path, config.worker_threads(), providers) {
                Ok(backend) => return Ok(Arc::new(backend)),
                Err(e) if strict_acceleration => {
                    return Err(MicrError::resource(format!("glyph model init: {e}")));
                }
                Err(e) => {
                    log::warn!("glyph model init failed ({e}); falling back to templates");
                }
            }
        } else {
            log::debug!(
                "no glyph model under {}; using template backend",
                assets.display()
            );
        }
    }
    Ok(Arc::new(TemplateClassifier::new(config.score_type)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Ready,
    Processing,
    Deinitialized,
}

impl EngineState {
    fn name(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Deinitialized => "deinitialized",
        }
    }
}

/// The recognition engine. One in-flight `process` call at a time (enforced
/// by `&mut self`); init builds all backend resources, deinit releases them
/// and is idempotent.
pub struct MicrEngine {
    config: Config,
    state: EngineState,
    backend: Option<Arc<dyn ClassifierBackend>>,
    pool: Option<rayon::ThreadPool>,
}

impl MicrEngine {
    /// Builds an engine straight from a JSON configuration object.
    pub fn init(json: &str) -> MicrResult<Self> {
        MicrEngineBuilder::new().config_json(json).build()
    }

    pub fn builder() -> MicrEngineBuilder {
        MicrEngineBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the full pipeline on one decoded image. Valid only while the
    /// engine is ready; recognition uncertainty never fails the call, only
    /// structural problems do.
    #[instrument(skip(self, image))]
    pub fn process(&mut self, image: &ImageBuffer) -> MicrResult<ProcessResult> {
        if self.state != EngineState::Ready {
            return Err(MicrError::InvalidState {
                operation: "process",
                state: self.state.name(),
            });
        }
        self.state = EngineState::Processing;
        let outcome = self.run_pipeline(image);
        self.state = EngineState::Ready;
        outcome
    }

    fn run_pipeline(&self, image: &ImageBuffer) -> MicrResult<ProcessResult> {
        let backend = self.backend.as_deref().ok_or(MicrError::InvalidState {
            operation: "process",
            state: "deinitialized",
        })?;
        let pool = self.pool.as_ref().ok_or(MicrError::InvalidState {
            operation: "process",
            state: "deinitialized",
        })?;

        let gray = image.to_gray();
        self.dump_input(&gray);

        let roi = self.config.roi_region(image.width(), image.height());
        let bands = locator::locate(&gray, roi, &self.config);
        log::debug!("{} band candidate(s)", bands.len());

        let mut lines = Vec::with_capacity(bands.len());
        for band in bands {
            let mut glyphs = segmenter::segment(&gray, &band.region, &self.config);
            classifier::classify_all(pool, backend, &mut glyphs);
            lines.push(assembler::assemble(
                band.region,
                &glyphs,
                self.config.min_score,
            ));
        }
        Ok(ProcessResult::ok(lines))
    }

    fn dump_input(&self, gray: &GrayImage) {
        if !self.config.debug_write_input_image_enabled {
            return;
        }
        let path = self.config.debug_internal_data_path.join("micr_input.png");
        match gray.save(&path) {
            Ok(()) => {
                if self.config.debug_enabled() {
                    log::debug!("wrote input image to {}", path.display());
                }
            }
            Err(e) => log::warn!("failed to write input image to {}: {e}", path.display()),
        }
    }

    /// Releases backend resources. Safe to call repeatedly; any later
    /// `process` fails with an invalid-state error.
    pub fn deinit(&mut self) -> MicrResult<()> {
        if self.state == EngineState::Deinitialized {
            return Ok(());
        }
        self.backend = None;
        self.pool = None;
        self.state = EngineState::Deinitialized;
        log::info!("engine deinitialized");
        Ok(())
    }
}
