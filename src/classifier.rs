use std::collections::HashMap;
use std::path::PathBuf;

use float_ord::FloatOrd;
use image::{imageops, imageops::FilterType, GrayImage};
use ndarray::{Array4, Axis};
use ort::{inputs, ExecutionProviderDispatch, GraphOptimizationLevel, Session};
use rayon::prelude::*;
use tracing::instrument;

use crate::alphabet::{templates, Template, ALPHABET};
use crate::config::ScoreType;
use crate::result::{Candidate, Glyph};
use crate::util::ink_mask;

/// The pluggable recognition seam: an owned glyph crop in, ranked candidates
/// out. Backends must be shareable across the classification worker pool.
pub trait ClassifierBackend: Send + Sync {
    /// Candidates for every alphabet symbol, sorted by strictly
    /// non-increasing score, ties broken by canonical alphabet order. Empty
    /// when the crop carries no ink at all.
    fn classify(&self, crop: &GrayImage) -> Vec<Candidate>;

    fn name(&self) -> &'static str;
}

/// Fans glyph classification out over the engine's worker pool.
#[instrument(skip_all, level = "debug")]
pub(crate) fn classify_all(
    pool: &rayon::ThreadPool,
    backend: &dyn ClassifierBackend,
    glyphs: &mut [Glyph],
) {
    pool.install(|| {
        glyphs
            .par_iter_mut()
            .for_each(|glyph| glyph.candidates = backend.classify(&glyph.crop));
    });
}

fn sort_candidates(candidates: &mut Vec<Candidate>) {
    candidates.sort_by(|a, b| {
        FloatOrd(b.score)
            .cmp(&FloatOrd(a.score))
            .then_with(|| a.symbol.canonical_index().cmp(&b.symbol.canonical_index()))
    });
}

/// Template matcher over the built-in E-13B / CMC-7 shapes.
///
/// Each symbol is scored by an ensemble of three sub-detectors on the
/// binarized, template-sized crop: cell agreement, column ink profile and row
/// ink profile. `score_type` picks the aggregation (the sample config's
/// default is "min", the most conservative of the three).
pub struct TemplateClassifier {
    templates: Vec<Template>,
    score_type: ScoreType,
}

impl TemplateClassifier {
    pub fn new(score_type: ScoreType) -> Self {
        Self {
            templates: templates(),
            score_type,
        }
    }
}

impl ClassifierBackend for TemplateClassifier {
    #[instrument(skip_all, level = "trace")]
    fn classify(&self, crop: &GrayImage) -> Vec<Candidate> {
        let mask = ink_mask(crop);
        let Some(tight) = tight_ink_box(&mask) else {
            return Vec::new();
        };

        // Crops get resampled once per distinct template geometry.
        let mut grids: HashMap<(usize, usize), Vec<bool>> = HashMap::new();
        let mut best: HashMap<usize, f32> = HashMap::new();
        for template in &self.templates {
            let key = (template.width, template.height);
            let grid = grids
                .entry(key)
                .or_insert_with(|| resample_cells(&mask, tight, key.0, key.1));
            let score = self.score_type.aggregate(&sub_scores(grid, template));
            let slot = best.entry(template.symbol.canonical_index()).or_insert(0.0);
            *slot = slot.max(score);
        }

        let mut candidates: Vec<Candidate> = ALPHABET
            .iter()
            .map(|&symbol| Candidate {
                symbol,
                score: best.get(&symbol.canonical_index()).copied().unwrap_or(0.0),
            })
            .collect();
        sort_candidates(&mut candidates);
        candidates
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

fn tight_ink_box(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = mask.dimensions();
    let ink_at = |x: u32, y: u32| mask.get_pixel(x, y)[0] > 0;
    let min_x = (0..w).find(|&x| (0..h).any(|y| ink_at(x, y)))?;
    let max_x = (0..w).rfind(|&x| (0..h).any(|y| ink_at(x, y)))?;
    let min_y = (0..h).find(|&y| (0..w).any(|x| ink_at(x, y)))?;
    let max_y = (0..h).rfind(|&y| (0..w).any(|x| ink_at(x, y)))?;
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

fn resample_cells(
    mask: &GrayImage,
    (x, y, w, h): (u32, u32, u32, u32),
    cols: usize,
    rows: usize,
) -> Vec<bool> {
    let tight = imageops::crop_imm(mask, x, y, w, h).to_image();
    let scaled = imageops::resize(&tight, cols as u32, rows as u32, FilterType::Nearest);
    scaled.pixels().map(|px| px[0] > 127).collect()
}

fn sub_scores(cells: &[bool], template: &Template) -> [f32; 3] {
    let (w, h) = (template.width, template.height);
    let total = (w * h) as f32;

    let mut matches = 0usize;
    let mut col_crop = vec![0f32; w];
    let mut col_tpl = vec![0f32; w];
    let mut row_crop = vec![0f32; h];
    let mut row_tpl = vec![0f32; h];
    for y in 0..h {
        for x in 0..w {
            let a = cells[y * w + x];
            let b = template.ink(x, y);
            if a == b {
                matches += 1;
            }
            if a {
                col_crop[x] += 1.0;
                row_crop[y] += 1.0;
            }
            if b {
                col_tpl[x] += 1.0;
                row_tpl[y] += 1.0;
            }
        }
    }

    let agreement = matches as f32 / total;
    let column_similarity = profile_similarity(&col_crop, &col_tpl, h as f32);
    let row_similarity = profile_similarity(&row_crop, &row_tpl, w as f32);
    [agreement, column_similarity, row_similarity]
}

fn profile_similarity(a: &[f32], b: &[f32], span: f32) -> f32 {
    let diff: f32 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs() / span)
        .sum::<f32>()
        / a.len() as f32;
    1.0 - diff
}

const ONNX_INPUT_SIZE: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Default,
    #[cfg(feature = "tensorrt")]
    TensorRT,
    #[cfg(feature = "coreml")]
    CoreML,
    #[cfg(feature = "cuda")]
    Cuda,
    #[cfg(feature = "directml")]
    DirectML,
}

pub const DEFAULT_PROVIDERS: &[ExecutionProvider] = &[
    #[cfg(feature = "tensorrt")]
    ExecutionProvider::TensorRT,
    #[cfg(feature = "coreml")]
    ExecutionProvider::CoreML,
    #[cfg(feature = "directml")]
    ExecutionProvider::DirectML,
    #[cfg(feature = "cuda")]
    ExecutionProvider::Cuda,
    ExecutionProvider::Default,
];

#[cfg(feature = "tensorrt")]
fn setup_tensorrt() -> ExecutionProviderDispatch {
    use ort::TensorRTExecutionProvider;

    TensorRTExecutionProvider::default()
        .with_profile_min_shapes("x:1x1x32x32")
        .with_profile_max_shapes("x:1x1x32x32")
        .with_profile_opt_shapes("x:1x1x32x32")
        .build()
}

#[cfg(feature = "cuda")]
fn setup_cuda() -> ExecutionProviderDispatch {
    use ort::CUDAExecutionProvider;

    CUDAExecutionProvider::default().build()
}

#[cfg(feature = "directml")]
fn setup_directml() -> ExecutionProviderDispatch {
    use ort::DirectMLExecutionProvider;

    DirectMLExecutionProvider::default().build()
}

#[cfg(feature = "coreml")]
fn setup_coreml() -> ExecutionProviderDispatch {
    use ort::CoreMLExecutionProvider;

    CoreMLExecutionProvider::default().build()
}

/// Learned-model backend: a glyph classification head over the canonical
/// alphabet, exported to ONNX and shipped in the assets folder.
pub struct OnnxClassifier {
    session: Session,
}

impl OnnxClassifier {
    #[instrument(level = "debug")]
    pub fn init(
        model_path: PathBuf,
        num_threads: usize,
        execution_providers: &[ExecutionProvider],
    ) -> ort::Result<Self> {
        let execution_providers = execution_providers.iter().filter_map(
            |provider| -> Option<ExecutionProviderDispatch> {
                match provider {
                    ExecutionProvider::Default => None,
                    #[cfg(feature = "tensorrt")]
                    ExecutionProvider::TensorRT => Some(setup_tensorrt()),
                    #[cfg(feature = "cuda")]
                    ExecutionProvider::Cuda => Some(setup_cuda()),
                    #[cfg(feature = "directml")]
                    ExecutionProvider::DirectML => Some(setup_directml()),
                    #[cfg(feature = "coreml")]
                    ExecutionProvider::CoreML => Some(setup_coreml()),
                }
            },
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_parallel_execution(true)?
            .with_inter_threads(num_threads)?
            .with_intra_threads(num_threads)?
            .with_execution_providers(execution_providers)?
            .commit_from_file(model_path)?;

        log::debug!("glyph session inputs: {:?}", session.inputs);
        log::debug!("glyph session outputs: {:?}", session.outputs);

        Ok(Self { session })
    }

    fn run(&self, crop: &GrayImage) -> ort::Result<Vec<Candidate>> {
        let image = imageops::resize(
            crop,
            ONNX_INPUT_SIZE,
            ONNX_INPUT_SIZE,
            FilterType::Triangle,
        );
        let input = Array4::<f32>::from_shape_fn(
            (1, 1, ONNX_INPUT_SIZE as usize, ONNX_INPUT_SIZE as usize),
            |(_, _, y, x)| {
                let px = image.get_pixel(x as u32, y as u32)[0] as f32;
                (px / 255.0 - 0.5) / 0.5
            },
        );
        let outputs = self.session.run(inputs!["x" => input]?)?;
        let output = outputs
            .first_key_value()
            .expect("glyph model has one output")
            .1
            .try_extract_tensor::<f32>()?
            .remove_axis(Axis(0));

        let logits: Vec<f32> = output.iter().copied().take(ALPHABET.len()).collect();
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
        let norm: f32 = exps.iter().sum();

        let mut candidates: Vec<Candidate> = ALPHABET
            .iter()
            .zip(&exps)
            .map(|(&symbol, &e)| Candidate {
                symbol,
                score: e / norm,
            })
            .collect();
        sort_candidates(&mut candidates);
        Ok(candidates)
    }
}

impl ClassifierBackend for OnnxClassifier {
    #[instrument(skip_all, level = "trace")]
    fn classify(&self, crop: &GrayImage) -> Vec<Candidate> {
        match self.run(crop) {
            Ok(candidates) => candidates,
            // Per-glyph inference trouble degrades to an unresolved glyph
            // instead of failing the whole line.
            Err(e) => {
                log::warn!("glyph inference failed, leaving glyph unresolved: {e}");
                Vec::new()
            }
        }
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
