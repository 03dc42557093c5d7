use float_ord::FloatOrd;
use geo::BoundingRect;
use image::GrayImage;
use imageproc::contours::find_contours;
use ndarray::Array2;
use tracing::instrument;

use crate::buffer::Region;
use crate::config::{Config, SegmenterAccuracy};
use crate::result::BandCandidate;
use crate::util::{
    crop_region, ink_density, ink_mask, mask_to_array, profile_runs, row_profile, to_geo_poly,
};

/// A MICR band is short and long; anything squarer is not worth segmenting.
const MIN_ASPECT: f32 = 3.0;
const MIN_BAND_HEIGHT: u32 = 8;
/// E-13B/CMC-7 stroke-density envelope: a band is neither sparse speckle nor
/// a solid rule.
const MIN_DENSITY: f32 = 0.05;
const MAX_DENSITY: f32 = 0.9;

/// Finds candidate MICR bands, ordered by descending detection score. An
/// empty result is the soft no-band-found outcome, never an error.
#[instrument(skip(gray, config), level = "debug")]
pub fn locate(gray: &GrayImage, roi: Option<Region>, config: &Config) -> Vec<BandCandidate> {
    let search = match roi {
        Some(region) if !region.is_empty() => region,
        _ => Region::full(gray.width(), gray.height()),
    };
    let view = crop_region(gray, &search);
    let mask = ink_mask(&view);
    let ink = mask_to_array(&mask);

    let rows = row_profile(&ink);
    let (row_threshold, gap_tolerance) = strip_tuning(config.segmenter_accuracy, view.width());

    let mut candidates = Vec::new();
    for (top, bottom) in profile_runs(&rows, row_threshold, gap_tolerance) {
        let strip_height = (bottom - top) as u32;
        if strip_height < MIN_BAND_HEIGHT {
            continue;
        }
        let strip = Region::new(0, top as u32, view.width(), strip_height);
        let Some(band) = tighten_strip(&mask, &strip) else {
            continue;
        };
        let aspect = band.width as f32 / band.height as f32;
        if aspect < MIN_ASPECT {
            log::debug!("dropping strip at y={top}: aspect {aspect:.2} below {MIN_ASPECT}");
            continue;
        }
        let density = ink_density(&ink, &band);
        if !(MIN_DENSITY..=MAX_DENSITY).contains(&density) {
            log::debug!("dropping strip at y={top}: density {density:.3} outside envelope");
            continue;
        }
        let score = band_score(&ink, &band);
        if score < config.min_score {
            log::debug!("dropping strip at y={top}: score {score:.3} < {}", config.min_score);
            continue;
        }
        candidates.push(BandCandidate {
            region: band.offset_by(&search),
            score,
        });
    }

    candidates.sort_by_key(|c| std::cmp::Reverse(FloatOrd(c.score)));
    candidates
}

fn strip_tuning(accuracy: SegmenterAccuracy, width: u32) -> (f32, usize) {
    // Row ink thresholds are fractions of the row width; higher accuracy
    // keeps fainter strips and bridges wider dropouts.
    let (fraction, gap_tolerance) = match accuracy {
        SegmenterAccuracy::High => (0.01, 2),
        SegmenterAccuracy::Medium => (0.02, 1),
        SegmenterAccuracy::Low => (0.04, 0),
    };
    ((width as f32 * fraction).max(1.0), gap_tolerance)
}

/// Shrinks a projection strip to the bounding box of its glyph-sized
/// connected components, discarding speckle.
fn tighten_strip(mask: &GrayImage, strip: &Region) -> Option<Region> {
    let strip_mask = crop_region(mask, strip);
    let min_component_height = (strip.height as f32 * 0.35).max(2.0);

    let mut union: Option<Region> = None;
    for contour in find_contours::<i32>(&strip_mask) {
        if contour.points.len() < 3 {
            continue;
        }
        let Some(rect) = to_geo_poly(&contour.points).bounding_rect() else {
            continue;
        };
        let width = rect.width() + 1.0;
        let height = rect.height() + 1.0;
        if height < min_component_height || width < 2.0 {
            continue;
        }
        let component = Region::new(
            rect.min().x as u32,
            rect.min().y as u32,
            width as u32,
            height as u32,
        );
        union = Some(match union {
            Some(existing) => existing.union(&component),
            None => component,
        });
    }

    union.map(|tight| tight.offset_by(strip))
}

/// Vertical solidity of the band: the fraction of its rows that carry ink.
/// A real MICR band has ink on every raster row; broken or speckled strips
/// score lower.
fn band_score(ink: &Array2<f32>, band: &Region) -> f32 {
    let row_min = (band.width as f32 * 0.02).max(1.0);
    let mut solid = 0usize;
    for y in band.y..band.bottom() {
        let row = ink.slice(ndarray::s![
            y as usize..y as usize + 1,
            band.x as usize..band.right() as usize
        ]);
        if row.sum() >= row_min {
            solid += 1;
        }
    }
    solid as f32 / band.height as f32
}
