use geo::{Coord, LineString, Polygon};
use image::GrayImage;
use imageproc::contrast::{otsu_level, threshold_mut, ThresholdType};
use imageproc::point::Point;
use ndarray::{Array2, Axis};

use crate::buffer::Region;

/// Binarizes a grayscale image into an ink mask: ink (dark on the scan)
/// becomes 255, background 0. The threshold is picked by Otsu's method so
/// uneven scan exposure does not shift the split point.
pub(crate) fn ink_mask(gray: &GrayImage) -> GrayImage {
    let (mut lo, mut hi) = (255u8, 0u8);
    for px in gray.pixels() {
        lo = lo.min(px[0]);
        hi = hi.max(px[0]);
    }
    // A near-uniform or empty patch has no ink to find; Otsu degenerates
    // there.
    if hi.saturating_sub(lo) < 16 {
        return GrayImage::from_pixel(gray.width(), gray.height(), image::Luma([0u8]));
    }
    let level = otsu_level(gray);
    let mut mask = gray.clone();
    threshold_mut(&mut mask, level, ThresholdType::BinaryInverted);
    mask
}

/// Ink mask as a 0/1 float matrix, rows × columns.
pub(crate) fn mask_to_array(mask: &GrayImage) -> Array2<f32> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    Array2::from_shape_fn((h, w), |(y, x)| {
        if mask.get_pixel(x as u32, y as u32)[0] > 0 {
            1.0
        } else {
            0.0
        }
    })
}

/// Per-row ink pixel counts.
pub(crate) fn row_profile(mask: &Array2<f32>) -> Vec<f32> {
    mask.sum_axis(Axis(1)).to_vec()
}

/// Per-column ink pixel counts.
pub(crate) fn column_profile(mask: &Array2<f32>) -> Vec<f32> {
    mask.sum_axis(Axis(0)).to_vec()
}

pub(crate) fn crop_region(gray: &GrayImage, region: &Region) -> GrayImage {
    image::imageops::crop_imm(gray, region.x, region.y, region.width, region.height).to_image()
}

pub(crate) fn to_geo_poly(points: &[Point<i32>]) -> Polygon<f32> {
    let points = points
        .iter()
        .map(|point| Coord {
            x: point.x as f32,
            y: point.y as f32,
        })
        .collect();
    Polygon::new(LineString::new(points), vec![])
}

/// Fraction of mask cells that are ink inside `region` (region in mask
/// coordinates).
pub(crate) fn ink_density(mask: &Array2<f32>, region: &Region) -> f32 {
    if region.is_empty() {
        return 0.0;
    }
    let sub = mask.slice(ndarray::s![
        region.y as usize..region.bottom() as usize,
        region.x as usize..region.right() as usize
    ]);
    sub.sum() / region.area() as f32
}

/// Maximal runs of indices whose profile value reaches `threshold`, bridging
/// dips no longer than `gap_tolerance`.
pub(crate) fn profile_runs(
    profile: &[f32],
    threshold: f32,
    gap_tolerance: usize,
) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    let mut gap = 0usize;
    for (i, &v) in profile.iter().enumerate() {
        if v >= threshold {
            if start.is_none() {
                start = Some(i);
            }
            gap = 0;
        } else if let Some(s) = start {
            gap += 1;
            if gap > gap_tolerance {
                runs.push((s, i - gap + 1));
                start = None;
                gap = 0;
            }
        }
    }
    if let Some(s) = start {
        runs.push((s, profile.len() - gap));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_bridge_small_gaps_only() {
        let profile = [0.0, 2.0, 2.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0];
        assert_eq!(profile_runs(&profile, 1.0, 1), vec![(1, 5), (8, 9)]);
        assert_eq!(profile_runs(&profile, 1.0, 0), vec![(1, 3), (4, 5), (8, 9)]);
    }

    #[test]
    fn density_counts_ink_cells() {
        let mask = Array2::from_shape_fn((4, 4), |(y, _)| if y < 2 { 1.0 } else { 0.0 });
        let whole = Region::full(4, 4);
        assert!((ink_density(&mask, &whole) - 0.5).abs() < 1e-6);
    }
}
