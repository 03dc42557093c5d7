use float_ord::FloatOrd;
use image::imageops;
use image::GrayImage;
use tracing::instrument;

use crate::buffer::Region;
use crate::config::Config;
use crate::result::Glyph;
use crate::util::{column_profile, crop_region, ink_mask, mask_to_array, profile_runs};

/// Bands are normalized to this height before profiling, so the width
/// thresholds below are in a known scale.
const WORK_HEIGHT: u32 = 48;
/// Fragments narrower than this are broken-character debris and get merged
/// into a neighbor.
const MIN_FRAGMENT_WIDTH: usize = 6;
/// A fragment wider than this multiple of the median width is assumed to be
/// touching characters.
const TOUCHING_RATIO: f32 = 1.5;
const VALLEY_FRACTION: f32 = 0.1;

/// Splits a located band into ordered glyphs. Always returns at least one
/// glyph: a band with no interior valleys comes back whole and the
/// classifier gets to judge it.
#[instrument(skip(gray, config), level = "debug")]
pub fn segment(gray: &GrayImage, band: &Region, config: &Config) -> Vec<Glyph> {
    let crop = crop_region(gray, band);
    let work_width =
        ((band.width as f32 * WORK_HEIGHT as f32 / band.height as f32).round() as u32).max(1);
    let work = if (work_width, WORK_HEIGHT) == (crop.width(), crop.height()) {
        crop
    } else {
        imageops::resize(&crop, work_width, WORK_HEIGHT, config.interpolation.filter())
    };

    let mask = ink_mask(&work);
    let profile = column_profile(&mask_to_array(&mask));
    let max_column = profile.iter().copied().fold(0.0f32, f32::max);
    let threshold = (max_column * VALLEY_FRACTION).max(1.0);

    let mut fragments = profile_runs(&profile, threshold, 0);
    if fragments.is_empty() {
        fragments.push((0, profile.len()));
    }
    merge_narrow(&mut fragments);
    split_touching(&mut fragments, &profile);

    let mut glyphs: Vec<Glyph> = fragments
        .into_iter()
        .map(|(start, end)| {
            let crop = imageops::crop_imm(&work, start as u32, 0, (end - start) as u32, WORK_HEIGHT)
                .to_image();
            Glyph {
                index: 0,
                region: to_source(band, start, end, work_width),
                crop,
                candidates: Vec::new(),
            }
        })
        .collect();

    // Strict reading order: leading x, then lesser top y.
    glyphs.sort_by_key(|g| (g.region.x, g.region.y));
    for (index, glyph) in glyphs.iter_mut().enumerate() {
        glyph.index = index;
    }
    log::debug!("band {band:?} segmented into {} glyphs", glyphs.len());
    glyphs
}

fn to_source(band: &Region, start: usize, end: usize, work_width: u32) -> Region {
    let scale = band.width as f32 / work_width as f32;
    let x0 = (start as f32 * scale).round() as u32;
    let x1 = (end as f32 * scale).round() as u32;
    Region::new(
        band.x + x0,
        band.y,
        (x1 - x0).max(1).min(band.width),
        band.height,
    )
}

/// Broken-character recovery: fold fragments narrower than the minimum
/// stroke width into whichever neighbor sits across the smaller gap.
fn merge_narrow(fragments: &mut Vec<(usize, usize)>) {
    while fragments.len() > 1 {
        let Some(i) = fragments
            .iter()
            .position(|(s, e)| e - s < MIN_FRAGMENT_WIDTH)
        else {
            break;
        };
        let (s, e) = fragments[i];
        let left_gap = if i > 0 {
            Some(s - fragments[i - 1].1)
        } else {
            None
        };
        let right_gap = if i + 1 < fragments.len() {
            Some(fragments[i + 1].0 - e)
        } else {
            None
        };
        let into_left = match (left_gap, right_gap) {
            (Some(l), Some(r)) => l <= r,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        if into_left {
            fragments[i - 1].1 = e;
        } else {
            fragments[i + 1].0 = s;
        }
        fragments.remove(i);
    }
}

/// Touching-character recovery: re-split any fragment wider than
/// `TOUCHING_RATIO` times the median width at the deepest valley in its
/// middle 60%.
fn split_touching(fragments: &mut Vec<(usize, usize)>, profile: &[f32]) {
    for _ in 0..16 {
        let median = median_width(fragments);
        let limit = median * TOUCHING_RATIO;
        let Some(i) = fragments.iter().position(|(s, e)| {
            let width = e - s;
            width as f32 > limit && width >= 2 * MIN_FRAGMENT_WIDTH
        }) else {
            return;
        };
        let (s, e) = fragments[i];
        let Some(cut) = interior_valley(profile, s, e) else {
            return;
        };
        fragments[i] = (s, cut);
        fragments.insert(i + 1, (cut, e));
    }
}

fn median_width(fragments: &[(usize, usize)]) -> f32 {
    let mut widths: Vec<usize> = fragments.iter().map(|(s, e)| e - s).collect();
    widths.sort_unstable();
    let mid = widths.len() / 2;
    if widths.len() % 2 == 1 {
        widths[mid] as f32
    } else {
        (widths[mid - 1] + widths[mid]) as f32 / 2.0
    }
}

/// The leftmost deepest profile column in the middle 60% of `[start, end)`.
fn interior_valley(profile: &[f32], start: usize, end: usize) -> Option<usize> {
    let width = end - start;
    let margin = (width as f32 * 0.2).round() as usize;
    let (lo, hi) = (start + margin, end - margin);
    if lo + 1 >= hi {
        return None;
    }
    // min_by_key keeps the first of equal minima, so ties cut leftmost.
    let cut = (lo..hi).min_by_key(|&x| FloatOrd(profile[x]))?;
    if cut == start || cut == end {
        return None;
    }
    Some(cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_fragments_fold_into_the_nearer_neighbor() {
        let mut fragments = vec![(0, 20), (22, 25), (40, 60)];
        merge_narrow(&mut fragments);
        assert_eq!(fragments, vec![(0, 25), (40, 60)]);
    }

    #[test]
    fn lone_fragment_is_never_dropped() {
        let mut fragments = vec![(3, 5)];
        merge_narrow(&mut fragments);
        assert_eq!(fragments, vec![(3, 5)]);
    }

    #[test]
    fn valley_search_stays_in_the_middle() {
        let mut profile = vec![10.0; 60];
        profile[2] = 0.0; // outside the middle 60%, must be ignored
        profile[31] = 1.0;
        assert_eq!(interior_valley(&profile, 0, 60), Some(31));
    }
}
