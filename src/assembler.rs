use tracing::instrument;

use crate::alphabet::PLACEHOLDER;
use crate::buffer::Region;
use crate::result::{Glyph, RecognizedLine};

/// Resolves classified glyphs into a line. Never fails: glyphs whose top
/// score misses `min_score` become placeholders with zero confidence, and a
/// line made entirely of placeholders is still a line; the caller judges it
/// by the confidence fields.
#[instrument(skip(glyphs), level = "debug")]
pub fn assemble(band: Region, glyphs: &[Glyph], min_score: f32) -> RecognizedLine {
    let mut text = String::with_capacity(glyphs.len());
    let mut glyph_confidences = Vec::with_capacity(glyphs.len());
    for glyph in glyphs {
        match glyph.resolved(min_score) {
            Some(candidate) => {
                text.push(candidate.symbol.as_char());
                glyph_confidences.push(candidate.score);
            }
            None => {
                text.push(PLACEHOLDER);
                glyph_confidences.push(0.0);
            }
        }
    }
    let confidence = if glyph_confidences.is_empty() {
        0.0
    } else {
        glyph_confidences.iter().sum::<f32>() / glyph_confidences.len() as f32
    };
    RecognizedLine {
        text,
        confidence,
        glyph_confidences,
        region: band,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::MicrSymbol;
    use crate::result::Candidate;
    use image::GrayImage;

    fn glyph(index: usize, candidates: Vec<Candidate>) -> Glyph {
        Glyph {
            index,
            region: Region::new(index as u32 * 10, 0, 10, 12),
            crop: GrayImage::new(10, 12),
            candidates,
        }
    }

    #[test]
    fn unresolved_glyphs_become_placeholders_with_zero_score() {
        let glyphs = vec![
            glyph(
                0,
                vec![Candidate {
                    symbol: MicrSymbol::Four,
                    score: 0.92,
                }],
            ),
            glyph(
                1,
                vec![Candidate {
                    symbol: MicrSymbol::Nine,
                    score: 0.41,
                }],
            ),
            glyph(2, Vec::new()),
        ];
        let line = assemble(Region::new(0, 0, 30, 12), &glyphs, 0.5);
        assert_eq!(line.text, "4??");
        assert_eq!(line.glyph_confidences.len(), 3);
        assert!((line.confidence - 0.92 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn all_placeholder_line_is_still_returned() {
        let glyphs = vec![glyph(0, Vec::new()), glyph(1, Vec::new())];
        let line = assemble(Region::new(0, 0, 20, 12), &glyphs, 0.3);
        assert_eq!(line.text, "??");
        assert_eq!(line.confidence, 0.0);
    }
}
