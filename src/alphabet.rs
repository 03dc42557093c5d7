//! The MICR symbol sets and their reference glyph shapes.
//!
//! E-13B glyphs are stylized on a cell grid (the font is defined on a coarse
//! module grid, which is what makes template matching viable at all); CMC-7
//! glyphs are seven vertical bars whose identity lives entirely in which two
//! of the six inter-bar gaps are long, so those are stored as gap tables and
//! rendered to the same kind of grid. Both fonts feed the template backend,
//! and the renderer doubles as the source of synthetic test bands.

use image::{GrayImage, Luma};

/// One symbol of the combined E-13B / CMC-7 alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MicrSymbol {
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    /// E-13B transit (routing field delimiter).
    Transit,
    /// E-13B amount field delimiter.
    Amount,
    /// E-13B on-us field delimiter.
    OnUs,
    /// E-13B dash.
    Dash,
    /// CMC-7 control characters S1..S5.
    S1,
    S2,
    S3,
    S4,
    S5,
}

/// Canonical alphabet order; classifier tie-breaks follow this order.
pub const ALPHABET: [MicrSymbol; 19] = [
    MicrSymbol::Zero,
    MicrSymbol::One,
    MicrSymbol::Two,
    MicrSymbol::Three,
    MicrSymbol::Four,
    MicrSymbol::Five,
    MicrSymbol::Six,
    MicrSymbol::Seven,
    MicrSymbol::Eight,
    MicrSymbol::Nine,
    MicrSymbol::Transit,
    MicrSymbol::Amount,
    MicrSymbol::OnUs,
    MicrSymbol::Dash,
    MicrSymbol::S1,
    MicrSymbol::S2,
    MicrSymbol::S3,
    MicrSymbol::S4,
    MicrSymbol::S5,
];

/// Placeholder character for glyphs left unresolved by `min_score`.
pub const PLACEHOLDER: char = '?';

impl MicrSymbol {
    pub fn canonical_index(self) -> usize {
        ALPHABET
            .iter()
            .position(|&s| s == self)
            .expect("every symbol is in the canonical alphabet")
    }

    /// ASCII rendering used in assembled line text. The E-13B delimiters have
    /// no ASCII form, so the conventional letters are used; CMC-7 controls
    /// map to lowercase a-e.
    pub fn as_char(self) -> char {
        match self {
            Self::Zero => '0',
            Self::One => '1',
            Self::Two => '2',
            Self::Three => '3',
            Self::Four => '4',
            Self::Five => '5',
            Self::Six => '6',
            Self::Seven => '7',
            Self::Eight => '8',
            Self::Nine => '9',
            Self::Transit => 'T',
            Self::Amount => 'A',
            Self::OnUs => 'U',
            Self::Dash => '-',
            Self::S1 => 'a',
            Self::S2 => 'b',
            Self::S3 => 'c',
            Self::S4 => 'd',
            Self::S5 => 'e',
        }
    }
}

/// A reference glyph shape, trimmed to its inked bounding box.
#[derive(Debug, Clone)]
pub(crate) struct Template {
    pub symbol: MicrSymbol,
    pub width: usize,
    pub height: usize,
    /// Row-major ink cells, `width * height` long.
    pub cells: Vec<bool>,
}

impl Template {
    pub fn ink(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.width + x]
    }
}

const E13B_ROWS: usize = 12;

#[rustfmt::skip]
const E13B_GLYPHS: [(MicrSymbol, [&str; E13B_ROWS]); 14] = [
    (MicrSymbol::Zero, [
        ".#####.",
        "#######",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "#######",
        ".#####.",
    ]),
    (MicrSymbol::One, [
        ".##.",
        "###.",
        ".##.",
        ".##.",
        ".##.",
        ".##.",
        ".##.",
        ".##.",
        ".##.",
        ".##.",
        "####",
        "####",
    ]),
    (MicrSymbol::Two, [
        "######.",
        "#######",
        ".....##",
        ".....##",
        "....##.",
        "...##..",
        "..##...",
        ".##....",
        "##.....",
        "##.....",
        "#######",
        "#######",
    ]),
    (MicrSymbol::Three, [
        "#######",
        "#######",
        ".....##",
        "....###",
        "..#####",
        "..#####",
        "....###",
        ".....##",
        ".....##",
        "#....##",
        "#######",
        "#######",
    ]),
    (MicrSymbol::Four, [
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "#######",
        "#######",
        ".....##",
        ".....##",
        ".....##",
        ".....##",
        ".....##",
    ]),
    (MicrSymbol::Five, [
        "#######",
        "#######",
        "##.....",
        "##.....",
        "######.",
        "#######",
        ".....##",
        ".....##",
        ".....##",
        "#....##",
        "#######",
        "######.",
    ]),
    (MicrSymbol::Six, [
        "..####.",
        ".##....",
        "##.....",
        "##.....",
        "######.",
        "#######",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "#######",
        ".#####.",
    ]),
    (MicrSymbol::Seven, [
        "#######",
        "#######",
        ".....##",
        ".....##",
        "....##.",
        "....##.",
        "...##..",
        "...##..",
        "..##...",
        "..##...",
        "..##...",
        "..##...",
    ]),
    (MicrSymbol::Eight, [
        ".#####.",
        "##...##",
        "##...##",
        ".##.##.",
        "..###..",
        ".##.##.",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "#######",
        ".#####.",
    ]),
    (MicrSymbol::Nine, [
        ".#####.",
        "#######",
        "##...##",
        "##...##",
        "##...##",
        "#######",
        ".######",
        ".....##",
        ".....##",
        "....##.",
        "..###..",
        ".###...",
    ]),
    (MicrSymbol::Transit, [
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "##...##",
        "#######",
    ]),
    (MicrSymbol::Amount, [
        "#####..",
        "#####..",
        "#####..",
        "..#####",
        "..#####",
        "..#####",
        "#####..",
        "#####..",
        "#####..",
        "..#####",
        "..#####",
        "..#####",
    ]),
    (MicrSymbol::OnUs, [
        ".....##",
        ".....##",
        ".....##",
        ".....##",
        ".....##",
        ".....##",
        "###..##",
        "###..##",
        "###..##",
        "###..##",
        "###..##",
        "###..##",
    ]),
    (MicrSymbol::Dash, [
        ".......",
        ".......",
        ".......",
        ".......",
        "##..###",
        "##..###",
        "##..###",
        "##..###",
        ".......",
        ".......",
        ".......",
        ".......",
    ]),
];

/// CMC-7 glyphs: seven bars, six gaps, exactly two of them long. The fifteen
/// possible long-gap pairs cover the ten digits and five controls, listed in
/// lexicographic gap order.
#[rustfmt::skip]
const CMC7_LONG_GAPS: [(MicrSymbol, [usize; 2]); 15] = [
    (MicrSymbol::Zero,  [0, 1]),
    (MicrSymbol::One,   [0, 2]),
    (MicrSymbol::Two,   [0, 3]),
    (MicrSymbol::Three, [0, 4]),
    (MicrSymbol::Four,  [0, 5]),
    (MicrSymbol::Five,  [1, 2]),
    (MicrSymbol::Six,   [1, 3]),
    (MicrSymbol::Seven, [1, 4]),
    (MicrSymbol::Eight, [1, 5]),
    (MicrSymbol::Nine,  [2, 3]),
    (MicrSymbol::S1,    [2, 4]),
    (MicrSymbol::S2,    [2, 5]),
    (MicrSymbol::S3,    [3, 4]),
    (MicrSymbol::S4,    [3, 5]),
    (MicrSymbol::S5,    [4, 5]),
];

const CMC7_ROWS: usize = 12;
const CMC7_BARS: usize = 7;
const SHORT_GAP: usize = 1;
const LONG_GAP: usize = 2;

fn parse_grid(rows: &[&str]) -> (usize, usize, Vec<bool>) {
    let height = rows.len();
    let width = rows[0].len();
    debug_assert!(rows.iter().all(|r| r.len() == width));
    let cells = rows
        .iter()
        .flat_map(|row| row.bytes().map(|b| b == b'#'))
        .collect();
    (width, height, cells)
}

fn render_cmc7_grid(long_gaps: [usize; 2]) -> (usize, usize, Vec<bool>) {
    let width: usize = CMC7_BARS
        + (0..CMC7_BARS - 1)
            .map(|gap| {
                if long_gaps.contains(&gap) {
                    LONG_GAP
                } else {
                    SHORT_GAP
                }
            })
            .sum::<usize>();
    let mut cells = vec![false; width * CMC7_ROWS];
    let mut x = 0usize;
    for bar in 0..CMC7_BARS {
        for row in cells.chunks_exact_mut(width) {
            row[x] = true;
        }
        if bar < CMC7_BARS - 1 {
            // Gap i follows bar i.
            x += 1 + if long_gaps.contains(&bar) {
                LONG_GAP
            } else {
                SHORT_GAP
            };
        }
    }
    (width, CMC7_ROWS, cells)
}

fn trim(symbol: MicrSymbol, width: usize, height: usize, cells: Vec<bool>) -> Template {
    let ink_at = |x: usize, y: usize| cells[y * width + x];
    let min_x = (0..width)
        .find(|&x| (0..height).any(|y| ink_at(x, y)))
        .unwrap_or(0);
    let max_x = (0..width)
        .rfind(|&x| (0..height).any(|y| ink_at(x, y)))
        .unwrap_or(0);
    let min_y = (0..height)
        .find(|&y| (0..width).any(|x| ink_at(x, y)))
        .unwrap_or(0);
    let max_y = (0..height)
        .rfind(|&y| (0..width).any(|x| ink_at(x, y)))
        .unwrap_or(0);
    let (tw, th) = (max_x - min_x + 1, max_y - min_y + 1);
    let trimmed = (min_y..=max_y)
        .flat_map(|y| (min_x..=max_x).map(move |x| ink_at(x, y)))
        .collect();
    Template {
        symbol,
        width: tw,
        height: th,
        cells: trimmed,
    }
}

/// Full template set for both fonts. Digits appear twice (one shape per
/// font), mapping to the same symbol.
pub(crate) fn templates() -> Vec<Template> {
    let mut out = Vec::with_capacity(E13B_GLYPHS.len() + CMC7_LONG_GAPS.len());
    for (symbol, rows) in E13B_GLYPHS.iter() {
        let (w, h, cells) = parse_grid(rows);
        out.push(trim(*symbol, w, h, cells));
    }
    for (symbol, gaps) in CMC7_LONG_GAPS.iter() {
        let (w, h, cells) = render_cmc7_grid(*gaps);
        out.push(trim(*symbol, w, h, cells));
    }
    out
}

/// Renders the E-13B shape of `symbol` at `scale` pixels per cell, ink black
/// on white. Returns `None` for the CMC-7-only controls.
pub fn render_e13b(symbol: MicrSymbol, scale: u32) -> Option<GrayImage> {
    let rows = E13B_GLYPHS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, rows)| rows)?;
    let (w, h, cells) = parse_grid(rows);
    let tpl = trim(symbol, w, h, cells);
    Some(render_template(&tpl, scale))
}

/// Renders the CMC-7 shape of `symbol` at `scale` pixels per cell.
pub fn render_cmc7(symbol: MicrSymbol, scale: u32) -> Option<GrayImage> {
    let gaps = CMC7_LONG_GAPS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, gaps)| gaps)?;
    let (w, h, cells) = render_cmc7_grid(*gaps);
    let tpl = trim(symbol, w, h, cells);
    Some(render_template(&tpl, scale))
}

fn render_template(tpl: &Template, scale: u32) -> GrayImage {
    let mut image = GrayImage::from_pixel(
        tpl.width as u32 * scale,
        tpl.height as u32 * scale,
        Luma([255u8]),
    );
    for (x, y, px) in image.enumerate_pixels_mut() {
        if tpl.ink((x / scale) as usize, (y / scale) as usize) {
            *px = Luma([0u8]);
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_set_covers_both_fonts() {
        let set = templates();
        assert_eq!(set.len(), 29);
        for symbol in ALPHABET {
            assert!(set.iter().any(|t| t.symbol == symbol));
        }
    }

    #[test]
    fn e13b_digits_share_the_full_band_height() {
        for symbol in &ALPHABET[..10] {
            let image = render_e13b(*symbol, 1).unwrap();
            assert_eq!(image.height(), E13B_ROWS as u32);
        }
    }

    #[test]
    fn cmc7_long_gap_pairs_are_unique() {
        for (i, (_, a)) in CMC7_LONG_GAPS.iter().enumerate() {
            for (_, b) in CMC7_LONG_GAPS.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
