// Not every test binary uses every helper.
#![allow(dead_code)]

use image::{GrayImage, Luma};
use microcr::alphabet::{render_e13b, MicrSymbol};
use microcr::ImageBuffer;

pub const SCALE: u32 = 4;

/// A glyph placed on a synthetic band: the symbol and the gap (in template
/// cells) to the next glyph. Gap 0 makes the pair touch.
pub type BandEntry = (MicrSymbol, u32);

/// Renders an E-13B line onto a white canvas, returning the canvas and each
/// glyph's (x, width) in pixels.
pub fn compose_band(
    entries: &[BandEntry],
    canvas: (u32, u32),
    origin: (u32, u32),
) -> (GrayImage, Vec<(u32, u32)>) {
    let (width, height) = canvas;
    let mut image = GrayImage::from_pixel(width, height, Luma([255u8]));
    let mut positions = Vec::with_capacity(entries.len());
    let (mut x, y) = origin;
    for (symbol, gap_cells) in entries {
        let glyph = render_e13b(*symbol, SCALE).expect("test symbols have E-13B shapes");
        blit(&mut image, &glyph, x, y);
        positions.push((x, glyph.width()));
        x += glyph.width() + gap_cells * SCALE;
    }
    (image, positions)
}

pub fn blit(canvas: &mut GrayImage, glyph: &GrayImage, x: u32, y: u32) {
    for (gx, gy, px) in glyph.enumerate_pixels() {
        if px[0] < 128 {
            canvas.put_pixel(x + gx, y + gy, *px);
        }
    }
}

/// Knocks out every other template cell of a rendered glyph, leaving a
/// low-confidence checkerboard the classifier cannot resolve.
pub fn degrade_checkerboard(canvas: &mut GrayImage, x: u32, y: u32, w: u32, h: u32) {
    for py in y..y + h {
        for px in x..x + w {
            let (cx, cy) = ((px - x) / SCALE, (py - y) / SCALE);
            if (cx + cy) % 2 == 0 {
                canvas.put_pixel(px, py, Luma([255u8]));
            }
        }
    }
}

pub fn to_buffer(gray: &GrayImage) -> ImageBuffer {
    ImageBuffer::from_gray8(gray.width(), gray.height(), gray.as_raw().clone())
        .expect("tightly packed gray canvas")
}
