use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::error::{MicrError, MicrResult};

/// Pixel layouts accepted by [`ImageBuffer`].
///
/// Packed formats carry `bytes_per_pixel` bytes per sample; planar YUV formats
/// are addressed through their luma plane only, which is all the pipeline
/// needs (MICR ink carries no chroma information worth keeping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb24,
    Bgr24,
    Rgba32,
    Nv12,
    Yuv420p,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 | Self::Nv12 | Self::Yuv420p => 1,
            Self::Rgb24 | Self::Bgr24 => 3,
            Self::Rgba32 => 4,
        }
    }
}

/// A decoded raster handed to the engine. Owns its pixels; codec work
/// (JPEG/PNG/BMP) happens outside the pipeline.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl ImageBuffer {
    pub fn from_owned(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> MicrResult<Self> {
        if width == 0 || height == 0 {
            return Err(MicrError::invalid_image(format!(
                "zero dimension: {width}x{height}"
            )));
        }
        if stride < width as usize * format.bytes_per_pixel() {
            return Err(MicrError::invalid_image(format!(
                "stride {stride} shorter than row of {width} {format:?} pixels"
            )));
        }
        let required = stride
            .checked_mul(height as usize)
            .ok_or_else(|| MicrError::invalid_image("plane length overflowed".to_string()))?;
        if data.len() < required {
            return Err(MicrError::invalid_image(format!(
                "insufficient pixel bytes: got {} expected at least {required}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
        })
    }

    /// Tightly packed grayscale buffer.
    pub fn from_gray8(width: u32, height: u32, data: Vec<u8>) -> MicrResult<Self> {
        Self::from_owned(width, height, width as usize, PixelFormat::Gray8, data)
    }

    pub fn from_dynamic(image: &DynamicImage) -> MicrResult<Self> {
        let rgb = image.to_rgb8();
        let (width, height) = (rgb.width(), rgb.height());
        Self::from_owned(
            width,
            height,
            width as usize * 3,
            PixelFormat::Rgb24,
            rgb.into_raw(),
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Normalizes the buffer to the 8-bit luma image the pipeline runs on.
    pub fn to_gray(&self) -> GrayImage {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut luma = Vec::with_capacity(w * h);
        for y in 0..h {
            let row = &self.data[y * self.stride..];
            match self.format {
                PixelFormat::Gray8 | PixelFormat::Nv12 | PixelFormat::Yuv420p => {
                    luma.extend_from_slice(&row[..w]);
                }
                PixelFormat::Rgb24 => {
                    for px in row[..w * 3].chunks_exact(3) {
                        luma.push(luma_of(px[0], px[1], px[2]));
                    }
                }
                PixelFormat::Bgr24 => {
                    for px in row[..w * 3].chunks_exact(3) {
                        luma.push(luma_of(px[2], px[1], px[0]));
                    }
                }
                PixelFormat::Rgba32 => {
                    for px in row[..w * 4].chunks_exact(4) {
                        luma.push(luma_of(px[0], px[1], px[2]));
                    }
                }
            }
        }
        GrayImage::from_raw(self.width, self.height, luma)
            .expect("luma plane sized from validated dimensions")
    }
}

fn luma_of(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8
}

/// Axis-aligned rectangle, always fully contained in its source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    #[serde(rename = "w")]
    pub width: u32,
    #[serde(rename = "h")]
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    // Saturating: ROI casts can produce coordinates near u32::MAX, and those
    // must clamp away instead of overflowing.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right > x && bottom > y {
            Some(Region::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Region) -> Region {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Region::new(x, y, right - x, bottom - y)
    }

    /// Same rectangle expressed in the coordinates of `outer`.
    pub fn offset_by(&self, outer: &Region) -> Region {
        Region::new(self.x + outer.x, self.y + outer.y, self.width, self.height)
    }
}
