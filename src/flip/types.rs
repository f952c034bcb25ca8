//! Core types for rendered pages

/// Raw rendered page image.
///
/// Contains RGB pixel data (3 bytes per pixel) at the scale it was
/// rasterized with. This is what the render backend produces and what the
/// page cache owns.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    /// Raw RGB pixel data (3 bytes per pixel: R, G, B)
    pub pixels: Vec<u8>,
    /// Image width in pixels
    pub width_px: u32,
    /// Image height in pixels
    pub height_px: u32,
}

impl Bitmap {
    /// Bytes per pixel of [`Bitmap::pixels`]
    pub const CHANNELS: usize = 3;

    #[must_use]
    pub fn new(width_px: u32, height_px: u32, pixels: Vec<u8>) -> Self {
        Self {
            pixels,
            width_px,
            height_px,
        }
    }

    /// A bitmap filled with a single color
    #[must_use]
    pub fn filled(width_px: u32, height_px: u32, rgb: (u8, u8, u8)) -> Self {
        let count = width_px as usize * height_px as usize;
        let mut pixels = Vec::with_capacity(count * Self::CHANNELS);
        for _ in 0..count {
            pixels.extend_from_slice(&[rgb.0, rgb.1, rgb.2]);
        }
        Self::new(width_px, height_px, pixels)
    }

    /// Memory held by the pixel buffer
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    /// True when the pixel buffer matches the declared dimensions
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.pixels.len() == self.width_px as usize * self.height_px as usize * Self::CHANNELS
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Position of a 0-based page index inside its spread
#[must_use]
pub const fn spread_of(page_index: usize) -> usize {
    page_index / 2
}

/// Number of spreads needed to show `page_count` pages
#[must_use]
pub const fn spread_count(page_count: usize) -> usize {
    page_count.div_ceil(2)
}
