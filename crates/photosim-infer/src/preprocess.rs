//! Image decoding and resizing ahead of embedding.
//!
//! Images are squashed to a fixed square (224x224 by default), matching the
//! input size of the MobileNet-style models this crate targets.

use image::imageops::FilterType;
use image::DynamicImage;
use photosim_core::config::DEFAULT_IMAGE_SIZE;
use photosim_core::{Error, Result};

/// Decoded RGB8 pixels, row-major, 3 bytes per pixel.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl PreparedImage {
    /// Wrap raw RGB8 pixels, checking the buffer matches the dimensions.
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || rgb.len() != expected {
            return Err(Error::Embedding(format!(
                "pixel buffer of {} bytes does not match {}x{} RGB",
                rgb.len(),
                width,
                height
            )));
        }
        Ok(Self { width, height, rgb })
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Turns a photo location into pixels ready for an embedder.
pub trait ImagePreprocessor: Send + Sync {
    fn prepare(&self, location: &str) -> Result<PreparedImage>;
}

/// Decodes a file path with the `image` crate and resizes it to a square.
pub struct ResizePreprocessor {
    size: u32,
}

impl ResizePreprocessor {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    /// Resize an already-decoded image.
    pub fn prepare_image(&self, img: &DynamicImage) -> Result<PreparedImage> {
        let resized = img.resize_exact(self.size, self.size, FilterType::Triangle);
        let rgb = resized.to_rgb8();
        PreparedImage::new(rgb.width(), rgb.height(), rgb.into_raw())
    }

    /// Decode and resize image bytes. The format is sniffed from the content,
    /// not the file name.
    pub fn prepare_bytes(&self, bytes: &[u8]) -> Result<PreparedImage> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| Error::Embedding(format!("Failed to decode image: {}", e)))?;
        self.prepare_image(&img)
    }
}

impl Default for ResizePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_SIZE)
    }
}

impl ImagePreprocessor for ResizePreprocessor {
    fn prepare(&self, location: &str) -> Result<PreparedImage> {
        let bytes = std::fs::read(location)
            .map_err(|e| Error::Embedding(format!("Failed to read {}: {}", location, e)))?;
        self.prepare_bytes(&bytes)
    }
}
