use std::io::Cursor;

use anyhow::{Context, Result};
use image::codecs::png::{self, CompressionType, PngEncoder};
use image::imageops::FilterType;

/// Turns a downloaded author photo into the bytes we store and serve.
pub trait PhotoTransform: Send + Sync {
    fn thumbnail(&self, photo: &[u8]) -> Result<Vec<u8>>;
}

/// Scales photos so that their longer side is `size` pixels and re-encodes them as PNG.
#[derive(Debug, Clone, Copy)]
pub struct PngThumbnailer {
    pub size: u32,
}

impl PngThumbnailer {
    pub fn new(size: u32) -> Self {
        Self { size }
    }
}

impl PhotoTransform for PngThumbnailer {
    fn thumbnail(&self, photo: &[u8]) -> Result<Vec<u8>> {
        let img = image::load_from_memory(photo).context("could not decode the photo")?;

        // the unconstrained side is derived from the aspect ratio.
        let (width, height) = if img.width() > img.height() {
            (self.size, u32::MAX)
        } else {
            (u32::MAX, self.size)
        };
        let resized = img.resize(width, height, FilterType::Lanczos3);

        let mut buf = Cursor::new(vec![]);
        let encoder = PngEncoder::new_with_quality(
            &mut buf,
            CompressionType::Best,
            png::FilterType::Adaptive,
        );
        resized
            .write_with_encoder(encoder)
            .context("could not encode the thumbnail")?;

        Ok(buf.into_inner())
    }
}
