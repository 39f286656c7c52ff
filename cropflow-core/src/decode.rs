//! Image decoding seam.
//!
//! Decoding is behind a trait so the streaming loader and batch processor
//! can be exercised with synthetic decoders in tests. The filesystem
//! implementation rejects corrupt, oversized, and undersized files before
//! they enter the pipeline.

use std::path::Path;

use image::DynamicImage;

use crate::error::DecodeError;

/// Smallest accepted dimension on either axis.
pub const MIN_DIMENSION: u32 = 8;
/// Largest accepted dimension on either axis.
pub const MAX_DIMENSION: u32 = 10_000;

/// Decodes an image file into pixels, or rejects it.
pub trait ImageDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError>;
}

/// Filesystem decoder with dimension guards.
pub struct FsDecoder {
    pub min_dimension: u32,
    pub max_dimension: u32,
}

impl Default for FsDecoder {
    fn default() -> Self {
        Self {
            min_dimension: MIN_DIMENSION,
            max_dimension: MAX_DIMENSION,
        }
    }
}

impl ImageDecoder for FsDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let image = image::open(path).map_err(|err| match err {
            image::ImageError::IoError(source) => DecodeError::Io {
                name: name.clone(),
                source,
            },
            source => DecodeError::Corrupt {
                name: name.clone(),
                source,
            },
        })?;

        let (width, height) = (image.width(), image.height());
        if width > self.max_dimension || height > self.max_dimension {
            return Err(DecodeError::Oversized {
                name,
                width,
                height,
                max: self.max_dimension,
            });
        }
        if width < self.min_dimension || height < self.min_dimension {
            return Err(DecodeError::Undersized {
                name,
                width,
                height,
                min: self.min_dimension,
            });
        }
        Ok(image)
    }
}
