//! SeetaFace detection backend.
//!
//! Wraps the `rustface` frontal-face detector behind the core
//! [`FaceDetector`] trait. The model file is supplied at runtime via
//! `--model`; a detector instance is built per call since detection requires
//! mutable access to the engine while the backend trait is shared.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use image::DynamicImage;

use cropflow_core::{FaceBox, FaceDetector, RawDetection};

/// SeetaFace reports unbounded scores; anything at or above this maps to
/// full confidence.
const SCORE_CEILING: f32 = 30.0;

pub struct SeetaDetector {
    model: rustface::Model,
}

impl SeetaDetector {
    /// Load the SeetaFace model from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read model file {}", path.display()))?;
        let model = rustface::read_model(std::io::Cursor::new(bytes)).map_err(|err| {
            anyhow::anyhow!("failed to load SeetaFace model from {}: {err}", path.display())
        })?;
        Ok(Self { model })
    }
}

impl FaceDetector for SeetaDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let gray = image.to_luma8();

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(20);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(
            &gray,
            gray.width(),
            gray.height(),
        ));

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                RawDetection {
                    bbox: FaceBox {
                        x: bbox.x() as f32,
                        y: bbox.y() as f32,
                        width: bbox.width() as f32,
                        height: bbox.height() as f32,
                    },
                    confidence: (face.score() as f32 / SCORE_CEILING).clamp(0.0, 1.0),
                }
            })
            .collect())
    }
}
