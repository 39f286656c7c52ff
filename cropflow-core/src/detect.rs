//! Face detection dispatch.
//!
//! The dispatcher turns an image into a list of [`FaceRecord`]s through an
//! opaque [`FaceDetector`] capability, either invoked in-process or offloaded
//! to the single background worker (see [`crate::worker`]). It owns the
//! retry/backoff/timeout policy: at most one request is in flight, each
//! attempt may time out, and the delay before attempt k+1 is k times the base
//! delay. Returned boxes are clamped into the image bounds and scored for
//! sharpness before being reported.

use std::{sync::Arc, thread, time::Duration};

use image::{DynamicImage, GenericImageView, imageops::FilterType};
use log::{debug, warn};

use crate::error::DetectError;
use crate::geometry::FaceBox;
use crate::records::FaceRecord;
use crate::worker::{WorkerError, WorkerHandle};
use cropflow_utils::quality::estimate_sharpness;

/// A raw detection as produced by a backend: box plus confidence, in the
/// pixel space of the image handed to the backend.
#[derive(Debug, Clone, Copy)]
pub struct RawDetection {
    pub bbox: FaceBox,
    pub confidence: f32,
}

/// Opaque face-detection capability.
pub trait FaceDetector: Send {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<RawDetection>>;
}

/// Options forwarded with every detection request.
#[derive(Debug, Clone, Default)]
pub struct DetectOptions {
    /// Downscale the image so its longest side is at most this many pixels
    /// before detection; boxes are rescaled by the inverse factor afterwards.
    pub reduced_resolution: Option<u32>,
}

/// Retry policy for a detection request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure (0 = no retry).
    pub max_retries: u32,
    /// Delay before attempt k+1 is `k * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Per-request lifecycle, tracked for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Attempting,
    Retrying,
    Succeeded,
    Failed,
}

/// Where attempts execute.
pub enum DetectionExecutor {
    InProcess(Box<dyn FaceDetector>),
    Worker(WorkerHandle),
}

/// Owns detection execution, retries, and the running face count.
pub struct DetectionDispatcher {
    executor: DetectionExecutor,
    retry: RetryPolicy,
    timeout: Duration,
    faces_detected: u64,
    last_states: Vec<RequestState>,
}

impl DetectionDispatcher {
    /// Dispatcher running the detector on the control thread.
    pub fn in_process(detector: Box<dyn FaceDetector>, retry: RetryPolicy) -> Self {
        Self {
            executor: DetectionExecutor::InProcess(detector),
            retry,
            timeout: Duration::from_secs(30),
            faces_detected: 0,
            last_states: vec![RequestState::Idle],
        }
    }

    /// Dispatcher offloading to the background worker.
    pub fn with_worker(handle: WorkerHandle, retry: RetryPolicy) -> Self {
        Self {
            executor: DetectionExecutor::Worker(handle),
            retry,
            timeout: Duration::from_secs(30),
            faces_detected: 0,
            last_states: vec![RequestState::Idle],
        }
    }

    /// Per-attempt timeout for offloaded requests.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Running total of faces detected, for statistics.
    pub fn faces_detected(&self) -> u64 {
        self.faces_detected
    }

    /// State transitions of the most recent request.
    pub fn last_request_states(&self) -> &[RequestState] {
        &self.last_states
    }

    /// Detect faces, retrying per the configured policy.
    ///
    /// Fails with [`DetectError::Exhausted`] once the retry budget is spent;
    /// a timed-out attempt counts against the budget like any other failure.
    pub fn detect_faces(
        &mut self,
        image: &Arc<DynamicImage>,
        options: &DetectOptions,
    ) -> Result<Vec<FaceRecord>, DetectError> {
        self.last_states.clear();
        self.last_states.push(RequestState::Idle);

        let mut attempts = 0u32;
        loop {
            self.last_states.push(RequestState::Attempting);
            attempts += 1;

            match self.attempt(image, options) {
                Ok(raw) => {
                    self.last_states.push(RequestState::Succeeded);
                    let faces = self.finalize(image, raw);
                    self.faces_detected += faces.len() as u64;
                    return Ok(faces);
                }
                Err(WorkerError::Disconnected) => {
                    self.last_states.push(RequestState::Failed);
                    return Err(DetectError::Unavailable(
                        "detection worker disconnected".to_string(),
                    ));
                }
                Err(err) => {
                    if attempts > self.retry.max_retries {
                        self.last_states.push(RequestState::Failed);
                        return Err(DetectError::Exhausted {
                            attempts,
                            last_error: err.to_string(),
                        });
                    }
                    let delay = self.retry.base_delay * attempts;
                    warn!(
                        "detection attempt {attempts} failed ({err}); retrying in {delay:?}"
                    );
                    self.last_states.push(RequestState::Retrying);
                    thread::sleep(delay);
                }
            }
        }
    }

    fn attempt(
        &mut self,
        image: &Arc<DynamicImage>,
        options: &DetectOptions,
    ) -> Result<Vec<RawDetection>, WorkerError> {
        match &mut self.executor {
            DetectionExecutor::InProcess(detector) => {
                detect_with_options(detector.as_ref(), image, options)
                    .map_err(|err| WorkerError::Backend(format!("{err:#}")))
            }
            DetectionExecutor::Worker(handle) => {
                handle.request(image.clone(), options.clone(), self.timeout)
            }
        }
    }

    /// Clamp boxes into the image, score sharpness, assign ids.
    fn finalize(&self, image: &DynamicImage, raw: Vec<RawDetection>) -> Vec<FaceRecord> {
        let (img_w, img_h) = image.dimensions();
        raw.into_iter()
            .enumerate()
            .map(|(idx, detection)| {
                let bbox = detection.bbox.clamped_to(img_w, img_h);
                let (quality_score, quality) = {
                    let x = (bbox.x.max(0.0) as u32).min(img_w.saturating_sub(1));
                    let y = (bbox.y.max(0.0) as u32).min(img_h.saturating_sub(1));
                    let w = (bbox.width.max(1.0) as u32).min(img_w - x).max(1);
                    let h = (bbox.height.max(1.0) as u32).min(img_h - y).max(1);
                    estimate_sharpness(&image.crop_imm(x, y, w, h))
                };
                FaceRecord {
                    id: idx as u32,
                    bbox,
                    confidence: detection.confidence.clamp(0.0, 1.0),
                    quality_score,
                    quality,
                    selected: true,
                }
            })
            .collect()
    }
}

/// Run a backend over an image, honoring the reduced-resolution option.
///
/// Shared by the in-process path and the worker thread: the image is
/// downscaled before detection when requested and the returned boxes are
/// rescaled back into the original pixel space.
pub fn detect_with_options(
    detector: &dyn FaceDetector,
    image: &DynamicImage,
    options: &DetectOptions,
) -> anyhow::Result<Vec<RawDetection>> {
    let (img_w, img_h) = image.dimensions();
    let longest = img_w.max(img_h);

    let Some(target) = options.reduced_resolution.filter(|t| *t > 0 && *t < longest) else {
        return detector.detect(image);
    };

    let factor = target as f32 / longest as f32;
    debug!("downscaling {img_w}x{img_h} by {factor:.3} for detection");
    let reduced = image.resize(target, target, FilterType::Triangle);
    let inverse = 1.0 / factor;

    let detections = detector.detect(&reduced)?;
    Ok(detections
        .into_iter()
        .map(|mut d| {
            d.bbox = FaceBox {
                x: d.bbox.x * inverse,
                y: d.bbox.y * inverse,
                width: d.bbox.width * inverse,
                height: d.bbox.height * inverse,
            };
            d
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn test_image() -> Arc<DynamicImage> {
        Arc::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            200,
            160,
            image::Rgba([90, 90, 90, 255]),
        )))
    }

    /// Fails a configurable number of times before succeeding.
    struct FlakyDetector {
        failures: AtomicU32,
        result: Vec<RawDetection>,
    }

    impl FaceDetector for FlakyDetector {
        fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<RawDetection>> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("backend hiccup");
            }
            Ok(self.result.clone())
        }
    }

    fn one_face() -> Vec<RawDetection> {
        vec![RawDetection {
            bbox: FaceBox {
                x: 40.0,
                y: 30.0,
                width: 60.0,
                height: 60.0,
            },
            confidence: 0.92,
        }]
    }

    #[test]
    fn retry_backoff_recovers_and_delays_linearly() {
        let detector = FlakyDetector {
            failures: AtomicU32::new(2),
            result: one_face(),
        };
        let base = Duration::from_millis(20);
        let mut dispatcher = DetectionDispatcher::in_process(
            Box::new(detector),
            RetryPolicy {
                max_retries: 2,
                base_delay: base,
            },
        );

        let started = Instant::now();
        let faces = dispatcher
            .detect_faces(&test_image(), &DetectOptions::default())
            .expect("third attempt succeeds");
        let elapsed = started.elapsed();

        assert_eq!(faces.len(), 1);
        // Delays: 1*base after attempt 1, 2*base after attempt 2.
        assert!(
            elapsed >= base * 3,
            "expected at least {:?} of backoff, saw {:?}",
            base * 3,
            elapsed
        );
        assert_eq!(
            dispatcher.last_request_states(),
            &[
                RequestState::Idle,
                RequestState::Attempting,
                RequestState::Retrying,
                RequestState::Attempting,
                RequestState::Retrying,
                RequestState::Attempting,
                RequestState::Succeeded,
            ]
        );
        assert_eq!(dispatcher.faces_detected(), 1);
    }

    #[test]
    fn exhausted_budget_reports_attempts() {
        let detector = FlakyDetector {
            failures: AtomicU32::new(10),
            result: Vec::new(),
        };
        let mut dispatcher = DetectionDispatcher::in_process(
            Box::new(detector),
            RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
            },
        );

        match dispatcher.detect_faces(&test_image(), &DetectOptions::default()) {
            Err(DetectError::Exhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(
            *dispatcher.last_request_states().last().unwrap(),
            RequestState::Failed
        );
    }

    #[test]
    fn boxes_are_clamped_and_faces_selected() {
        struct EdgeDetector;
        impl FaceDetector for EdgeDetector {
            fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<RawDetection>> {
                Ok(vec![RawDetection {
                    bbox: FaceBox {
                        x: -10.0,
                        y: 140.0,
                        width: 50.0,
                        height: 50.0,
                    },
                    confidence: 1.7,
                }])
            }
        }

        let mut dispatcher =
            DetectionDispatcher::in_process(Box::new(EdgeDetector), RetryPolicy::default());
        let faces = dispatcher
            .detect_faces(&test_image(), &DetectOptions::default())
            .expect("detect");

        let face = &faces[0];
        assert_eq!(face.bbox.x, 0.0);
        assert!(face.bbox.y + face.bbox.height <= 160.0);
        assert_eq!(face.confidence, 1.0);
        assert!(face.selected);
    }

    #[test]
    fn reduced_resolution_rescales_boxes() {
        /// Reports a box covering the whole image it is handed.
        struct FullFrameDetector;
        impl FaceDetector for FullFrameDetector {
            fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<RawDetection>> {
                Ok(vec![RawDetection {
                    bbox: FaceBox {
                        x: 0.0,
                        y: 0.0,
                        width: image.width() as f32,
                        height: image.height() as f32,
                    },
                    confidence: 0.5,
                }])
            }
        }

        let image = test_image();
        let detections = detect_with_options(
            &FullFrameDetector,
            &image,
            &DetectOptions {
                reduced_resolution: Some(100),
            },
        )
        .expect("detect");

        // The box comes back in original pixel space.
        let bbox = detections[0].bbox;
        assert!((bbox.width - 200.0).abs() < 1.0, "width was {}", bbox.width);
        assert!((bbox.height - 160.0).abs() < 1.0, "height was {}", bbox.height);
    }
}
