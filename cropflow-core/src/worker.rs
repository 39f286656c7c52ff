//! Background detection worker.
//!
//! A single dedicated thread services detection requests over an explicit
//! request/response protocol: every request carries a unique correlation id
//! and the shared pixel handle plus options; responses are matched against an
//! outstanding-request table. A timed-out id is removed from the table, so a
//! late response for it is discarded instead of being mis-delivered to a
//! newer request.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        mpsc::{Receiver, RecvTimeoutError, Sender, channel},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use image::DynamicImage;
use log::debug;
use thiserror::Error;

use crate::detect::{DetectOptions, FaceDetector, RawDetection, detect_with_options};
use crate::error::RequestTimeout;

/// One detection request sent to the worker.
struct DetectRequest {
    correlation_id: u64,
    image: Arc<DynamicImage>,
    options: DetectOptions,
}

/// The worker's answer to a request.
struct DetectResponse {
    correlation_id: u64,
    result: Result<Vec<RawDetection>, String>,
}

/// Failure modes of one offloaded attempt.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("detection worker disconnected")]
    Disconnected,
    #[error(transparent)]
    Timeout(#[from] RequestTimeout),
    #[error("{0}")]
    Backend(String),
}

/// Client handle to the background worker. Owned by the dispatcher; dropping
/// it shuts the worker down.
pub struct WorkerHandle {
    tx: Option<Sender<DetectRequest>>,
    rx: Receiver<DetectResponse>,
    next_correlation: u64,
    outstanding: HashMap<u64, Instant>,
    worker: Option<JoinHandle<()>>,
}

/// Spawn the detection worker around a backend.
pub fn spawn_worker(detector: Box<dyn FaceDetector>) -> WorkerHandle {
    let (req_tx, req_rx) = channel::<DetectRequest>();
    let (resp_tx, resp_rx) = channel::<DetectResponse>();

    let worker = std::thread::Builder::new()
        .name("cropflow-detect".to_string())
        .spawn(move || {
            while let Ok(request) = req_rx.recv() {
                let result = detect_with_options(
                    detector.as_ref(),
                    request.image.as_ref(),
                    &request.options,
                )
                .map_err(|err| format!("{err:#}"));
                let response = DetectResponse {
                    correlation_id: request.correlation_id,
                    result,
                };
                if resp_tx.send(response).is_err() {
                    // Client side is gone; stop servicing.
                    break;
                }
            }
        })
        .expect("spawn detection worker thread");

    WorkerHandle {
        tx: Some(req_tx),
        rx: resp_rx,
        next_correlation: 1,
        outstanding: HashMap::new(),
        worker: Some(worker),
    }
}

impl WorkerHandle {
    /// Send one request and await its matching response or the timeout.
    ///
    /// At most one request is in flight per dispatcher, but the outstanding
    /// table is keyed by id regardless so duplicate and late responses are
    /// handled deterministically.
    pub fn request(
        &mut self,
        image: Arc<DynamicImage>,
        options: DetectOptions,
        timeout: Duration,
    ) -> Result<Vec<RawDetection>, WorkerError> {
        let correlation_id = self.next_correlation;
        self.next_correlation += 1;

        let tx = self.tx.as_ref().ok_or(WorkerError::Disconnected)?;
        self.outstanding.insert(correlation_id, Instant::now());
        if tx
            .send(DetectRequest {
                correlation_id,
                image,
                options,
            })
            .is_err()
        {
            self.outstanding.remove(&correlation_id);
            return Err(WorkerError::Disconnected);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.outstanding.remove(&correlation_id);
                return Err(RequestTimeout {
                    correlation_id,
                    timeout,
                }
                .into());
            }

            match self.rx.recv_timeout(remaining) {
                Ok(response) if response.correlation_id == correlation_id => {
                    self.outstanding.remove(&correlation_id);
                    return response.result.map_err(WorkerError::Backend);
                }
                Ok(stale) => {
                    // A response whose id is no longer outstanding belongs to
                    // a request that already timed out.
                    debug!(
                        "discarding late detection response for request {}",
                        stale.correlation_id
                    );
                    self.outstanding.remove(&stale.correlation_id);
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.outstanding.remove(&correlation_id);
                    return Err(RequestTimeout {
                        correlation_id,
                        timeout,
                    }
                    .into());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.outstanding.remove(&correlation_id);
                    return Err(WorkerError::Disconnected);
                }
            }
        }
    }

    /// Number of requests awaiting a response.
    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FaceBox;
    use image::RgbaImage;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_image() -> Arc<DynamicImage> {
        Arc::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            64,
            64,
            image::Rgba([128, 128, 128, 255]),
        )))
    }

    /// Sleeps on the first call, answers instantly afterwards.
    struct SlowFirstDetector {
        calls: AtomicU32,
        first_delay: Duration,
    }

    impl FaceDetector for SlowFirstDetector {
        fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<RawDetection>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(self.first_delay);
            }
            Ok(vec![RawDetection {
                bbox: FaceBox {
                    x: 8.0,
                    y: 8.0,
                    width: 16.0,
                    height: 16.0,
                },
                confidence: 0.8,
            }])
        }
    }

    #[test]
    fn round_trip_through_the_worker() {
        struct OneBox;
        impl FaceDetector for OneBox {
            fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<RawDetection>> {
                Ok(vec![RawDetection {
                    bbox: FaceBox {
                        x: 1.0,
                        y: 2.0,
                        width: 3.0,
                        height: 4.0,
                    },
                    confidence: 0.9,
                }])
            }
        }

        let mut handle = spawn_worker(Box::new(OneBox));
        let detections = handle
            .request(
                test_image(),
                DetectOptions::default(),
                Duration::from_secs(5),
            )
            .expect("worker responds");
        assert_eq!(detections.len(), 1);
        assert_eq!(handle.outstanding_len(), 0);
    }

    #[test]
    fn timeout_counts_as_failure_and_late_response_is_discarded() {
        let mut handle = spawn_worker(Box::new(SlowFirstDetector {
            calls: AtomicU32::new(0),
            first_delay: Duration::from_millis(200),
        }));

        // First request times out while the worker is still busy.
        let err = handle
            .request(
                test_image(),
                DetectOptions::default(),
                Duration::from_millis(40),
            )
            .expect_err("first request should time out");
        assert!(matches!(err, WorkerError::Timeout(_)));
        assert_eq!(handle.outstanding_len(), 0);

        // The second request must receive its own response, not the late one
        // for request 1.
        let detections = handle
            .request(
                test_image(),
                DetectOptions::default(),
                Duration::from_secs(5),
            )
            .expect("second request succeeds");
        assert_eq!(detections.len(), 1);
        assert_eq!(handle.outstanding_len(), 0);
    }

    #[test]
    fn backend_errors_propagate_as_backend_failures() {
        struct Broken;
        impl FaceDetector for Broken {
            fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<RawDetection>> {
                anyhow::bail!("model not loaded")
            }
        }

        let mut handle = spawn_worker(Box::new(Broken));
        let err = handle
            .request(
                test_image(),
                DetectOptions::default(),
                Duration::from_secs(5),
            )
            .expect_err("backend failure surfaces");
        match err {
            WorkerError::Backend(message) => assert!(message.contains("model not loaded")),
            other => panic!("expected Backend, got {other:?}"),
        }
    }
}
