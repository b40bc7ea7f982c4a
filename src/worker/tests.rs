use super::*;
use crate::config::AnnotationConfig;
use crate::detect::Region;
use crate::error::{SinkError, SourceError};
use crate::frame::Resolution;
use crate::source::{VideoConnection, VideoTransport};
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const FRAME_INTERVAL: Duration = Duration::from_millis(10);

/// Camera that delivers a frame every 10ms, or refuses every connection
struct MockCamera {
    available: bool,
}

struct MockConnection;

#[async_trait]
impl VideoTransport for MockCamera {
    fn describe(&self) -> String {
        "mock://camera".to_string()
    }

    async fn open(&self) -> Result<Box<dyn VideoConnection>, SourceError> {
        if self.available {
            Ok(Box::new(MockConnection))
        } else {
            Err(SourceError::Open {
                url: self.describe(),
                details: "host unreachable".to_string(),
            })
        }
    }
}

#[async_trait]
impl VideoConnection for MockConnection {
    async fn read_frame(&mut self) -> Result<RgbImage, SourceError> {
        tokio::time::sleep(FRAME_INTERVAL).await;
        Ok(RgbImage::from_pixel(64, 48, Rgb([40, 40, 40])))
    }

    async fn release(&mut self) {}
}

#[derive(Clone, Default)]
struct SinkCounters {
    writes: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

struct MockSink {
    counters: SinkCounters,
    fail_on_write: Option<usize>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn write(&mut self, _frame: &Frame) -> Result<(), SinkError> {
        let n = self.counters.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if Some(n) == self.fail_on_write {
            return Err(SinkError::EncoderExited {
                details: "broken pipe".to_string(),
            });
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum DetectorBehavior {
    Person,
    Error,
    Panic,
}

struct MockDetector {
    behavior: DetectorBehavior,
    calls: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl Detector for MockDetector {
    fn name(&self) -> &str {
        "mock"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            DetectorBehavior::Person => Ok(vec![Detection::new(
                Region::new(4.0, 4.0, 20.0, 20.0),
                "person",
                0.9,
            )]),
            DetectorBehavior::Error => Err(DetectorError::FrameProcessing {
                details: "model not ready".to_string(),
            }),
            DetectorBehavior::Panic => panic!("detector blew up"),
        }
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    worker: CameraWorker,
    sink: SinkCounters,
    detector_calls: Arc<AtomicUsize>,
    detector_releases: Arc<AtomicUsize>,
    stop: CancellationToken,
}

async fn harness(
    available: bool,
    behavior: DetectorBehavior,
    fail_on_write: Option<usize>,
) -> Harness {
    let source = StreamSource::connect(
        Box::new(MockCamera { available }),
        Resolution::new(64, 48),
        Duration::from_secs(1),
    )
    .await;

    let sink = SinkCounters::default();
    let detector_calls = Arc::new(AtomicUsize::new(0));
    let detector_releases = Arc::new(AtomicUsize::new(0));
    let stop = CancellationToken::new();

    let worker = CameraWorker::new(
        "10.0.0.5",
        source,
        Box::new(MockDetector {
            behavior,
            calls: Arc::clone(&detector_calls),
            releases: Arc::clone(&detector_releases),
        }),
        FrameAnnotator::new(&AnnotationConfig::default()),
        Box::new(MockSink {
            counters: sink.clone(),
            fail_on_write,
        }),
        Duration::from_millis(100),
        stop.clone(),
    );

    Harness {
        worker,
        sink,
        detector_calls,
        detector_releases,
        stop,
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_request_closes_sink_once() {
    let h = harness(true, DetectorBehavior::Person, None).await;
    let mut states = h.worker.subscribe();
    assert_eq!(*states.borrow(), WorkerState::Connecting);

    let task = tokio::spawn(h.worker.run());
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(*states.borrow_and_update(), WorkerState::Streaming);

    h.stop.cancel();
    let report = task.await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.camera, "10.0.0.5");
    assert!(report.frames > 0);
    assert_eq!(report.frames as usize, h.sink.writes.load(Ordering::SeqCst));
    assert_eq!(h.sink.closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.detector_releases.load(Ordering::SeqCst), 1);
    assert_eq!(*states.borrow(), WorkerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_detection_is_rate_limited_but_every_frame_is_written() {
    let h = harness(true, DetectorBehavior::Person, None).await;

    let task = tokio::spawn(h.worker.run());
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.stop.cancel();
    let report = task.await.unwrap();

    let calls = h.detector_calls.load(Ordering::SeqCst);
    assert!(calls >= 1);
    // 100ms gate over ~1s of 10ms frames
    assert!(calls <= 11, "detector ran {} times", calls);
    assert!(report.frames as usize > calls * 5);
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_is_fatal_and_still_closes() {
    let h = harness(true, DetectorBehavior::Person, Some(3)).await;

    let report = h.worker.run().await;

    assert!(matches!(report.outcome, WorkerOutcome::Failed(_)));
    assert_eq!(report.frames, 2);
    assert_eq!(h.sink.closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.detector_releases.load(Ordering::SeqCst), 1);
    assert!(!h.stop.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_source_stops_cleanly() {
    let h = harness(false, DetectorBehavior::Person, None).await;
    let states = h.worker.subscribe();

    let task = tokio::spawn(h.worker.run());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*states.borrow(), WorkerState::Connecting);

    h.stop.cancel();
    let report = task.await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.frames, 0);
    assert_eq!(h.sink.writes.load(Ordering::SeqCst), 0);
    assert_eq!(h.sink.closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.detector_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_detector_error_keeps_streaming() {
    let h = harness(true, DetectorBehavior::Error, None).await;

    let task = tokio::spawn(h.worker.run());
    tokio::time::sleep(Duration::from_millis(300)).await;
    h.stop.cancel();
    let report = task.await.unwrap();

    assert!(report.is_clean());
    assert!(report.frames > 10);
    assert!(h.detector_calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(h.sink.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_detector_panic_is_fatal_and_still_closes() {
    let h = harness(true, DetectorBehavior::Panic, None).await;

    let report = h.worker.run().await;

    assert!(matches!(report.outcome, WorkerOutcome::Failed(_)));
    assert_eq!(report.frames, 0);
    assert_eq!(h.sink.closes.load(Ordering::SeqCst), 1);
}

/// Encoder that stopped draining its input: writes never complete
struct StalledSink {
    counters: SinkCounters,
}

#[async_trait]
impl FrameSink for StalledSink {
    async fn write(&mut self, _frame: &Frame) -> Result<(), SinkError> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_observed_while_write_is_stalled() {
    let source = StreamSource::connect(
        Box::new(MockCamera { available: true }),
        Resolution::new(64, 48),
        Duration::from_secs(1),
    )
    .await;
    let counters = SinkCounters::default();
    let stop = CancellationToken::new();

    let worker = CameraWorker::new(
        "10.0.0.5",
        source,
        Box::new(MockDetector {
            behavior: DetectorBehavior::Person,
            calls: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        }),
        FrameAnnotator::new(&AnnotationConfig::default()),
        Box::new(StalledSink {
            counters: counters.clone(),
        }),
        Duration::from_millis(100),
        stop.clone(),
    );
    let states = worker.subscribe();

    let task = tokio::spawn(worker.run());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(counters.writes.load(Ordering::SeqCst), 1);

    stop.cancel();
    let report = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("worker did not stop while its sink was stalled")
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.frames, 0);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    assert_eq!(*states.borrow(), WorkerState::Stopped);
}
