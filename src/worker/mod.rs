mod state;
#[cfg(test)]
mod tests;

pub use state::{WorkerOutcome, WorkerReport, WorkerState};

use crate::annotate::FrameAnnotator;
use crate::detect::{Detection, Detector};
use crate::error::{CamwatchError, DetectorError};
use crate::frame::Frame;
use crate::sink::FrameSink;
use crate::source::StreamSource;
use crate::throttle::RateLimitedInvoker;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Pipeline for a single camera: read, detect (rate limited), annotate, encode.
///
/// The worker owns every per-camera resource. Whatever ends the loop (stop
/// request, sink failure, detector panic) the source is released, the sink is
/// closed exactly once and the detector is released before `run` returns.
pub struct CameraWorker {
    camera: String,
    source: StreamSource,
    invoker: RateLimitedInvoker<Vec<Detection>>,
    detector: Option<Box<dyn Detector>>,
    annotator: FrameAnnotator,
    sink: Box<dyn FrameSink>,
    stop: CancellationToken,
    state: watch::Sender<WorkerState>,
    frames_written: u64,
}

impl CameraWorker {
    pub fn new(
        camera: impl Into<String>,
        source: StreamSource,
        detector: Box<dyn Detector>,
        annotator: FrameAnnotator,
        sink: Box<dyn FrameSink>,
        detection_interval: Duration,
        stop: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Connecting);
        Self {
            camera: camera.into(),
            source,
            invoker: RateLimitedInvoker::new(detection_interval),
            detector: Some(detector),
            annotator,
            sink,
            stop,
            state,
            frames_written: 0,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Follow state transitions from outside the worker task
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: WorkerState) {
        self.state.send_if_modified(|current| {
            if next > *current {
                debug!("State {} -> {}", current, next);
                *current = next;
                true
            } else {
                false
            }
        });
    }

    /// Run until stopped or a fatal error, then clean up
    pub async fn run(mut self) -> WorkerReport {
        let span = info_span!("camera", host = %self.camera);
        async move {
            info!("Worker started");

            let loop_result = AssertUnwindSafe(self.stream_loop()).catch_unwind().await;
            let mut failure = match loop_result {
                Ok(Ok(())) => None,
                Ok(Err(e)) => {
                    error!("Worker failed: {}", e);
                    Some(e.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("Worker panicked: {}", message);
                    Some(format!("panic: {}", message))
                }
            };

            self.set_state(WorkerState::Stopping);
            if let Err(e) = self.release_resources().await {
                error!("Cleanup failed: {}", e);
                failure.get_or_insert_with(|| e.to_string());
            }
            self.set_state(WorkerState::Stopped);

            info!(
                "Worker stopped after {} frames written, {} read ({} reconnects, {} detector runs)",
                self.frames_written,
                self.source.frames_read(),
                self.source.reconnects(),
                self.invoker.invocations()
            );

            WorkerReport {
                camera: self.camera.clone(),
                frames: self.frames_written,
                outcome: match failure {
                    None => WorkerOutcome::Clean,
                    Some(reason) => WorkerOutcome::Failed(reason),
                },
            }
        }
        .instrument(span)
        .await
    }

    async fn stream_loop(&mut self) -> Result<(), CamwatchError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    info!("Stop requested");
                    return Ok(());
                }
                frame = self.source.read() => frame,
            };

            let Some(mut frame) = next else {
                continue;
            };
            if self.state() == WorkerState::Connecting {
                info!("First frame received, streaming");
                self.set_state(WorkerState::Streaming);
            }

            let detections = self.detect(&frame).await?;
            let summary = self.annotator.annotate(&mut frame, &detections);
            trace!(
                "Frame {}: {} drawn, {} filtered, {} skipped",
                frame.id,
                summary.drawn,
                summary.filtered,
                summary.skipped
            );

            // A stalled encoder must not hide a stop request; close() kills it
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    warn!("Stop requested while frame {} was being written", frame.id);
                    return Ok(());
                }
                written = self.sink.write(&frame) => written?,
            }
            self.frames_written += 1;
        }
    }

    /// Latest detections for `frame`, running the detector on the blocking
    /// pool only when the rate gate is open. Detector errors become an empty
    /// result; a detector panic is returned as an error.
    async fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        let slot = &mut self.detector;
        let mut fatal = None;
        let fatal_slot = &mut fatal;

        let detections = self
            .invoker
            .call_async(move || async move {
                let Some(mut detector) = slot.take() else {
                    return Vec::new();
                };
                let input = frame.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    let result = detector.detect(&input);
                    (detector, result)
                })
                .await;

                match joined {
                    Ok((detector, result)) => {
                        *slot = Some(detector);
                        match result {
                            Ok(detections) => detections,
                            Err(e) => {
                                warn!("Detector error, no detections for this interval: {}", e);
                                Vec::new()
                            }
                        }
                    }
                    Err(e) => {
                        *fatal_slot = Some(DetectorError::Task {
                            details: e.to_string(),
                        });
                        Vec::new()
                    }
                }
            })
            .await
            .clone();

        match fatal {
            Some(e) => Err(e),
            None => Ok(detections),
        }
    }

    async fn release_resources(&mut self) -> Result<(), CamwatchError> {
        self.source.release().await;

        let closed = self.sink.close().await;

        if let Some(mut detector) = self.detector.take() {
            detector.release();
            debug!("Released detector {}", detector.name());
        }

        closed.map_err(CamwatchError::from)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
