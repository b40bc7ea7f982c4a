use crate::annotate::FrameAnnotator;
use crate::config::{CameraConfig, CamwatchConfig};
use crate::detect::MotionDetector;
use crate::error::{CamwatchError, ConfigError};
use crate::sink::StreamSink;
use crate::source::{FfmpegTransport, StreamSource};
use crate::worker::{CameraWorker, WorkerReport};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Builds the worker for one camera
#[async_trait]
pub trait WorkerFactory: Send + Sync + 'static {
    async fn build(
        &self,
        camera: &CameraConfig,
        stop: CancellationToken,
    ) -> Result<CameraWorker, CamwatchError>;
}

/// Production wiring: ffmpeg decoder, motion detector, ffmpeg HLS encoder
pub struct FfmpegWorkerFactory {
    config: CamwatchConfig,
}

impl FfmpegWorkerFactory {
    pub fn new(config: CamwatchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WorkerFactory for FfmpegWorkerFactory {
    async fn build(
        &self,
        camera: &CameraConfig,
        stop: CancellationToken,
    ) -> Result<CameraWorker, CamwatchError> {
        let resolution = self.config.resolution();

        let sink = StreamSink::open(
            &camera.output_dir,
            resolution,
            self.config.pipeline.fps,
            &self.config.output,
        )
        .await?;
        info!("Publishing {} to {}", camera.host, sink.playlist_path().display());

        let transport = FfmpegTransport::new(
            self.config.pipeline.decoder.clone(),
            camera.source_url(),
            camera.redacted_url(),
            resolution,
            self.config.read_timeout(),
        );
        let source = StreamSource::connect(
            Box::new(transport),
            resolution,
            self.config.reconnect_backoff(),
        )
        .await;

        Ok(CameraWorker::new(
            camera.host.clone(),
            source,
            Box::new(MotionDetector::new(self.config.detector.clone())),
            FrameAnnotator::new(&self.config.annotation),
            Box::new(sink),
            self.config.detection_interval(),
            stop,
        ))
    }
}

/// Outcome of a whole supervised run, one report per camera in launch order
#[derive(Debug, Clone)]
pub struct SupervisorReport {
    pub workers: Vec<WorkerReport>,
}

impl SupervisorReport {
    pub fn all_clean(&self) -> bool {
        self.workers.iter().all(WorkerReport::is_clean)
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_clean() {
            0
        } else {
            1
        }
    }
}

/// Launches one independent worker per camera and waits for all of them
pub struct WorkerSupervisor {
    cameras: Vec<CameraConfig>,
}

impl WorkerSupervisor {
    /// Deduplicate by host and validate every camera. Nothing is launched if
    /// any camera is invalid.
    pub fn new(configs: Vec<CameraConfig>) -> Result<Self, ConfigError> {
        let cameras = dedup_by_host(configs);
        if cameras.is_empty() {
            return Err(ConfigError::NoCameras);
        }
        for camera in &cameras {
            camera.validate()?;
        }
        Ok(Self { cameras })
    }

    pub fn cameras(&self) -> &[CameraConfig] {
        &self.cameras
    }

    /// Run every worker to completion. Cancelling `shutdown` stops them all;
    /// a failing worker never stops its siblings.
    pub async fn run<F: WorkerFactory>(
        self,
        factory: Arc<F>,
        shutdown: CancellationToken,
    ) -> SupervisorReport {
        info!("Launching {} camera workers", self.cameras.len());

        let hosts: Vec<String> = self.cameras.iter().map(|c| c.host.clone()).collect();
        let mut tasks = JoinSet::new();
        for (index, camera) in self.cameras.into_iter().enumerate() {
            let factory = Arc::clone(&factory);
            let stop = shutdown.child_token();

            tasks.spawn(async move {
                let host = camera.host.clone();
                let supervised = async move {
                    match factory.build(&camera, stop).await {
                        Ok(worker) => worker.run().await,
                        Err(e) => {
                            error!("Failed to start worker for {}: {}", camera.host, e);
                            WorkerReport::failed(camera.host.clone(), e.to_string())
                        }
                    }
                };

                let report = match AssertUnwindSafe(supervised).catch_unwind().await {
                    Ok(report) => report,
                    Err(_) => {
                        error!("Worker for {} panicked outside its loop", host);
                        WorkerReport::failed(host, "worker panicked")
                    }
                };
                (index, report)
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => {
                    if report.is_clean() {
                        info!("Worker {} stopped cleanly", report.camera);
                    } else {
                        warn!("Worker {} ended with {:?}", report.camera, report.outcome);
                    }
                    reports.push((index, report));
                }
                Err(e) => error!("Worker task failed to join: {}", e),
            }
        }

        SupervisorReport {
            workers: collect_reports(&hosts, reports),
        }
    }
}

/// Order reports by launch index. A camera whose task never reported (it
/// was aborted or failed to join) gets a failed report of its own.
fn collect_reports(
    hosts: &[String],
    mut joined: Vec<(usize, WorkerReport)>,
) -> Vec<WorkerReport> {
    joined.sort_by_key(|(index, _)| *index);
    let mut joined = joined.into_iter().peekable();

    hosts
        .iter()
        .enumerate()
        .map(|(index, host)| match joined.next_if(|(i, _)| *i == index) {
            Some((_, report)) => report,
            None => {
                warn!("No report from worker {}, counting it as failed", host);
                WorkerReport::failed(host.clone(), "worker task failed to join")
            }
        })
        .collect()
}

/// Keep the first config for each host, preserving order. Later duplicates
/// are dropped; differing fields are logged.
pub fn dedup_by_host(configs: Vec<CameraConfig>) -> Vec<CameraConfig> {
    let mut seen = HashSet::new();
    let mut kept: Vec<CameraConfig> = Vec::with_capacity(configs.len());

    for config in configs {
        if seen.insert(config.identity().to_string()) {
            kept.push(config);
            continue;
        }

        if let Some(first) = kept.iter().find(|c| c.identity() == config.identity()) {
            if first != &config {
                warn!(
                    "Camera {} listed twice with different settings; keeping the first",
                    config.host
                );
            } else {
                info!("Ignoring duplicate camera {}", config.host);
            }
        }
    }

    kept
}
