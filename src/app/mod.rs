mod runtime;
mod types;

pub use types::ShutdownReason;

use crate::config::CamwatchConfig;
use crate::error::Result;
use crate::supervisor::WorkerSupervisor;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Top-level process: resolves cameras, runs the supervisor and turns
/// SIGINT/SIGTERM into a graceful stop of every worker
pub struct CamwatchApp {
    config: CamwatchConfig,
    supervisor: WorkerSupervisor,
    shutdown: CancellationToken,
}

impl CamwatchApp {
    /// Validate the configuration and every camera. Fails before anything is
    /// started.
    pub fn new(config: CamwatchConfig) -> Result<Self> {
        config.validate()?;
        let supervisor = WorkerSupervisor::new(config.resolve_cameras())?;

        for camera in supervisor.cameras() {
            info!(
                "Camera {} -> {} ({})",
                camera.host,
                camera.output_dir.display(),
                camera.redacted_url()
            );
        }

        Ok(Self {
            config,
            supervisor,
            shutdown: CancellationToken::new(),
        })
    }

    /// Cancelling this token stops every worker, like a signal would
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn camera_count(&self) -> usize {
        self.supervisor.cameras().len()
    }
}
