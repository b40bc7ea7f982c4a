use super::{CamwatchApp, ShutdownReason};
use crate::error::{CamwatchError, Result};
use crate::supervisor::FfmpegWorkerFactory;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

impl CamwatchApp {
    /// Run every camera worker until a signal arrives or all workers end.
    /// Returns the process exit code.
    pub async fn run(self) -> Result<i32> {
        info!("Camwatch is running with {} cameras", self.camera_count());

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        setup_signal_handlers(shutdown_sender);

        let token = self.shutdown.clone();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                reason = shutdown_receiver => {
                    if let Ok(reason) = reason {
                        info!("Shutdown initiated: {}", reason);
                        token.cancel();
                    }
                }
                _ = token.cancelled() => {}
            }
        });

        let factory = Arc::new(FfmpegWorkerFactory::new(self.config));
        let report = self.supervisor.run(factory, self.shutdown.clone()).await;

        if !self.shutdown.is_cancelled() {
            warn!("Shutdown initiated: {}", ShutdownReason::WorkersFinished);
            self.shutdown.cancel();
        }
        watcher.await.map_err(|e| CamwatchError::System {
            message: format!("Shutdown watcher failed: {}", e),
        })?;

        for worker in &report.workers {
            if !worker.is_clean() {
                error!(
                    "Camera {} did not stop cleanly after {} frames: {:?}",
                    worker.camera, worker.frames, worker.outcome
                );
            }
        }

        let exit_code = report.exit_code();
        info!("Camwatch shutdown complete with exit code: {}", exit_code);
        Ok(exit_code)
    }
}

/// Forward the first SIGTERM or SIGINT to `shutdown_sender`
fn setup_signal_handlers(shutdown_sender: oneshot::Sender<ShutdownReason>) {
    let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

    // Handle SIGTERM (systemd stop) - Unix only
    #[cfg(unix)]
    {
        let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };
            if let Some(()) = sigterm.recv().await {
                info!("Received SIGTERM signal");
                if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                }
            }
        });
    }

    // Handle SIGINT (Ctrl+C) - Cross-platform
    let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
            }
        }
    });
}

