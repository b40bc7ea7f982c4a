pub mod annotate;
pub mod app;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod sink;
pub mod source;
pub mod supervisor;
pub mod throttle;
pub mod worker;

pub use app::{CamwatchApp, ShutdownReason};
pub use config::{CameraConfig, CamwatchConfig};
pub use error::{CamwatchError, Result};
pub use frame::{Frame, Resolution};
pub use supervisor::{FfmpegWorkerFactory, SupervisorReport, WorkerFactory, WorkerSupervisor};
pub use worker::{CameraWorker, WorkerOutcome, WorkerReport, WorkerState};
