use std::fmt;

/// Worker lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerState {
    Connecting,
    Streaming,
    Stopping,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Connecting => "connecting",
            WorkerState::Streaming => "streaming",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How a worker ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Stop was requested and every resource was released without error
    Clean,
    /// A fatal error, a panic or a failed cleanup
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub camera: String,
    pub frames: u64,
    pub outcome: WorkerOutcome,
}

impl WorkerReport {
    pub fn failed(camera: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            camera: camera.into(),
            frames: 0,
            outcome: WorkerOutcome::Failed(reason.into()),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.outcome == WorkerOutcome::Clean
    }
}
