use std::fmt;

/// Why the application began stopping its workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    /// Every worker ended on its own
    WorkersFinished,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {}", name),
            ShutdownReason::WorkersFinished => write!(f, "all workers finished"),
        }
    }
}
