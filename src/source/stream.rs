use super::{VideoConnection, VideoTransport};
use crate::error::SourceError;
use crate::frame::{Frame, Resolution};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace, warn};

/// Live video source with unlimited reconnect.
///
/// A failed read releases the connection, waits the backoff, re-opens and
/// yields `None` for that call. The caller re-polls; there is no retry loop
/// inside a single `read`.
pub struct StreamSource {
    transport: Box<dyn VideoTransport>,
    connection: Option<Box<dyn VideoConnection>>,
    resolution: Resolution,
    backoff: Duration,
    frame_counter: u64,
    consecutive_failures: u32,
    reconnects: u64,
}

impl StreamSource {
    /// Open the transport right away. An open failure is not fatal; it shows up
    /// as `None` from [`read`](Self::read) until a reconnect succeeds.
    pub async fn connect(
        transport: Box<dyn VideoTransport>,
        resolution: Resolution,
        backoff: Duration,
    ) -> Self {
        let mut source = Self {
            transport,
            connection: None,
            resolution,
            backoff,
            frame_counter: 0,
            consecutive_failures: 0,
            reconnects: 0,
        };
        source.open().await;
        source
    }

    async fn open(&mut self) {
        match self.transport.open().await {
            Ok(connection) => {
                info!("Connected to {}", self.transport.describe());
                self.connection = Some(connection);
            }
            Err(e) => {
                warn!("Could not open {}: {}", self.transport.describe(), e);
                self.connection = None;
            }
        }
    }

    /// Pull one frame, resized to the canonical resolution
    pub async fn read(&mut self) -> Option<Frame> {
        let result = match self.connection.as_mut() {
            Some(connection) => connection.read_frame().await,
            None => Err(SourceError::Read {
                details: "not connected".to_string(),
            }),
        };

        match result {
            Ok(image) => {
                if self.consecutive_failures > 0 {
                    info!(
                        "Stream {} recovered after {} failed reads",
                        self.transport.describe(),
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;

                let id = self.frame_counter;
                self.frame_counter += 1;
                trace!("Read frame {} ({}x{})", id, image.width(), image.height());

                Some(Frame::new(id, SystemTime::now(), image).conform_to(self.resolution))
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "Read from {} failed ({} in a row): {}; reconnecting in {:?}",
                    self.transport.describe(),
                    self.consecutive_failures,
                    e,
                    self.backoff
                );

                self.release_connection().await;
                tokio::time::sleep(self.backoff).await;
                self.reconnects += 1;
                self.open().await;
                None
            }
        }
    }

    async fn release_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.release().await;
            debug!("Released connection to {}", self.transport.describe());
        }
    }

    /// Release the current connection. Safe to call more than once.
    pub async fn release(&mut self) {
        self.release_connection().await;
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn frames_read(&self) -> u64 {
        self.frame_counter
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }
}
