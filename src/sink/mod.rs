mod hls;

pub use hls::StreamSink;

use crate::error::SinkError;
use crate::frame::Frame;
use async_trait::async_trait;

/// Destination for annotated frames.
///
/// `write` errors are fatal to the worker that owns the sink. `close` must be
/// called before the worker exits; it is idempotent.
#[async_trait]
pub trait FrameSink: Send {
    async fn write(&mut self, frame: &Frame) -> Result<(), SinkError>;

    async fn close(&mut self) -> Result<(), SinkError>;
}
