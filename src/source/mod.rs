mod ffmpeg;
mod stream;

pub use ffmpeg::FfmpegTransport;
pub use stream::StreamSource;

use crate::error::SourceError;
use async_trait::async_trait;
use image::RgbImage;

/// Something that can open a live video connection
#[async_trait]
pub trait VideoTransport: Send + Sync {
    /// Human-readable location, safe to log
    fn describe(&self) -> String;

    async fn open(&self) -> Result<Box<dyn VideoConnection>, SourceError>;
}

/// One open connection yielding decoded frames
#[async_trait]
pub trait VideoConnection: Send {
    async fn read_frame(&mut self) -> Result<RgbImage, SourceError>;

    /// Tear down the connection. Called at most once per connection.
    async fn release(&mut self);
}
