use super::{VideoConnection, VideoTransport};
use crate::error::SourceError;
use crate::frame::Resolution;
use async_trait::async_trait;
use image::RgbImage;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

/// Decodes a network stream with an `ffmpeg` child process emitting raw RGB24
pub struct FfmpegTransport {
    program: String,
    url: String,
    display_url: String,
    resolution: Resolution,
    read_timeout: Duration,
}

impl FfmpegTransport {
    pub fn new(
        program: impl Into<String>,
        url: impl Into<String>,
        display_url: impl Into<String>,
        resolution: Resolution,
        read_timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            url: url.into(),
            display_url: display_url.into(),
            resolution,
            read_timeout,
        }
    }

    pub(crate) fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
        if self.url.starts_with("rtsp://") {
            args.push("-rtsp_transport".to_string());
            args.push("tcp".to_string());
        }
        let scale = format!("scale={}:{}", self.resolution.width, self.resolution.height);
        for arg in [
            "-i",
            self.url.as_str(),
            "-an",
            "-vf",
            scale.as_str(),
            "-pix_fmt",
            "rgb24",
            "-f",
            "rawvideo",
            "-",
        ] {
            args.push(arg.to_string());
        }
        args
    }
}

#[async_trait]
impl VideoTransport for FfmpegTransport {
    fn describe(&self) -> String {
        self.display_url.clone()
    }

    async fn open(&self) -> Result<Box<dyn VideoConnection>, SourceError> {
        debug!("Spawning decoder for {}", self.display_url);

        let mut child = Command::new(&self.program)
            .args(self.build_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SourceError::Open {
                url: self.display_url.clone(),
                details: format!("failed to spawn {}: {}", self.program, e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| SourceError::Open {
            url: self.display_url.clone(),
            details: "decoder stdout not captured".to_string(),
        })?;

        Ok(Box::new(FfmpegConnection {
            child,
            stdout,
            resolution: self.resolution,
            read_timeout: self.read_timeout,
        }))
    }
}

struct FfmpegConnection {
    child: Child,
    stdout: ChildStdout,
    resolution: Resolution,
    read_timeout: Duration,
}

#[async_trait]
impl VideoConnection for FfmpegConnection {
    async fn read_frame(&mut self) -> Result<RgbImage, SourceError> {
        let mut buf = vec![0u8; self.resolution.rgb24_len()];

        match tokio::time::timeout(self.read_timeout, self.stdout.read_exact(&mut buf)).await {
            Err(_) => Err(SourceError::Timeout {
                secs: self.read_timeout.as_secs(),
            }),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(SourceError::EndOfStream)
            }
            Ok(Err(e)) => Err(SourceError::Read {
                details: e.to_string(),
            }),
            Ok(Ok(_)) => RgbImage::from_raw(self.resolution.width, self.resolution.height, buf)
                .ok_or_else(|| SourceError::Read {
                    details: "decoded buffer has wrong size".to_string(),
                }),
        }
    }

    async fn release(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("Decoder already gone: {}", e);
        }
        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(Ok(status)) => debug!("Decoder exited: {}", status),
            Ok(Err(e)) => warn!("Failed to reap decoder: {}", e),
            Err(_) => warn!("Decoder did not exit within 5s"),
        }
    }
}
