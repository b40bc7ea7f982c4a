use super::FrameSink;
use crate::config::OutputConfig;
use crate::error::SinkError;
use crate::frame::{Frame, Resolution};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, error, info, warn};

pub const PLAYLIST_NAME: &str = "index.m3u8";

/// Long-lived `ffmpeg` encoder turning raw RGB24 frames on stdin into a
/// rolling HLS playlist. Only the last `playlist_size` segments are kept.
pub struct StreamSink {
    program: String,
    output_dir: PathBuf,
    resolution: Resolution,
    close_timeout: Duration,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frames_written: u64,
}

impl StreamSink {
    pub async fn open(
        output_dir: &Path,
        resolution: Resolution,
        fps: u32,
        config: &OutputConfig,
    ) -> Result<Self, SinkError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| SinkError::OutputDir {
                path: output_dir.display().to_string(),
                details: e.to_string(),
            })?;

        let args = build_args(output_dir, resolution, fps, config);
        info!(
            "Starting encoder for {} ({} @ {}fps)",
            output_dir.display(),
            resolution,
            fps
        );
        debug!("Encoder command: {} {}", config.encoder, args.join(" "));

        let mut child = Command::new(&config.encoder)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SinkError::Spawn {
                program: config.encoder.clone(),
                details: e.to_string(),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| SinkError::Spawn {
            program: config.encoder.clone(),
            details: "encoder stdin not captured".to_string(),
        })?;

        Ok(Self {
            program: config.encoder.clone(),
            output_dir: output_dir.to_path_buf(),
            resolution,
            close_timeout: Duration::from_secs(config.close_timeout_secs),
            child: Some(child),
            stdin: Some(stdin),
            frames_written: 0,
        })
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.output_dir.join(PLAYLIST_NAME)
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn exit_details(&mut self, io_error: std::io::Error) -> String {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(Some(status))) => format!("{} ({})", io_error, status),
            _ => io_error.to_string(),
        }
    }
}

#[async_trait]
impl FrameSink for StreamSink {
    async fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        if frame.resolution() != self.resolution {
            return Err(SinkError::ResolutionMismatch {
                expected_width: self.resolution.width,
                expected_height: self.resolution.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }

        let stdin = self.stdin.as_mut().ok_or(SinkError::Closed)?;
        let result = stdin.write_all(frame.as_bytes()).await;
        if let Err(e) = result {
            let details = self.exit_details(e);
            return Err(SinkError::EncoderExited { details });
        }

        self.frames_written += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        // Dropping stdin is the end-of-stream signal
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                debug!("Encoder stdin already closed: {}", e);
            }
        }

        match tokio::time::timeout(self.close_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                info!(
                    "Encoder for {} finished after {} frames",
                    self.output_dir.display(),
                    self.frames_written
                );
                Ok(())
            }
            Ok(Ok(status)) => {
                error!("Encoder {} exited with {}", self.program, status);
                Err(SinkError::EncoderFailed {
                    status: status.to_string(),
                })
            }
            Ok(Err(e)) => Err(SinkError::EncoderExited {
                details: e.to_string(),
            }),
            Err(_) => {
                warn!(
                    "Encoder did not exit within {:?}; killing it",
                    self.close_timeout
                );
                let _ = child.kill().await;
                Err(SinkError::EncoderFailed {
                    status: format!("no exit within {:?}", self.close_timeout),
                })
            }
        }
    }
}

impl Drop for StreamSink {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            warn!(
                "Encoder for {} dropped without close; killing it",
                self.output_dir.display()
            );
            let _ = child.start_kill();
        }
    }
}

pub(crate) fn build_args(
    output_dir: &Path,
    resolution: Resolution,
    fps: u32,
    config: &OutputConfig,
) -> Vec<String> {
    let size = resolution.to_string();
    let rate = fps.to_string();
    // One keyframe per segment so every segment starts independently decodable
    let gop = (fps * config.segment_seconds).max(1).to_string();
    let hls_time = config.segment_seconds.to_string();
    let list_size = config.playlist_size.to_string();
    let segment_pattern = output_dir.join("segment_%05d.ts").to_string_lossy().into_owned();
    let playlist = output_dir.join(PLAYLIST_NAME).to_string_lossy().into_owned();

    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-s",
        size.as_str(),
        "-r",
        rate.as_str(),
        "-i",
        "-",
        "-an",
        "-c:v",
        "libx264",
        "-preset",
        config.preset.as_str(),
        "-tune",
        "zerolatency",
        "-pix_fmt",
        "yuv420p",
        "-g",
        gop.as_str(),
        "-f",
        "hls",
        "-hls_time",
        hls_time.as_str(),
        "-hls_list_size",
        list_size.as_str(),
        "-hls_flags",
        "delete_segments",
        "-hls_segment_filename",
        segment_pattern.as_str(),
        playlist.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
