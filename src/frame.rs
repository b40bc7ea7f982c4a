use image::{imageops, RgbImage};
use std::time::SystemTime;

/// Canonical frame resolution used by every stage downstream of the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size in bytes of one RGB24 frame at this resolution
    pub fn rgb24_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One decoded RGB frame from a camera, owned by a single pipeline iteration
#[derive(Debug, Clone)]
pub struct Frame {
    /// Per-source sequence number
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Decoded pixels
    pub image: RgbImage,
}

impl Frame {
    pub fn new(id: u64, timestamp: SystemTime, image: RgbImage) -> Self {
        Self {
            id,
            timestamp,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }

    /// Raw RGB24 bytes, row-major
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Resize to the target resolution if the frame does not already match it
    pub fn conform_to(self, target: Resolution) -> Self {
        if self.resolution() == target {
            return self;
        }

        let image = imageops::resize(
            &self.image,
            target.width,
            target.height,
            imageops::FilterType::Triangle,
        );

        Self { image, ..self }
    }
}
