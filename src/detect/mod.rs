mod motion;

pub use motion::MotionDetector;

use crate::error::DetectorError;
use crate::frame::Frame;

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Region {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Finite coordinates and a positive size
    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Clip to a `width` x `height` frame, returning integer pixel bounds
    /// `(x, y, w, h)`. `None` if malformed or entirely outside the frame.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<(i32, i32, u32, u32)> {
        if !self.is_well_formed() {
            return None;
        }

        let left = self.x.max(0.0);
        let top = self.y.max(0.0);
        let right = (self.x + self.width).min(width as f32);
        let bottom = (self.y + self.height).min(height as f32);

        if right - left < 1.0 || bottom - top < 1.0 {
            return None;
        }

        Some((
            left as i32,
            top as i32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// One thing found in a frame
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub region: Region,
    pub label: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(region: Region, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            region,
            label: label.into(),
            confidence,
        }
    }
}

/// Frame classifier used by the camera pipeline.
///
/// Calls are synchronous and CPU-bound; the worker runs them on the blocking
/// pool and expects each call to finish well inside the detection interval.
pub trait Detector: Send + 'static {
    fn name(&self) -> &str;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError>;

    /// Free any resources held by the detector. Called once when the worker stops.
    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_regions() {
        assert!(!Region::new(f32::NAN, 0.0, 10.0, 10.0).is_well_formed());
        assert!(!Region::new(0.0, 0.0, -4.0, 10.0).is_well_formed());
        assert!(!Region::new(0.0, 0.0, 10.0, 0.0).is_well_formed());
        assert!(Region::new(0.0, 0.0, 10.0, 10.0).is_well_formed());
    }

    #[test]
    fn test_clip_to_frame() {
        let region = Region::new(-10.0, 20.0, 50.0, 500.0);
        assert_eq!(region.clip_to(100, 100), Some((0, 20, 40, 80)));

        let outside = Region::new(200.0, 200.0, 10.0, 10.0);
        assert_eq!(outside.clip_to(100, 100), None);
    }
}
