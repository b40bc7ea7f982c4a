use super::{Detection, Detector, Region};
use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::frame::Frame;

use image::{imageops, GrayImage, ImageBuffer, Luma};
use imageproc::{
    contrast::threshold,
    distance_transform::Norm,
    filter::gaussian_blur_f32,
    morphology::{dilate, erode},
    region_labelling::{connected_components, Connectivity},
};
use std::collections::HashMap;
use tracing::{debug, info};

pub const MOTION_LABEL: &str = "motion";

/// Frame-differencing detector against a running-average background.
///
/// Each connected region of changed pixels becomes a `motion` detection whose
/// confidence is the fraction of its bounding box that actually changed.
pub struct MotionDetector {
    config: DetectorConfig,
    background_model: Option<GrayImage>,
    frame_count: u64,
}

#[derive(Debug, Clone, Copy)]
struct ComponentBounds {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixels: u32,
}

impl MotionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        info!("Initializing motion detector with config: {:?}", config);
        Self {
            config,
            background_model: None,
            frame_count: 0,
        }
    }

    pub(crate) fn background_initialized(&self) -> bool {
        self.background_model.is_some()
    }

    fn to_analysis_image(&self, frame: &Frame) -> GrayImage {
        let gray = imageops::grayscale(&frame.image);
        let scale = self.config.analysis_scale.max(1);
        if scale == 1 {
            return gray;
        }

        let width = (gray.width() / scale).max(1);
        let height = (gray.height() / scale).max(1);
        imageops::resize(&gray, width, height, imageops::FilterType::Triangle)
    }

    fn calculate_frame_difference(&self, background: &GrayImage, current: &GrayImage) -> GrayImage {
        let (width, height) = background.dimensions();
        let mut diff_image = GrayImage::new(width, height);

        for (x, y, bg_pixel) in background.enumerate_pixels() {
            if let Some(curr_pixel) = current.get_pixel_checked(x, y) {
                let diff = (bg_pixel[0] as i16 - curr_pixel[0] as i16).unsigned_abs() as u8;
                diff_image.put_pixel(x, y, Luma([diff]));
            }
        }

        diff_image
    }

    fn component_bounds(components: &ImageBuffer<Luma<u32>, Vec<u32>>) -> Vec<ComponentBounds> {
        let mut bounds: HashMap<u32, ComponentBounds> = HashMap::new();

        for (x, y, pixel) in components.enumerate_pixels() {
            let id = pixel[0];
            if id == 0 {
                continue;
            }
            bounds
                .entry(id)
                .and_modify(|b| {
                    b.min_x = b.min_x.min(x);
                    b.min_y = b.min_y.min(y);
                    b.max_x = b.max_x.max(x);
                    b.max_y = b.max_y.max(y);
                    b.pixels += 1;
                })
                .or_insert(ComponentBounds {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                    pixels: 1,
                });
        }

        bounds.into_values().collect()
    }

    fn update_background_model(&mut self, current_frame: &GrayImage) {
        if let Some(ref mut background) = self.background_model {
            let learning_rate = self.config.learning_rate.clamp(0.0, 1.0);

            for (bg_pixel, curr_pixel) in background.pixels_mut().zip(current_frame.pixels()) {
                let bg_val = bg_pixel[0] as f32;
                let curr_val = curr_pixel[0] as f32;
                bg_pixel[0] = (bg_val * (1.0 - learning_rate) + curr_val * learning_rate) as u8;
            }
        }
    }
}

impl Detector for MotionDetector {
    fn name(&self) -> &str {
        "motion"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        let gray_image = self.to_analysis_image(frame);
        let blurred = gaussian_blur_f32(&gray_image, self.config.blur_sigma.max(0.1));

        let background = match self.background_model.take() {
            Some(background) if background.dimensions() == blurred.dimensions() => background,
            _ => {
                info!("Initializing background model with frame {}", frame.id);
                self.background_model = Some(blurred);
                self.frame_count = 1;
                return Ok(Vec::new());
            }
        };

        let diff_image = self.calculate_frame_difference(&background, &blurred);
        let binary_mask = threshold(&diff_image, self.config.delta_threshold);

        // Open the mask to drop speckle noise
        let kernel_size = 1u8;
        let cleaned_mask = dilate(
            &erode(&binary_mask, Norm::LInf, kernel_size),
            Norm::LInf,
            kernel_size,
        );

        let components = connected_components(&cleaned_mask, Connectivity::Eight, Luma([0u8]));

        let scale = self.config.analysis_scale.max(1) as f32;
        let area_scale = (scale * scale) as f64;

        let mut detections: Vec<Detection> = Self::component_bounds(&components)
            .into_iter()
            .filter(|b| b.pixels as f64 * area_scale >= self.config.min_area)
            .map(|b| {
                let box_width = (b.max_x - b.min_x + 1) as f32;
                let box_height = (b.max_y - b.min_y + 1) as f32;
                let fill = b.pixels as f32 / (box_width * box_height);
                Detection::new(
                    Region::new(
                        b.min_x as f32 * scale,
                        b.min_y as f32 * scale,
                        box_width * scale,
                        box_height * scale,
                    ),
                    MOTION_LABEL,
                    fill.clamp(0.0, 1.0),
                )
            })
            .collect();

        detections.sort_by(|a, b| {
            b.region
                .area()
                .partial_cmp(&a.region.area())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        detections.truncate(self.config.max_regions);

        self.background_model = Some(background);
        self.update_background_model(&blurred);
        self.frame_count += 1;

        debug!(
            "Motion analysis of frame {} found {} regions",
            frame.id,
            detections.len()
        );
        Ok(detections)
    }

    fn release(&mut self) {
        self.background_model = None;
        debug!("Motion detector released after {} frames", self.frame_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::time::SystemTime;

    fn config() -> DetectorConfig {
        DetectorConfig {
            delta_threshold: 25,
            min_area: 100.0,
            blur_sigma: 1.0,
            analysis_scale: 1,
            learning_rate: 0.05,
            max_regions: 8,
        }
    }

    fn solid(id: u64, value: u8) -> Frame {
        Frame::new(
            id,
            SystemTime::now(),
            RgbImage::from_pixel(64, 48, Rgb([value, value, value])),
        )
    }

    #[test]
    fn test_first_frame_only_seeds_background() {
        let mut detector = MotionDetector::new(config());
        assert!(!detector.background_initialized());

        let detections = detector.detect(&solid(0, 128)).unwrap();
        assert!(detections.is_empty());
        assert!(detector.background_initialized());
    }

    #[test]
    fn test_static_scene_has_no_motion() {
        let mut detector = MotionDetector::new(config());
        detector.detect(&solid(0, 128)).unwrap();
        assert!(detector.detect(&solid(1, 128)).unwrap().is_empty());
    }

    #[test]
    fn test_bright_square_is_detected() {
        let mut detector = MotionDetector::new(config());
        detector.detect(&solid(0, 20)).unwrap();

        let mut moved = solid(1, 20);
        for y in 10..30 {
            for x in 20..40 {
                moved.image.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }

        let detections = detector.detect(&moved).unwrap();
        assert_eq!(detections.len(), 1);

        let detection = &detections[0];
        assert_eq!(detection.label, MOTION_LABEL);
        assert!(detection.confidence > 0.5);
        // Blur spreads the edge by a pixel or two
        assert!(detection.region.x >= 15.0 && detection.region.x <= 21.0);
        assert!(detection.region.y >= 5.0 && detection.region.y <= 11.0);
        assert!(detection.region.width >= 18.0 && detection.region.width <= 28.0);
    }

    #[test]
    fn test_release_clears_background() {
        let mut detector = MotionDetector::new(config());
        detector.detect(&solid(0, 128)).unwrap();
        detector.release();
        assert!(!detector.background_initialized());
    }
}
