mod palette;

pub use palette::LabelColors;

use crate::config::AnnotationConfig;
use crate::detect::Detection;
use crate::frame::Frame;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// What happened to the detections handed to one [`FrameAnnotator::annotate`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    /// Drawn onto the frame
    pub drawn: usize,
    /// Dropped by the label or confidence filter
    pub filtered: usize,
    /// Retained but not drawable (malformed or off-frame geometry)
    pub skipped: usize,
}

/// Draws detection boxes and labels onto frames, in place
pub struct FrameAnnotator {
    excluded_labels: HashSet<String>,
    min_confidence: f32,
    box_thickness: u32,
    font: Option<Font<'static>>,
    scale: Scale,
    colors: LabelColors,
}

impl FrameAnnotator {
    pub fn new(config: &AnnotationConfig) -> Self {
        let font = config.font_path.as_deref().and_then(load_font);
        if font.is_none() {
            info!("No label font available, drawing boxes without text");
        }

        Self {
            excluded_labels: config.excluded_labels.iter().cloned().collect(),
            min_confidence: config.min_confidence,
            box_thickness: config.box_thickness.max(1),
            font,
            scale: Scale::uniform(config.font_size),
            colors: LabelColors::new(),
        }
    }

    /// Whether a detection passes the label and confidence filters
    pub fn is_retained(&self, detection: &Detection) -> bool {
        detection.confidence >= self.min_confidence
            && !self.excluded_labels.contains(&detection.label)
    }

    /// Draw every retained detection onto the frame. A detection with bad
    /// geometry is logged and skipped; the rest are still drawn.
    pub fn annotate(&mut self, frame: &mut Frame, detections: &[Detection]) -> AnnotationSummary {
        let mut summary = AnnotationSummary::default();
        let (width, height) = frame.image.dimensions();

        for detection in detections {
            if !self.is_retained(detection) {
                summary.filtered += 1;
                continue;
            }

            let Some((x, y, w, h)) = detection.region.clip_to(width, height) else {
                warn!(
                    "Skipping detection '{}' with unusable region {:?} on {}x{} frame {}",
                    detection.label, detection.region, width, height, frame.id
                );
                summary.skipped += 1;
                continue;
            };

            let color = self.colors.color_for(&detection.label);
            self.draw_box(&mut frame.image, x, y, w, h, color);
            self.draw_label(&mut frame.image, detection, x, y, color);
            summary.drawn += 1;
        }

        if summary.drawn > 0 || summary.skipped > 0 {
            debug!(
                "Annotated frame {}: {} drawn, {} filtered, {} skipped",
                frame.id, summary.drawn, summary.filtered, summary.skipped
            );
        }
        summary
    }

    fn draw_box(&self, image: &mut RgbImage, x: i32, y: i32, w: u32, h: u32, color: Rgb<u8>) {
        // Grow inwards so the outer edge matches the detected region
        for inset in 0..self.box_thickness {
            let inner_w = w.saturating_sub(inset * 2);
            let inner_h = h.saturating_sub(inset * 2);
            if inner_w == 0 || inner_h == 0 {
                break;
            }
            let rect = Rect::at(x + inset as i32, y + inset as i32).of_size(inner_w, inner_h);
            draw_hollow_rect_mut(image, rect, color);
        }
    }

    fn draw_label(
        &self,
        image: &mut RgbImage,
        detection: &Detection,
        x: i32,
        y: i32,
        color: Rgb<u8>,
    ) {
        let Some(font) = &self.font else {
            return;
        };

        let text = format!("{} {:.2}", detection.label, detection.confidence);
        let (text_width, text_height) = text_size(self.scale, font, &text);
        if text_width <= 0 || text_height <= 0 {
            return;
        }

        // Above the box when there is room, otherwise just inside it
        let label_y = if y >= text_height + 4 { y - text_height - 4 } else { y };
        let background =
            Rect::at(x, label_y).of_size(text_width as u32 + 4, text_height as u32 + 4);
        draw_filled_rect_mut(image, background, color);
        draw_text_mut(image, Rgb([0, 0, 0]), x + 2, label_y + 2, self.scale, font, &text);
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }
}

fn load_font(path: &str) -> Option<Font<'static>> {
    match std::fs::read(path) {
        Ok(data) => {
            let font = Font::try_from_vec(data);
            if font.is_none() {
                warn!("Failed to parse font file '{}'", path);
            }
            font
        }
        Err(e) => {
            warn!("Failed to read font file '{}': {}", path, e);
            None
        }
    }
}
