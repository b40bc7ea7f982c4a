use image::Rgb;
use std::collections::HashMap;

/// Fixed set of box colours, chosen to stay readable on typical CCTV footage
const PALETTE: [Rgb<u8>; 10] = [
    Rgb([0, 255, 0]),
    Rgb([255, 64, 64]),
    Rgb([64, 160, 255]),
    Rgb([255, 200, 0]),
    Rgb([255, 0, 255]),
    Rgb([0, 255, 255]),
    Rgb([255, 128, 0]),
    Rgb([160, 96, 255]),
    Rgb([255, 255, 255]),
    Rgb([128, 255, 128]),
];

/// Assigns each label a palette slot in first-seen order. Stable for the
/// lifetime of the assigner, not across restarts.
#[derive(Debug, Default)]
pub struct LabelColors {
    assigned: HashMap<String, usize>,
}

impl LabelColors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color_for(&mut self, label: &str) -> Rgb<u8> {
        let next = self.assigned.len();
        let slot = *self.assigned.entry(label.to_string()).or_insert(next);
        PALETTE[slot % PALETTE.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colors_are_stable_per_label() {
        let mut colors = LabelColors::new();
        let person = colors.color_for("person");
        let car = colors.color_for("car");

        assert_ne!(person, car);
        assert_eq!(colors.color_for("person"), person);
        assert_eq!(colors.color_for("car"), car);
        assert_eq!(colors.assigned.len(), 2);
    }

    #[test]
    fn test_palette_wraps() {
        let mut colors = LabelColors::new();
        let first = colors.color_for("label-0");
        for i in 1..PALETTE.len() {
            colors.color_for(&format!("label-{}", i));
        }
        assert_eq!(colors.color_for("label-overflow"), first);
    }
}
