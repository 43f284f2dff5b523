//! Glyph layout engine: line measurement, fit scaling, slot placement.
//!
//! Runs once per cue (re)materialization, never per frame. Given the atlas
//! advance metrics it computes a centered left-to-right slot per rendered
//! glyph and a line-fit scale that keeps any text within the configured
//! fraction of the viewport width.

use glam::Vec3;

use crate::params::LayoutConfig;

/// Advance metrics of the rasterized atlas, in em units (1.0 = letter size)
pub trait GlyphMetrics {
    fn advance_em(&self, ch: char) -> f32;
}

/// Fixed-advance metrics for layout tests
#[cfg(test)]
pub struct MonospaceMetrics(pub f32);

#[cfg(test)]
impl GlyphMetrics for MonospaceMetrics {
    fn advance_em(&self, _ch: char) -> f32 {
        self.0
    }
}

/// Layout result: one slot per rendered (non-space) glyph
#[derive(Debug, Clone)]
pub struct LineLayout {
    pub slots: Vec<(char, Vec3)>,
    /// Line-fit scale in (0, 1]
    pub scale: f32,
    /// Final rendered width in world units
    pub width: f32,
}

/// Lay out one line of text, centered on the cue origin
pub fn layout_line(
    text: &str,
    metrics: &dyn GlyphMetrics,
    config: &LayoutConfig,
    viewport_world_width: f32,
) -> LineLayout {
    let size = config.letter_size;
    let gap = config.spacing_fraction * size;
    let space_width = config.space_fraction * size;

    // Measure: glyph advances plus inter-glyph gaps, runs of spaces
    // collapsed to one fixed-width space
    let mut tokens: Vec<(Option<char>, f32)> = Vec::new();
    let mut prev_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                tokens.push((None, space_width));
            }
            prev_space = true;
        } else {
            tokens.push((Some(ch), metrics.advance_em(ch) * size));
            prev_space = false;
        }
    }

    let glyph_width: f32 = tokens.iter().map(|(_, w)| w).sum();
    let total_width = if tokens.is_empty() {
        0.0
    } else {
        glyph_width + gap * (tokens.len() - 1) as f32
    };

    let max_width = config.max_line_fraction * viewport_world_width;
    let scale = if total_width > 0.0 {
        (max_width / total_width).min(1.0)
    } else {
        1.0
    };

    // Place: cursor sweeps left to right from the centered origin
    let mut slots = Vec::new();
    let mut cursor = -total_width / 2.0;
    for (ch, width) in &tokens {
        if let Some(ch) = ch {
            let center = cursor + width / 2.0;
            slots.push((*ch, Vec3::new(center * scale, 0.0, 0.0)));
        }
        cursor += width + gap;
    }

    LineLayout {
        slots,
        scale,
        width: total_width * scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: f32 = 800.0;

    fn layout(text: &str) -> LineLayout {
        layout_line(
            text,
            &MonospaceMetrics(0.6),
            &LayoutConfig::default(),
            VIEWPORT,
        )
    }

    #[test]
    fn test_width_never_exceeds_viewport_fraction() {
        let limit = LayoutConfig::default().max_line_fraction * VIEWPORT;
        let mut text = String::new();
        for _ in 0..120 {
            text.push('W');
            let line = layout(&text);
            assert!(
                line.width <= limit + 1e-3,
                "width {} exceeds limit {} for {} chars",
                line.width,
                limit,
                text.len()
            );
            assert!(line.scale > 0.0 && line.scale <= 1.0);
        }
    }

    #[test]
    fn test_short_line_keeps_unit_scale() {
        let line = layout("HI");
        assert_eq!(line.scale, 1.0);
    }

    #[test]
    fn test_layout_is_centered() {
        let line = layout("ABBA");
        let first = line.slots.first().unwrap().1.x;
        let last = line.slots.last().unwrap().1.x;
        assert!((first + last).abs() < 1e-3);
    }

    #[test]
    fn test_spaces_produce_no_slots() {
        let line = layout("A B");
        assert_eq!(line.slots.len(), 2);
        assert_eq!(line.slots[0].0, 'A');
        assert_eq!(line.slots[1].0, 'B');
    }

    #[test]
    fn test_consecutive_spaces_collapse() {
        let narrow = layout("A B");
        let wide = layout("A     B");
        let narrow_span = narrow.slots[1].1.x - narrow.slots[0].1.x;
        let wide_span = wide.slots[1].1.x - wide.slots[0].1.x;
        assert!((narrow_span - wide_span).abs() < 1e-3);
    }

    #[test]
    fn test_empty_text_yields_no_slots() {
        let line = layout("");
        assert!(line.slots.is_empty());
        assert_eq!(line.width, 0.0);
    }

    #[test]
    fn test_slots_ordered_left_to_right() {
        let line = layout("HELLO");
        for pair in line.slots.windows(2) {
            assert!(pair[0].1.x < pair[1].1.x);
        }
    }
}
