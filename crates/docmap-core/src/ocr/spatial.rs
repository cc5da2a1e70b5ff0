//! Spatial text reconstruction.
//!
//! Flat OCR text loses column alignment. Re-inserting spaces proportional to
//! the pixel gap between words recovers a fixed-width-like layout that the
//! line-item grammar can split on.

use tracing::debug;

use super::OcrPage;

/// Glyph width assumed when the page has no characters.
const DEFAULT_GLYPH_WIDTH: f32 = 10.0;

/// Average glyph width across every word on the page.
pub fn average_glyph_width(page: &OcrPage) -> f32 {
    let (width, chars) = page.words().fold((0.0f32, 0usize), |(w, c), word| {
        (w + word.bbox.width(), c + word.text.chars().count())
    });

    if chars > 0 {
        width / chars as f32
    } else {
        DEFAULT_GLYPH_WIDTH
    }
}

/// Rebuild page text with gap-proportional spacing, one line per OCR line.
///
/// For each word the gap to the previous word's right edge (or the line's
/// left edge) is measured. A gap wider than two glyphs becomes
/// `max(1, floor(gap / glyph))` spaces; any smaller gap is a single space,
/// except before the first word of a line.
pub fn reconstruct_spatial_text(page: &OcrPage) -> String {
    let glyph = average_glyph_width(page);
    let mut out = String::new();

    for line in &page.lines {
        let mut current = String::new();
        let mut cursor = line.bbox.x0;

        for word in &line.words {
            let gap = word.bbox.x0 - cursor;

            if gap > glyph * 2.0 {
                let spaces = ((gap / glyph).floor() as usize).max(1);
                current.extend(std::iter::repeat_n(' ', spaces));
            } else if !current.is_empty() {
                current.push(' ');
            }

            current.push_str(&word.text);
            cursor = word.bbox.x1;
        }

        out.push_str(&current);
        out.push('\n');
    }

    debug!(
        "Reconstructed {} lines with glyph width {:.2}",
        page.lines.len(),
        glyph
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{BoundingBox, OcrLine, OcrWord};
    use pretty_assertions::assert_eq;

    fn word(text: &str, x0: f32, x1: f32) -> OcrWord {
        OcrWord::new(text, BoundingBox::new(x0, 0.0, x1, 10.0))
    }

    #[test]
    fn test_average_glyph_width() {
        let page = OcrPage::from_lines(vec![OcrLine::from_words(vec![
            word("ab", 0.0, 20.0),
            word("cdef", 30.0, 70.0),
        ])]);
        assert_eq!(average_glyph_width(&page), 10.0);
        assert_eq!(average_glyph_width(&OcrPage::default()), DEFAULT_GLYPH_WIDTH);
    }

    #[test]
    fn test_wide_gaps_become_multiple_spaces() {
        // Glyph width 10: gap 45 -> 4 spaces, gap 15 -> 1 space.
        let page = OcrPage::from_lines(vec![OcrLine::from_words(vec![
            word("ab", 0.0, 20.0),
            word("cd", 65.0, 85.0),
            word("ef", 100.0, 120.0),
        ])]);
        assert_eq!(reconstruct_spatial_text(&page), "ab    cd ef\n");
    }

    #[test]
    fn test_touching_words_still_get_one_space() {
        let page = OcrPage::from_lines(vec![OcrLine::from_words(vec![
            word("ab", 0.0, 20.0),
            word("cd", 20.0, 40.0),
        ])]);
        assert_eq!(reconstruct_spatial_text(&page), "ab cd\n");
    }

    #[test]
    fn test_text_layer_round_trips_columns() {
        let source = "WIDGET-100 Blue Widget      12.50   10 EACH     125.00";
        let page = OcrPage::from_text_layer(source);
        assert_eq!(reconstruct_spatial_text(&page), format!("{}\n", source));
    }
}
