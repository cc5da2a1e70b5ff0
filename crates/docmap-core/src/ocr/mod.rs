//! OCR stage of the local pipeline.
//!
//! Backends return words with axis-aligned boxes grouped into lines; the
//! spatial reconstruction step only relies on that shape.

#[cfg(feature = "native")]
mod engine;
mod preprocessing;
mod spatial;

#[cfg(feature = "native")]
pub use engine::PureOcrEngine;
pub use preprocessing::{binarize, luminance};
pub use spatial::{average_glyph_width, reconstruct_spatial_text};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::OcrError;

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// A recognized word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BoundingBox,
}

impl OcrWord {
    pub fn new(text: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }
}

/// Words sharing one text line, left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    pub words: Vec<OcrWord>,
    pub bbox: BoundingBox,
}

impl OcrLine {
    /// Build a line from words; the line box is the union of word boxes.
    pub fn from_words(mut words: Vec<OcrWord>) -> Self {
        words.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
        let bbox = words
            .iter()
            .map(|w| w.bbox)
            .reduce(|acc, b| acc.union(&b))
            .unwrap_or_default();
        Self { words, bbox }
    }

    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// OCR output for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    /// Plain text, one line per OCR line.
    pub text: String,
    /// Lines in reading order.
    pub lines: Vec<OcrLine>,
}

impl OcrPage {
    /// Build a page from lines, deriving `text`.
    pub fn from_lines(lines: Vec<OcrLine>) -> Self {
        let text = lines
            .iter()
            .map(OcrLine::text)
            .collect::<Vec<_>>()
            .join("\n");
        Self { text, lines }
    }

    /// Synthesize a page from an embedded text layer.
    ///
    /// Every character is given a fixed-width cell, so runs of spaces in the
    /// source become pixel gaps the spatial reconstruction can recover.
    pub fn from_text_layer(text: &str) -> Self {
        const CELL_WIDTH: f32 = 10.0;
        const LINE_HEIGHT: f32 = 20.0;

        let lines: Vec<OcrLine> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(row, line)| {
                let y0 = row as f32 * LINE_HEIGHT;
                let mut words = Vec::new();
                let mut start: Option<usize> = None;

                let chars: Vec<char> = line.chars().collect();
                for (col, ch) in chars.iter().enumerate() {
                    match (ch.is_whitespace(), start) {
                        (false, None) => start = Some(col),
                        (true, Some(s)) => {
                            words.push(cell_word(&chars[s..col], s, y0, CELL_WIDTH, LINE_HEIGHT));
                            start = None;
                        }
                        _ => {}
                    }
                }
                if let Some(s) = start {
                    words.push(cell_word(&chars[s..], s, y0, CELL_WIDTH, LINE_HEIGHT));
                }

                OcrLine::from_words(words)
            })
            .collect();

        Self::from_lines(lines)
    }

    pub fn words(&self) -> impl Iterator<Item = &OcrWord> {
        self.lines.iter().flat_map(|l| l.words.iter())
    }
}

fn cell_word(chars: &[char], col: usize, y0: f32, cell: f32, height: f32) -> OcrWord {
    let x0 = col as f32 * cell;
    let x1 = x0 + chars.len() as f32 * cell;
    OcrWord::new(chars.iter().collect::<String>(), BoundingBox::new(x0, y0, x1, y0 + height))
}

/// A text recognizer returning word boxes grouped into lines.
///
/// Recognition is CPU-bound and synchronous; callers run it off the async
/// executor.
pub trait OcrBackend: Send + Sync {
    /// Recognize text in an already preprocessed page image.
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<OcrPage, OcrError>;

    /// Name recorded in logs.
    fn name(&self) -> &str;
}
