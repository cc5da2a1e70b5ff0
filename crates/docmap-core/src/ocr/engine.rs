//! Pure Rust OCR backend using `pure-onnx-ocr`.

use std::path::Path;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

use super::{BoundingBox, OcrBackend, OcrLine, OcrPage, OcrWord};

/// OCR backend backed by `pure-onnx-ocr` (no external ONNX Runtime).
pub struct PureOcrEngine {
    engine: pure_onnx_ocr::engine::OcrEngine,
    config: OcrConfig,
}

impl PureOcrEngine {
    /// Load det.onnx, latin_rec.onnx and latin_dict.txt from `model_dir`.
    pub fn from_dir(model_dir: &Path, config: OcrConfig) -> Result<Self, OcrError> {
        let det_path = model_dir.join("det.onnx");
        let rec_path = model_dir.join("latin_rec.onnx");
        let dict_path = model_dir.join("latin_dict.txt");

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::ModelLoad(format!(
                    "missing model file {}",
                    path.display()
                )));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded pure-onnx-ocr engine from {}", model_dir.display());

        Ok(Self { engine, config })
    }
}

impl OcrBackend for PureOcrEngine {
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<OcrPage, OcrError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();
        debug!("Recognizing {}x{} image (language {})", width, height, language);

        let results = self
            .engine
            .run_from_image(image)
            .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?;

        debug!("pure-onnx-ocr returned {} text regions", results.len());

        let regions: Vec<(BoundingBox, String)> = results
            .iter()
            .map(|r| {
                let text = if self.config.keep_unk {
                    r.text.clone()
                } else {
                    r.text.replace("[UNK]", " ")
                };
                (polygon_to_rect(&r.bounding_box), text)
            })
            .collect();

        let lines = group_into_lines(regions, self.config.line_tolerance);
        let page = OcrPage::from_lines(lines);

        info!(
            "OCR complete: {} lines in {}ms",
            page.lines.len(),
            start.elapsed().as_millis()
        );
        Ok(page)
    }

    fn name(&self) -> &str {
        "pure-onnx-ocr"
    }
}

/// Axis-aligned rectangle around a detection polygon.
fn polygon_to_rect(polygon: &pure_onnx_ocr::Polygon<f64>) -> BoundingBox {
    let mut rect: Option<BoundingBox> = None;
    for coord in polygon.exterior().coords() {
        let point = BoundingBox::new(coord.x as f32, coord.y as f32, coord.x as f32, coord.y as f32);
        rect = Some(match rect {
            Some(r) => r.union(&point),
            None => point,
        });
    }
    rect.unwrap_or_default()
}

/// Split detected regions into words and group them into reading-order lines.
///
/// Regions whose vertical centers lie within `tolerance` times the line
/// height of the current line join it. Region text is split on whitespace,
/// each word getting a share of the region width proportional to its length.
pub(crate) fn group_into_lines(mut regions: Vec<(BoundingBox, String)>, tolerance: f32) -> Vec<OcrLine> {
    regions.retain(|(_, text)| !text.trim().is_empty());
    regions.sort_by(|a, b| a.0.center_y().total_cmp(&b.0.center_y()));

    let mut rows: Vec<Vec<(BoundingBox, String)>> = Vec::new();
    let mut row_box: Option<BoundingBox> = None;

    for region in regions {
        let joins = row_box.is_some_and(|rb| {
            let limit = rb.height().max(region.0.height()) * tolerance;
            (region.0.center_y() - rb.center_y()).abs() <= limit
        });

        if joins {
            if let (Some(row), Some(rb)) = (rows.last_mut(), row_box.as_mut()) {
                *rb = rb.union(&region.0);
                row.push(region);
                continue;
            }
        }

        row_box = Some(region.0);
        rows.push(vec![region]);
    }

    rows.into_iter()
        .map(|row| OcrLine::from_words(row.iter().flat_map(|(rect, text)| split_words(rect, text)).collect()))
        .collect()
}

fn split_words(rect: &BoundingBox, text: &str) -> Vec<OcrWord> {
    let total_chars = text.chars().count().max(1) as f32;
    let glyph = rect.width() / total_chars;

    let mut words = Vec::new();
    let mut offset = 0usize;
    for token in text.split(' ') {
        let len = token.chars().count();
        if !token.trim().is_empty() {
            let x0 = rect.x0 + offset as f32 * glyph;
            let x1 = x0 + len as f32 * glyph;
            words.push(OcrWord::new(token.trim(), BoundingBox::new(x0, rect.y0, x1, rect.y1)));
        }
        offset += len + 1;
    }
    words
}
