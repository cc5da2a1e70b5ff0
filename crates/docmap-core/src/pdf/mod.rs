//! PDF rasterization. Only the first page is ever processed.

mod extractor;

pub use extractor::PdfExtractor;

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::{debug, info};

use crate::error::PdfError;
use crate::models::config::PdfConfig;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// What the first page could be turned into.
#[derive(Debug, Clone)]
pub enum FirstPage {
    /// Raster image, already upscaled.
    Raster(DynamicImage),
    /// Embedded text layer, used when the page has no raster image.
    Text(String),
}

/// Render the first page of a PDF for OCR.
///
/// The largest raster image on the page is upscaled by `render_scale`. When
/// the page carries no decodable image, the text layer is returned instead
/// if `text_layer_fallback` is set.
pub fn render_first_page(data: &[u8], config: &PdfConfig) -> Result<FirstPage> {
    let extractor = PdfExtractor::load(data)?;
    if extractor.page_count() > 1 {
        debug!(
            "PDF has {} pages; only the first is processed",
            extractor.page_count()
        );
    }

    if let Some(image) = extractor.first_page_image() {
        return Ok(FirstPage::Raster(upscale(image, config.render_scale)));
    }

    if config.text_layer_fallback {
        let text = extractor.first_page_text()?;
        if !text.trim().is_empty() {
            info!("First page has no raster image, using text layer");
            return Ok(FirstPage::Text(text));
        }
    }

    Err(PdfError::NoRenderableContent)
}

/// Scale an image by `factor`; factors at or below 1 leave it untouched.
pub fn upscale(image: DynamicImage, factor: f32) -> DynamicImage {
    if !(factor > 1.0) {
        return image;
    }
    let width = (image.width() as f32 * factor).round() as u32;
    let height = (image.height() as f32 * factor).round() as u32;
    debug!(
        "Upscaling page {}x{} -> {}x{}",
        image.width(),
        image.height(),
        width,
        height
    );
    image.resize_exact(width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    enum Page<'a> {
        Text(&'a str),
        Image { width: i64, height: i64 },
    }

    /// Build a small PDF with one page per entry.
    fn build_pdf(pages: &[Page<'_>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });

        let mut kids: Vec<Object> = Vec::new();
        for page in pages {
            let (operations, resources) = match page {
                Page::Text(text) => (
                    vec![
                        Operation::new("BT", vec![]),
                        Operation::new("Tf", vec!["F1".into(), 12.into()]),
                        Operation::new("Td", vec![72.into(), 700.into()]),
                        Operation::new("Tj", vec![Object::string_literal(*text)]),
                        Operation::new("ET", vec![]),
                    ],
                    dictionary! { "Font" => dictionary! { "F1" => font_id } },
                ),
                Page::Image { width, height } => {
                    let samples = vec![200u8; (*width * *height * 3) as usize];
                    let image_id = doc.add_object(Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Image",
                            "Width" => *width,
                            "Height" => *height,
                            "ColorSpace" => "DeviceRGB",
                            "BitsPerComponent" => 8,
                        },
                        samples,
                    ));
                    (
                        vec![
                            Operation::new("q", vec![]),
                            Operation::new(
                                "cm",
                                vec![
                                    (*width).into(),
                                    0.into(),
                                    0.into(),
                                    (*height).into(),
                                    0.into(),
                                    0.into(),
                                ],
                            ),
                            Operation::new("Do", vec!["Im1".into()]),
                            Operation::new("Q", vec![]),
                        ],
                        dictionary! { "XObject" => dictionary! { "Im1" => image_id } },
                    )
                }
            };

            let content = Content { operations }.encode().unwrap();
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let media_box: Vec<Object> = vec![0.into(), 0.into(), 612.into(), 792.into()];
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources,
                "MediaBox" => media_box,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => pages.len() as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn first_page_text(pdf: &[u8]) -> String {
        match render_first_page(pdf, &PdfConfig::default()).unwrap() {
            FirstPage::Text(text) => text,
            FirstPage::Raster(_) => panic!("expected text layer"),
        }
    }

    #[test]
    fn test_upscale_doubles_dimensions() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(30, 20));
        let scaled = upscale(image, 2.0);
        assert_eq!((scaled.width(), scaled.height()), (60, 40));
    }

    #[test]
    fn test_upscale_ignores_non_enlarging_factors() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(30, 20));
        assert_eq!(upscale(image.clone(), 1.0).width(), 30);
        assert_eq!(upscale(image, f32::NAN).width(), 30);
    }

    #[test]
    fn test_render_rejects_non_pdf() {
        let err = render_first_page(b"%PDF-broken", &PdfConfig::default()).unwrap_err();
        assert!(matches!(err, PdfError::Parse(_)));
    }

    #[test]
    fn test_render_image_page_upscales() {
        let pdf = build_pdf(&[Page::Image { width: 4, height: 3 }]);
        match render_first_page(&pdf, &PdfConfig::default()).unwrap() {
            FirstPage::Raster(image) => assert_eq!((image.width(), image.height()), (8, 6)),
            FirstPage::Text(text) => panic!("expected raster, got text {:?}", text),
        }
    }

    #[test]
    fn test_text_layer_single_page() {
        let pdf = build_pdf(&[Page::Text("FIRST PAGE LINE")]);
        assert!(first_page_text(&pdf).contains("FIRST PAGE LINE"));
    }

    #[test]
    fn test_text_layer_takes_only_first_page() {
        let pdf = build_pdf(&[Page::Text("FIRST PAGE LINE"), Page::Text("SECOND PAGE LINE")]);
        let text = first_page_text(&pdf);
        assert!(text.contains("FIRST PAGE LINE"));
        assert!(!text.contains("SECOND PAGE LINE"));
    }

    #[test]
    fn test_text_layer_fallback_disabled() {
        let pdf = build_pdf(&[Page::Text("FIRST PAGE LINE")]);
        let config = PdfConfig {
            text_layer_fallback: false,
            ..PdfConfig::default()
        };
        let err = render_first_page(&pdf, &config).unwrap_err();
        assert!(matches!(err, PdfError::NoRenderableContent));
    }
}
