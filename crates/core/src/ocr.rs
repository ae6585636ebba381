use crate::error::ExtractError;
use crate::layout::{split_run_into_words, Word};
use crate::models::{BoundingBox, OcrEndpointConfig, PageSize};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Raster resolution requested from the OCR service.
pub const OCR_RENDER_DPI: u32 = 150;

/// Word boxes as reported by an OCR engine: image pixels, origin top-left.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OcrPage {
    pub image_width: u32,
    pub image_height: u32,
    #[serde(default)]
    pub words: Vec<OcrWord>,
}

/// A PDF read and encoded once, shared by every page sent to OCR.
#[derive(Debug, Clone)]
pub struct OcrDocument {
    source_path: String,
    pdf_base64: String,
}

impl OcrDocument {
    pub fn read(path: &Path) -> Result<Self, ExtractError> {
        let pdf = std::fs::read(path)?;
        Ok(Self {
            source_path: path.to_string_lossy().to_string(),
            pdf_base64: STANDARD.encode(pdf),
        })
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn pdf_base64(&self) -> &str {
        &self.pdf_base64
    }
}

/// Rasterizes one page and reads the words on it.
pub trait OcrEngine {
    fn recognize_page(&self, document: &OcrDocument, page: u32) -> Result<OcrPage, ExtractError>;
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest<'a> {
    pdf_base64: &'a str,
    source_path: &'a str,
    page: u32,
    dpi: u32,
}

pub struct HttpOcrEngine {
    config: OcrEndpointConfig,
    client: Client,
}

impl HttpOcrEngine {
    pub fn new(config: OcrEndpointConfig) -> Result<Self, ExtractError> {
        Url::parse(&config.endpoint)?;
        Ok(Self {
            config,
            client: Client::new(),
        })
    }
}

impl OcrEngine for HttpOcrEngine {
    fn recognize_page(&self, document: &OcrDocument, page: u32) -> Result<OcrPage, ExtractError> {
        let payload = OcrRequest {
            pdf_base64: document.pdf_base64(),
            source_path: document.source_path(),
            page,
            dpi: OCR_RENDER_DPI,
        };

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(ExtractError::Ocr(format!(
                "OCR request to {} returned {}",
                self.config.endpoint,
                response.status()
            )));
        }

        let parsed: OcrPage = response.json()?;
        if parsed.image_width == 0 || parsed.image_height == 0 {
            return Err(ExtractError::Ocr(format!(
                "OCR response for page {page} has an empty image size"
            )));
        }

        Ok(parsed)
    }
}

/// Reads `OCR_ENDPOINT` / `OCR_API_KEY`; `None` leaves OCR disabled.
pub fn parse_ocr_config() -> Option<OcrEndpointConfig> {
    let endpoint = std::env::var("OCR_ENDPOINT").ok()?;
    let endpoint = endpoint.trim().to_string();
    if endpoint.is_empty() {
        return None;
    }

    let api_key = std::env::var("OCR_API_KEY").ok().and_then(|value| {
        let key = value.trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    });

    Some(OcrEndpointConfig { endpoint, api_key })
}

/// Maps OCR words from image pixels (top-left origin) into PDF point space
/// (bottom-left origin).
pub fn ocr_words_to_pdf_space(ocr: &OcrPage, page_size: PageSize) -> Vec<Word> {
    if ocr.image_width == 0 || ocr.image_height == 0 {
        return Vec::new();
    }

    let sx = page_size.width / ocr.image_width as f32;
    let sy = page_size.height / ocr.image_height as f32;

    ocr.words
        .iter()
        .filter_map(|word| {
            let text = word.text.trim();
            if text.is_empty() || word.width <= 0.0 || word.height <= 0.0 {
                return None;
            }

            let x0 = word.left * sx;
            let x1 = (word.left + word.width) * sx;
            let y0 = page_size.height - (word.top + word.height) * sy;
            let y1 = page_size.height - word.top * sy;

            // Line-level engines report several words in one box.
            Some(split_run_into_words(
                text,
                BoundingBox::new(x0, y0, x1, y1),
                word.height * sy,
            ))
        })
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ocr_word(text: &str, left: f32, top: f32, width: f32, height: f32) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            left,
            top,
            width,
            height,
            confidence: Some(91.0),
        }
    }

    #[test]
    fn ocr_boxes_are_flipped_and_scaled_into_points() {
        let page = OcrPage {
            image_width: 1224,
            image_height: 1584,
            words: vec![
                ocr_word("Carbon", 200.0, 100.0, 120.0, 40.0),
                ocr_word("   ", 0.0, 0.0, 10.0, 10.0),
            ],
        };

        let words = ocr_words_to_pdf_space(
            &page,
            PageSize {
                width: 612.0,
                height: 792.0,
            },
        );

        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "Carbon");
        assert_eq!(words[0].bbox, BoundingBox::new(100.0, 722.0, 160.0, 742.0));
        assert_eq!(words[0].font_size, 20.0);
    }

    #[test]
    fn multi_word_ocr_boxes_are_split() {
        let page = OcrPage {
            image_width: 100,
            image_height: 100,
            words: vec![ocr_word("net zero", 0.0, 0.0, 80.0, 10.0)],
        };

        let words = ocr_words_to_pdf_space(
            &page,
            PageSize {
                width: 100.0,
                height: 100.0,
            },
        );

        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "net");
        assert_eq!(words[0].bbox, BoundingBox::new(0.0, 90.0, 30.0, 100.0));
        assert_eq!(words[1].text, "zero");
        assert_eq!(words[1].bbox, BoundingBox::new(40.0, 90.0, 80.0, 100.0));
    }

    #[test]
    fn ocr_response_parses_without_confidence() -> Result<(), Box<dyn std::error::Error>> {
        let body = r#"{"image_width":10,"image_height":20,"words":[{"text":"ESG","left":1,"top":2,"width":3,"height":4}]}"#;
        let page: OcrPage = serde_json::from_str(body)?;
        assert_eq!(page.words.len(), 1);
        assert_eq!(page.words[0].confidence, None);
        Ok(())
    }
}
