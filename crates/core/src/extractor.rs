use crate::error::ExtractError;
use crate::fonts::{inherited, number, page_resources, resolve, resource_fonts, stream_content, FontInfo};
use crate::layout::{group_into_lines, Word};
use crate::models::{BoundingBox, HeadingRule, PageGeometry, PageSize, SentenceRecord, SkippedPage};
use crate::ocr::{ocr_words_to_pdf_space, OcrDocument, OcrEngine};
use crate::sentences::segment_page;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// US Letter, used when a page declares no usable `MediaBox`.
const DEFAULT_VIEW_BOX: BoundingBox = BoundingBox {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// Nesting limit for Form XObjects drawing other forms.
const MAX_FORM_DEPTH: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub page_count: u32,
    pub sentences: Vec<SentenceRecord>,
    pub skipped_pages: Vec<SkippedPage>,
}

pub trait PdfExtractor {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError>;
}

#[derive(Default)]
pub struct LopdfExtractor {
    heading: HeadingRule,
    ocr: Option<Box<dyn OcrEngine + Send + Sync>>,
}

impl LopdfExtractor {
    pub fn new(heading: HeadingRule) -> Self {
        Self { heading, ocr: None }
    }

    pub fn with_ocr(mut self, engine: Box<dyn OcrEngine + Send + Sync>) -> Self {
        self.ocr = Some(engine);
        self
    }

    /// `document` is read on the first page that needs OCR and reused after.
    fn ocr_page(
        &self,
        path: &Path,
        document: &mut Option<OcrDocument>,
        page: u32,
        page_size: PageSize,
    ) -> Result<Option<Vec<SentenceRecord>>, ExtractError> {
        let Some(engine) = &self.ocr else {
            return Ok(None);
        };

        let document = match document {
            Some(document) => document,
            None => document.insert(OcrDocument::read(path)?),
        };
        let recognized = engine.recognize_page(document, page)?;
        let words = ocr_words_to_pdf_space(&recognized, page_size);
        debug!(page, words = words.len(), "OCR words recognized");

        let lines = group_into_lines(words);
        Ok(Some(segment_page(page, page_size, &lines, &self.heading)))
    }
}

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let document = load_document(path)?;
        let pages = document.get_pages();
        let mut extraction = Extraction {
            page_count: pages.len() as u32,
            ..Extraction::default()
        };

        info!(path = %path.display(), pages = extraction.page_count, "extracting pdf");
        let mut ocr_document = None;

        for (page_no, page_id) in pages {
            let page_size = page_geometry(&document, page_no, page_id).size();

            let words = match page_words(&document, page_no, page_id) {
                Ok(words) => words,
                Err(error) => {
                    warn!(page = page_no, %error, "skipping unreadable page");
                    extraction.skipped_pages.push(SkippedPage {
                        page: page_no,
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            if !words.is_empty() {
                let lines = group_into_lines(words);
                let records = segment_page(page_no, page_size, &lines, &self.heading);
                debug!(page = page_no, sentences = records.len(), "page segmented");
                extraction.sentences.extend(records);
                continue;
            }

            match self.ocr_page(path, &mut ocr_document, page_no, page_size) {
                Ok(Some(records)) => {
                    if records.is_empty() {
                        warn!(page = page_no, "OCR found no legible text");
                    }
                    extraction.sentences.extend(records);
                }
                Ok(None) => {
                    warn!(page = page_no, "page has no extractable text and OCR is not configured");
                }
                Err(error) => {
                    warn!(page = page_no, %error, "OCR fallback failed, skipping page");
                    extraction.skipped_pages.push(SkippedPage {
                        page: page_no,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(extraction)
    }
}

pub fn load_document(path: &Path) -> Result<Document, ExtractError> {
    if !path.is_file() {
        return Err(ExtractError::Open(format!("{} is not a file", path.display())));
    }

    Document::load(path)
        .map_err(|error| ExtractError::Open(format!("{}: {error}", path.display())))
}

/// Geometry of every page, in page order.
pub fn page_geometries(path: &Path) -> Result<Vec<PageGeometry>, ExtractError> {
    let document = load_document(path)?;
    Ok(document
        .get_pages()
        .into_iter()
        .map(|(page_no, page_id)| page_geometry(&document, page_no, page_id))
        .collect())
}

fn page_geometry(doc: &Document, page_no: u32, page_id: ObjectId) -> PageGeometry {
    let view_box = inherited(doc, page_id, b"MediaBox")
        .and_then(|object| object.as_array().ok())
        .and_then(|values| {
            let numbers: Vec<f32> = values.iter().filter_map(number).collect();
            match numbers.as_slice() {
                [x0, y0, x1, y1] => Some(BoundingBox::new(*x0, *y0, *x1, *y1)),
                _ => None,
            }
        })
        .filter(|view_box| view_box.width() > 0.0 && view_box.height() > 0.0)
        .unwrap_or_else(|| {
            warn!(page = page_no, "page has no usable MediaBox, assuming US Letter");
            DEFAULT_VIEW_BOX
        });

    let rotation = inherited(doc, page_id, b"Rotate")
        .and_then(number)
        .map(|degrees| (degrees as i64).rem_euclid(360))
        .map(|degrees| (degrees / 90 * 90) as u16)
        .unwrap_or(0);

    PageGeometry {
        page: page_no,
        view_box,
        rotation,
    }
}

fn page_words(doc: &Document, page_no: u32, page_id: ObjectId) -> Result<Vec<Word>, ExtractError> {
    let data = doc.get_page_content(page_id).map_err(|error| ExtractError::Page {
        page: page_no,
        reason: error.to_string(),
    })?;
    let content = Content::decode(&data).map_err(|error| ExtractError::Page {
        page: page_no,
        reason: error.to_string(),
    })?;

    let resources = page_resources(doc, page_id);
    let fonts = resources
        .map(|resources| resource_fonts(doc, resources))
        .unwrap_or_default();
    let mut interpreter = TextInterpreter::new(fonts);
    interpreter.run(doc, resources, &content.operations, 0);

    Ok(glyphs_to_words(&interpreter.glyphs))
}

/// One shown character positioned in PDF point space.
#[derive(Debug, Clone)]
struct Glyph {
    text: String,
    bbox: BoundingBox,
    font_size: f32,
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m1 × m2` for PDF row-vector matrices `[a b c d e f]`.
fn multiply(m1: &Matrix, m2: &Matrix) -> Matrix {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

#[derive(Debug, Clone, Copy)]
struct TextState {
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    font_size: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            font_size: 12.0,
        }
    }
}

/// Follows the text and graphics state of a content stream far enough to
/// place every shown glyph.
struct TextInterpreter {
    fonts: HashMap<Vec<u8>, FontInfo>,
    fallback_font: FontInfo,
    font_name: Vec<u8>,
    ctm: Matrix,
    stack: Vec<(Matrix, TextState, Vec<u8>)>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    state: TextState,
    glyphs: Vec<Glyph>,
}

impl TextInterpreter {
    fn new(fonts: HashMap<Vec<u8>, FontInfo>) -> Self {
        Self {
            fonts,
            fallback_font: FontInfo::default(),
            font_name: Vec::new(),
            ctm: IDENTITY,
            stack: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            state: TextState::default(),
            glyphs: Vec::new(),
        }
    }

    /// Applies a content stream, descending into Form XObjects drawn with `Do`.
    fn run<'d>(
        &mut self,
        doc: &'d Document,
        resources: Option<&'d Dictionary>,
        operations: &[Operation],
        depth: usize,
    ) {
        for operation in operations {
            if operation.operator == "Do" {
                self.draw_form(doc, resources, operation, depth);
            } else {
                self.apply(operation);
            }
        }
    }

    fn draw_form<'d>(
        &mut self,
        doc: &'d Document,
        resources: Option<&'d Dictionary>,
        operation: &Operation,
        depth: usize,
    ) {
        let Some(name) = operation.operands.first().and_then(|o| o.as_name().ok()) else {
            return;
        };
        let Some(stream) = resources
            .and_then(|resources| resources.get(b"XObject").ok())
            .and_then(|object| resolve(doc, object))
            .and_then(|object| object.as_dict().ok())
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|object| resolve(doc, object))
            .and_then(|object| object.as_stream().ok())
        else {
            return;
        };

        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|subtype| subtype == b"Form");
        if !is_form {
            return;
        }
        if depth >= MAX_FORM_DEPTH {
            warn!(depth, "form xobjects nested too deeply, ignoring inner form");
            return;
        }

        let Some(content) = stream_content(stream).and_then(|data| Content::decode(&data).ok())
        else {
            debug!(name = %String::from_utf8_lossy(name), "undecodable form xobject");
            return;
        };

        let form_matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|object| resolve(doc, object))
            .and_then(|object| object.as_array().ok())
            .and_then(|values| matrix_operands(values))
            .unwrap_or(IDENTITY);

        // A form without its own resources uses the resources it is drawn with.
        let form_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|object| resolve(doc, object))
            .and_then(|object| object.as_dict().ok());
        let outer_fonts = form_resources
            .map(|inner| std::mem::replace(&mut self.fonts, resource_fonts(doc, inner)));

        let saved = (self.ctm, self.state, self.font_name.clone(), self.stack.len());
        let saved_text = (self.text_matrix, self.line_matrix);
        self.ctm = multiply(&form_matrix, &self.ctm);

        self.run(doc, form_resources.or(resources), &content.operations, depth + 1);

        let (ctm, state, font_name, stack_len) = saved;
        self.ctm = ctm;
        self.state = state;
        self.font_name = font_name;
        self.stack.truncate(stack_len);
        (self.text_matrix, self.line_matrix) = saved_text;
        if let Some(fonts) = outer_fonts {
            self.fonts = fonts;
        }
    }

    fn apply(&mut self, operation: &Operation) {
        let operands = &operation.operands;
        let num = |index: usize| operands.get(index).and_then(number);

        match operation.operator.as_str() {
            "q" => self
                .stack
                .push((self.ctm, self.state, self.font_name.clone())),
            "Q" => {
                if let Some((ctm, state, font_name)) = self.stack.pop() {
                    self.ctm = ctm;
                    self.state = state;
                    self.font_name = font_name;
                }
            }
            "cm" => {
                if let Some(matrix) = matrix_operands(operands) {
                    self.ctm = multiply(&matrix, &self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "Tf" => {
                if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                    self.font_name = name.to_vec();
                }
                if let Some(size) = num(1) {
                    self.state.font_size = size;
                }
            }
            "Tc" => self.state.char_spacing = num(0).unwrap_or(0.0),
            "Tw" => self.state.word_spacing = num(0).unwrap_or(0.0),
            "Tz" => self.state.horizontal_scale = num(0).unwrap_or(100.0) / 100.0,
            "TL" => self.state.leading = num(0).unwrap_or(0.0),
            "Td" | "TD" => {
                let (tx, ty) = (num(0).unwrap_or(0.0), num(1).unwrap_or(0.0));
                if operation.operator == "TD" {
                    self.state.leading = -ty;
                }
                self.move_line(tx, ty);
            }
            "Tm" => {
                if let Some(matrix) = matrix_operands(operands) {
                    self.text_matrix = matrix;
                    self.line_matrix = matrix;
                }
            }
            "T*" => self.move_line(0.0, -self.state.leading),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.move_line(0.0, -self.state.leading);
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                self.state.word_spacing = num(0).unwrap_or(0.0);
                self.state.char_spacing = num(1).unwrap_or(0.0);
                self.move_line(0.0, -self.state.leading);
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                let Some(Ok(items)) = operands.first().map(Object::as_array) else {
                    return;
                };
                for item in items {
                    match item {
                        Object::String(bytes, _) => self.show(bytes),
                        other => {
                            if let Some(adjust) = number(other) {
                                let shift = -adjust / 1000.0
                                    * self.state.font_size
                                    * self.state.horizontal_scale;
                                self.advance(shift);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, 0.0], &self.text_matrix);
    }

    fn show(&mut self, bytes: &[u8]) {
        let font = self
            .fonts
            .get(&self.font_name)
            .unwrap_or(&self.fallback_font);
        let two_byte = font.two_byte;
        let shown: Vec<(u32, String, f32)> = font
            .codes(bytes)
            .into_iter()
            .map(|code| (code, font.decode(&[code]), font.width(code)))
            .collect();
        let font_size = self.state.font_size;

        for (code, text, glyph_width) in shown {
            let mut advance = glyph_width / 1000.0 * font_size + self.state.char_spacing;
            if !two_byte && code == 32 {
                advance += self.state.word_spacing;
            }
            advance *= self.state.horizontal_scale;

            let rendering = multiply(&self.text_matrix, &self.ctm);
            let scale_x = rendering[0].hypot(rendering[1]);
            let scale_y = rendering[2].hypot(rendering[3]);
            let size = (font_size * scale_y).abs();
            let x0 = rendering[4];
            let baseline = rendering[5];
            let width = (advance * scale_x).abs();

            if size > 0.0 && width > 0.0 {
                self.glyphs.push(Glyph {
                    text,
                    bbox: BoundingBox::new(
                        x0,
                        baseline - 0.2 * size,
                        x0 + width,
                        baseline + 0.8 * size,
                    ),
                    font_size: size,
                });
            }

            self.advance(advance);
        }
    }
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut matrix = IDENTITY;
    for (index, operand) in operands.iter().take(6).enumerate() {
        matrix[index] = number(operand)?;
    }
    Some(matrix)
}

/// Joins glyphs into words, breaking on whitespace, on horizontal gaps wider
/// than a quarter em, and on baseline jumps.
fn glyphs_to_words(glyphs: &[Glyph]) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Vec<&Glyph> = Vec::new();

    for glyph in glyphs {
        if glyph.text.trim().is_empty() {
            flush_word(&mut current, &mut words);
            continue;
        }

        if let Some(last) = current.last() {
            let em = last.font_size.max(glyph.font_size);
            let gap = glyph.bbox.x0 - last.bbox.x1;
            let baseline_shift = (glyph.bbox.y0 - last.bbox.y0).abs();
            if gap > 0.25 * em || gap < -0.5 * em || baseline_shift > 0.5 * em {
                flush_word(&mut current, &mut words);
            }
        }

        current.push(glyph);
    }

    flush_word(&mut current, &mut words);
    words
}

fn flush_word(current: &mut Vec<&Glyph>, words: &mut Vec<Word>) {
    if current.is_empty() {
        return;
    }

    let text: String = current.iter().map(|glyph| glyph.text.as_str()).collect();
    let bbox = BoundingBox::union_all(current.iter().map(|glyph| &glyph.bbox));
    let font_size = current.iter().map(|glyph| glyph.font_size).fold(0.0, f32::max);
    current.clear();

    if let Some(bbox) = bbox {
        if !text.trim().is_empty() {
            words.push(Word {
                text: text.trim().to_string(),
                bbox,
                font_size,
            });
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ocr::{OcrPage, OcrWord};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use lopdf::{dictionary, Stream};
    use std::sync::{Arc, Mutex};
    use std::path::PathBuf;
    use tempfile::tempdir;

    /// A text line to draw: x, y, font size, text.
    pub(crate) type Line<'a> = (i64, i64, i64, &'a str);

    /// Writes a PDF with Helvetica text; an empty page slice yields an
    /// image-only style page with no text operators.
    pub(crate) fn write_pdf(path: &Path, pages: &[&[Line<'_>]]) -> Result<(), Box<dyn std::error::Error>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids = Vec::new();
        for lines in pages {
            let mut operations = Vec::new();
            for (x, y, size, text) in lines.iter() {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new(
                    "Tf",
                    vec![Object::Name(b"F1".to_vec()), Object::Integer(*size)],
                ));
                operations.push(Operation::new(
                    "Td",
                    vec![Object::Integer(*x), Object::Integer(*y)],
                ));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path)?;
        Ok(())
    }

    struct FixedOcr {
        page: OcrPage,
    }

    impl OcrEngine for FixedOcr {
        fn recognize_page(&self, _document: &OcrDocument, _page: u32) -> Result<OcrPage, ExtractError> {
            Ok(self.page.clone())
        }
    }

    /// Page number and payload address of every OCR call.
    type PayloadLog = Arc<Mutex<Vec<(u32, usize, String)>>>;

    struct RecordingOcr {
        log: PayloadLog,
    }

    impl OcrEngine for RecordingOcr {
        fn recognize_page(&self, document: &OcrDocument, page: u32) -> Result<OcrPage, ExtractError> {
            let payload = document.pdf_base64();
            if let Ok(mut log) = self.log.lock() {
                log.push((page, payload.as_ptr() as usize, payload.to_string()));
            }
            Ok(OcrPage {
                image_width: 612,
                image_height: 792,
                words: Vec::new(),
            })
        }
    }

    struct FailingOcr;

    impl OcrEngine for FailingOcr {
        fn recognize_page(&self, _document: &OcrDocument, page: u32) -> Result<OcrPage, ExtractError> {
            Err(ExtractError::Ocr(format!("engine offline for page {page}")))
        }
    }

    fn fixture(name: &str, pages: &[&[Line<'_>]]) -> Result<(tempfile::TempDir, PathBuf), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join(name);
        write_pdf(&path, pages)?;
        Ok((dir, path))
    }

    #[test]
    fn native_text_yields_sentences_with_ordered_boxes() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = fixture(
            "report.pdf",
            &[
                &[
                    (72, 720, 24, "CLIMATE STRATEGY"),
                    (72, 690, 12, "We reduced carbon emissions by 30%. Water use fell."),
                ],
                &[(72, 700, 12, "Board oversight improved")],
            ],
        )?;

        let extraction = LopdfExtractor::default().extract(&path)?;
        assert_eq!(extraction.page_count, 2);
        assert!(extraction.skipped_pages.is_empty());

        let texts: Vec<_> = extraction
            .sentences
            .iter()
            .map(|s| (s.page, s.text.as_str(), s.is_heading))
            .collect();
        assert_eq!(
            texts,
            vec![
                (1, "CLIMATE STRATEGY", true),
                (1, "We reduced carbon emissions by 30%.", false),
                (1, "Water use fell.", false),
                (2, "Board oversight improved", false),
            ]
        );

        for sentence in &extraction.sentences {
            assert!(sentence.bbox.x0 < sentence.bbox.x1);
            assert!(sentence.bbox.y0 < sentence.bbox.y1);
            assert_eq!(sentence.page_size.height, 792.0);
        }

        let first = &extraction.sentences[1];
        assert_eq!(first.bbox.x0, 72.0);
        assert!(first.bbox.y0 < 690.0 && first.bbox.y1 > 690.0);
        Ok(())
    }

    #[test]
    fn missing_file_is_fatal() {
        let result = LopdfExtractor::default().extract(Path::new("/nonexistent/report.pdf"));
        assert!(matches!(result, Err(ExtractError::Open(_))));
    }

    #[test]
    fn corrupt_file_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = LopdfExtractor::default().extract(&path);
        assert!(matches!(result, Err(ExtractError::Open(_))));
        Ok(())
    }

    #[test]
    fn image_only_page_uses_ocr_fallback() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = fixture("scan.pdf", &[&[]])?;
        let engine = FixedOcr {
            page: OcrPage {
                image_width: 1224,
                image_height: 1584,
                words: vec![
                    OcrWord {
                        text: "Renewable".to_string(),
                        left: 144.0,
                        top: 200.0,
                        width: 200.0,
                        height: 30.0,
                        confidence: Some(93.0),
                    },
                    OcrWord {
                        text: "energy.".to_string(),
                        left: 360.0,
                        top: 200.0,
                        width: 140.0,
                        height: 30.0,
                        confidence: Some(90.0),
                    },
                ],
            },
        };

        let extraction = LopdfExtractor::default()
            .with_ocr(Box::new(engine))
            .extract(&path)?;

        assert_eq!(extraction.sentences.len(), 1);
        let sentence = &extraction.sentences[0];
        assert_eq!(sentence.text, "Renewable energy.");
        assert_eq!(sentence.bbox, BoundingBox::new(72.0, 677.0, 250.0, 692.0));
        Ok(())
    }

    #[test]
    fn scanned_pages_share_one_encoded_document() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = fixture("scan.pdf", &[&[], &[(72, 700, 12, "Text page.")], &[]])?;
        let log = PayloadLog::default();

        let extraction = LopdfExtractor::default()
            .with_ocr(Box::new(RecordingOcr {
                log: Arc::clone(&log),
            }))
            .extract(&path)?;
        assert_eq!(extraction.sentences.len(), 1);

        let calls = log.lock().map_err(|_| "payload log poisoned")?.clone();
        let pages: Vec<u32> = calls.iter().map(|(page, _, _)| *page).collect();
        assert_eq!(pages, vec![1, 3]);
        assert_eq!(calls[0].1, calls[1].1);
        assert_eq!(calls[0].2, STANDARD.encode(std::fs::read(&path)?));
        Ok(())
    }

    #[test]
    fn failed_ocr_skips_only_that_page() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = fixture("mixed.pdf", &[&[], &[(72, 700, 12, "Diversity matters.")]])?;

        let extraction = LopdfExtractor::default()
            .with_ocr(Box::new(FailingOcr))
            .extract(&path)?;

        assert_eq!(extraction.skipped_pages.len(), 1);
        assert_eq!(extraction.skipped_pages[0].page, 1);
        assert_eq!(extraction.sentences.len(), 1);
        assert_eq!(extraction.sentences[0].page, 2);
        Ok(())
    }

    #[test]
    fn geometry_is_inherited_from_page_tree() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = fixture("geometry.pdf", &[&[(72, 700, 12, "A.")]])?;
        let geometries = page_geometries(&path)?;
        assert_eq!(geometries.len(), 1);
        assert_eq!(geometries[0].view_box, BoundingBox::new(0.0, 0.0, 612.0, 792.0));
        assert_eq!(geometries[0].rotation, 0);
        Ok(())
    }

    /// One page whose content is only `/X1 Do`; the form draws `text` at
    /// (72, 700) in Helvetica 12, shifted by the form's `/Matrix`.
    fn write_form_pdf(path: &Path, text: &str, matrix: [i64; 6]) -> Result<(), Box<dyn std::error::Error>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let form_content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
                "Matrix" => matrix.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            },
            form_content.encode()?,
        ));

        let page_content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("Do", vec![Object::Name(b"X1".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, page_content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "X1" => form_id },
            },
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1_i64,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path)?;
        Ok(())
    }

    #[test]
    fn text_drawn_inside_form_xobject_is_extracted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("form.pdf");
        write_form_pdf(&path, "We reduced carbon emissions by 30%.", [1, 0, 0, 1, 0, 0])?;

        let extraction = LopdfExtractor::default().extract(&path)?;
        assert!(extraction.skipped_pages.is_empty());
        assert_eq!(extraction.sentences.len(), 1);
        let sentence = &extraction.sentences[0];
        assert_eq!(sentence.text, "We reduced carbon emissions by 30%.");
        assert_eq!(sentence.bbox.x0, 72.0);
        assert!(sentence.bbox.y0 < 700.0 && sentence.bbox.y1 > 700.0);
        Ok(())
    }

    #[test]
    fn form_matrix_moves_form_text() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("shifted.pdf");
        write_form_pdf(&path, "Board oversight improved.", [1, 0, 0, 1, 28, -200])?;

        let extraction = LopdfExtractor::default().extract(&path)?;
        assert_eq!(extraction.sentences.len(), 1);
        let bbox = extraction.sentences[0].bbox;
        assert_eq!(bbox.x0, 100.0);
        assert!(bbox.y0 < 500.0 && bbox.y1 > 500.0);
        Ok(())
    }

    #[test]
    fn self_referencing_form_stops_at_depth_limit() {
        let mut doc = Document::with_version("1.5");
        let form_id = doc.new_object_id();
        let resources = dictionary! {
            "XObject" => dictionary! { "Loop" => form_id },
        };
        let content = Content {
            operations: vec![Operation::new("Do", vec![Object::Name(b"Loop".to_vec())])],
        };
        let encoded = content.encode().expect("content encodes");
        doc.objects.insert(
            form_id,
            Object::Stream(Stream::new(
                dictionary! {
                    "Subtype" => "Form",
                    "Resources" => resources.clone(),
                },
                encoded,
            )),
        );

        let mut interpreter = TextInterpreter::new(HashMap::new());
        interpreter.run(&doc, Some(&resources), &content.operations, 0);
        assert!(interpreter.glyphs.is_empty());
        assert!(interpreter.stack.is_empty());
    }

    #[test]
    fn tj_kerning_keeps_words_together() {
        let mut interpreter = TextInterpreter::new(HashMap::new());
        interpreter.apply(&Operation::new("BT", vec![]));
        interpreter.apply(&Operation::new(
            "Tf",
            vec![Object::Name(b"F9".to_vec()), Object::Integer(10)],
        ));
        interpreter.apply(&Operation::new(
            "Td",
            vec![Object::Integer(100), Object::Integer(500)],
        ));
        interpreter.apply(&Operation::new(
            "TJ",
            vec![Object::Array(vec![
                Object::string_literal("Gr"),
                Object::Integer(20),
                Object::string_literal("een"),
                Object::Integer(-1000),
                Object::string_literal("bond"),
            ])],
        ));

        let words = glyphs_to_words(&interpreter.glyphs);
        let texts: Vec<_> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["Green", "bond"]);
        assert_eq!(words[0].bbox.x0, 100.0);
    }
}
