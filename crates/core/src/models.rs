use crate::error::ViewerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Axis-aligned box in PDF point space (origin bottom-left, unscaled).
///
/// Corners carry no implied ordering on the wire; [`BoundingBox::normalized`]
/// resolves min/max for consumers that need it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }.normalized()
    }

    pub fn normalized(self) -> Self {
        Self {
            x0: self.x0.min(self.x1),
            y0: self.y0.min(self.y1),
            x1: self.x0.max(self.x1),
            y1: self.y0.max(self.y1),
        }
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let left = self.normalized();
        let right = other.normalized();
        BoundingBox {
            x0: left.x0.min(right.x0),
            y0: left.y0.min(right.y0),
            x1: left.x1.max(right.x1),
            y1: left.y1.max(right.y1),
        }
    }

    pub fn union_all<'a, I>(boxes: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        boxes
            .into_iter()
            .fold(None, |acc: Option<BoundingBox>, next| match acc {
                Some(current) => Some(current.union(next)),
                None => Some(next.normalized()),
            })
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).abs()
    }

    pub fn is_finite(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|value| value.is_finite())
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x0, self.y0, self.x1, self.y1)
    }
}

/// Parses the compact `x0,y0,x1,y1` form used by viewer request parameters.
impl FromStr for BoundingBox {
    type Err = ViewerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts = value
            .split(',')
            .map(|part| part.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| ViewerError::MalformedBox(format!("{value:?}: {error}")))?;

        match parts.as_slice() {
            [x0, y0, x1, y1] => {
                let parsed = BoundingBox {
                    x0: *x0,
                    y0: *y0,
                    x1: *x1,
                    y1: *y1,
                };
                if parsed.is_finite() {
                    Ok(parsed)
                } else {
                    Err(ViewerError::MalformedBox(format!("{value:?} is not finite")))
                }
            }
            _ => Err(ViewerError::MalformedBox(format!(
                "expected four comma separated numbers, got {value:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// A page's `MediaBox` and `/Rotate` as declared by the document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageGeometry {
    pub page: u32,
    pub view_box: BoundingBox,
    /// Clockwise rotation in degrees, one of 0, 90, 180, 270.
    pub rotation: u16,
}

impl PageGeometry {
    pub fn size(&self) -> PageSize {
        PageSize {
            width: self.view_box.width(),
            height: self.view_box.height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentenceRecord {
    /// 1-based page number.
    pub page: u32,
    pub text: String,
    pub bbox: BoundingBox,
    pub is_heading: bool,
    pub page_size: PageSize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredSentence {
    #[serde(flatten)]
    pub sentence: SentenceRecord,
    pub score: f32,
    pub category: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HighlightRequest {
    pub page: u32,
    pub bbox: BoundingBox,
}

impl From<&ScoredSentence> for HighlightRequest {
    fn from(value: &ScoredSentence) -> Self {
        Self {
            page: value.sentence.page,
            bbox: value.sentence.bbox,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceCategory {
    pub label: String,
    pub phrases: Vec<String>,
}

/// Ordered reference phrases; declaration order decides ties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CategorySet {
    pub categories: Vec<ReferenceCategory>,
}

impl CategorySet {
    pub fn new(categories: Vec<ReferenceCategory>) -> Self {
        Self { categories }
    }

    pub fn esg() -> Self {
        fn category(label: &str, phrases: &[&str]) -> ReferenceCategory {
            ReferenceCategory {
                label: label.to_string(),
                phrases: phrases.iter().map(|phrase| phrase.to_string()).collect(),
            }
        }

        Self::new(vec![
            category(
                "Environmental",
                &[
                    "environment",
                    "sustainability",
                    "carbon footprint",
                    "climate change",
                    "renewable energy",
                    "emissions",
                    "waste reduction",
                    "greenhouse gas",
                ],
            ),
            category(
                "Social",
                &[
                    "social responsibility",
                    "diversity",
                    "human rights",
                    "employee health and safety",
                    "community engagement",
                ],
            ),
            category(
                "Governance",
                &[
                    "governance",
                    "ethical",
                    "board oversight",
                    "anti-corruption",
                    "ESG",
                ],
            ),
        ])
    }

    /// `(category label, phrase)` pairs in declaration order.
    pub fn phrases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.categories.iter().flat_map(|category| {
            category
                .phrases
                .iter()
                .map(move |phrase| (category.label.as_str(), phrase.as_str()))
        })
    }

    pub fn phrase_count(&self) -> usize {
        self.categories
            .iter()
            .map(|category| category.phrases.len())
            .sum()
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self::esg()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_title: String,
    pub source_path: String,
    pub checksum: String,
    pub page_count: u32,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedPage {
    pub page: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub document: DocumentFingerprint,
    pub sentence_count: usize,
    pub results: Vec<ScoredSentence>,
    pub skipped_pages: Vec<SkippedPage>,
}

/// Font-size heuristic for heading lines. Informational only; scoring ignores it.
#[derive(Debug, Clone, Copy)]
pub struct HeadingRule {
    pub absolute_min_size: f32,
    pub relative_ratio: f32,
    pub max_words: usize,
}

impl Default for HeadingRule {
    fn default() -> Self {
        Self {
            absolute_min_size: 16.0,
            relative_ratio: 1.25,
            max_words: 12,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.4;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub max_file_bytes: u64,
    pub similarity_threshold: f32,
    pub heading: HeadingRule,
    pub ocr: Option<OcrEndpointConfig>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            heading: HeadingRule::default(),
            ocr: None,
        }
    }
}
