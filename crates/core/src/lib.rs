pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod fonts;
pub mod layout;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod scorer;
pub mod sentences;
pub mod viewer;

pub use embeddings::{
    cosine_similarity, embedder_from_env, shared_embedder, CharacterNgramEmbedder, Embedder,
    HttpEmbedder, SerializedEmbedder, SharedEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{AnalysisError, EmbedError, ExtractError, ScoreError, ViewerError};
pub use extractor::{page_geometries, Extraction, LopdfExtractor, PdfExtractor};
pub use models::{
    AnalysisOptions, AnalysisReport, BoundingBox, CategorySet, DocumentFingerprint, HeadingRule,
    HighlightRequest, OcrEndpointConfig, PageGeometry, PageSize, ReferenceCategory, ScoredSentence,
    SentenceRecord, SkippedPage,
};
pub use ocr::{HttpOcrEngine, OcrDocument, OcrEngine};
pub use pipeline::{
    discover_pdf_files, extract_document, extractor_from_options, Analyzer, FolderReport, SkippedPdf,
};
pub use scorer::{load_category_set, RelevanceScorer};
pub use viewer::{PageRenderer, PdfPageSource, RenderQuality, RenderSession};
