use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to open pdf: {0}")]
    Open(String),

    #[error("file is {size} bytes, above the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("page {page} could not be read: {reason}")]
    Page { page: u32, reason: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("OCR failed: {0}")]
    Ocr(String),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("reference phrase {phrase:?} could not be embedded: {source}")]
    ReferenceEmbedding {
        phrase: String,
        #[source]
        source: EmbedError,
    },

    #[error("no reference phrases configured")]
    EmptyCategories,

    #[error("similarity threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("category file is invalid: {0}")]
    CategoryFile(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum ViewerError {
    #[error("page {page} does not exist, document has {page_count} page(s)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("malformed highlight box: {0}")]
    MalformedBox(String),

    #[error("page {page} failed to load: {reason}")]
    PageLoad { page: u32, reason: String },

    #[error("no document is loaded")]
    NoDocument,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error("no text found in {0}")]
    NoText(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
