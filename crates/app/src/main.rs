use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use esg_highlight_core::embeddings::{EmbeddingEndpointConfig, DEFAULT_EMBEDDING_MODEL};
use esg_highlight_core::models::{DEFAULT_MAX_FILE_BYTES, DEFAULT_SIMILARITY_THRESHOLD};
use esg_highlight_core::ocr::parse_ocr_config;
use esg_highlight_core::{
    embedder_from_env, extract_document, extractor_from_options, load_category_set,
    shared_embedder, AnalysisOptions, Analyzer, BoundingBox, CategorySet, EmbedError,
    HighlightRequest, HttpEmbedder, OcrEndpointConfig, PdfPageSource, RelevanceScorer,
    RenderQuality, RenderSession, SharedEmbedder,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "esg-highlight", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    backends: BackendArgs,
}

#[derive(Args, Clone)]
struct BackendArgs {
    /// OCR service URL for pages without a text layer. Falls back to OCR_ENDPOINT.
    #[arg(long, global = true)]
    ocr_endpoint: Option<String>,

    /// OCR service API key. Falls back to OCR_API_KEY.
    #[arg(long, global = true)]
    ocr_api_key: Option<String>,

    /// OpenAI-style embeddings URL. Falls back to EMBEDDING_ENDPOINT, then to
    /// the built-in n-gram embedder.
    #[arg(long, global = true)]
    embedding_endpoint: Option<String>,

    /// Embedding service API key.
    #[arg(long, global = true)]
    embedding_api_key: Option<String>,

    /// Embedding model name sent to the embedding service.
    #[arg(long, global = true, default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Largest PDF accepted, in bytes.
    #[arg(long, global = true, env = "ESG_MAX_FILE_BYTES", default_value_t = DEFAULT_MAX_FILE_BYTES)]
    max_file_bytes: u64,
}

impl BackendArgs {
    fn ocr(&self) -> Option<OcrEndpointConfig> {
        match &self.ocr_endpoint {
            Some(endpoint) => Some(OcrEndpointConfig {
                endpoint: endpoint.clone(),
                api_key: self.ocr_api_key.clone(),
            }),
            None => parse_ocr_config(),
        }
    }

    fn embedder(&self) -> Result<SharedEmbedder, EmbedError> {
        match &self.embedding_endpoint {
            Some(endpoint) => Ok(Arc::new(HttpEmbedder::new(EmbeddingEndpointConfig {
                endpoint: endpoint.clone(),
                api_key: self.embedding_api_key.clone(),
                model: self.embedding_model.clone(),
            })?)),
            None => embedder_from_env(),
        }
    }

    fn options(&self, similarity_threshold: f32) -> AnalysisOptions {
        AnalysisOptions {
            max_file_bytes: self.max_file_bytes,
            similarity_threshold,
            ocr: self.ocr(),
            ..AnalysisOptions::default()
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print every sentence and heading of a PDF with its bounding box.
    Extract {
        #[arg(long)]
        file: PathBuf,
    },
    /// Score sentences against the reference categories.
    Analyze {
        /// Single PDF to analyze.
        #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
        file: Option<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Minimum cosine similarity, in [0, 1].
        #[arg(long, default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
        threshold: f32,
        /// JSON file of `[{"label": ..., "phrases": [...]}]` replacing the ESG set.
        #[arg(long, env = "ESG_CATEGORIES_FILE")]
        categories: Option<PathBuf>,
    },
    /// Place highlight boxes on a page laid out at a container width.
    Highlight {
        #[arg(long)]
        file: PathBuf,
        /// 1-based page number.
        #[arg(long)]
        page: u32,
        /// Box in PDF points as `x0,y0,x1,y1`. Repeat for several boxes.
        #[arg(long = "bbox", required = true)]
        boxes: Vec<BoundingBox>,
        /// Width in pixels the page is fitted to.
        #[arg(long, default_value = "800")]
        container_width: f32,
        /// Raster oversampling factor.
        #[arg(long, default_value = "2.0")]
        oversample: f32,
    },
    /// Print the configured limits and backends.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "esg-highlight boot"
    );

    let backends = cli.backends;
    let output = match cli.command {
        Command::Extract { file } => {
            // The blocking HTTP clients must live outside the async runtime.
            tokio::task::spawn_blocking(move || extract(&backends, file)).await??
        }
        Command::Analyze {
            file,
            folder,
            threshold,
            categories,
        } => {
            tokio::task::spawn_blocking(move || {
                analyze(&backends, file, folder, threshold, categories)
            })
            .await??
        }
        Command::Highlight {
            file,
            page,
            boxes,
            container_width,
            oversample,
        } => highlight(file, page, boxes, container_width, oversample).await?,
        Command::Health => {
            let http_embeddings = backends.embedding_endpoint.is_some()
                || std::env::var_os("EMBEDDING_ENDPOINT").is_some();
            json!({
                "status": "ok",
                "version": app_version,
                "max_file_bytes": backends.max_file_bytes,
                "similarity_threshold": DEFAULT_SIMILARITY_THRESHOLD,
                "ocr_enabled": backends.ocr().is_some(),
                "embedding_backend": if http_embeddings { "http" } else { "character-ngram" },
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn analyzer(
    backends: &BackendArgs,
    threshold: f32,
    categories: Option<PathBuf>,
) -> anyhow::Result<Analyzer> {
    let embedder = shared_embedder(|| backends.embedder())?;
    let categories = match categories {
        Some(path) => load_category_set(&path)
            .with_context(|| format!("reading categories from {}", path.display()))?,
        None => CategorySet::esg(),
    };

    let scorer = RelevanceScorer::new(embedder, categories, threshold)?;
    Ok(Analyzer::from_options(&backends.options(threshold), &scorer)?)
}

fn extract(backends: &BackendArgs, file: PathBuf) -> anyhow::Result<serde_json::Value> {
    let options = backends.options(DEFAULT_SIMILARITY_THRESHOLD);
    let extractor = extractor_from_options(&options)?;
    let (document, extraction) = extract_document(&extractor, &file, options.max_file_bytes)?;

    for skipped in &extraction.skipped_pages {
        warn!(page = skipped.page, reason = %skipped.reason, "skipped page");
    }

    Ok(json!({
        "document": document,
        "sentences": extraction.sentences,
        "skipped_pages": extraction.skipped_pages,
    }))
}

fn analyze(
    backends: &BackendArgs,
    file: Option<PathBuf>,
    folder: Option<PathBuf>,
    threshold: f32,
    categories: Option<PathBuf>,
) -> anyhow::Result<serde_json::Value> {
    let analyzer = analyzer(backends, threshold, categories)?;
    analyzer.scorer().warm_up()?;

    match (file, folder) {
        (Some(file), _) => {
            let report = analyzer.analyze(&file)?;
            info!(
                file = %file.display(),
                matches = report.results.len(),
                "analysis complete"
            );
            Ok(serde_json::to_value(report)?)
        }
        (None, Some(folder)) => {
            let report = analyzer.analyze_folder(&folder)?;
            if !report.skipped_files.is_empty() {
                warn!(
                    "skipped_files={} for folder={}",
                    report.skipped_files.len(),
                    folder.display()
                );
            }
            Ok(serde_json::to_value(report)?)
        }
        (None, None) => anyhow::bail!("either --file or --folder is required"),
    }
}

async fn highlight(
    file: PathBuf,
    page: u32,
    boxes: Vec<BoundingBox>,
    container_width: f32,
    oversample: f32,
) -> anyhow::Result<serde_json::Value> {
    let quality = RenderQuality {
        oversample,
        ..RenderQuality::default()
    };
    let source = PdfPageSource::open(&file)?;
    let mut session = RenderSession::new(container_width, quality);
    session.load(source).await?;

    for bbox in boxes {
        session.request_highlight(HighlightRequest { page, bbox })?;
    }
    session.render_all().await?;

    let state = session
        .page_state(page)
        .copied()
        .with_context(|| format!("page {page} was not rendered"))?;

    Ok(json!({
        "page": state,
        "canvas": state.canvas(session.quality()),
        "highlights": session.overlays(),
    }))
}
