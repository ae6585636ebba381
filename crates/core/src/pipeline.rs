use crate::error::{AnalysisError, ExtractError, Result};
use crate::extractor::{Extraction, LopdfExtractor, PdfExtractor};
use crate::models::{AnalysisOptions, AnalysisReport, DocumentFingerprint};
use crate::ocr::HttpOcrEngine;
use crate::scorer::RelevanceScorer;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, ExtractError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Rejects files above `limit` bytes before any parsing happens.
pub fn check_file_size(path: &Path, limit: u64) -> Result<u64, ExtractError> {
    let size = fs::metadata(path)?.len();
    if size > limit {
        return Err(ExtractError::FileTooLarge { size, limit });
    }
    Ok(size)
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderReport {
    pub reports: Vec<AnalysisReport>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Extraction followed by relevance scoring for whole documents.
pub struct Analyzer<E = LopdfExtractor> {
    extractor: E,
    scorer: RelevanceScorer,
    max_file_bytes: u64,
}

/// The lopdf extractor, with OCR when an endpoint is configured.
pub fn extractor_from_options(options: &AnalysisOptions) -> Result<LopdfExtractor, ExtractError> {
    let extractor = LopdfExtractor::new(options.heading);
    Ok(match &options.ocr {
        Some(config) => extractor.with_ocr(Box::new(HttpOcrEngine::new(config.clone())?)),
        None => extractor,
    })
}

/// Sentences and fingerprint for one file, without scoring.
pub fn extract_document<E: PdfExtractor>(
    extractor: &E,
    path: &Path,
    max_file_bytes: u64,
) -> Result<(DocumentFingerprint, Extraction)> {
    check_file_size(path, max_file_bytes)?;

    let extraction = extractor.extract(path)?;
    let fingerprint = build_document_fingerprint(path, extraction.page_count)?;

    info!(
        document = %fingerprint.document_title,
        pages = extraction.page_count,
        sentences = extraction.sentences.len(),
        skipped_pages = extraction.skipped_pages.len(),
        "document extracted"
    );
    Ok((fingerprint, extraction))
}

impl Analyzer<LopdfExtractor> {
    /// Builds the extractor from `options` and rebinds `scorer` to the
    /// configured threshold.
    pub fn from_options(options: &AnalysisOptions, scorer: &RelevanceScorer) -> Result<Self> {
        Ok(Self::new(
            extractor_from_options(options)?,
            scorer.with_threshold(options.similarity_threshold)?,
            options.max_file_bytes,
        ))
    }
}

impl<E: PdfExtractor> Analyzer<E> {
    pub fn new(extractor: E, scorer: RelevanceScorer, max_file_bytes: u64) -> Self {
        Self {
            extractor,
            scorer,
            max_file_bytes,
        }
    }

    pub fn scorer(&self) -> &RelevanceScorer {
        &self.scorer
    }

    pub fn extract(&self, path: &Path) -> Result<(DocumentFingerprint, Extraction)> {
        extract_document(&self.extractor, path, self.max_file_bytes)
    }

    /// Extracts and scores one file. A document with no sentences at all,
    /// native or OCR, is an error rather than an empty report.
    pub fn analyze(&self, path: &Path) -> Result<AnalysisReport> {
        let (document, extraction) = self.extract(path)?;
        if extraction.sentences.is_empty() {
            return Err(AnalysisError::NoText(path.display().to_string()));
        }

        let results = self.scorer.score(&extraction.sentences)?;
        info!(
            document = %document.document_title,
            matches = results.len(),
            threshold = self.scorer.threshold(),
            "document scored"
        );

        Ok(AnalysisReport {
            document,
            sentence_count: extraction.sentences.len(),
            results,
            skipped_pages: extraction.skipped_pages,
        })
    }

    /// Analyzes every PDF under `folder`. Files that fail are reported in
    /// `skipped_files`; only an empty folder fails the whole run.
    pub fn analyze_folder(&self, folder: &Path) -> Result<FolderReport> {
        let files = discover_pdf_files(folder);

        if files.is_empty() {
            return Err(AnalysisError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut reports = Vec::new();
        let mut skipped_files = Vec::new();

        for path in files {
            match self.analyze(&path) {
                Ok(report) => reports.push(report),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping pdf");
                    skipped_files.push(SkippedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(FolderReport {
            reports,
            skipped_files,
        })
    }
}

fn build_document_fingerprint(path: &Path, page_count: u32) -> Result<DocumentFingerprint> {
    let checksum = digest_file(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| AnalysisError::MissingFileName(path.display().to_string()))?;

    Ok(DocumentFingerprint {
        document_title: name.to_string(),
        source_path: path.to_string_lossy().to_string(),
        checksum,
        page_count,
        analyzed_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{CharacterNgramEmbedder, SharedEmbedder};
    use crate::extractor::tests::write_pdf;
    use crate::models::{
        CategorySet, ReferenceCategory, DEFAULT_MAX_FILE_BYTES, DEFAULT_SIMILARITY_THRESHOLD,
    };
    use std::fs::{self, File};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn analyzer() -> Analyzer {
        let embedder: SharedEmbedder = Arc::new(CharacterNgramEmbedder::default());
        let scorer = RelevanceScorer::new(embedder, CategorySet::esg(), DEFAULT_SIMILARITY_THRESHOLD)
            .expect("valid scorer");
        Analyzer::from_options(&AnalysisOptions::default(), &scorer).expect("analyzer")
    }

    fn esg_report(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        write_pdf(
            path,
            &[
                &[
                    (72, 720, 24, "CLIMATE STRATEGY"),
                    (
                        72,
                        690,
                        12,
                        "We reduced carbon emissions by 30%. Lunch was served at noon.",
                    ),
                ],
                &[(72, 700, 12, "Board oversight improved")],
            ],
        )
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        fs::write(base.join("notes.txt"), b"not a pdf")?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        Ok(())
    }

    #[test]
    fn analysis_labels_relevant_sentences() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("esg-report.pdf");
        esg_report(&path)?;

        let report = analyzer().analyze(&path)?;

        assert_eq!(report.document.document_title, "esg-report.pdf");
        assert_eq!(report.document.page_count, 2);
        assert_eq!(report.sentence_count, 4);
        assert!(report.skipped_pages.is_empty());

        let labelled: Vec<_> = report
            .results
            .iter()
            .map(|result| (result.sentence.text.as_str(), result.category.as_str()))
            .collect();
        assert_eq!(labelled[0], ("Board oversight improved", "Governance"));
        assert!(labelled.contains(&("We reduced carbon emissions by 30%.", "Environmental")));
        assert!(!labelled.iter().any(|(text, _)| text.starts_with("Lunch")));

        assert!(report
            .results
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));
        assert!(report
            .results
            .iter()
            .all(|result| (0.4..=1.0).contains(&result.score)));
        Ok(())
    }

    #[test]
    fn single_sentence_matches_custom_category() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("one-line.pdf");
        write_pdf(&path, &[&[(72, 700, 12, "We reduced carbon emissions by 30%.")]])?;

        let categories = CategorySet::new(vec![ReferenceCategory {
            label: "Environmental".to_string(),
            phrases: vec!["carbon emissions reduction".to_string()],
        }]);
        let embedder: SharedEmbedder = Arc::new(CharacterNgramEmbedder::default());
        let scorer = RelevanceScorer::new(embedder, categories, 0.4)?;
        let analyzer = Analyzer::new(LopdfExtractor::default(), scorer, DEFAULT_MAX_FILE_BYTES);

        let report = analyzer.analyze(&path)?;
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].category, "Environmental");
        assert!(report.results[0].score >= 0.4);
        Ok(())
    }

    #[test]
    fn repeated_analysis_is_identical() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("esg-report.pdf");
        esg_report(&path)?;

        let analyzer = analyzer();
        let first = analyzer.analyze(&path)?;
        let second = analyzer.analyze(&path)?;

        assert_eq!(first.results, second.results);
        assert_eq!(first.document.checksum, second.document.checksum);
        Ok(())
    }

    #[test]
    fn document_without_text_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blank.pdf");
        write_pdf(&path, &[&[]])?;

        let result = analyzer().analyze(&path);
        assert!(matches!(result, Err(AnalysisError::NoText(_))));
        Ok(())
    }

    #[test]
    fn oversized_file_is_rejected_before_parsing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("big.pdf");
        fs::write(&path, vec![b' '; 2048])?;

        let analyzer = Analyzer::new(LopdfExtractor::default(), analyzer().scorer().clone(), 1024);
        let result = analyzer.analyze(&path);
        assert!(matches!(
            result,
            Err(AnalysisError::Extract(ExtractError::FileTooLarge {
                size: 2048,
                limit: 1024
            }))
        ));
        Ok(())
    }

    #[test]
    fn extraction_needs_no_scorer() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("report.pdf");
        esg_report(&path)?;

        let extractor = extractor_from_options(&AnalysisOptions::default())?;
        let (document, extraction) = extract_document(&extractor, &path, DEFAULT_MAX_FILE_BYTES)?;
        assert_eq!(document.document_title, "report.pdf");
        assert_eq!(document.page_count, 2);
        assert_eq!(extraction.sentences.len(), 4);

        let result = extract_document(&extractor, &path, 16);
        assert!(matches!(
            result,
            Err(AnalysisError::Extract(ExtractError::FileTooLarge { limit: 16, .. }))
        ));
        Ok(())
    }

    #[test]
    fn folder_analysis_skips_unreadable_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        esg_report(&dir.path().join("good.pdf"))?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;

        let report = analyzer().analyze_folder(dir.path())?;

        assert_eq!(report.reports.len(), 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        Ok(())
    }

    #[test]
    fn empty_folder_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = analyzer().analyze_folder(dir.path());
        assert!(matches!(result, Err(AnalysisError::InvalidArgument(_))));
        Ok(())
    }
}
