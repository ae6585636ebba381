use crate::embeddings::{cosine_similarity, SharedEmbedder};
use crate::error::ScoreError;
use crate::models::{CategorySet, ScoredSentence, SentenceRecord};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct ReferenceEmbedding {
    label: String,
    vector: Vec<f32>,
}

/// Keeps the sentences whose best cosine similarity to any reference phrase
/// reaches the threshold, labelled with that phrase's category.
#[derive(Clone)]
pub struct RelevanceScorer {
    embedder: SharedEmbedder,
    categories: Arc<CategorySet>,
    threshold: f32,
    references: Arc<OnceCell<Vec<ReferenceEmbedding>>>,
}

impl RelevanceScorer {
    pub fn new(
        embedder: SharedEmbedder,
        categories: CategorySet,
        threshold: f32,
    ) -> Result<Self, ScoreError> {
        validate_threshold(threshold)?;
        if categories
            .phrases()
            .all(|(_, phrase)| phrase.trim().is_empty())
        {
            return Err(ScoreError::EmptyCategories);
        }

        Ok(Self {
            embedder,
            categories: Arc::new(categories),
            threshold,
            references: Arc::new(OnceCell::new()),
        })
    }

    /// Same embedder and cached reference embeddings, different threshold.
    pub fn with_threshold(&self, threshold: f32) -> Result<Self, ScoreError> {
        validate_threshold(threshold)?;
        Ok(Self {
            threshold,
            ..self.clone()
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    /// Embeds the reference phrases now instead of on the first `score` call.
    pub fn warm_up(&self) -> Result<(), ScoreError> {
        self.references().map(|_| ())
    }

    fn references(&self) -> Result<&[ReferenceEmbedding], ScoreError> {
        self.references
            .get_or_try_init(|| {
                let pairs: Vec<(&str, &str)> = self
                    .categories
                    .phrases()
                    .filter(|(_, phrase)| !phrase.trim().is_empty())
                    .collect();
                let texts: Vec<&str> = pairs.iter().map(|(_, phrase)| *phrase).collect();

                let vectors = self.embedder.embed_batch(&texts);
                let references = pairs
                    .into_iter()
                    .zip(vectors)
                    .map(|((label, phrase), vector)| {
                        vector
                            .map(|vector| ReferenceEmbedding {
                                label: label.to_string(),
                                vector,
                            })
                            .map_err(|source| ScoreError::ReferenceEmbedding {
                                phrase: phrase.to_string(),
                                source,
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                debug!(phrases = references.len(), "reference phrases embedded");
                Ok(references)
            })
            .map(Vec::as_slice)
    }

    /// Scores `sentences`; output is ordered by descending score, ties in
    /// document order.
    pub fn score(&self, sentences: &[SentenceRecord]) -> Result<Vec<ScoredSentence>, ScoreError> {
        let references = self.references()?;

        let candidates: Vec<&SentenceRecord> = sentences
            .iter()
            .filter(|sentence| !sentence.text.trim().is_empty())
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = candidates.iter().map(|s| s.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts);

        let mut results = Vec::new();
        for (sentence, vector) in candidates.into_iter().zip(vectors) {
            let vector = match vector {
                Ok(vector) => vector,
                Err(error) => {
                    warn!(page = sentence.page, %error, "sentence could not be embedded, treating as no match");
                    continue;
                }
            };

            let Some((score, label)) = best_match(&vector, references) else {
                continue;
            };

            if score >= self.threshold {
                results.push(ScoredSentence {
                    sentence: sentence.clone(),
                    score,
                    category: label.to_string(),
                });
            }
        }

        results.sort_by(|left, right| right.score.total_cmp(&left.score));
        Ok(results)
    }
}

/// Highest similarity, clamped into `[0, 1]`. Only a strictly greater score
/// replaces the current best, so ties go to the first declared phrase.
fn best_match<'a>(vector: &[f32], references: &'a [ReferenceEmbedding]) -> Option<(f32, &'a str)> {
    let mut best: Option<(f32, &str)> = None;
    for reference in references {
        let score = cosine_similarity(vector, &reference.vector).clamp(0.0, 1.0);
        if best.map_or(true, |(current, _)| score > current) {
            best = Some((score, reference.label.as_str()));
        }
    }
    best
}

fn validate_threshold(threshold: f32) -> Result<(), ScoreError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ScoreError::InvalidThreshold(threshold))
    }
}

/// Loads a category set from JSON: `[{"label": "...", "phrases": ["..."]}]`.
pub fn load_category_set(path: &Path) -> Result<CategorySet, ScoreError> {
    let raw = std::fs::read_to_string(path)?;
    let set: CategorySet = serde_json::from_str(&raw)?;
    if set.phrase_count() == 0 {
        return Err(ScoreError::EmptyCategories);
    }
    Ok(set)
}
