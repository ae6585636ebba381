use crate::error::EmbedError;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use url::Url;

const DEFAULT: usize = 512;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

pub trait Embedder {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// One result per input, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Vec<Result<Vec<f32>, EmbedError>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Handle shared read-only by every analysis in the process.
pub type SharedEmbedder = Arc<dyn Embedder + Send + Sync>;

static SHARED: OnceCell<SharedEmbedder> = OnceCell::new();

/// Returns the process-wide embedder, running `init` only on first use.
///
/// Concurrent first callers block on the same initialization; afterwards the
/// handle is frozen and reads take no lock.
pub fn shared_embedder<F>(init: F) -> Result<SharedEmbedder, EmbedError>
where
    F: FnOnce() -> Result<SharedEmbedder, EmbedError>,
{
    SHARED.get_or_try_init(init).cloned()
}

/// Picks the HTTP backend when `EMBEDDING_ENDPOINT` is set, else the
/// deterministic n-gram embedder.
pub fn embedder_from_env() -> Result<SharedEmbedder, EmbedError> {
    match parse_embedding_config() {
        Some(config) => Ok(Arc::new(HttpEmbedder::new(config)?)),
        None => Ok(Arc::new(CharacterNgramEmbedder::default())),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let normalized = normalize_for_ngrams(text);
        let chars: Vec<char> = normalized.chars().collect();

        if chars.len() < 3 {
            return Ok(vector);
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

/// Lowercases, keeps alphanumerics, and pads words so edge trigrams exist.
fn normalize_for_ngrams(text: &str) -> String {
    let words = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>();
    let joined = words.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        joined
    } else {
        format!(" {joined} ")
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
}

/// Reads `EMBEDDING_ENDPOINT`, `EMBEDDING_API_KEY` and `EMBEDDING_MODEL`.
pub fn parse_embedding_config() -> Option<EmbeddingEndpointConfig> {
    let endpoint = std::env::var("EMBEDDING_ENDPOINT").ok()?;
    let endpoint = endpoint.trim().to_string();
    if endpoint.is_empty() {
        return None;
    }

    let non_empty = |name: &str| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    Some(EmbeddingEndpointConfig {
        endpoint,
        api_key: non_empty("EMBEDDING_API_KEY"),
        model: non_empty("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
    })
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Sentence-transformer model served behind an OpenAI-style `/embeddings` API.
///
/// Every text goes out in its own request, so an input the service rejects
/// only loses its own embedding.
pub struct HttpEmbedder {
    config: EmbeddingEndpointConfig,
    client: Client,
    dimensions: OnceCell<usize>,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingEndpointConfig) -> Result<Self, EmbedError> {
        Url::parse(&config.endpoint).map_err(|error| {
            EmbedError::Unavailable(format!("invalid endpoint {}: {error}", config.endpoint))
        })?;
        Ok(Self {
            config,
            client: Client::new(),
            dimensions: OnceCell::new(),
        })
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut request = self.client.post(&self.config.endpoint).json(&EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        });
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(EmbedError::BackendResponse {
                backend: self.config.endpoint.clone(),
                details: response.status().to_string(),
            });
        }

        let parsed: EmbeddingResponse = response.json()?;
        order_embeddings(parsed, texts.len()).map_err(|details| EmbedError::BackendResponse {
            backend: self.config.endpoint.clone(),
            details,
        })
    }
}

fn order_embeddings(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>, String> {
    if response.data.len() != expected {
        return Err(format!(
            "expected {expected} embeddings, got {}",
            response.data.len()
        ));
    }

    let mut ordered: Vec<Option<Vec<f32>>> = vec![None; expected];
    for (position, item) in response.data.into_iter().enumerate() {
        let slot = item.index.unwrap_or(position);
        match ordered.get_mut(slot) {
            Some(entry) if entry.is_none() => *entry = Some(item.embedding),
            _ => return Err(format!("embedding index {slot} is out of range or repeated")),
        }
    }

    ordered
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| "embedding response has gaps".to_string())
}

impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.get().copied().unwrap_or(0)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.request(&[text])?;
        let vector = vectors.pop().ok_or_else(|| EmbedError::BackendResponse {
            backend: self.config.endpoint.clone(),
            details: "empty embedding list".to_string(),
        })?;
        let _ = self.dimensions.set(vector.len());
        Ok(vector)
    }
}

/// Serializes calls into a backend whose inference is not reentrant.
pub struct SerializedEmbedder<E> {
    inner: Mutex<E>,
    dimensions: usize,
}

impl<E: Embedder> SerializedEmbedder<E> {
    pub fn new(inner: E) -> Self {
        let dimensions = inner.dimensions();
        Self {
            inner: Mutex::new(inner),
            dimensions,
        }
    }
}

impl<E: Embedder> Embedder for SerializedEmbedder<E> {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| EmbedError::Unavailable("embedding backend lock poisoned".to_string()))?;
        guard.embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Vec<Result<Vec<f32>, EmbedError>> {
        match self.inner.lock() {
            Ok(guard) => guard.embed_batch(texts),
            Err(_) => texts
                .iter()
                .map(|_| {
                    Err(EmbedError::Unavailable(
                        "embedding backend lock poisoned".to_string(),
                    ))
                })
                .collect(),
        }
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }

    dot / (left_norm * right_norm)
}
