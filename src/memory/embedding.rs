//! Text embedding backends for the semantic index.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::MemoryError;

/// Maps text to fixed-size vectors.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError>;

    fn name(&self) -> &'static str;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        self.embed(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Storage("no embedding generated".to_string()))
    }
}

/// Tokens carried by every indexed entry, or too common to discriminate.
const STOPWORDS: &[&str] = &[
    "the", "and", "or", "of", "to", "in", "for", "is", "on", "with", "an", "it", "this", "that",
    "task", "agent", "result",
];

/// Deterministic bag-of-words embedder using feature hashing.
///
/// Each lowercased alphanumeric token (two characters or more, stopwords
/// excluded) increments one bucket chosen by its FNV-1a hash; the vector is
/// then L2-normalised. All weights are non-negative, so two texts score
/// above zero exactly when they share a bucket.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in tokenize(text) {
            let bucket = (fnv1a(token.as_bytes()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn name(&self) -> &'static str {
        "hashing"
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

/// Neural embedder backed by fastembed (BGE-small-en v1.5).
///
/// The model runs on the blocking pool; it is moved out of the mutex for
/// the duration of a batch and put back afterwards.
pub struct FastEmbedder {
    model: Arc<Mutex<Option<TextEmbedding>>>,
}

impl std::fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("model", &"BGESmallENV15")
            .finish()
    }
}

impl FastEmbedder {
    /// Load the model, downloading it on first use.
    pub async fn initialize() -> Result<Self, MemoryError> {
        info!("Initializing fastembed model (BG-Small-En-V1.5)...");
        let model = tokio::task::spawn_blocking(|| {
            let mut options = InitOptions::new(EmbeddingModel::BGESmallENV15);
            options.show_download_progress = false;
            TextEmbedding::try_new(options)
        })
        .await
        .map_err(MemoryError::storage)?
        .map_err(|e| MemoryError::Storage(format!("embedding model failed to load: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(Some(model))),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        let mut guard = self.model.lock().await;
        let mut owned_model = guard
            .take()
            .ok_or_else(|| MemoryError::Storage("embedding model unavailable".to_string()))?;

        let (embeddings, returned_model) = tokio::task::spawn_blocking(move || {
            let res = owned_model.embed(texts, None);
            (res, owned_model)
        })
        .await
        .map_err(MemoryError::storage)?;

        *guard = Some(returned_model);
        embeddings.map_err(|e| MemoryError::Storage(format!("embedding failed: {e}")))
    }

    fn name(&self) -> &'static str {
        "fastembed"
    }
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
