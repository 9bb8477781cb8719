//! Feature-hashing embedding model
//!
//! A dependency-free encoder that maps lowercase word unigrams and bigrams
//! into a fixed number of signed buckets. Texts sharing vocabulary land close
//! together, which is enough for lexical retrieval and for exercising the full
//! pipeline without downloading transformer weights.

use std::sync::Arc;

use crate::domain::errors::EncoderError;
use crate::domain::ports::{EmbeddingModel, ModelLoader};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

fn fnv1a(parts: &[&str]) -> u64 {
    let mut hash = FNV_OFFSET;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hash ^= u64::from(b' ');
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        for byte in part.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

/// Deterministic bag-of-words embedding model
#[derive(Debug, Clone)]
pub struct HashingEmbeddingModel {
    dimensions: usize,
}

impl HashingEmbeddingModel {
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Embed a single text. Empty text yields a uniform vector so that
    /// normalization stays defined.
    pub fn embed_text(&self, text: &str, normalize: bool) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        for (i, token) in tokens.iter().enumerate() {
            self.accumulate(&mut embedding, &[token.as_str()], 1.0);
            if let Some(next) = tokens.get(i + 1) {
                self.accumulate(&mut embedding, &[token.as_str(), next.as_str()], 0.5);
            }
        }

        if normalize {
            normalize_l2(&mut embedding);
        }
        embedding
    }

    #[allow(clippy::cast_possible_truncation)]
    fn accumulate(&self, embedding: &mut [f32], parts: &[&str], weight: f32) {
        let hash = fnv1a(parts);
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        embedding[bucket] += sign * weight;
    }
}

/// Scale to unit length, falling back to a uniform vector for zero input.
#[allow(clippy::cast_possible_truncation)]
fn normalize_l2(embedding: &mut [f32]) {
    // f64 accumulation keeps the norm stable across hundreds of dimensions
    let magnitude = embedding
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt() as f32;

    if magnitude > 1e-10 {
        for val in embedding.iter_mut() {
            *val /= magnitude;
        }
    } else if !embedding.is_empty() {
        let uniform = 1.0 / (embedding.len() as f32).sqrt();
        embedding.fill(uniform);
    }
}

impl EmbeddingModel for HashingEmbeddingModel {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>, EncoderError> {
        Ok(texts.iter().map(|t| self.embed_text(t, normalize)).collect())
    }
}

/// Loader for [`HashingEmbeddingModel`]. Loading never fails.
#[derive(Debug, Clone)]
pub struct HashingModelLoader {
    dimensions: usize,
}

impl HashingModelLoader {
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl ModelLoader for HashingModelLoader {
    fn model_name(&self) -> &str {
        "feature-hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EncoderError> {
        Ok(Arc::new(HashingEmbeddingModel::new(self.dimensions)))
    }
}
