//! Chunking, representative sampling and mean pooling.
//!
//! Long documents are never encoded in full: the text is cut into fixed-size
//! word chunks and an evenly strided subset is embedded, then averaged into a
//! single document vector.

use crate::domain::models::SamplingConfig;

/// Split on whitespace and group into chunks of `chunk_words`, in order.
pub fn chunk_words(text: &str, chunk_words: usize) -> Vec<String> {
    let size = chunk_words.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();
    words.chunks(size).map(|chunk| chunk.join(" ")).collect()
}

/// Pick at most `sample_chunks` chunks at an even stride starting at 0.
///
/// With `n` chunks and `n > sample_chunks` the stride is
/// `max(1, n / sample_chunks)` and the selection is truncated to exactly
/// `sample_chunks` items. Otherwise every chunk is kept.
pub fn select_samples(chunks: Vec<String>, sample_chunks: usize) -> Vec<String> {
    let limit = sample_chunks.max(1);
    if chunks.len() <= limit {
        return chunks;
    }
    let step = (chunks.len() / limit).max(1);
    chunks.into_iter().step_by(step).take(limit).collect()
}

/// Chunk and sample in one step. Empty text yields no chunks.
pub fn sample_chunks(text: &str, config: &SamplingConfig) -> Vec<String> {
    select_samples(chunk_words(text, config.chunk_words), config.sample_chunks)
}

/// Element-wise mean of equal-length vectors.
///
/// Accumulates in `f64` and narrows to `f32`. Returns `None` for an empty
/// input or ragged widths.
#[allow(clippy::cast_possible_truncation)]
pub fn mean_pool(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let width = first.len();
    if vectors.iter().any(|v| v.len() != width) {
        return None;
    }

    let mut sums = vec![0.0f64; width];
    for vector in vectors {
        for (sum, value) in sums.iter_mut().zip(vector) {
            *sum += f64::from(*value);
        }
    }
    let count = vectors.len() as f64;
    Some(sums.into_iter().map(|s| (s / count) as f32).collect())
}

/// Leading text with whitespace collapsed, cut at a char boundary.
pub fn snippet(text: &str, max_chars: usize) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || max_chars == 0 {
        return None;
    }
    Some(collapsed.chars().take(max_chars).collect())
}
