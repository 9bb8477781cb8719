//! Score conversion, normalization and per-document dedup.

use std::collections::HashSet;

use crate::domain::models::SearchHit;

/// Convert an L2 distance into a similarity in `(0, 1]`.
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Min-max rescale positive scores into `[0, 1]`, in place.
///
/// Non-positive (and non-finite) scores become `0.0`. When every positive
/// score is equal they all become `1.0`.
pub fn normalize_scores(scores: &mut [f32]) {
    let positives = scores.iter().copied().filter(|s| s.is_finite() && *s > 0.0);
    let (min, max) = positives.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s), hi.max(s))
    });

    if !min.is_finite() {
        scores.fill(0.0);
        return;
    }

    let range = max - min;
    for score in scores.iter_mut() {
        *score = if !(score.is_finite() && *score > 0.0) {
            0.0
        } else if range > f32::EPSILON {
            (*score - min) / range
        } else {
            1.0
        };
    }
}

/// Keep the first hit per document, up to `limit` documents.
pub fn dedup_by_document(hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    let mut seen = HashSet::with_capacity(hits.len());
    hits.into_iter()
        .filter(|hit| seen.insert(hit.document_id))
        .take(limit)
        .collect()
}

/// Dedup, truncate, then normalize the surviving scores.
pub fn finalize_hits(hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    let mut hits = dedup_by_document(hits, limit);
    let mut scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
    normalize_scores(&mut scores);
    for (hit, score) in hits.iter_mut().zip(scores) {
        hit.score = score;
    }
    hits
}
