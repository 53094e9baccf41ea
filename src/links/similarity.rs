//! Similarity measures used by the clustering engine.
//!
//! # Algorithm Details
//! - Distance metric: Cosine similarity, accumulated in `f64`
//! - Degenerate input: a zero vector has similarity 0 with everything
//! - Edge threshold: grows with the evidence (vector counts) behind both
//!   centroids and tends to the configured pair maximum

/// Computes cosine similarity between two vectors.
///
/// # Arguments
/// * `a` - First vector
/// * `b` - Second vector
///
/// # Returns
/// * Cosine similarity clamped to [-1, 1], where 1 is most similar
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let (dot_product, norm_a, norm_b) = a.iter().zip(b.iter()).fold(
        (0.0f64, 0.0f64, 0.0f64),
        |(dot, na, nb), (&x, &y)| {
            let (x, y) = (f64::from(x), f64::from(y));
            (dot + x * y, na + x * x, nb + y * y)
        },
    );

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Edge threshold for two centroids backed by `k1` and `k2` vectors.
///
/// With `t = cluster_threshold` and `p = pair_maximum`:
///
/// ```text
/// s = 1 / sqrt((1 + (1/t² - 1)/k1) * (1 + (1/t² - 1)/k2))
/// threshold = t² + (p - t²) / (1 - t²) * (s - t²)
/// ```
///
/// Two single-vector subclusters only need `t²`; the bar rises towards `p`
/// as both centroids gather evidence. A count of zero is treated as one.
pub fn evidence_threshold(k1: usize, k2: usize, cluster_threshold: f64, pair_maximum: f64) -> f64 {
    let floor = cluster_threshold * cluster_threshold;
    let prior = 1.0 / floor - 1.0;

    let spread = |k: usize| 1.0 + prior / k.max(1) as f64;
    let s = 1.0 / (spread(k1) * spread(k2)).sqrt();

    floor + (pair_maximum - floor) / (1.0 - floor) * (s - floor)
}
