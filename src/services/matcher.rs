//! Descriptor matching
//!
//! Compares a captured face embedding against an enrolled reference
//! descriptor. Confidence is `max(0, 1 - euclidean_distance)`: a
//! monotonic transform of distance for ranking and thresholding, not a
//! calibrated probability. Both vectors must come from the same
//! embedding model; unequal dimensionality is a programming error
//! upstream, not a runtime condition.

/// Euclidean distance between two embeddings of equal dimensionality
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "descriptor dimensionality mismatch");
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

/// Match confidence in [0, 1]. Identical descriptors score 1.0;
/// anything at distance >= 1 floors at 0.0.
pub fn confidence(sample: &[f32], enrolled: &[f32]) -> f32 {
    (1.0 - euclidean_distance(sample, enrolled)).max(0.0)
}
