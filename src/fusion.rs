//! Dense ranking and reciprocal rank fusion.
//!
//! Fusion only looks at rank positions, so BM25 scores and cosine
//! similarities never need to share a scale.

use std::collections::HashMap;

use rayon::prelude::*;

/// RRF damping constant.
pub const RRF_K: f32 = 60.0;

/// Added to the norm product so zero vectors score 0 instead of NaN.
pub const COSINE_EPSILON: f32 = 1e-8;

/// `dot(a, b) / (|a| * |b| + eps)`.
///
/// Vectors of different lengths are compared over their common prefix;
/// callers are expected to keep dimensions equal.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt() + COSINE_EPSILON)
}

/// Rank every stored vector by cosine similarity to `query`, best first.
///
/// Equal similarities are ordered by chunk id.
pub fn rank_by_cosine(
    query: &[f32],
    vectors: &HashMap<String, Vec<f32>>,
    top_k: usize,
) -> Vec<(String, f32)> {
    let mut ranked: Vec<(String, f32)> = vectors
        .par_iter()
        .map(|(id, vector)| (id.clone(), cosine_similarity(query, vector)))
        .collect();

    sort_ranked(&mut ranked);
    ranked.truncate(top_k);
    ranked
}

/// Merge two rankings with reciprocal rank fusion.
///
/// An entry at zero-based position `i` contributes `1 / (k + i + 1)`; a
/// chunk's fused score is the sum over the rankings that contain it.
/// The result is symmetric in its two inputs.
///
/// # Examples
///
/// ```
/// use docsift::fusion::{reciprocal_rank_fusion, RRF_K};
///
/// let sparse = vec!["a".to_string(), "b".to_string()];
/// let dense = vec!["b".to_string(), "c".to_string()];
/// let fused = reciprocal_rank_fusion(&sparse, &dense, RRF_K, 10);
/// assert_eq!(fused[0].0, "b");
/// assert_eq!(fused.len(), 3);
/// ```
pub fn reciprocal_rank_fusion(
    sparse: &[String],
    dense: &[String],
    k: f32,
    top_k: usize,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<&str, f32> = HashMap::new();
    for ranking in [sparse, dense] {
        for (i, id) in ranking.iter().enumerate() {
            *scores.entry(id.as_str()).or_insert(0.0) +=
                1.0 / (k + i as f32 + 1.0);
        }
    }

    let mut fused: Vec<(String, f32)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    sort_ranked(&mut fused);
    fused.truncate(top_k);
    fused
}

fn sort_ranked(ranked: &mut [(String, f32)]) {
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn fused_score_sums_both_rankings() {
        let sparse = ids(&["x", "s1", "s2", "s3", "s4"]);
        let dense = ids(&["d0", "d1", "d2", "d3", "x"]);
        let fused = reciprocal_rank_fusion(&sparse, &dense, RRF_K, 10);

        assert_eq!(fused[0].0, "x");
        let expected = 1.0 / 61.0 + 1.0 / 65.0;
        assert!((fused[0].1 - expected).abs() < 1e-6);
        assert!((fused[0].1 - 0.03177).abs() < 1e-4);
    }

    #[test]
    fn single_ranking_members_still_score() {
        let fused =
            reciprocal_rank_fusion(&ids(&["only"]), &[], RRF_K, 10);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].1 - 1.0 / 61.0).abs() < 1e-7);
    }

    #[test]
    fn empty_inputs_fuse_to_nothing() {
        assert!(reciprocal_rank_fusion(&[], &[], RRF_K, 10).is_empty());
    }

    #[test]
    fn fusion_respects_top_k() {
        let fused = reciprocal_rank_fusion(
            &ids(&["a", "b", "c"]),
            &ids(&["d", "e"]),
            RRF_K,
            2,
        );
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn cosine_of_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        let score = cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(score, 0.0);
        assert!(!score.is_nan());
    }

    #[test]
    fn rank_by_cosine_orders_descending() {
        let vectors = HashMap::from([
            ("far".to_string(), vec![0.0, 1.0]),
            ("near".to_string(), vec![1.0, 0.1]),
            ("exact".to_string(), vec![2.0, 0.0]),
        ]);
        let ranked = rank_by_cosine(&[1.0, 0.0], &vectors, 10);
        let order: Vec<_> = ranked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["exact", "near", "far"]);

        assert_eq!(rank_by_cosine(&[1.0, 0.0], &vectors, 1).len(), 1);
    }

    proptest! {
        #[test]
        fn fusion_is_symmetric(
            a in proptest::collection::btree_set("[a-f]{1,2}", 0..12),
            b in proptest::collection::btree_set("[a-f]{1,2}", 0..12),
        ) {
            let a: Vec<String> = a.into_iter().collect();
            let b: Vec<String> = b.into_iter().rev().collect();
            let ab = reciprocal_rank_fusion(&a, &b, RRF_K, usize::MAX);
            let ba = reciprocal_rank_fusion(&b, &a, RRF_K, usize::MAX);

            prop_assert_eq!(ab.len(), ba.len());
            for ((id_ab, s_ab), (id_ba, s_ba)) in ab.iter().zip(&ba) {
                prop_assert_eq!(id_ab, id_ba);
                prop_assert!((s_ab - s_ba).abs() < 1e-6);
            }
        }
    }
}
