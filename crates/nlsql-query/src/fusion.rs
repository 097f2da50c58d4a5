//! Reciprocal Rank Fusion (RRF) for combining retrieval results.

use std::collections::HashMap;

/// Fuse ranked result lists using Reciprocal Rank Fusion.
///
/// RRF score = Σ 1 / (rrf_k + rank_i), ranks starting at 1. Original scores
/// are ignored; only positions matter. Ties keep first-seen order.
///
/// Returns at most `k` (id, fused_score) pairs, best first.
pub fn reciprocal_rank_fusion(
    results: Vec<Vec<(String, f32)>>,
    rrf_k: f32,
    k: usize,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, (f32, usize)> = HashMap::new();
    let mut next_seen = 0usize;

    for result_list in results {
        for (rank, (id, _original_score)) in result_list.into_iter().enumerate() {
            let entry = scores.entry(id).or_insert_with(|| {
                next_seen += 1;
                (0.0, next_seen)
            });
            entry.0 += 1.0 / (rrf_k + rank as f32 + 1.0);
        }
    }

    let mut fused: Vec<(String, f32, usize)> = scores
        .into_iter()
        .map(|(id, (score, seen))| (id, score, seen))
        .collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.2.cmp(&b.2))
    });
    fused.truncate(k);

    fused.into_iter().map(|(id, score, _)| (id, score)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[&str]) -> Vec<(String, f32)> {
        ids.iter().map(|id| (id.to_string(), 0.0)).collect()
    }

    fn ids(fused: &[(String, f32)]) -> Vec<&str> {
        fused.iter().map(|(id, _)| id.as_str()).collect()
    }

    #[test]
    fn test_rrf_single_list_keeps_order() {
        let fused = reciprocal_rank_fusion(vec![list(&["a", "b", "c"])], 60.0, 10);
        assert_eq!(ids(&fused), vec!["a", "b", "c"]);
        assert!((fused[0].1 - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_rewards_agreement() {
        let fused = reciprocal_rank_fusion(
            vec![list(&["a", "b", "c"]), list(&["b", "d", "a"])],
            60.0,
            10,
        );
        // b: 1/62 + 1/61, a: 1/61 + 1/63
        assert_eq!(ids(&fused)[..2], ["b", "a"]);
        assert_eq!(fused.len(), 4);
    }

    #[test]
    fn test_rrf_ties_keep_first_seen_order() {
        let fused = reciprocal_rank_fusion(vec![list(&["x"]), list(&["y"])], 60.0, 10);
        assert_eq!(ids(&fused), vec!["x", "y"]);
    }

    #[test]
    fn test_rrf_truncation() {
        let fused = reciprocal_rank_fusion(vec![list(&["a", "b", "c", "d", "e"])], 60.0, 3);
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_rrf_empty() {
        assert!(reciprocal_rank_fusion(vec![Vec::new(), Vec::new()], 60.0, 5).is_empty());
    }
}
