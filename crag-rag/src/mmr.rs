//! Maximal Marginal Relevance selection.

use crate::embedding::cosine_similarity;

/// Select up to `k` candidate positions by Maximal Marginal Relevance.
///
/// The first pick is the candidate most similar to `query`. Each later pick
/// maximizes `lambda * sim(query, c) - (1 - lambda) * max(sim(c, selected))`.
/// Ties go to the earlier candidate. Returned positions are in selection order.
pub fn maximal_marginal_relevance(query: &[f32], candidates: &[&[f32]], lambda: f32, k: usize) -> Vec<usize> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates.iter().map(|c| cosine_similarity(query, c)).collect();
    let mut selected: Vec<usize> = Vec::with_capacity(k);
    // Highest similarity to any selected candidate, per candidate.
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];
    let mut taken = vec![false; candidates.len()];

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for (i, &rel) in relevance.iter().enumerate() {
            if taken[i] {
                continue;
            }
            let score = if selected.is_empty() { rel } else { lambda * rel - (1.0 - lambda) * redundancy[i] };
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let Some((pick, _)) = best else { break };
        taken[pick] = true;
        selected.push(pick);

        for (i, candidate) in candidates.iter().enumerate() {
            if !taken[i] {
                redundancy[i] = redundancy[i].max(cosine_similarity(candidate, candidates[pick]));
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_relevance_orders_by_similarity() {
        let query = [1.0, 0.0];
        let candidates: Vec<&[f32]> = vec![&[0.5, 0.5], &[1.0, 0.0], &[0.0, 1.0]];
        assert_eq!(maximal_marginal_relevance(&query, &candidates, 1.0, 3), vec![1, 0, 2]);
    }

    #[test]
    fn diversity_skips_near_duplicates() {
        let query = [1.0, 0.0];
        let candidates: Vec<&[f32]> = vec![&[1.0, 0.0], &[0.99, 0.01], &[0.6, 0.8]];
        let picks = maximal_marginal_relevance(&query, &candidates, 0.3, 2);
        assert_eq!(picks, vec![0, 2]);
    }

    #[test]
    fn k_is_bounded_by_candidates() {
        let candidates: Vec<&[f32]> = vec![&[1.0]];
        assert_eq!(maximal_marginal_relevance(&[1.0], &candidates, 0.5, 5), vec![0]);
        assert!(maximal_marginal_relevance(&[1.0], &[], 0.5, 5).is_empty());
    }
}
