//! Ordering of retrieval candidates into ranked memories.

use std::cmp::Ordering;

use crate::memory::core::record::{RankedMemory, RetrievalCandidate};

/// Order by rerank score, then similarity, then recency, then id, keep the
/// first `top_k`, and assign contiguous ranks from zero.
///
/// `scores` must have one entry per candidate.
#[must_use]
pub fn rank_by_rerank(candidates: Vec<RetrievalCandidate>, scores: &[f32], top_k: usize) -> Vec<RankedMemory> {
    let mut scored: Vec<(f32, RetrievalCandidate)> = scores.iter().copied().zip(candidates).collect();
    scored.sort_by(|(score_a, a), (score_b, b)| {
        score_b.total_cmp(score_a).then_with(|| tie_break(a, b))
    });
    finalize(scored.into_iter().map(|(score, c)| (Some(score), c)), top_k)
}

/// Order by similarity alone (no reranker, or reranker unavailable).
#[must_use]
pub fn rank_by_similarity(mut candidates: Vec<RetrievalCandidate>, top_k: usize) -> Vec<RankedMemory> {
    candidates.sort_by(tie_break);
    finalize(candidates.into_iter().map(|c| (None, c)), top_k)
}

fn tie_break(a: &RetrievalCandidate, b: &RetrievalCandidate) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| b.record.created_at.cmp(&a.record.created_at))
        .then_with(|| b.record.id.cmp(&a.record.id))
}

fn finalize(
    ordered: impl Iterator<Item = (Option<f32>, RetrievalCandidate)>,
    top_k: usize,
) -> Vec<RankedMemory> {
    ordered
        .take(top_k)
        .enumerate()
        .map(|(rank, (rerank_score, candidate))| RankedMemory {
            similarity: candidate.similarity,
            record: candidate.record,
            rerank_score,
            rank,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::memory::core::ids::MemoryId;
    use crate::memory::core::record::{MemoryMetadata, MemoryRecord};

    fn candidate(text: &str, similarity: f32, age_secs: i64) -> RetrievalCandidate {
        RetrievalCandidate {
            record: MemoryRecord {
                id: MemoryId::new(),
                user_id: "u".to_string(),
                text: text.to_string(),
                embedding: Vec::new(),
                created_at: Utc::now() - Duration::seconds(age_secs),
                metadata: MemoryMetadata::new(),
            },
            similarity,
        }
    }

    #[test]
    fn test_rerank_order_wins_over_similarity() {
        let candidates = vec![candidate("a", 0.9, 0), candidate("b", 0.5, 0), candidate("c", 0.7, 0)];
        let ranked = rank_by_rerank(candidates, &[0.1, 0.8, 0.4], 2);
        let texts: Vec<&str> = ranked.iter().map(|m| m.record.text.as_str()).collect();
        assert_eq!(texts, ["b", "c"]);
        assert_eq!(ranked[0].rank, 0);
        assert_eq!(ranked[1].rank, 1);
        assert_eq!(ranked[0].rerank_score, Some(0.8));
    }

    #[test]
    fn test_equal_scores_break_on_similarity_then_recency() {
        let candidates = vec![
            candidate("old", 0.5, 100),
            candidate("new", 0.5, 1),
            candidate("close", 0.6, 500),
        ];
        let ranked = rank_by_rerank(candidates, &[1.0, 1.0, 1.0], 3);
        let texts: Vec<&str> = ranked.iter().map(|m| m.record.text.as_str()).collect();
        assert_eq!(texts, ["close", "new", "old"]);
    }

    #[test]
    fn test_similarity_fallback_has_no_rerank_score() {
        let ranked = rank_by_similarity(vec![candidate("x", 0.2, 0), candidate("y", 0.8, 0)], 5);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].record.text, "y");
        assert!(ranked.iter().all(|m| m.rerank_score.is_none()));
        assert_eq!(ranked.iter().map(|m| m.rank).collect::<Vec<_>>(), [0, 1]);
    }
}
