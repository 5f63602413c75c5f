//! Retrieval hit-rate scoring.
//!
//! One synthetic query is generated per indexed document; a query "hits"
//! when its source document appears in the top-k retrieved set.
//!
//! Precision and recall are both `hits / queries`, so they are always equal
//! and F1 collapses to the same value. This matches the scores historically
//! reported for the assistant and is kept for comparability;
//! [`RetrievalScore::precision_equals_recall`] makes the degeneracy visible.

use serde::{Deserialize, Serialize};

/// Scores for one retrieval evaluation pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalScore {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub total_queries: usize,
}

impl RetrievalScore {
    pub fn from_hits(relevant_retrieved: usize, total_queries: usize) -> Self {
        if total_queries == 0 {
            return Self::default();
        }
        let rate = relevant_retrieved.min(total_queries) as f64 / total_queries as f64;
        let precision = rate;
        let recall = rate;
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1_score,
            total_queries,
        }
    }

    /// Count hits from (source document id, retrieved ids) pairs.
    pub fn from_retrievals<'a, I>(retrievals: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let (hits, total) = retrievals
            .into_iter()
            .fold((0usize, 0usize), |(hits, total), (source, retrieved)| {
                let hit = retrieved.iter().any(|id| id == source);
                (hits + usize::from(hit), total + 1)
            });
        Self::from_hits(hits, total)
    }

    pub fn precision_equals_recall(&self) -> bool {
        self.precision == self.recall
    }
}
