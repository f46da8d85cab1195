//! Search phase for IVF-Flat index.
//!
//! 1. Score the query against every centroid.
//! 2. Select the `nprobe` highest-scoring centroids (ties: lowest index).
//! 3. Scan only those inverted lists, scoring every candidate.
//! 4. Return the `top_k` best (score descending, ties: lowest id).

use std::cmp::Ordering;

use tracing::debug;

use crate::error::{AntError, Result};
use crate::index::distance::inner_product;
use crate::types::SearchResult;

use super::IvfFlatIndex;

impl IvfFlatIndex {
    /// Search every query in `queries`.
    ///
    /// Each row holds at most `top_k` results in non-increasing score order.
    /// Rows are shorter when the probed lists hold fewer candidates.
    pub fn search(
        &self,
        queries: &[Vec<f32>],
        top_k: usize,
        nprobe: usize,
    ) -> Result<Vec<Vec<SearchResult>>> {
        if !self.is_trained() {
            return Err(AntError::NotTrained);
        }
        if nprobe == 0 {
            return Err(AntError::Validation("nprobe must be > 0".into()));
        }
        for query in queries {
            if query.len() != self.dim {
                return Err(AntError::DimensionMismatch {
                    expected: self.dim,
                    actual: query.len(),
                });
            }
        }

        Ok(queries
            .iter()
            .map(|q| self.search_one(q, top_k, nprobe))
            .collect())
    }

    /// Indices of the `nprobe` centroids with the highest inner product.
    pub fn probe_order(&self, query: &[f32], nprobe: usize) -> Vec<usize> {
        let mut scored: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, inner_product(query, c)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(nprobe.min(self.centroids.len()))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn search_one(&self, query: &[f32], top_k: usize, nprobe: usize) -> Vec<SearchResult> {
        if top_k == 0 {
            return Vec::new();
        }

        let probes = self.probe_order(query, nprobe);

        let mut candidates: Vec<SearchResult> = Vec::new();
        for &list_idx in &probes {
            for (id, vector) in self.lists[list_idx].entries(self.dim) {
                candidates.push(SearchResult {
                    id,
                    score: inner_product(query, vector),
                });
            }
        }

        debug!(
            nprobe = probes.len(),
            candidates = candidates.len(),
            top_k,
            "scanned inverted lists"
        );

        candidates.sort_by(rank);
        candidates.truncate(top_k);
        candidates
    }
}

/// Score descending, then id ascending.
fn rank(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score.total_cmp(&a.score).then(a.id.cmp(&b.id))
}
