//! Build phase for IVF-Flat index.
//!
//! Pipeline: validate batch -> train centroids -> assign vectors to their
//! nearest centroid -> append to that centroid's inverted list.

use tracing::{debug, info};

use crate::error::{AntError, Result};
use crate::types::{KMeansParams, VectorId};

use super::kmeans::train_kmeans;
use super::{first_duplicate, IvfFlatIndex};

/// Shape checks shared by every write path: equal lengths, correct
/// dimension, finite values, pairwise-unique ids.
pub(crate) fn validate_batch(dim: usize, vectors: &[Vec<f32>], ids: &[VectorId]) -> Result<()> {
    if vectors.len() != ids.len() {
        return Err(AntError::LengthMismatch {
            vectors: vectors.len(),
            ids: ids.len(),
        });
    }
    for vector in vectors {
        if vector.len() != dim {
            return Err(AntError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(AntError::Validation(
                "vectors must not contain NaN or infinite values".into(),
            ));
        }
    }
    if let Some(id) = first_duplicate(ids) {
        return Err(AntError::DuplicateId { id });
    }
    Ok(())
}

impl IvfFlatIndex {
    /// Check that `train_and_add(vectors, ids)` would succeed.
    pub fn validate_training(&self, vectors: &[Vec<f32>], ids: &[VectorId]) -> Result<()> {
        validate_batch(self.dim, vectors, ids)?;
        if vectors.len() < self.nlist {
            return Err(AntError::InsufficientData {
                required: self.nlist,
                actual: vectors.len(),
            });
        }
        self.check_absent(ids)
    }

    /// Check that `add(vectors, ids)` would succeed.
    pub fn validate_add(&self, vectors: &[Vec<f32>], ids: &[VectorId]) -> Result<()> {
        if !self.is_trained() {
            return Err(AntError::NotTrained);
        }
        validate_batch(self.dim, vectors, ids)?;
        self.check_absent(ids)
    }

    /// Train centroids from `vectors`, then add every vector to its list.
    ///
    /// Entries already stored (from an earlier training) are re-routed
    /// against the new centroids so list membership stays consistent.
    pub fn train_and_add(
        &mut self,
        vectors: &[Vec<f32>],
        ids: &[VectorId],
        params: &KMeansParams,
    ) -> Result<()> {
        self.validate_training(vectors, ids)?;

        let refs: Vec<&[f32]> = vectors.iter().map(|v| v.as_slice()).collect();
        let centroids = train_kmeans(&refs, self.dim, self.nlist, params)?;

        let (old_vectors, old_ids) = self.drain_entries();
        self.centroids = centroids;
        if !old_ids.is_empty() {
            debug!(count = old_ids.len(), "re-routing existing entries after retraining");
            self.insert_unchecked(&old_vectors, &old_ids);
        }
        self.insert_unchecked(vectors, ids);

        info!(
            added = ids.len(),
            total = self.count(),
            nlist = self.nlist,
            "trained and populated IVF-Flat index"
        );
        Ok(())
    }

    /// Add vectors without retraining. Requires a trained index.
    pub fn add(&mut self, vectors: &[Vec<f32>], ids: &[VectorId]) -> Result<()> {
        self.validate_add(vectors, ids)?;
        self.insert_unchecked(vectors, ids);
        debug!(added = ids.len(), total = self.count(), "added vectors");
        Ok(())
    }

    fn check_absent(&self, ids: &[VectorId]) -> Result<()> {
        match ids.iter().find(|id| self.contains(**id)) {
            Some(&id) => Err(AntError::DuplicateId { id }),
            None => Ok(()),
        }
    }

    fn drain_entries(&mut self) -> (Vec<Vec<f32>>, Vec<VectorId>) {
        let dim = self.dim;
        let mut vectors = Vec::with_capacity(self.count());
        let mut ids = Vec::with_capacity(self.count());
        for list in self.lists.iter_mut() {
            for (id, v) in list.entries(dim) {
                ids.push(id);
                vectors.push(v.to_vec());
            }
            list.ids.clear();
            list.vectors.clear();
        }
        self.owners.clear();
        (vectors, ids)
    }
}
