//! IVF-Flat index implementation.
//!
//! An Inverted File index with flat (uncompressed) vector storage.
//! Vectors are partitioned into clusters via k-means, and at search time
//! only the `nprobe` clusters with the highest inner product to the query
//! are scanned.

pub mod build;
pub mod kmeans;
pub mod search;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{AntError, Result};
use crate::types::VectorId;

/// The (id, vector) pairs routed to one centroid.
///
/// Vectors are stored row-major in one contiguous buffer so a scan walks
/// memory linearly. Order inside a list carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvertedList {
    pub(crate) ids: Vec<VectorId>,
    pub(crate) vectors: Vec<f32>,
}

impl InvertedList {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[VectorId] {
        &self.ids
    }

    /// Iterate `(id, vector)` pairs for a list of dimension `dim`.
    pub fn entries(&self, dim: usize) -> impl Iterator<Item = (VectorId, &[f32])> + '_ {
        self.ids.iter().copied().zip(self.vectors.chunks_exact(dim))
    }

    fn push(&mut self, id: VectorId, vector: &[f32]) {
        self.ids.push(id);
        self.vectors.extend_from_slice(vector);
    }

    /// Remove `id` by swapping the last entry into its slot.
    fn swap_remove(&mut self, id: VectorId, dim: usize) -> bool {
        let Some(pos) = self.ids.iter().position(|&x| x == id) else {
            return false;
        };
        let last = self.ids.len() - 1;
        self.ids.swap_remove(pos);
        if pos != last {
            let (head, tail) = self.vectors.split_at_mut(last * dim);
            head[pos * dim..(pos + 1) * dim].copy_from_slice(&tail[..dim]);
        }
        self.vectors.truncate(last * dim);
        true
    }
}

/// In-memory IVF-Flat index: centroids plus one inverted list per centroid.
///
/// Every stored id appears in exactly one list; `owners` maps each id to
/// the list holding it and is rebuilt after deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfFlatIndex {
    pub(crate) dim: usize,
    pub(crate) nlist: usize,
    /// Empty until trained, then exactly `nlist` entries of length `dim`.
    pub(crate) centroids: Vec<Vec<f32>>,
    pub(crate) lists: Vec<InvertedList>,
    #[serde(skip)]
    pub(crate) owners: HashMap<VectorId, usize>,
}

impl IvfFlatIndex {
    /// Create an untrained index.
    pub fn new(dim: usize, nlist: usize) -> Self {
        Self {
            dim,
            nlist,
            centroids: Vec::new(),
            lists: vec![InvertedList::default(); nlist],
            owners: HashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn nlist(&self) -> usize {
        self.nlist
    }

    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    pub fn lists(&self) -> &[InvertedList] {
        &self.lists
    }

    /// Total number of stored ids.
    pub fn count(&self) -> usize {
        self.owners.len()
    }

    pub fn contains(&self, id: VectorId) -> bool {
        self.owners.contains_key(&id)
    }

    /// All stored ids, grouped by list.
    pub fn ids(&self) -> Vec<VectorId> {
        self.lists.iter().flat_map(|l| l.ids.iter().copied()).collect()
    }

    /// Stored vector for `id`, if present.
    pub fn get(&self, id: VectorId) -> Option<&[f32]> {
        let list = &self.lists[*self.owners.get(&id)?];
        list.entries(self.dim)
            .find(|(stored, _)| *stored == id)
            .map(|(_, v)| v)
    }

    /// Delete every id in `ids` from whichever list holds it.
    ///
    /// Absent ids are ignored. Returns the number actually removed.
    pub fn remove(&mut self, ids: &[VectorId]) -> usize {
        let mut removed = 0;
        for &id in ids {
            if let Some(list_idx) = self.owners.remove(&id) {
                if self.lists[list_idx].swap_remove(id, self.dim) {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Remove `ids`, then add them back with the new `vectors`.
    ///
    /// Ids that were not present are simply added. Validation happens
    /// before anything is removed, so a failed call leaves the index as is.
    pub fn replace(&mut self, ids: &[VectorId], vectors: &[Vec<f32>]) -> Result<()> {
        if !self.is_trained() {
            return Err(AntError::NotTrained);
        }
        build::validate_batch(self.dim, vectors, ids)?;
        self.remove(ids);
        self.insert_unchecked(vectors, ids);
        Ok(())
    }

    /// Rebuild `owners` from the lists and check the structural invariants.
    ///
    /// Used after deserialization; any violation is reported as a message
    /// so the caller can wrap it in its own error.
    pub(crate) fn restore_owners(&mut self) -> std::result::Result<(), String> {
        if self.lists.len() != self.nlist {
            return Err(format!(
                "expected {} inverted lists, found {}",
                self.nlist,
                self.lists.len()
            ));
        }
        if !self.centroids.is_empty() && self.centroids.len() != self.nlist {
            return Err(format!(
                "expected {} centroids, found {}",
                self.nlist,
                self.centroids.len()
            ));
        }
        if self.centroids.iter().any(|c| c.len() != self.dim) {
            return Err(format!("centroid length differs from dimension {}", self.dim));
        }

        let mut owners = HashMap::new();
        for (list_idx, list) in self.lists.iter().enumerate() {
            if list.vectors.len() != list.ids.len() * self.dim {
                return Err(format!("inverted list {list_idx} has a truncated vector buffer"));
            }
            for &id in &list.ids {
                if owners.insert(id, list_idx).is_some() {
                    return Err(format!("id {id} stored in more than one slot"));
                }
            }
        }
        if !owners.is_empty() && self.centroids.is_empty() {
            return Err("vectors stored in an untrained index".into());
        }
        self.owners = owners;
        Ok(())
    }

    /// Route each vector to its nearest centroid and append it.
    /// Callers must have validated the batch.
    fn insert_unchecked(&mut self, vectors: &[Vec<f32>], ids: &[VectorId]) {
        for (vector, &id) in vectors.iter().zip(ids) {
            let list_idx = kmeans::assign(vector, &self.centroids);
            self.lists[list_idx].push(id, vector);
            self.owners.insert(id, list_idx);
        }
    }
}

/// Ids occurring more than once in `ids`, in first-seen order.
pub(crate) fn first_duplicate(ids: &[VectorId]) -> Option<VectorId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().find(|id| !seen.insert(*id))
}
