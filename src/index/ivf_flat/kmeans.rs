//! k-means++ seeding and Lloyd's iteration for IVF centroid training.
//!
//! Assignment uses inner-product similarity (nearest = maximum dot product),
//! matching how vectors are routed to inverted lists at insert and search
//! time. Seeding uses squared L2 since k-means++ needs a non-negative
//! distance to weight its draws.
//!
//! Centroid storage is pre-allocated and reused across iterations.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::error::{AntError, Result};
use crate::index::distance::{inner_product, squared_l2};
use crate::types::KMeansParams;

/// Index of the centroid with the highest inner product to `vector`.
///
/// Ties resolve to the lowest centroid index. Returns 0 for an empty
/// centroid set; callers guard against that case.
#[inline]
pub fn assign(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best_idx = 0usize;
    let mut best_score = f32::NEG_INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let score = inner_product(vector, centroid);
        if score > best_score {
            best_score = score;
            best_idx = c;
        }
    }
    best_idx
}

/// Train `k` centroids from the given data points.
///
/// Fails with `InsufficientData` when there are fewer points than
/// centroids. Deterministic when `params.seed` is set.
pub fn train_kmeans(
    vectors: &[&[f32]],
    dim: usize,
    k: usize,
    params: &KMeansParams,
) -> Result<Vec<Vec<f32>>> {
    let n = vectors.len();

    if k == 0 {
        return Err(AntError::Validation("nlist must be > 0".into()));
    }
    if n < k {
        return Err(AntError::InsufficientData {
            required: k,
            actual: n,
        });
    }

    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!(n, k, dim, "starting k-means++ initialization");
    let mut centroids = kmeans_pp_init(vectors, k, &mut rng);

    let mut assignments = vec![0usize; n];
    let mut counts = vec![0usize; k];
    let mut new_centroids = vec![vec![0.0f32; dim]; k];

    for iter in 0..params.max_iterations {
        for (i, vec) in vectors.iter().enumerate() {
            assignments[i] = assign(vec, &centroids);
        }

        for (c, new_centroid) in new_centroids.iter_mut().enumerate() {
            counts[c] = 0;
            new_centroid.iter_mut().for_each(|v| *v = 0.0);
        }

        for (i, vec) in vectors.iter().enumerate() {
            let c = assignments[i];
            counts[c] += 1;
            for (acc, &x) in new_centroids[c].iter_mut().zip(vec.iter()) {
                *acc += x;
            }
        }

        let mut max_shift: f64 = 0.0;
        for (c, new_centroid) in new_centroids.iter_mut().enumerate() {
            if counts[c] == 0 {
                // Empty cluster keeps its previous centroid.
                new_centroid.copy_from_slice(&centroids[c]);
                continue;
            }
            let inv = 1.0 / counts[c] as f32;
            new_centroid.iter_mut().for_each(|v| *v *= inv);
            let shift = squared_l2(&centroids[c], new_centroid) as f64;
            if shift > max_shift {
                max_shift = shift;
            }
        }

        std::mem::swap(&mut centroids, &mut new_centroids);

        debug!(iter = iter + 1, max_shift, "k-means iteration complete");

        if max_shift < params.epsilon {
            info!(iterations = iter + 1, max_shift, "k-means converged");
            return Ok(centroids);
        }
    }

    warn!(
        max_iterations = params.max_iterations,
        "k-means did not converge within iteration limit, using current centroids"
    );
    Ok(centroids)
}

/// k-means++ seeding: pick initial centroids with probability proportional
/// to squared distance from the nearest already-chosen centroid.
fn kmeans_pp_init(vectors: &[&[f32]], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let n = vectors.len();
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);

    let first_idx = rng.gen_range(0..n);
    centroids.push(vectors[first_idx].to_vec());

    let mut min_dists = vec![f32::MAX; n];

    for c in 1..k {
        let last = &centroids[c - 1];
        let mut total_dist: f64 = 0.0;
        for (i, vec) in vectors.iter().enumerate() {
            let d = squared_l2(vec, last);
            if d < min_dists[i] {
                min_dists[i] = d;
            }
            total_dist += min_dists[i] as f64;
        }

        let chosen = if total_dist <= 0.0 {
            // Every point coincides with a chosen centroid; fall back to a
            // uniform draw so the remaining slots are still filled.
            rng.gen_range(0..n)
        } else {
            let threshold = rng.gen::<f64>() * total_dist;
            let mut cumulative: f64 = 0.0;
            let mut chosen = n - 1;
            for (i, &d) in min_dists.iter().enumerate() {
                cumulative += d as f64;
                if cumulative >= threshold {
                    chosen = i;
                    break;
                }
            }
            chosen
        };

        centroids.push(vectors[chosen].to_vec());
        debug!(centroid = c, chosen_idx = chosen, "k-means++ selected centroid");
    }

    debug_assert_eq!(centroids.len(), k);
    centroids
}
