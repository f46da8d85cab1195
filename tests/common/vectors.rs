use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `n` random vectors with components in [-1, 1).
pub fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

/// `n` random unit-norm vectors. Under inner product each one is its own
/// best match.
pub fn random_unit_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    random_vectors(n, dim, seed)
        .into_iter()
        .map(|v| {
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(f32::EPSILON);
            v.into_iter().map(|x| x / norm).collect()
        })
        .collect()
}

pub fn ids(range: std::ops::Range<i64>) -> Vec<i64> {
    range.collect()
}
