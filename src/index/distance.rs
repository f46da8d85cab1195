//! Similarity kernels for vector comparison.
//!
//! The index ranks by inner product (higher is closer). Squared L2 is only
//! used for k-means++ seeding and convergence checks.

/// Inner product `sum(a_i * b_i)`.
///
/// Not a metric: no triangle inequality, and a vector is not necessarily
/// its own nearest neighbour unless all vectors share a norm.
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");
    inner_product_kernel(a, b)
}

/// Squared Euclidean distance `sum((a_i - b_i)^2)`.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");
    squared_l2_kernel(a, b)
}

// ---------------------------------------------------------------------------
// Scalar kernels written to encourage auto-vectorization, plus explicit
// AVX2 / NEON paths when those target features are enabled at build time.
// ---------------------------------------------------------------------------

#[cfg(not(any(
    all(target_arch = "x86_64", target_feature = "avx2"),
    all(target_arch = "aarch64", target_feature = "neon"),
)))]
#[inline]
fn inner_product_kernel(a: &[f32], b: &[f32]) -> f32 {
    let mut sum: f32 = 0.0;
    let chunks = a.len() / 8;
    let remainder = a.len() % 8;

    for i in 0..chunks {
        let base = i * 8;
        let mut tmp = [0.0f32; 8];
        for j in 0..8 {
            tmp[j] = a[base + j] * b[base + j];
        }
        for val in tmp {
            sum += val;
        }
    }

    let base = chunks * 8;
    for i in 0..remainder {
        sum += a[base + i] * b[base + i];
    }

    sum
}

#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
#[inline]
fn inner_product_kernel(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::x86_64::*;

    unsafe {
        let mut acc = _mm256_setzero_ps();
        let chunks = a.len() / 8;
        let remainder = a.len() % 8;

        for i in 0..chunks {
            let base = i * 8;
            let va = _mm256_loadu_ps(a.as_ptr().add(base));
            let vb = _mm256_loadu_ps(b.as_ptr().add(base));
            acc = _mm256_add_ps(_mm256_mul_ps(va, vb), acc);
        }

        let mut sum = hsum_avx(acc);
        let base = chunks * 8;
        for i in 0..remainder {
            sum += a[base + i] * b[base + i];
        }
        sum
    }
}

#[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
#[inline]
fn inner_product_kernel(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::aarch64::*;

    unsafe {
        let mut acc = vdupq_n_f32(0.0);
        let chunks = a.len() / 4;
        let remainder = a.len() % 4;

        for i in 0..chunks {
            let base = i * 4;
            let va = vld1q_f32(a.as_ptr().add(base));
            let vb = vld1q_f32(b.as_ptr().add(base));
            acc = vfmaq_f32(acc, va, vb);
        }

        let mut sum = vaddvq_f32(acc);
        let base = chunks * 4;
        for i in 0..remainder {
            sum += a[base + i] * b[base + i];
        }
        sum
    }
}

#[inline]
fn squared_l2_kernel(a: &[f32], b: &[f32]) -> f32 {
    let mut sum: f32 = 0.0;
    let chunks = a.len() / 8;
    let remainder = a.len() % 8;

    for i in 0..chunks {
        let base = i * 8;
        let mut tmp = [0.0f32; 8];
        for j in 0..8 {
            let d = a[base + j] - b[base + j];
            tmp[j] = d * d;
        }
        for val in tmp {
            sum += val;
        }
    }

    let base = chunks * 8;
    for i in 0..remainder {
        let d = a[base + i] - b[base + i];
        sum += d * d;
    }

    sum
}

/// Horizontal sum of an AVX 256-bit float register.
#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
#[inline]
unsafe fn hsum_avx(v: std::arch::x86_64::__m256) -> f32 {
    use std::arch::x86_64::*;
    let hi = _mm256_extractf128_ps(v, 1);
    let lo = _mm256_castps256_ps128(v);
    let sum128 = _mm_add_ps(lo, hi);
    let shuf = _mm_movehdup_ps(sum128);
    let sums = _mm_add_ps(sum128, shuf);
    let shuf2 = _mm_movehl_ps(sums, sums);
    let sums2 = _mm_add_ss(sums, shuf2);
    _mm_cvtss_f32(sums2)
}

/// Compute the L2 norm of a vector.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    inner_product(v, v).sqrt()
}

/// Normalize a vector in-place to unit length. Zero vectors are left as-is.
#[inline]
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > f32::EPSILON {
        let inv = 1.0 / norm;
        for x in v.iter_mut() {
            *x *= inv;
        }
    }
}
