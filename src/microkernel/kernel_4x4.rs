//! 4x4 AVX2 register micro-kernel.
//!
//! Broadcast-and-FMA structure: takes explicit A/B strides rather than
//! assuming a pre-grouped MR-panel layout (the block descriptor this
//! driver hands the kernel is the plain packed `(mc, kc)` / `(kc, nc)`
//! layout, not a secondary MR-tiled repacking), and an explicit
//! `accumulate` flag instead of always adding into C.

/// Computes a 4x4 tile: `C[0:4, 0:4] = A*B` (accumulate=false) or
/// `C[0:4, 0:4] += A*B` (accumulate=true).
///
/// # Safety
///
/// Caller must ensure:
/// - CPU supports AVX2 and FMA (checked via `#[target_feature]`)
/// - `a_base + r * a_stride_row + p * a_stride_k` is valid for `r in 0..4`, `p in 0..kc`
/// - `b_base + p * b_stride_k` is valid for a 4-wide load, for `p in 0..kc`
/// - `c_base` is valid for 4 rows of 4 contiguous `f64`, each row strided by `ldc`
#[target_feature(enable = "avx2,fma")]
#[allow(clippy::too_many_arguments)]
#[allow(unsafe_op_in_unsafe_fn)]
pub unsafe fn kernel_4x4_avx2(
    a_base: *const f64,
    a_stride_row: usize,
    a_stride_k: usize,
    b_base: *const f64,
    b_stride_k: usize,
    c_base: *mut f64,
    ldc: usize,
    kc: usize,
    accumulate: bool,
) {
    use std::arch::x86_64::*;

    let mut c0 = if accumulate {
        _mm256_loadu_pd(c_base.add(0 * ldc))
    } else {
        _mm256_setzero_pd()
    };
    let mut c1 = if accumulate {
        _mm256_loadu_pd(c_base.add(1 * ldc))
    } else {
        _mm256_setzero_pd()
    };
    let mut c2 = if accumulate {
        _mm256_loadu_pd(c_base.add(2 * ldc))
    } else {
        _mm256_setzero_pd()
    };
    let mut c3 = if accumulate {
        _mm256_loadu_pd(c_base.add(3 * ldc))
    } else {
        _mm256_setzero_pd()
    };

    for p in 0..kc {
        let b_vec = _mm256_loadu_pd(b_base.add(p * b_stride_k));

        let a0 = _mm256_broadcast_sd(&*a_base.add(0 * a_stride_row + p * a_stride_k));
        let a1 = _mm256_broadcast_sd(&*a_base.add(1 * a_stride_row + p * a_stride_k));
        let a2 = _mm256_broadcast_sd(&*a_base.add(2 * a_stride_row + p * a_stride_k));
        let a3 = _mm256_broadcast_sd(&*a_base.add(3 * a_stride_row + p * a_stride_k));

        c0 = _mm256_fmadd_pd(a0, b_vec, c0);
        c1 = _mm256_fmadd_pd(a1, b_vec, c1);
        c2 = _mm256_fmadd_pd(a2, b_vec, c2);
        c3 = _mm256_fmadd_pd(a3, b_vec, c3);
    }

    _mm256_storeu_pd(c_base.add(0 * ldc), c0);
    _mm256_storeu_pd(c_base.add(1 * ldc), c1);
    _mm256_storeu_pd(c_base.add(2 * ldc), c2);
    _mm256_storeu_pd(c_base.add(3 * ldc), c3);
}
