//! 12x4 AVX2 register micro-kernel. Same broadcast-and-FMA structure as
//! `kernel_4x4`, with 12 accumulator rows for higher throughput.

/// Computes a 12x4 tile: `C[0:12, 0:4] = A*B` or `+= A*B` per `accumulate`.
///
/// # Safety
///
/// See [`super::kernel_4x4::kernel_4x4_avx2`]; the same contract applies
/// with 12 rows instead of 4.
#[target_feature(enable = "avx2,fma")]
#[allow(clippy::too_many_arguments)]
#[allow(unsafe_op_in_unsafe_fn)]
pub unsafe fn kernel_12x4_avx2(
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

    let mut acc: [__m256d; 12] = [_mm256_setzero_pd(); 12];
    if accumulate {
        for (row, slot) in acc.iter_mut().enumerate() {
            *slot = _mm256_loadu_pd(c_base.add(row * ldc));
        }
    }

    for p in 0..kc {
        let b_vec = _mm256_loadu_pd(b_base.add(p * b_stride_k));
        for (row, slot) in acc.iter_mut().enumerate() {
            let a_val = _mm256_broadcast_sd(&*a_base.add(row * a_stride_row + p * a_stride_k));
            *slot = _mm256_fmadd_pd(a_val, b_vec, *slot);
        }
    }

    for (row, value) in acc.iter().enumerate() {
        _mm256_storeu_pd(c_base.add(row * ldc), *value);
    }
}
