//! 8x8 AVX-512 register micro-kernel. Same broadcast-and-FMA structure as
//! `kernel_4x4`/`kernel_12x4`, with 8-wide AVX-512 registers.

/// Computes an 8x8 tile: `C[0:8, 0:8] = A*B` or `+= A*B` per `accumulate`.
///
/// # Safety
///
/// Caller must ensure:
/// - CPU supports AVX-512F, AVX-512DQ and FMA
/// - same pointer-validity contract as [`super::kernel_4x4::kernel_4x4_avx2`],
///   with 8 rows and an 8-wide (not 4-wide) B/C register.
#[target_feature(enable = "avx512f,avx512dq,fma")]
#[allow(clippy::too_many_arguments)]
#[allow(unsafe_op_in_unsafe_fn)]
pub unsafe fn kernel_8x8_avx512(
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

    let mut acc: [__m512d; 8] = [_mm512_setzero_pd(); 8];
    if accumulate {
        for (row, slot) in acc.iter_mut().enumerate() {
            *slot = _mm512_loadu_pd(c_base.add(row * ldc));
        }
    }

    for p in 0..kc {
        let b_vec = _mm512_loadu_pd(b_base.add(p * b_stride_k));
        for (row, slot) in acc.iter_mut().enumerate() {
            let a_val = _mm512_set1_pd(*a_base.add(row * a_stride_row + p * a_stride_k));
            *slot = _mm512_fmadd_pd(a_val, b_vec, *slot);
        }
    }

    for (row, value) in acc.iter().enumerate() {
        _mm512_storeu_pd(c_base.add(row * ldc), *value);
    }
}
