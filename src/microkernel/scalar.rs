//! Scalar fallback micro-kernel: used when no AVX2/AVX-512 feature is
//! available, and for the ragged remainder rows/columns a register kernel
//! can't cover (mc or nc not a multiple of the kernel's MR/NR).

/// Computes an `mr x nr` tile with a plain triple loop, honoring
/// `accumulate` the same way the register kernels do.
///
/// `c_base` is a raw pointer rather than `&mut [f64]`: the driver may
/// call this (and the register kernels) with a pointer into a single
/// shared output buffer from several tiles running on different workers,
/// and `ldc` can exceed `nr` — a `&mut [f64]` wide enough to cover `mr`
/// rows at stride `ldc` would then span other tiles' columns too,
/// aliasing a sibling worker's concurrently-held `&mut` over the same
/// memory, which is undefined behavior even when the actual writes are
/// disjoint.
///
/// # Safety
/// `c_base` must be valid for reads and writes at
/// `(c_row_offset + r) * ldc + (c_col_offset + c)` for every `r in
/// 0..mr`, `c in 0..nr`, and no other thread may access an overlapping
/// offset concurrently.
#[allow(clippy::too_many_arguments)]
pub unsafe fn kernel_scalar(
    a_base: &[f64],
    a_row_offset: usize,
    a_stride_row: usize,
    a_stride_k: usize,
    b_base: &[f64],
    b_col_offset: usize,
    b_stride_k: usize,
    b_stride_col: usize,
    c_base: *mut f64,
    c_row_offset: usize,
    c_col_offset: usize,
    ldc: usize,
    mr: usize,
    nr: usize,
    kc: usize,
    accumulate: bool,
) {
    for r in 0..mr {
        for c in 0..nr {
            let mut sum = 0.0;
            for p in 0..kc {
                let a_val = a_base[(a_row_offset + r) * a_stride_row + p * a_stride_k];
                let b_val = b_base[p * b_stride_k + (b_col_offset + c) * b_stride_col];
                sum += a_val * b_val;
            }
            let c_idx = (c_row_offset + r) * ldc + (c_col_offset + c);
            // SAFETY: caller guarantees `c_base` is valid and unaliased
            // at `c_idx` for `r in 0..mr`, `c in 0..nr`.
            unsafe {
                let slot = c_base.add(c_idx);
                if accumulate {
                    *slot += sum;
                } else {
                    *slot = sum;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_naive_product() {
        // A: 2x3 row-major, B: 3x2 row-major, C: 2x2
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let mut c = vec![0.0; 4];

        // SAFETY: `c` is a plain 4-element Vec, valid for the 2x2 tile
        // written at offsets 0..4, single-threaded.
        unsafe {
            kernel_scalar(&a, 0, 3, 1, &b, 0, 2, 1, c.as_mut_ptr(), 0, 0, 2, 2, 2, 3, false);
        }

        assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn accumulates_when_requested() {
        let a = vec![1.0, 0.0, 0.0, 1.0];
        let b = vec![5.0, 6.0, 7.0, 8.0];
        let mut c = vec![100.0, 100.0, 100.0, 100.0];

        // SAFETY: see `matches_naive_product`.
        unsafe {
            kernel_scalar(&a, 0, 2, 1, &b, 0, 2, 1, c.as_mut_ptr(), 0, 0, 2, 2, 2, 2, true);
        }

        assert_eq!(c, vec![105.0, 106.0, 107.0, 108.0]);
    }
}
