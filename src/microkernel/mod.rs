//! SIMD micro-kernels for the inner loop of matrix multiplication.
//! Dispatched by a capability token (`MicroKernelId`) selected at
//! configuration time: each variant supplies the `(mc_step, nc_step,
//! min_vector_a, min_vector_b)` constants the driver reads, and one
//! `run` call consumes a full `(packed A block, packed B block, C block)`
//! and either overwrites or adds into C — looping internally over
//! register-sized sub-tiles, with packing factored out into
//! [`crate::transfer`] rather than fused into this loop.

mod kernel_12x4;
mod kernel_4x4;
mod kernel_8x8;
mod scalar;

use crate::config::{ALayout, BLayout};
use crate::descriptor::GridDescriptor;
use scalar::kernel_scalar;

/// Capability token selecting which register kernel backs a `Driver::run`
/// call. Chosen once, at configuration time — never branched on inside
/// the parallel region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroKernelId {
    /// 4x4 tile, AVX2 (4 accumulator registers).
    Avx2_4x4,
    /// 12x4 tile, AVX2 (12 accumulator registers, higher throughput).
    Avx2_12x4,
    /// 8x8 tile, AVX-512 (8 accumulator registers, 8-wide lanes).
    Avx512_8x8,
    /// Plain scalar triple loop; used when no AVX2/AVX-512+FMA is
    /// available, and for ragged remainder tiles under any kernel.
    Scalar,
}

impl MicroKernelId {
    /// Picks the best kernel the current CPU supports, mirroring the
    /// an `is_x86_feature_detected!` cascade, AVX-512 first.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx512f")
                && is_x86_feature_detected!("avx512dq")
                && is_x86_feature_detected!("fma")
            {
                return MicroKernelId::Avx512_8x8;
            }
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                return MicroKernelId::Avx2_12x4;
            }
        }
        MicroKernelId::Scalar
    }

    /// Row-tile step (`MR`).
    pub fn mr(self) -> usize {
        match self {
            MicroKernelId::Avx2_4x4 => 4,
            MicroKernelId::Avx2_12x4 => 12,
            MicroKernelId::Avx512_8x8 => 8,
            MicroKernelId::Scalar => 1,
        }
    }

    /// Column-tile step (`NR`), always equal to the kernel's native SIMD
    /// lane width.
    pub fn nr(self) -> usize {
        match self {
            MicroKernelId::Avx2_4x4 => 4,
            MicroKernelId::Avx2_12x4 => 4,
            MicroKernelId::Avx512_8x8 => 8,
            MicroKernelId::Scalar => 1,
        }
    }

    /// `MatrixAMinVectorSize`: the multiple A's M axis is padded to when
    /// `ALayout::ColMajorKM` is in use.
    pub fn min_vector_a(self) -> usize {
        self.mr()
    }

    /// `MatrixBMinVectorSize`: the multiple B's N axis (and, in turn,
    /// every `nc` this driver computes) is always rounded up to.
    pub fn min_vector_b(self) -> usize {
        self.nr()
    }

    /// Runs this kernel over an entire `(mc, kc, nc)` block, looping over
    /// `MR x NR` register sub-tiles and falling back to
    /// [`kernel_scalar`] for ragged remainders and whenever `self` is
    /// [`MicroKernelId::Scalar`].
    ///
    /// `a_block`/`a_desc` and `b_block`/`b_desc` are the packed buffers
    /// and descriptors produced by [`crate::transfer::SliceTransfer`] /
    /// [`crate::descriptor::BlockDescriptorFactory`]; `c_block` is a raw
    /// base pointer to `mc` rows of `nc` valid columns each, spaced `ldc`
    /// elements apart (`ldc == nc` for a tightly packed block; a caller
    /// writing into a wider local buffer — e.g. one C tile spanning the
    /// whole N axis, or straight into a shared output grid — passes the
    /// wider stride).
    ///
    /// `c_block` is a pointer rather than `&mut [f64]` because `ldc` can
    /// exceed `nc`: a slice wide enough to cover `mc` rows at that stride
    /// would span neighboring tiles' columns too, and this is called once
    /// per parallel tile against a single shared output buffer — forming
    /// such a slice from two tiles running on different workers would
    /// create overlapping `&mut` references, undefined behavior even
    /// though the actual writes never overlap.
    ///
    /// # Safety
    /// `c_block` must be valid for reads (when `accumulate`) and writes
    /// at `r * ldc + c` for every `r in 0..mc`, `c in 0..nc`, and no other
    /// thread may access an overlapping offset concurrently.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn run(
        self,
        a_block: &[f64],
        a_layout: ALayout,
        a_desc: &GridDescriptor,
        b_block: &[f64],
        b_layout: BLayout,
        b_desc: &GridDescriptor,
        c_block: *mut f64,
        mc: usize,
        kc: usize,
        nc: usize,
        ldc: usize,
        accumulate: bool,
    ) {
        let (a_stride_row, a_stride_k) = match a_layout {
            ALayout::RowMajorMK => (a_desc.stride(0), a_desc.stride(1)),
            ALayout::ColMajorKM => (a_desc.stride(1), a_desc.stride(0)),
        };

        if self == MicroKernelId::Scalar {
            let (b_base_offset, b_stride_k, b_stride_col) =
                b_tile_strides(b_layout, b_desc, kc, nc, 0);
            // SAFETY: forwards this function's own safety contract; `mr =
            // mc`, `nr = nc` here so the offset range is identical.
            unsafe {
                kernel_scalar(
                    a_block,
                    0,
                    a_stride_row,
                    a_stride_k,
                    &b_block[b_base_offset..],
                    0,
                    b_stride_k,
                    b_stride_col,
                    c_block,
                    0,
                    0,
                    ldc,
                    mc,
                    nc,
                    kc,
                    accumulate,
                );
            }
            return;
        }

        let mr = self.mr();
        let nr = self.nr();

        let mc_main = (mc / mr) * mr;
        let nc_main = (nc / nr) * nr;

        for jj in (0..nc_main).step_by(nr) {
            let (b_base_offset, b_stride_k, b_stride_col) =
                b_tile_strides(b_layout, b_desc, kc, nr, jj);

            for ii in (0..mc_main).step_by(mr) {
                let a_offset = ii * a_stride_row;
                let c_offset = ii * ldc + jj;

                // SAFETY: every offset below stays within `a_block`,
                // `b_block` because `ii < mc_main <= mc`, `jj < nc_main <=
                // nc`, and the descriptors guarantee the buffers hold at
                // least `mc_padded * kc_padded` / `kc * nc_padded`
                // elements respectively (Data Model invariant 3). `c_base`
                // forwards this function's own safety contract for the
                // `(ii..ii+mr, jj..jj+nr)` sub-rectangle.
                unsafe {
                    self.dispatch_register_tile(
                        a_block.as_ptr().add(a_offset),
                        a_stride_row,
                        a_stride_k,
                        b_block.as_ptr().add(b_base_offset),
                        b_stride_k,
                        c_block.add(c_offset),
                        ldc,
                        kc,
                        accumulate,
                    );
                }
            }

            if mc_main < mc {
                // SAFETY: forwards this function's own safety contract
                // for rows `mc_main..mc`, columns `jj..jj+nr`.
                unsafe {
                    kernel_scalar(
                        a_block,
                        mc_main,
                        a_stride_row,
                        a_stride_k,
                        &b_block[b_base_offset..],
                        0,
                        b_stride_k,
                        b_stride_col,
                        c_block,
                        mc_main,
                        jj,
                        ldc,
                        mc - mc_main,
                        nr,
                        kc,
                        accumulate,
                    );
                }
            }
        }

        if nc_main < nc {
            // `jj = nc_main` is still a multiple of `nr` (the tiling
            // granularity), so the tile-index math in `b_tile_strides`
            // must use `nr`, not the (possibly narrower) remainder width.
            let (b_base_offset, b_stride_k, b_stride_col) =
                b_tile_strides(b_layout, b_desc, kc, nr, nc_main);
            // SAFETY: forwards this function's own safety contract for
            // rows `0..mc`, columns `nc_main..nc`.
            unsafe {
                kernel_scalar(
                    a_block,
                    0,
                    a_stride_row,
                    a_stride_k,
                    &b_block[b_base_offset..],
                    0,
                    b_stride_k,
                    b_stride_col,
                    c_block,
                    0,
                    nc_main,
                    ldc,
                    mc,
                    nc - nc_main,
                    kc,
                    accumulate,
                );
            }
        }
    }

    /// # Safety
    /// See the per-kernel safety docs in `kernel_4x4`, `kernel_12x4`,
    /// `kernel_8x8`. For `Scalar` this just calls the safe scalar kernel
    /// through raw pointers reconstructed into slices by the caller's
    /// bounds (always within `mr`/`nr` of the block).
    #[allow(clippy::too_many_arguments)]
    unsafe fn dispatch_register_tile(
        self,
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
        match self {
            MicroKernelId::Avx2_4x4 => kernel_4x4::kernel_4x4_avx2(
                a_base,
                a_stride_row,
                a_stride_k,
                b_base,
                b_stride_k,
                c_base,
                ldc,
                kc,
                accumulate,
            ),
            MicroKernelId::Avx2_12x4 => kernel_12x4::kernel_12x4_avx2(
                a_base,
                a_stride_row,
                a_stride_k,
                b_base,
                b_stride_k,
                c_base,
                ldc,
                kc,
                accumulate,
            ),
            MicroKernelId::Avx512_8x8 => kernel_8x8::kernel_8x8_avx512(
                a_base,
                a_stride_row,
                a_stride_k,
                b_base,
                b_stride_k,
                c_base,
                ldc,
                kc,
                accumulate,
            ),
            MicroKernelId::Scalar => {
                unreachable!("MicroKernelId::run returns before tiling when self is Scalar")
            }
        }
    }
}

/// Computes `(base_offset, stride_between_k_steps, stride_between_columns)`
/// for a register tile of `nr` columns starting at logical column `jj` of
/// a B block, for either B layout.
fn b_tile_strides(
    layout: BLayout,
    b_desc: &GridDescriptor,
    kc: usize,
    nr: usize,
    jj: usize,
) -> (usize, usize, usize) {
    let _ = kc;
    match layout {
        BLayout::RowMajorKN => {
            let k_stride = b_desc.stride(0);
            (jj, k_stride, 1)
        }
        BLayout::TiledN0KN1 => {
            debug_assert_eq!(
                jj % nr,
                0,
                "tiled B layout requires column tiles aligned to MatrixBMinVectorSize"
            );
            let n0 = jj / nr;
            let base = n0 * b_desc.stride(0);
            (base, b_desc.stride(1), 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::BlockDescriptorFactory;

    fn naive(a: &[f64], b: &[f64], m: usize, n: usize, k: usize) -> Vec<f64> {
        let mut c = vec![0.0; m * n];
        for i in 0..m {
            for p in 0..k {
                for j in 0..n {
                    c[i * n + j] += a[i * k + p] * b[p * n + j];
                }
            }
        }
        c
    }

    fn run_kernel(id: MicroKernelId, m: usize, n: usize, k: usize) {
        let a: Vec<f64> = (0..m * k).map(|i| (i % 7) as f64).collect();
        let b: Vec<f64> = (0..k * n).map(|i| (i % 5) as f64).collect();
        let expected = naive(&a, &b, m, n, k);

        let a_desc = BlockDescriptorFactory::a_block(ALayout::RowMajorMK, m, k, id.min_vector_a());
        let b_desc = BlockDescriptorFactory::b_block(BLayout::RowMajorKN, k, n, id.min_vector_b());
        let mut c = vec![0.0; m * n];

        // SAFETY: `c` is a freshly allocated `m*n` Vec, single-threaded.
        unsafe {
            id.run(
                &a,
                ALayout::RowMajorMK,
                &a_desc,
                &b,
                BLayout::RowMajorKN,
                &b_desc,
                c.as_mut_ptr(),
                m,
                k,
                n,
                n,
                false,
            );
        }

        for i in 0..m * n {
            assert!(
                (c[i] - expected[i]).abs() < 1e-8,
                "{id:?} mismatch @ {i}: {} vs {}",
                c[i],
                expected[i]
            );
        }
    }

    #[test]
    fn scalar_kernel_matches_naive_on_ragged_shapes() {
        for (m, n, k) in [(1, 1, 1), (3, 5, 7), (13, 17, 11)] {
            run_kernel(MicroKernelId::Scalar, m, n, k);
        }
    }

    #[test]
    fn avx2_4x4_matches_naive_when_available() {
        if !is_x86_feature_detected!("avx2") {
            return;
        }
        for (m, n, k) in [(4, 4, 4), (8, 12, 16), (9, 7, 5), (5, 9, 13)] {
            run_kernel(MicroKernelId::Avx2_4x4, m, n, k);
        }
    }

    #[test]
    fn avx2_12x4_matches_naive_when_available() {
        if !is_x86_feature_detected!("avx2") {
            return;
        }
        for (m, n, k) in [(12, 4, 16), (25, 9, 13), (11, 4, 8)] {
            run_kernel(MicroKernelId::Avx2_12x4, m, n, k);
        }
    }

    #[test]
    fn avx512_8x8_matches_naive_when_available() {
        if !(is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512dq")) {
            return;
        }
        for (m, n, k) in [(8, 8, 16), (17, 9, 7), (24, 24, 32)] {
            run_kernel(MicroKernelId::Avx512_8x8, m, n, k);
        }
    }

    #[test]
    fn col_major_a_layout_matches_naive() {
        let (m, n, k) = (9, 8, 6);
        let a_mk: Vec<f64> = (0..m * k).map(|i| (i % 7) as f64).collect();
        // Build the K,M (column-major logical) storage by transposing.
        let mut a_km = vec![0.0; k * m];
        for i in 0..m {
            for p in 0..k {
                a_km[p * m + i] = a_mk[i * k + p];
            }
        }
        let b: Vec<f64> = (0..k * n).map(|i| (i % 5) as f64).collect();
        let expected = naive(&a_mk, &b, m, n, k);

        let id = MicroKernelId::Scalar;
        let a_desc = BlockDescriptorFactory::a_block(ALayout::ColMajorKM, m, k, id.min_vector_a());
        let b_desc = BlockDescriptorFactory::b_block(BLayout::RowMajorKN, k, n, id.min_vector_b());
        let mut c = vec![0.0; m * n];

        // SAFETY: `c` is a freshly allocated `m*n` Vec, single-threaded.
        unsafe {
            id.run(
                &a_km,
                ALayout::ColMajorKM,
                &a_desc,
                &b,
                BLayout::RowMajorKN,
                &b_desc,
                c.as_mut_ptr(),
                m,
                k,
                n,
                n,
                false,
            );
        }

        for i in 0..m * n {
            assert!((c[i] - expected[i]).abs() < 1e-8, "mismatch @ {i}");
        }
    }

    #[test]
    fn tiled_b_layout_matches_naive() {
        let (m, n, k) = (8, 8, 6);
        let id = MicroKernelId::Avx512_8x8;
        if !(is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512dq")) {
            return;
        }
        let a: Vec<f64> = (0..m * k).map(|i| (i % 7) as f64).collect();
        let b_kn: Vec<f64> = (0..k * n).map(|i| (i % 5) as f64).collect();
        let expected = naive(&a, &b_kn, m, n, k);

        let vb = id.min_vector_b();
        let n0 = n.div_ceil(vb);
        let mut b_tiled = vec![0.0; n0 * k * vb];
        for p in 0..k {
            for j in 0..n {
                let t = j / vb;
                let lane = j % vb;
                b_tiled[(t * k + p) * vb + lane] = b_kn[p * n + j];
            }
        }

        let a_desc = BlockDescriptorFactory::a_block(ALayout::RowMajorMK, m, k, id.min_vector_a());
        let b_desc = BlockDescriptorFactory::b_block(BLayout::TiledN0KN1, k, n, vb);
        let mut c = vec![0.0; m * n];

        // SAFETY: `c` is a freshly allocated `m*n` Vec, single-threaded.
        unsafe {
            id.run(
                &a,
                ALayout::RowMajorMK,
                &a_desc,
                &b_tiled,
                BLayout::TiledN0KN1,
                &b_desc,
                c.as_mut_ptr(),
                m,
                k,
                n,
                n,
                false,
            );
        }

        for i in 0..m * n {
            assert!((c[i] - expected[i]).abs() < 1e-8, "mismatch @ {i}");
        }
    }
}
