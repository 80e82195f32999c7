//! Slice-transfer: packs strided grid regions into packed block buffers,
//! and copies block buffers back into the grid. A fully general,
//! N-dimensional slice transfer isn't needed here — up to 3 dimensions
//! covers every block shape this driver produces (B's tiled layout is the
//! only 3-D case) — so this is a pair of hand-unrolled loops rather than a
//! generic recursive index walker.

use crate::descriptor::GridDescriptor;

/// Tracks origin cursors for a packing operation and exposes the
/// `set_src_origin` / `move_src_window` / `run` contract. One
/// instance is reused across the K-loop for a given (i_m, i_n) tile,
/// advancing its source window each iteration instead of being
/// reconstructed.
#[derive(Debug, Default, Clone)]
pub struct SliceTransfer {
    src_origin: [usize; 3],
    dst_origin: [usize; 3],
}

impl SliceTransfer {
    pub fn new() -> Self {
        SliceTransfer::default()
    }

    pub fn set_src_origin(&mut self, idx: &[usize]) {
        for (slot, &v) in self.src_origin.iter_mut().zip(idx) {
            *slot = v;
        }
    }

    pub fn set_dst_origin(&mut self, idx: &[usize]) {
        for (slot, &v) in self.dst_origin.iter_mut().zip(idx) {
            *slot = v;
        }
    }

    pub fn src_origin(&self) -> &[usize; 3] {
        &self.src_origin
    }

    /// Advances the source window by `step` along each axis (elementwise
    /// add); used to move to the next K-tile without resetting the other
    /// axes.
    pub fn move_src_window(&mut self, step: &[usize]) {
        for (slot, &s) in self.src_origin.iter_mut().zip(step) {
            *slot += s;
        }
    }

    /// Packs a region of `src` (described by `src_desc`, starting at the
    /// current source origin) into `dst` (described by `dst_desc`,
    /// starting at offset 0 — packed blocks are always written from their
    /// own origin). `valid_lengths` gives, per axis of `dst_desc`, how
    /// many of its elements actually exist in `src` starting from the
    /// current origin; any destination index at or beyond that length
    /// along any axis is zero-padded rather than read from `src` — this
    /// is what keeps the SIMD tail lanes of B (and the M-padding of a
    /// column-major A) exactly zero (Testable Property 4).
    pub fn run_pack(
        &self,
        src: &[f64],
        src_desc: &GridDescriptor,
        dst: &mut [f64],
        dst_desc: &GridDescriptor,
        valid_lengths: &[usize],
        op: &dyn Fn(f64) -> f64,
    ) {
        match dst_desc.num_dimensions() {
            2 => self.run_pack_2d(src, src_desc, dst, dst_desc, valid_lengths, op),
            3 => self.run_pack_3d(src, src_desc, dst, dst_desc, valid_lengths, op),
            n => panic!("unsupported slice-transfer dimensionality: {n}"),
        }
    }

    fn run_pack_2d(
        &self,
        src: &[f64],
        src_desc: &GridDescriptor,
        dst: &mut [f64],
        dst_desc: &GridDescriptor,
        valid_lengths: &[usize],
        op: &dyn Fn(f64) -> f64,
    ) {
        let (d0, d1) = (dst_desc.length(0), dst_desc.length(1));
        let (v0, v1) = (valid_lengths[0], valid_lengths[1]);
        for i in 0..d0 {
            for j in 0..d1 {
                let value = if i < v0 && j < v1 {
                    let src_idx = [self.src_origin[0] + i, self.src_origin[1] + j];
                    op(src[src_desc.offset(&src_idx)])
                } else {
                    0.0
                };
                dst[dst_desc.offset(&[i, j])] = value;
            }
        }
    }

    /// `src` and `dst` are both B's (N0, K, N1) tiling — the top-level
    /// grid when `BLayout::TiledN0KN1` is configured is genuinely stored
    /// that way (Data Model §3: it's a caller-owned storage layout, not
    /// merely a scratch-block format), so packing a sub-block is a 3-D
    /// tile-aligned copy, not a row-major-to-tiled transform. The source
    /// origin's axis 0 is a *tile* index (`n_start / MatrixBMinVectorSize`),
    /// not a column index. `valid_lengths` is `[nc, kc]`: local column/K
    /// extents of the block being packed, in the same units as
    /// `dst_desc`'s logical (non-tile) column count and K length.
    fn run_pack_3d(
        &self,
        src: &[f64],
        src_desc: &GridDescriptor,
        dst: &mut [f64],
        dst_desc: &GridDescriptor,
        valid_lengths: &[usize],
        op: &dyn Fn(f64) -> f64,
    ) {
        let (n0_len, k_len, n1_len) = (dst_desc.length(0), dst_desc.length(1), dst_desc.length(2));
        let valid_n = valid_lengths[0];
        let valid_k = valid_lengths[1];
        for n0 in 0..n0_len {
            for k in 0..k_len {
                for n1 in 0..n1_len {
                    let local_n = n0 * n1_len + n1;
                    let value = if local_n < valid_n && k < valid_k {
                        let src_idx = [
                            self.src_origin[0] + n0,
                            self.src_origin[1] + k,
                            self.src_origin[2] + n1,
                        ];
                        op(src[src_desc.offset(&src_idx)])
                    } else {
                        0.0
                    };
                    dst[dst_desc.offset(&[n0, k, n1])] = value;
                }
            }
        }
    }

    /// Copies a packed block (`src_desc`, always 2-D, origin 0) back into
    /// `dst` (the C grid, described by `dst_desc`) starting at the current
    /// destination origin. No padding: the block's logical shape is
    /// exactly the valid (mc, nc) region.
    ///
    /// `dst` is a raw base pointer rather than `&mut [f64]` because the
    /// driver calls this once per parallel tile with a pointer into a
    /// single shared output buffer; forming a `&mut` slice spanning the
    /// whole grid (or even the whole row band) from each tile would
    /// create overlapping exclusive references across tiles running on
    /// different workers, which is undefined behavior regardless of
    /// whether the actual writes are disjoint.
    ///
    /// # Safety
    /// `dst` must be valid for writes at every offset `dst_desc.offset(&
    /// [dst_origin[0] + i, dst_origin[1] + j])` for `i in 0..src_desc.
    /// length(0)`, `j in 0..src_desc.length(1)`, and no other thread may
    /// write through an overlapping region concurrently.
    pub unsafe fn run_copy_back(
        &self,
        src: &[f64],
        src_desc: &GridDescriptor,
        dst: *mut f64,
        dst_desc: &GridDescriptor,
        op: &dyn Fn(f64) -> f64,
    ) {
        let (d0, d1) = (src_desc.length(0), src_desc.length(1));
        for i in 0..d0 {
            for j in 0..d1 {
                let dst_idx = [self.dst_origin[0] + i, self.dst_origin[1] + j];
                let offset = dst_desc.offset(&dst_idx);
                // SAFETY: caller guarantees `dst` is valid for this offset
                // and not concurrently aliased.
                unsafe {
                    *dst.add(offset) = op(src[src_desc.offset(&[i, j])]);
                }
            }
        }
    }
}
