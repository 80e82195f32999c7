//! Tensor descriptor algebra and the block-descriptor factory.
//!
//! A full multi-dimensional index/stride transform library is out of scope
//! for this driver; this module implements just enough of the contract
//! (`length`, `num_dimensions`, `element_space_size`, index-to-offset) for
//! a 2-D or 3-D grid/block, plus the factories that build packed-layout
//! block descriptors for A, B and C.

use crate::config::{ALayout, BLayout};

/// A strided, up-to-3-dimensional index/offset mapping. Covers both the
/// caller's grid descriptors (A, B, C) and packed block descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridDescriptor {
    lengths: [usize; 3],
    strides: [usize; 3],
    ndim: usize,
}

impl GridDescriptor {
    /// A 2-D descriptor with explicit strides (elements, not bytes).
    pub fn new_2d(lengths: [usize; 2], strides: [usize; 2]) -> Self {
        GridDescriptor {
            lengths: [lengths[0], lengths[1], 1],
            strides: [strides[0], strides[1], 0],
            ndim: 2,
        }
    }

    /// A 2-D row-major ("packed") descriptor: `strides = [cols, 1]`.
    pub fn packed_row_major_2d(rows: usize, cols: usize) -> Self {
        GridDescriptor::new_2d([rows, cols], [cols, 1])
    }

    /// A 2-D column-major descriptor: `strides = [1, rows]`.
    pub fn packed_col_major_2d(rows: usize, cols: usize) -> Self {
        GridDescriptor::new_2d([rows, cols], [1, rows])
    }

    /// A 3-D packed row-major descriptor, used for B's tiled (N0, K, N1)
    /// layout: `strides = [k * n1, n1, 1]`.
    pub fn packed_row_major_3d(d0: usize, d1: usize, d2: usize) -> Self {
        GridDescriptor {
            lengths: [d0, d1, d2],
            strides: [d1 * d2, d2, 1],
            ndim: 3,
        }
    }

    pub fn num_dimensions(&self) -> usize {
        self.ndim
    }

    pub fn length(&self, dim: usize) -> usize {
        self.lengths[dim]
    }

    pub fn stride(&self, dim: usize) -> usize {
        self.strides[dim]
    }

    /// The number of elements the underlying buffer must hold (the
    /// highest offset reachable plus one), not merely the logical element
    /// count — matches `TensorDescriptor::GetElementSpaceSize`.
    pub fn element_space_size(&self) -> usize {
        (0..self.ndim)
            .map(|d| (self.lengths[d].saturating_sub(1)) * self.strides[d])
            .sum::<usize>()
            + 1
    }

    /// Index-to-offset computation for up to 3 dimensions.
    pub fn offset(&self, idx: &[usize]) -> usize {
        debug_assert_eq!(idx.len(), self.ndim);
        idx.iter()
            .zip(self.strides.iter())
            .map(|(i, s)| i * s)
            .sum()
    }
}

/// Packed layouts for A, B, C blocks. These describe layout and
/// strides only — they do not allocate; [`crate::buffer::AlignedBuffer`]
/// provides the backing storage.
pub struct BlockDescriptorFactory;

impl BlockDescriptorFactory {
    /// A_block descriptor: row-major `(mc, kc)` if A is `RowMajorMK`,
    /// else row-major `(kc, next_multiple(mc, VA))` if A is `ColMajorKM`
    /// (Data Model row for Matrix A / packed A block).
    pub fn a_block(layout: ALayout, mc: usize, kc: usize, min_vector_a: usize) -> GridDescriptor {
        match layout {
            ALayout::RowMajorMK => GridDescriptor::packed_row_major_2d(mc, kc),
            ALayout::ColMajorKM => {
                let mc_padded = integer_least_multiple(mc, min_vector_a);
                GridDescriptor::packed_row_major_2d(kc, mc_padded)
            }
        }
    }

    /// B_block descriptor: row-major `(kc, nc)` if B is `RowMajorKN`, else
    /// a 3-D tiling `(ceil(nc / VB), kc, VB)` presenting contiguous SIMD
    /// lanes along the innermost axis.
    pub fn b_block(layout: BLayout, kc: usize, nc: usize, min_vector_b: usize) -> GridDescriptor {
        match layout {
            BLayout::RowMajorKN => GridDescriptor::packed_row_major_2d(kc, nc),
            BLayout::TiledN0KN1 => {
                let n0 = integer_divide_ceil(nc, min_vector_b);
                GridDescriptor::packed_row_major_3d(n0, kc, min_vector_b)
            }
        }
    }

    /// C_block descriptor: row-major `(mc, nc)`, always — Matrix C is
    /// row-major per the Data Model regardless of A/B layout.
    pub fn c_block(mc: usize, nc: usize) -> GridDescriptor {
        GridDescriptor::packed_row_major_2d(mc, nc)
    }
}

/// Rounds `value` up to the next multiple of `multiple` (0 stays 0).
pub fn integer_least_multiple(value: usize, multiple: usize) -> usize {
    if multiple == 0 {
        return value;
    }
    integer_divide_ceil(value, multiple) * multiple
}

/// `ceil(numerator / denominator)` for positive integers.
pub fn integer_divide_ceil(numerator: usize, denominator: usize) -> usize {
    if denominator == 0 {
        return 0;
    }
    (numerator + denominator - 1) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_row_major_offsets() {
        let desc = GridDescriptor::packed_row_major_2d(4, 3);
        assert_eq!(desc.offset(&[0, 0]), 0);
        assert_eq!(desc.offset(&[1, 0]), 3);
        assert_eq!(desc.offset(&[3, 2]), 11);
        assert_eq!(desc.element_space_size(), 12);
    }

    #[test]
    fn tiled_n0_k_n1_offsets() {
        // 2 tiles of width 4, kc = 3 => shape (2, 3, 4)
        let desc = GridDescriptor::packed_row_major_3d(2, 3, 4);
        assert_eq!(desc.offset(&[0, 0, 0]), 0);
        assert_eq!(desc.offset(&[1, 0, 0]), 12);
        assert_eq!(desc.offset(&[1, 2, 3]), 12 + 8 + 3);
    }

    #[test]
    fn least_multiple_rounds_up() {
        assert_eq!(integer_least_multiple(9, 4), 12);
        assert_eq!(integer_least_multiple(8, 4), 8);
        assert_eq!(integer_divide_ceil(9, 4), 3);
    }
}
