//! Compile/config-time parameters for the driver.
//!
//! The layouts, access order and local-buffer toggles a GEMM call needs
//! are modeled as a small closed set of enums plus a validated runtime
//! value, `GemmConfig`, rather than template specialization.

use crate::error::{GemmError, GemmResult};
use crate::microkernel::MicroKernelId;

/// Storage layout of the A (left) operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ALayout {
    /// Row-major, (M, K): A's fastest axis is K.
    RowMajorMK,
    /// Column-major, (K, M): A's fastest axis is M.
    ColMajorKM,
}

/// Storage layout of the B (right) operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BLayout {
    /// Row-major, (K, N): B's fastest axis is N.
    RowMajorKN,
    /// Pre-tiled (N0, K, N1) where `N1 == MatrixBMinVectorSize`: each
    /// SIMD-wide strip of N is contiguous.
    TiledN0KN1,
}

/// Outer loop nest order over (M, N, K) tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOrder {
    /// Tile-parallel over M·N; K is the innermost loop. Corresponds to
    /// the original's `BlockMNKAccessOrder = Sequence<0, 1, 2>`.
    MNK,
    /// Tile-parallel over M only; K is reused across all N tiles.
    /// Corresponds to `Sequence<0, 2, 1>`.
    MKN,
}

/// Validated, immutable configuration for a single `Driver::run` call.
#[derive(Debug, Clone)]
pub struct GemmConfig {
    pub(crate) m_per_block: usize,
    pub(crate) n_per_block: usize,
    pub(crate) k_per_block: usize,
    pub(crate) access_order: AccessOrder,
    pub(crate) a_layout: ALayout,
    pub(crate) b_layout: BLayout,
    pub(crate) use_a_local_buffer: bool,
    pub(crate) use_b_local_buffer: bool,
    pub(crate) use_c_local_buffer: bool,
    pub(crate) kernel: MicroKernelId,
}

impl GemmConfig {
    /// Starts a builder with the given block sizes; everything else
    /// defaults to the most common configuration (row-major A and B,
    /// `M,N,K` access order, local C buffer on, auto-detected kernel).
    pub fn builder(m_per_block: usize, n_per_block: usize, k_per_block: usize) -> GemmConfigBuilder {
        GemmConfigBuilder {
            m_per_block,
            n_per_block,
            k_per_block,
            access_order: AccessOrder::MNK,
            a_layout: ALayout::RowMajorMK,
            b_layout: BLayout::RowMajorKN,
            use_a_local_buffer: true,
            use_b_local_buffer: true,
            use_c_local_buffer: true,
            kernel: MicroKernelId::detect(),
        }
    }

    pub fn m_per_block(&self) -> usize {
        self.m_per_block
    }

    pub fn n_per_block(&self) -> usize {
        self.n_per_block
    }

    pub fn k_per_block(&self) -> usize {
        self.k_per_block
    }

    pub fn access_order(&self) -> AccessOrder {
        self.access_order
    }

    pub fn a_layout(&self) -> ALayout {
        self.a_layout
    }

    pub fn b_layout(&self) -> BLayout {
        self.b_layout
    }

    pub fn use_a_local_buffer(&self) -> bool {
        self.use_a_local_buffer
    }

    pub fn use_b_local_buffer(&self) -> bool {
        self.use_b_local_buffer
    }

    pub fn use_c_local_buffer(&self) -> bool {
        self.use_c_local_buffer
    }

    pub fn kernel(&self) -> MicroKernelId {
        self.kernel
    }

    /// Validity check: verifies the configuration is compatible with
    /// a GEMM of shape (gemm_m, gemm_n, gemm_k).
    pub fn validate(&self, gemm_m: usize, gemm_n: usize, gemm_k: usize) -> GemmResult<()> {
        if self.m_per_block == 0 || self.n_per_block == 0 || self.k_per_block == 0 {
            return Err(GemmError::config(
                "MPerBlock, NPerBlock and KPerBlock must all be positive",
            ));
        }

        let vb = self.kernel.min_vector_b();

        if self.use_c_local_buffer && self.access_order == AccessOrder::MKN {
            if self.n_per_block < gemm_n {
                return Err(GemmError::config(format!(
                    "UseCLocalBuffer with M,K,N access order requires NPerBlock >= N \
                     (NPerBlock={}, N={}): a local C tile would be partially accumulated \
                     and flushed before the K reduction completes",
                    self.n_per_block, gemm_n
                )));
            }
        }

        if !self.use_c_local_buffer && gemm_n % vb != 0 {
            return Err(GemmError::config(format!(
                "UseCLocalBuffer=false requires N % MatrixBMinVectorSize == 0 \
                 (N={}, MatrixBMinVectorSize={}): the micro-kernel writes full \
                 SIMD lanes straight into C",
                gemm_n, vb
            )));
        }

        if self.b_layout == BLayout::TiledN0KN1 {
            if !self.use_b_local_buffer {
                return Err(GemmError::config(
                    "B,TiledN0KN1 only describes a packed block layout; \
                     UseBLocalBuffer=false has no flat source to read it from",
                ));
            }
            if self.n_per_block % vb != 0 {
                return Err(GemmError::config(format!(
                    "B,TiledN0KN1 requires NPerBlock % MatrixBMinVectorSize == 0 \
                     (NPerBlock={}, MatrixBMinVectorSize={}): block boundaries \
                     must line up with the tile boundaries of the packed layout",
                    self.n_per_block, vb
                )));
            }
        }

        if gemm_m == 0 || gemm_n == 0 || gemm_k == 0 {
            return Err(GemmError::config(
                "M, N and K must all be positive",
            ));
        }

        Ok(())
    }
}

/// Builder for [`GemmConfig`]. Every setter is optional; `build` performs
/// no shape-dependent validation (that happens in [`GemmConfig::validate`],
/// once the operand shapes are known).
#[derive(Debug, Clone)]
pub struct GemmConfigBuilder {
    m_per_block: usize,
    n_per_block: usize,
    k_per_block: usize,
    access_order: AccessOrder,
    a_layout: ALayout,
    b_layout: BLayout,
    use_a_local_buffer: bool,
    use_b_local_buffer: bool,
    use_c_local_buffer: bool,
    kernel: MicroKernelId,
}

impl GemmConfigBuilder {
    pub fn access_order(mut self, order: AccessOrder) -> Self {
        self.access_order = order;
        self
    }

    pub fn a_layout(mut self, layout: ALayout) -> Self {
        self.a_layout = layout;
        self
    }

    pub fn b_layout(mut self, layout: BLayout) -> Self {
        self.b_layout = layout;
        self
    }

    pub fn use_a_local_buffer(mut self, flag: bool) -> Self {
        self.use_a_local_buffer = flag;
        self
    }

    pub fn use_b_local_buffer(mut self, flag: bool) -> Self {
        self.use_b_local_buffer = flag;
        self
    }

    pub fn use_c_local_buffer(mut self, flag: bool) -> Self {
        self.use_c_local_buffer = flag;
        self
    }

    pub fn kernel(mut self, kernel: MicroKernelId) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn build(self) -> GemmConfig {
        GemmConfig {
            m_per_block: self.m_per_block,
            n_per_block: self.n_per_block,
            k_per_block: self.k_per_block,
            access_order: self.access_order,
            a_layout: self.a_layout,
            b_layout: self.b_layout,
            use_a_local_buffer: self.use_a_local_buffer,
            use_b_local_buffer: self.use_b_local_buffer,
            use_c_local_buffer: self.use_c_local_buffer,
            kernel: self.kernel,
        }
    }
}
