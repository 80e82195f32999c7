//! Cache-blocked, multi-threaded GEMM for AVX2/AVX-512-class CPUs.
//!
//! I started this as a from-scratch matmul kernel and kept hitting the
//! same wall: a fixed blocking/packing scheme only goes fast for the
//! shapes and layouts it was tuned against. This crate generalizes the
//! scheduler itself — the block sizes, the storage layout of each
//! operand, the outer loop order, and which register kernel runs the
//! inner product are all picked through [`GemmConfig`], and a [`Driver`]
//! sweeps the resulting tile grid over [`rayon`]'s fork-join pool.
//!
//! ## Usage
//!
//! ```
//! use blocked_gemm::{run_gemm, GemmConfig};
//!
//! let (m, n, k) = (256, 256, 256);
//! let a = vec![1.0f64; m * k];
//! let b = vec![1.0f64; k * n];
//! let mut c = vec![0.0f64; m * n];
//!
//! let config = GemmConfig::builder(64, 64, 256).build();
//! run_gemm(&config, m, n, k, &a, &b, &mut c).unwrap();
//! ```
//!
//! ## What's inside
//!
//! - 4x4, 12x4 AVX2 kernels and an 8x8 AVX-512 kernel, auto-detected
//!   ([`microkernel::MicroKernelId::detect`])
//! - Two matrix-A layouts (row-major M,K and column-major K,M) and two
//!   matrix-B layouts (row-major K,N and a pre-tiled N0,K,N1 form)
//! - Two tile sweep orders: M,N,K (tile-parallel over M·N) and M,K,N
//!   (tile-parallel over M, A reused across the whole N axis)
//! - A validated [`GemmConfig`] that rejects incompatible combinations
//!   before any work starts

pub mod buffer;
pub mod config;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod microkernel;
pub mod transfer;

pub use config::{AccessOrder, ALayout, BLayout, GemmConfig, GemmConfigBuilder};
pub use driver::{Driver, ElementOp};
pub use error::{GemmError, GemmResult};
pub use microkernel::MicroKernelId;

/// Runs `C = A * B` (row-major A/B/C, identity elementwise ops) under the
/// given configuration. Shorthand for [`Driver::run`] for callers that
/// don't need the elementwise-transform hooks.
pub fn run_gemm(
    config: &GemmConfig,
    m: usize,
    n: usize,
    k: usize,
    a: &[f64],
    b: &[f64],
    c: &mut [f64],
) -> GemmResult<()> {
    run_gemm_with_ops(config, m, n, k, a, b, c, &|x| x, &|x| x, &|x| x)
}

/// Same as [`run_gemm`], applying `a_op`/`b_op` while packing A/B and
/// `c_op` while flushing C.
#[allow(clippy::too_many_arguments)]
pub fn run_gemm_with_ops(
    config: &GemmConfig,
    m: usize,
    n: usize,
    k: usize,
    a: &[f64],
    b: &[f64],
    c: &mut [f64],
    a_op: ElementOp,
    b_op: ElementOp,
    c_op: ElementOp,
) -> GemmResult<()> {
    Driver::run(config, m, n, k, a, b, c, a_op, b_op, c_op)
}
