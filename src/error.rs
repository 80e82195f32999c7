//! Error types surfaced by the driver.
//!
//! All variants are decidable before the parallel region starts (see
//! `Driver::run`'s validity check) except `AllocError`, which can only be
//! detected once scratch buffers are actually requested. The micro-kernel
//! and packers are total and never produce an error themselves.

use thiserror::Error;

/// Errors `run_gemm` / `Driver::run` can return.
#[derive(Debug, Error)]
pub enum GemmError {
    /// An incompatible combination of configuration flags was requested.
    #[error("invalid gemm configuration: {reason}")]
    Config {
        /// Human-readable explanation of which invariant failed.
        reason: String,
    },

    /// Aligned scratch allocation failed.
    #[error("failed to allocate {size} bytes aligned to {align} bytes")]
    Alloc {
        /// Requested allocation size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },

    /// Descriptor lengths are inconsistent with each other (A.K != B.K,
    /// A.M != C.M, or B.N != C.N).
    #[error("inconsistent operand shapes: {reason}")]
    ContractViolation {
        /// Human-readable explanation of the mismatch.
        reason: String,
    },
}

impl GemmError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::debug!(%reason, "gemm configuration rejected");
        GemmError::Config { reason }
    }

    pub(crate) fn contract(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::debug!(%reason, "gemm operand shapes rejected");
        GemmError::ContractViolation { reason }
    }
}

/// Result alias used throughout the crate.
pub type GemmResult<T> = Result<T, GemmError>;
