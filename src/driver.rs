//! The parallel packing-and-compute scheduler.
//!
//! This is where the block-descriptor factory, the slice-transfer packer
//! and the micro-kernel dispatch are wired together into the actual
//! `(M, N, K)` tile sweep, in either of the two access orders the original
//! `GridwiseGemmAvx2_MxN` specialized on.

use rayon::prelude::*;

use crate::buffer::AlignedBuffer;
use crate::config::{AccessOrder, ALayout, BLayout, GemmConfig};
use crate::descriptor::{BlockDescriptorFactory, GridDescriptor};
use crate::error::{GemmError, GemmResult};
use crate::transfer::SliceTransfer;

/// Elementwise transform applied while packing or flushing an operand.
pub type ElementOp<'a> = &'a (dyn Fn(f64) -> f64 + Sync);

fn tile_count(total: usize, per_block: usize) -> usize {
    total.div_ceil(per_block)
}

/// `(start, len)` of tile `idx` along an axis of size `total`, blocked by
/// `per_block`; the last tile is the ragged remainder.
fn tile_extent(idx: usize, per_block: usize, total: usize) -> (usize, usize) {
    let start = idx * per_block;
    let len = per_block.min(total - start);
    (start, len)
}

fn a_full_descriptor(layout: ALayout, m: usize, k: usize) -> GridDescriptor {
    match layout {
        ALayout::RowMajorMK => GridDescriptor::packed_row_major_2d(m, k),
        ALayout::ColMajorKM => GridDescriptor::packed_row_major_2d(k, m),
    }
}

/// B's top-level grid descriptor. `BLayout::TiledN0KN1` is, per the Data
/// Model, a genuine caller-owned storage layout — not merely a
/// scratch-block format — so the full grid is described the same
/// `(N0, K, N1)` tiling the packed block uses, just at full `(N, K)`
/// extent (`N0 = ceil(N / MatrixBMinVectorSize)`).
fn b_full_descriptor(layout: BLayout, k: usize, n: usize, min_vector_b: usize) -> GridDescriptor {
    match layout {
        BLayout::RowMajorKN => GridDescriptor::packed_row_major_2d(k, n),
        BLayout::TiledN0KN1 => {
            let n0 = n.div_ceil(min_vector_b);
            GridDescriptor::packed_row_major_3d(n0, k, min_vector_b)
        }
    }
}

/// How to position a [`SliceTransfer`]'s source cursor before packing:
/// either jump to a freshly computed absolute tile origin, or advance the
/// existing cursor by a step vector. Spec §4.4 describes the K-loop (and,
/// in `M,K,N` order, the N-loop) as *advancing* the source window rather
/// than recomputing an absolute index each iteration; `Step` is how that
/// gets wired through to [`SliceTransfer::move_src_window`].
#[derive(Clone, Copy)]
enum Positioning {
    Reset([usize; 3]),
    Step([usize; 3]),
}

impl Positioning {
    fn apply(self, xfer: &mut SliceTransfer) {
        match self {
            Positioning::Reset(origin) => xfer.set_src_origin(&origin),
            Positioning::Step(step) => xfer.move_src_window(&step),
        }
    }
}

fn a_reset_origin(layout: ALayout, m_start: usize) -> [usize; 3] {
    match layout {
        ALayout::RowMajorMK => [m_start, 0, 0],
        ALayout::ColMajorKM => [0, m_start, 0],
    }
}

fn a_k_step(layout: ALayout, k_per_block: usize) -> [usize; 3] {
    match layout {
        ALayout::RowMajorMK => [0, k_per_block, 0],
        ALayout::ColMajorKM => [k_per_block, 0, 0],
    }
}

/// B origin at the start of an `M,N,K`-order tile: fixed at `n_start` (or,
/// for the tiled layout, the N-tile index `n_start / VB`) for the whole K
/// loop, K starting at 0.
fn b_reset_origin_mnk(layout: BLayout, n_start: usize, min_vector_b: usize) -> [usize; 3] {
    match layout {
        BLayout::RowMajorKN => [0, n_start, 0],
        BLayout::TiledN0KN1 => [n_start / min_vector_b, 0, 0],
    }
}

fn b_k_step(layout: BLayout, k_per_block: usize) -> [usize; 3] {
    match layout {
        BLayout::RowMajorKN => [k_per_block, 0, 0],
        BLayout::TiledN0KN1 => [0, k_per_block, 0],
    }
}

/// B origin at the start of each `i_k` in `M,K,N` order: N resets to 0,
/// K jumps to `k_start` — spec §4.4's "reset B origin at (0, i_k, 0) (or
/// (i_k, 0) for row-major B)".
fn b_reset_origin_mkn(layout: BLayout, k_start: usize) -> [usize; 3] {
    match layout {
        BLayout::RowMajorKN => [k_start, 0, 0],
        BLayout::TiledN0KN1 => [0, k_start, 0],
    }
}

/// Step to advance B's origin to the next N tile within an `i_k` in
/// `M,K,N` order. `NPerBlock % MatrixBMinVectorSize == 0` is enforced by
/// [`GemmConfig::validate`] whenever `TiledN0KN1` is configured, so the
/// tile-index step divides evenly.
fn b_n_step(layout: BLayout, n_per_block: usize, min_vector_b: usize) -> [usize; 3] {
    match layout {
        BLayout::RowMajorKN => [0, n_per_block, 0],
        BLayout::TiledN0KN1 => [n_per_block / min_vector_b, 0, 0],
    }
}

/// Per-worker scratch: packed A/B/C block buffers plus the slice-transfer
/// cursors that pack into and flush them. Built once per rayon worker via
/// `for_each_init` instead of once per tile, to avoid allocator pressure
/// in the hot loop. Scratch must be per-worker, not shared across the
/// parallel region, or concurrent tiles would race on the same buffer.
struct Scratch {
    a_local: AlignedBuffer,
    b_local: AlignedBuffer,
    c_local: Option<AlignedBuffer>,
    a_xfer: SliceTransfer,
    b_xfer: SliceTransfer,
    c_xfer: SliceTransfer,
}

impl Scratch {
    fn new(config: &GemmConfig, c_local_len: usize) -> GemmResult<Self> {
        let va = config.kernel().min_vector_a();
        let vb = config.kernel().min_vector_b();
        let mc = config.m_per_block();
        let nc = config.n_per_block();
        let kc = config.k_per_block();

        let a_len =
            BlockDescriptorFactory::a_block(config.a_layout(), mc, kc, va).element_space_size();
        let b_len =
            BlockDescriptorFactory::b_block(config.b_layout(), kc, nc, vb).element_space_size();

        let a_local = AlignedBuffer::new(a_len)?;
        let b_local = AlignedBuffer::new(b_len)?;
        let c_local = if config.use_c_local_buffer() {
            Some(AlignedBuffer::new(c_local_len)?)
        } else {
            None
        };

        Ok(Scratch {
            a_local,
            b_local,
            c_local,
            a_xfer: SliceTransfer::new(),
            b_xfer: SliceTransfer::new(),
            c_xfer: SliceTransfer::new(),
        })
    }
}

/// Packs (or directly views) the `(mc, kc)` A block, positioning the
/// source cursor per `positioning` first. Returns the slice the
/// micro-kernel should read from and the descriptor whose strides it
/// should use.
///
/// When `UseALocalBuffer` is off there is no packing step and `a_op` is
/// not applied — values flow from `a` straight into the kernel, matching
/// the original's behavior when no `AThreadBuffer` is materialized; in
/// that case `positioning` is unused since there is no cursor to move.
#[allow(clippy::too_many_arguments)]
fn prepare_a_block<'s>(
    config: &GemmConfig,
    a: &'s [f64],
    a_full_desc: &GridDescriptor,
    a_local: &'s mut AlignedBuffer,
    a_xfer: &mut SliceTransfer,
    positioning: Positioning,
    m_start: usize,
    mc: usize,
    k_start: usize,
    kc: usize,
    a_op: ElementOp,
) -> (&'s [f64], GridDescriptor) {
    if !config.use_a_local_buffer() {
        let origin = match config.a_layout() {
            ALayout::RowMajorMK => [m_start, k_start],
            ALayout::ColMajorKM => [k_start, m_start],
        };
        let offset = a_full_desc.offset(&origin);
        return (&a[offset..], a_full_desc.clone());
    }

    let desc = BlockDescriptorFactory::a_block(config.a_layout(), mc, kc, config.kernel().min_vector_a());
    let valid = match config.a_layout() {
        ALayout::RowMajorMK => [mc, kc],
        ALayout::ColMajorKM => [kc, mc],
    };
    positioning.apply(a_xfer);
    a_xfer.run_pack(a, a_full_desc, a_local.as_mut_slice(), &desc, &valid, a_op);
    (&a_local.as_slice()[..desc.element_space_size()], desc)
}

/// Same as [`prepare_a_block`] for the `(kc, nc)` B block. `BLayout`
/// validity already guarantees `TiledN0KN1` always packs.
#[allow(clippy::too_many_arguments)]
fn prepare_b_block<'s>(
    config: &GemmConfig,
    b: &'s [f64],
    b_full_desc: &GridDescriptor,
    b_local: &'s mut AlignedBuffer,
    b_xfer: &mut SliceTransfer,
    positioning: Positioning,
    k_start: usize,
    kc: usize,
    n_start: usize,
    nc: usize,
    b_op: ElementOp,
) -> (&'s [f64], GridDescriptor) {
    let vb = config.kernel().min_vector_b();

    if !config.use_b_local_buffer() {
        // Validity rejects `TiledN0KN1` combined with `UseBLocalBuffer =
        // false` (there is no flat source to read it from), so this is
        // always the row-major 2-D case.
        let offset = b_full_desc.offset(&[k_start, n_start]);
        return (&b[offset..], b_full_desc.clone());
    }

    let desc = BlockDescriptorFactory::b_block(config.b_layout(), kc, nc, vb);
    let valid: Vec<usize> = match desc.num_dimensions() {
        2 => vec![kc, nc],
        3 => vec![nc, kc],
        n => unreachable!("B block descriptor has unsupported dimensionality {n}"),
    };
    positioning.apply(b_xfer);
    b_xfer.run_pack(b, b_full_desc, b_local.as_mut_slice(), &desc, &valid, b_op);
    (&b_local.as_slice()[..desc.element_space_size()], desc)
}

/// Runs the scheduled tile sweep over `(m, n, k)` and writes the result
/// into `c`. Callers reach this through [`crate::run_gemm`].
pub struct Driver;

impl Driver {
    /// Executes one GEMM with the given configuration and elementwise
    /// operand transforms. `a`, `b`, `c` are flat row-major (or, for `A`,
    /// `ALayout`-dependent, and for `B`, `BLayout`-dependent) buffers
    /// sized exactly `m*k`, `k*n`, `m*n` elements (or, for B under
    /// `TiledN0KN1`, `ceil(n/VB)*k*VB`).
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(level = "debug", skip(config, a, b, c, a_op, b_op, c_op))]
    pub fn run(
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
        config.validate(m, n, k)?;

        let a_full_desc = a_full_descriptor(config.a_layout(), m, k);
        let b_full_desc = b_full_descriptor(config.b_layout(), k, n, config.kernel().min_vector_b());
        let c_full_desc = GridDescriptor::packed_row_major_2d(m, n);

        if a.len() < a_full_desc.element_space_size() {
            return Err(GemmError::contract(format!(
                "A buffer has {} elements, need at least {}",
                a.len(),
                a_full_desc.element_space_size()
            )));
        }
        if b.len() < b_full_desc.element_space_size() {
            return Err(GemmError::contract(format!(
                "B buffer has {} elements, need at least {}",
                b.len(),
                b_full_desc.element_space_size()
            )));
        }
        if c.len() < m * n {
            return Err(GemmError::contract(format!(
                "C buffer has {} elements, need at least {}",
                c.len(),
                m * n
            )));
        }

        // Surface allocation failures here, synchronously, where `?`
        // still works — `for_each_init`'s init closure cannot return a
        // `Result`.
        let c_local_len = match config.access_order() {
            AccessOrder::MNK => config.m_per_block() * config.n_per_block(),
            AccessOrder::MKN => config.m_per_block() * n,
        };
        Scratch::new(config, c_local_len)?;

        match config.access_order() {
            AccessOrder::MNK => Self::run_mnk(
                config,
                m,
                n,
                k,
                a,
                &a_full_desc,
                b,
                &b_full_desc,
                c,
                &c_full_desc,
                c_local_len,
                a_op,
                b_op,
                c_op,
            ),
            AccessOrder::MKN => Self::run_mkn(
                config,
                m,
                n,
                k,
                a,
                &a_full_desc,
                b,
                &b_full_desc,
                c,
                &c_full_desc,
                c_local_len,
                a_op,
                b_op,
                c_op,
            ),
        }

        Ok(())
    }

    /// `Sequence<0, 1, 2>`: tile-parallel over `(M, N)`, K innermost and
    /// sequential within a tile.
    #[allow(clippy::too_many_arguments)]
    fn run_mnk(
        config: &GemmConfig,
        m: usize,
        n: usize,
        k: usize,
        a: &[f64],
        a_full_desc: &GridDescriptor,
        b: &[f64],
        b_full_desc: &GridDescriptor,
        c: &mut [f64],
        c_full_desc: &GridDescriptor,
        c_local_len: usize,
        a_op: ElementOp,
        b_op: ElementOp,
        c_op: ElementOp,
    ) {
        let num_m = tile_count(m, config.m_per_block());
        let num_n = tile_count(n, config.n_per_block());
        let num_k = tile_count(k, config.k_per_block());
        let vb = config.kernel().min_vector_b();

        // `c` is partitioned into a `num_m * num_n` grid of disjoint
        // row/column ranges; `par_chunks_mut` over rows would not line
        // up with column tiling, so tiles instead write through a raw
        // pointer into disjoint regions of one shared buffer — never
        // materializing an `&mut` slice wider than a single tile's own
        // footprint, since two sibling column tiles run on different
        // workers and a wide slice would overlap both of them.
        let c_ptr = SendPtr(c.as_mut_ptr());

        (0..num_m * num_n)
            .into_par_iter()
            .for_each_init(
                || Scratch::new(config, c_local_len).expect("scratch pre-flight already succeeded"),
                |scratch, tile_idx| {
                    let i_m = tile_idx / num_n;
                    let i_n = tile_idx % num_n;
                    let (m_start, mc) = tile_extent(i_m, config.m_per_block(), m);
                    let (n_start, nc) = tile_extent(i_n, config.n_per_block(), n);

                    tracing::trace!(i_m, i_n, m_start, mc, n_start, nc, "dispatching M,N tile");

                    for i_k in 0..num_k {
                        let (k_start, kc) = tile_extent(i_k, config.k_per_block(), k);
                        let accumulate_into_local = i_k != 0;
                        let first_k = i_k == 0;

                        let a_positioning = if first_k {
                            Positioning::Reset(a_reset_origin(config.a_layout(), m_start))
                        } else {
                            Positioning::Step(a_k_step(config.a_layout(), config.k_per_block()))
                        };
                        let b_positioning = if first_k {
                            Positioning::Reset(b_reset_origin_mnk(config.b_layout(), n_start, vb))
                        } else {
                            Positioning::Step(b_k_step(config.b_layout(), config.k_per_block()))
                        };

                        let (a_block, a_desc) = prepare_a_block(
                            config, a, a_full_desc, &mut scratch.a_local, &mut scratch.a_xfer,
                            a_positioning, m_start, mc, k_start, kc, a_op,
                        );
                        let (b_block, b_desc) = prepare_b_block(
                            config, b, b_full_desc, &mut scratch.b_local, &mut scratch.b_xfer,
                            b_positioning, k_start, kc, n_start, nc, b_op,
                        );

                        match &mut scratch.c_local {
                            Some(c_local) => {
                                // SAFETY: `c_local` is this worker's own
                                // private scratch buffer, sized for at
                                // least `mc * nc` elements.
                                unsafe {
                                    config.kernel().run(
                                        a_block,
                                        config.a_layout(),
                                        &a_desc,
                                        b_block,
                                        config.b_layout(),
                                        &b_desc,
                                        c_local.as_mut_ptr(),
                                        mc,
                                        kc,
                                        nc,
                                        nc,
                                        accumulate_into_local,
                                    );
                                }
                            }
                            None => {
                                // SAFETY: each (i_m, i_n) tile owns a
                                // disjoint `mc x nc` sub-rectangle of `c`
                                // (size `m * n`, row stride `n`), so this
                                // pointer plus the kernel's own `r * ldc +
                                // c` addressing never touches another
                                // tile's elements; no two rayon tasks ever
                                // write the same element, and no `&mut`
                                // slice spanning other tiles' columns is
                                // ever formed.
                                unsafe {
                                    let c_tile = c_ptr.0.add(m_start * n + n_start);
                                    config.kernel().run(
                                        a_block,
                                        config.a_layout(),
                                        &a_desc,
                                        b_block,
                                        config.b_layout(),
                                        &b_desc,
                                        c_tile,
                                        mc,
                                        kc,
                                        nc,
                                        n,
                                        accumulate_into_local,
                                    );
                                }
                            }
                        }
                    }

                    if let Some(c_local) = &scratch.c_local {
                        let c_block_desc = BlockDescriptorFactory::c_block(mc, nc);
                        scratch.c_xfer.set_dst_origin(&[m_start, n_start]);
                        // SAFETY: this tile's `(mc, nc)` sub-rectangle of
                        // `c`, rooted at `(m_start, n_start)`, is disjoint
                        // from every other (i_m, i_n) tile's; no full-grid
                        // `&mut` slice is ever formed.
                        unsafe {
                            scratch.c_xfer.run_copy_back(
                                &c_local.as_slice()[..c_block_desc.element_space_size()],
                                &c_block_desc,
                                c_ptr.0,
                                c_full_desc,
                                c_op,
                            );
                        }
                    }
                },
            );
    }

    /// `Sequence<0, 2, 1>`: tile-parallel over `M` only; `K` is outer and
    /// `N` inner, so A is packed once per `(i_m, i_k)` and reused across
    /// every `i_n`.
    #[allow(clippy::too_many_arguments)]
    fn run_mkn(
        config: &GemmConfig,
        m: usize,
        n: usize,
        k: usize,
        a: &[f64],
        a_full_desc: &GridDescriptor,
        b: &[f64],
        b_full_desc: &GridDescriptor,
        c: &mut [f64],
        c_full_desc: &GridDescriptor,
        c_local_len: usize,
        a_op: ElementOp,
        b_op: ElementOp,
        c_op: ElementOp,
    ) {
        let num_m = tile_count(m, config.m_per_block());
        let num_n = tile_count(n, config.n_per_block());
        let num_k = tile_count(k, config.k_per_block());
        let vb = config.kernel().min_vector_b();

        let c_ptr = SendPtr(c.as_mut_ptr());

        (0..num_m)
            .into_par_iter()
            .for_each_init(
                || Scratch::new(config, c_local_len).expect("scratch pre-flight already succeeded"),
                |scratch, i_m| {
                    let (m_start, mc) = tile_extent(i_m, config.m_per_block(), m);

                    tracing::trace!(i_m, m_start, mc, "dispatching M tile");

                    for i_k in 0..num_k {
                        let (k_start, kc) = tile_extent(i_k, config.k_per_block(), k);
                        let accumulate = i_k != 0;
                        let first_k = i_k == 0;

                        let a_positioning = if first_k {
                            Positioning::Reset(a_reset_origin(config.a_layout(), m_start))
                        } else {
                            Positioning::Step(a_k_step(config.a_layout(), config.k_per_block()))
                        };

                        let (a_block, a_desc) = prepare_a_block(
                            config, a, a_full_desc, &mut scratch.a_local, &mut scratch.a_xfer,
                            a_positioning, m_start, mc, k_start, kc, a_op,
                        );

                        // B's origin resets once per `i_k` (N back to 0,
                        // K to `k_start`); within the N loop it only ever
                        // advances.
                        let b_reset = Positioning::Reset(b_reset_origin_mkn(config.b_layout(), k_start));

                        for i_n in 0..num_n {
                            let (n_start, nc) = tile_extent(i_n, config.n_per_block(), n);
                            let b_positioning = if i_n == 0 {
                                b_reset
                            } else {
                                Positioning::Step(b_n_step(config.b_layout(), config.n_per_block(), vb))
                            };

                            let (b_block, b_desc) = prepare_b_block(
                                config, b, b_full_desc, &mut scratch.b_local, &mut scratch.b_xfer,
                                b_positioning, k_start, kc, n_start, nc, b_op,
                            );

                            match &mut scratch.c_local {
                                Some(c_local) => {
                                    // The local C tile spans the whole N
                                    // (validated: NPerBlock >= N), laid
                                    // out `mc x n`; the i_n'th N-subrange
                                    // starts at column `n_start`, with
                                    // `ldc == n` (not `nc`).
                                    //
                                    // SAFETY: `c_local` is this worker's
                                    // own private scratch buffer, sized
                                    // for at least `mc * n` elements;
                                    // `n_start + nc <= n`.
                                    unsafe {
                                        config.kernel().run(
                                            a_block,
                                            config.a_layout(),
                                            &a_desc,
                                            b_block,
                                            config.b_layout(),
                                            &b_desc,
                                            c_local.as_mut_ptr().add(n_start),
                                            mc,
                                            kc,
                                            nc,
                                            n,
                                            accumulate,
                                        );
                                    }
                                }
                                None => {
                                    // SAFETY: (i_m) tiles are disjoint row
                                    // ranges of `c`; within one task, i_k
                                    // and i_n run sequentially, so no live
                                    // reference ever overlaps another
                                    // worker's, and no slice wider than
                                    // this write is ever formed.
                                    unsafe {
                                        let c_tile = c_ptr.0.add(m_start * n + n_start);
                                        config.kernel().run(
                                            a_block,
                                            config.a_layout(),
                                            &a_desc,
                                            b_block,
                                            config.b_layout(),
                                            &b_desc,
                                            c_tile,
                                            mc,
                                            kc,
                                            nc,
                                            n,
                                            accumulate,
                                        );
                                    }
                                }
                            }
                        }
                    }

                    if let Some(c_local) = &scratch.c_local {
                        let c_block_desc = BlockDescriptorFactory::c_block(mc, n);
                        scratch.c_xfer.set_dst_origin(&[m_start, 0]);
                        // SAFETY: `M` tiles are disjoint row ranges of
                        // `c`; no full-grid `&mut` slice is ever formed.
                        unsafe {
                            scratch.c_xfer.run_copy_back(
                                &c_local.as_slice()[..c_block_desc.element_space_size()],
                                &c_block_desc,
                                c_ptr.0,
                                c_full_desc,
                                c_op,
                            );
                        }
                    }
                },
            );
    }
}

/// A raw pointer wrapper to let disjoint-region writes into one `&mut
/// [f64]` cross into `for_each_init`'s closure, which otherwise can't
/// capture an exclusive borrow across parallel iterations. Every use site
/// carries a `SAFETY` comment establishing the regions never overlap and
/// writes through the pointer directly rather than via an intermediate
/// `&mut` slice spanning more than one tile.
#[derive(Clone, Copy)]
struct SendPtr(*mut f64);
unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}
