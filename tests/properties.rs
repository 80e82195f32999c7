//! Property-based coverage of shape independence across arbitrary
//! (M, N, K) and order equivalence between the two access orders,
//! generated with `proptest` instead of the hand-picked edge-size lists
//! in `tests/correctness.rs`.

use blocked_gemm::{AccessOrder, GemmConfig, run_gemm};
use proptest::prelude::*;

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

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Property 3: shape independence. Any (m, n, k) in a modest range,
    // with block sizes smaller than the shape (forcing ragged tiles),
    // matches the naive reference.
    #[test]
    fn shape_independence(
        m in 1usize..40,
        n in 1usize..40,
        k in 1usize..40,
        mpb in 1usize..20,
        npb in 1usize..20,
        kpb in 1usize..20,
    ) {
        let a: Vec<f64> = (0..m * k).map(|i| (i % 7) as f64).collect();
        let b: Vec<f64> = (0..k * n).map(|i| (i % 5) as f64).collect();
        let expected = naive(&a, &b, m, n, k);

        let config = GemmConfig::builder(mpb, npb, kpb).build();
        let mut c = vec![0.0; m * n];
        run_gemm(&config, m, n, k, &a, &b, &mut c).unwrap();

        for i in 0..m * n {
            prop_assert!(
                (c[i] - expected[i]).abs() < 1e-8,
                "mismatch @ {i}: {} vs {} (m={m},n={n},k={k},mpb={mpb},npb={npb},kpb={kpb})",
                c[i], expected[i]
            );
        }
    }

    // Property 6: the two access orders produce bit-identical C. MKN
    // requires NPerBlock >= N when local C is on, so NPerBlock is fixed
    // to the full N for that side.
    #[test]
    fn order_equivalence(
        m in 1usize..24,
        n in 1usize..24,
        k in 1usize..24,
        mpb in 1usize..16,
        npb_mnk in 1usize..16,
        kpb in 1usize..16,
    ) {
        let a: Vec<f64> = (0..m * k).map(|i| (i % 9) as f64).collect();
        let b: Vec<f64> = (0..k * n).map(|i| (i % 11) as f64).collect();

        let cfg_mnk = GemmConfig::builder(mpb, npb_mnk, kpb)
            .access_order(AccessOrder::MNK)
            .build();
        let cfg_mkn = GemmConfig::builder(mpb, n, kpb)
            .access_order(AccessOrder::MKN)
            .build();

        let mut c_mnk = vec![0.0; m * n];
        let mut c_mkn = vec![0.0; m * n];
        run_gemm(&cfg_mnk, m, n, k, &a, &b, &mut c_mnk).unwrap();
        run_gemm(&cfg_mkn, m, n, k, &a, &b, &mut c_mkn).unwrap();

        for i in 0..m * n {
            prop_assert_eq!(c_mnk[i], c_mkn[i], "mismatch @ {i}");
        }
    }

    // Property 5: parallel determinism. Running the same shape twice
    // (both runs go through the same rayon pool) yields bit-identical C,
    // since tiles are disjoint and no floating reduction crosses workers.
    #[test]
    fn parallel_determinism(
        m in 1usize..48,
        n in 1usize..48,
        k in 1usize..48,
    ) {
        let a: Vec<f64> = (0..m * k).map(|i| (i % 13) as f64).collect();
        let b: Vec<f64> = (0..k * n).map(|i| (i % 17) as f64).collect();
        let config = GemmConfig::builder(8, 8, 8).build();

        let mut c1 = vec![0.0; m * n];
        let mut c2 = vec![0.0; m * n];
        run_gemm(&config, m, n, k, &a, &b, &mut c1).unwrap();
        run_gemm(&config, m, n, k, &a, &b, &mut c2).unwrap();

        prop_assert_eq!(c1, c2);
    }
}
