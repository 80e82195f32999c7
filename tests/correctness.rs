//! Integration tests against `run_gemm` / `Driver::run`, covering
//! end-to-end scenarios and testable correctness properties. Plain
//! `#[test]` functions comparing against a naive reference.

use blocked_gemm::{AccessOrder, ALayout, BLayout, GemmConfig, GemmError, run_gemm};

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

fn assert_matrices_equal(expected: &[f64], actual: &[f64], name: &str) {
    assert_eq!(expected.len(), actual.len(), "{name}: length mismatch");
    for i in 0..expected.len() {
        assert!(
            (expected[i] - actual[i]).abs() < 1e-8,
            "{name}: mismatch at index {i}: expected {}, got {}",
            expected[i],
            actual[i]
        );
    }
}

// ============================================================
// S1: identity matrices
// ============================================================

#[test]
fn s1_identity_64() {
    let n = 64;
    let mut a = vec![0.0; n * n];
    let mut b = vec![0.0; n * n];
    for i in 0..n {
        a[i * n + i] = 1.0;
        b[i * n + i] = 1.0;
    }
    let mut c = vec![0.0; n * n];

    let config = GemmConfig::builder(16, 16, 16).build();
    run_gemm(&config, n, n, n, &a, &b, &mut c).unwrap();

    for i in 0..n {
        for j in 0..n {
            let expect = if i == j { 1.0 } else { 0.0 };
            assert_eq!(c[i * n + j], expect, "at ({i},{j})");
        }
    }
}

// ============================================================
// S2: all-ones ragged shape
// ============================================================

#[test]
fn s2_all_ones_ragged() {
    let (m, n, k) = (9, 11, 17);
    let a = vec![1.0; m * k];
    let b = vec![1.0; k * n];
    let mut c = vec![0.0; m * n];

    let config = GemmConfig::builder(8, 8, 8)
        .use_c_local_buffer(true)
        .access_order(AccessOrder::MNK)
        .build();
    run_gemm(&config, m, n, k, &a, &b, &mut c).unwrap();

    for i in 0..m {
        for j in 0..n {
            assert_eq!(c[i * n + j], 17.0, "at ({i},{j})");
        }
    }
}

// ============================================================
// S3: random shapes against a naive reference
// ============================================================

#[test]
fn s3_random_shape_within_tolerance() {
    let (m, n, k) = (128, 128, 64);
    let a: Vec<f64> = (0..m * k).map(|i| ((i * 37 + 11) % 1000) as f64 / 100.0).collect();
    let b: Vec<f64> = (0..k * n).map(|i| ((i * 53 + 7) % 1000) as f64 / 100.0).collect();
    let expected = naive(&a, &b, m, n, k);
    let mut c = vec![0.0; m * n];

    let config = GemmConfig::builder(32, 32, 32).build();
    run_gemm(&config, m, n, k, &a, &b, &mut c).unwrap();

    for i in 0..m * n {
        let rel = (c[i] - expected[i]).abs() / expected[i].abs().max(1.0);
        assert!(rel < 1e-4, "mismatch @ {i}: {} vs {}", c[i], expected[i]);
    }
}

// ============================================================
// S4: tall-and-thin dot-product accumulation
// ============================================================

#[test]
fn s4_dot_product_accumulation() {
    let (m, n, k) = (1, 8, 1024);
    let a: Vec<f64> = (0..k).map(|i| (i % 10) as f64).collect();
    let b: Vec<f64> = (0..k * n).map(|i| (i % 7) as f64).collect();
    let expected = naive(&a, &b, m, n, k);
    let mut c = vec![0.0; n];

    let config = GemmConfig::builder(16, 8, 64).build();
    run_gemm(&config, m, n, k, &a, &b, &mut c).unwrap();

    assert_matrices_equal(&expected, &c, "s4_dot_product");
}

// ============================================================
// S5 / S6: validity-check refusals
// ============================================================

#[test]
fn s5_non_local_c_requires_n_divisible_by_vb() {
    let config = GemmConfig::builder(8, 8, 8)
        .use_c_local_buffer(false)
        .access_order(AccessOrder::MKN)
        .build();

    let err = config.validate(8, 12, 8).unwrap_err();
    assert!(matches!(err, GemmError::Config { .. }));
}

#[test]
fn s6_local_c_with_mkn_requires_n_per_block_covers_n() {
    let config = GemmConfig::builder(8, 32, 8)
        .use_c_local_buffer(true)
        .access_order(AccessOrder::MKN)
        .build();

    let err = config.validate(8, 64, 8).unwrap_err();
    assert!(matches!(err, GemmError::Config { .. }));
}

// ============================================================
// Property 2: accumulate correctness is independent of how K is tiled
// ============================================================

#[test]
fn accumulate_correctness_independent_of_k_tiling() {
    // 24 doesn't divide evenly by 5, 7 or 11 - each KPerBlock below
    // exercises a different number of K-tiles and a different ragged
    // remainder, all of which must drive the same `accumulate` sequence
    // to the same numerical result (the `i_k != 0` flag is the hinge).
    let (m, n, k) = (16, 16, 24);
    let a: Vec<f64> = (0..m * k).map(|i| (i % 9) as f64).collect();
    let b: Vec<f64> = (0..k * n).map(|i| (i % 11) as f64).collect();
    let expected = naive(&a, &b, m, n, k);

    for kpb in [5, 7, 8, 11, 24] {
        let config = GemmConfig::builder(8, 8, kpb).build();
        let mut c = vec![0.0; m * n];
        run_gemm(&config, m, n, k, &a, &b, &mut c).unwrap();
        assert_matrices_equal(&expected, &c, &format!("kpb_{kpb}"));
    }
}

// ============================================================
// Property 5/6: order equivalence and determinism
// ============================================================

#[test]
fn order_equivalence_mnk_vs_mkn() {
    let (m, n, k) = (48, 64, 96);
    let a: Vec<f64> = (0..m * k).map(|i| (i % 13) as f64).collect();
    let b: Vec<f64> = (0..k * n).map(|i| (i % 17) as f64).collect();

    let cfg_mnk = GemmConfig::builder(16, 16, 32)
        .access_order(AccessOrder::MNK)
        .build();
    let cfg_mkn = GemmConfig::builder(16, n, 32)
        .access_order(AccessOrder::MKN)
        .build();

    let mut c_mnk = vec![0.0; m * n];
    let mut c_mkn = vec![0.0; m * n];
    run_gemm(&cfg_mnk, m, n, k, &a, &b, &mut c_mnk).unwrap();
    run_gemm(&cfg_mkn, m, n, k, &a, &b, &mut c_mkn).unwrap();

    assert_matrices_equal(&c_mnk, &c_mkn, "order_equivalence");
}

#[test]
fn local_c_toggle_matches_direct_write() {
    let (m, n, k) = (40, 64, 48);
    let a: Vec<f64> = (0..m * k).map(|i| (i % 13) as f64).collect();
    let b: Vec<f64> = (0..k * n).map(|i| (i % 17) as f64).collect();

    let cfg_local = GemmConfig::builder(16, 16, 16)
        .use_c_local_buffer(true)
        .build();
    let cfg_direct = GemmConfig::builder(16, 16, 16)
        .use_c_local_buffer(false)
        .build();

    let mut c_local = vec![0.0; m * n];
    let mut c_direct = vec![0.0; m * n];
    run_gemm(&cfg_local, m, n, k, &a, &b, &mut c_local).unwrap();
    run_gemm(&cfg_direct, m, n, k, &a, &b, &mut c_direct).unwrap();

    assert_matrices_equal(&c_local, &c_direct, "local_c_toggle");
}

// ============================================================
// Non-square shapes, both A layouts, both B layouts
// ============================================================

#[test]
fn non_square_shapes() {
    let test_cases = [
        (32, 64, 48),
        (64, 32, 48),
        (100, 50, 75),
        (48, 48, 100),
        (13, 17, 19),
    ];

    for (m, n, k) in test_cases {
        let a: Vec<f64> = (0..m * k).map(|i| (i % 10) as f64).collect();
        let b: Vec<f64> = (0..k * n).map(|i| (i % 10) as f64).collect();
        let expected = naive(&a, &b, m, n, k);
        let mut c = vec![0.0; m * n];

        let config = GemmConfig::builder(16, 16, 16).build();
        run_gemm(&config, m, n, k, &a, &b, &mut c).unwrap();

        assert_matrices_equal(&expected, &c, &format!("non_square_{m}x{n}x{k}"));
    }
}

#[test]
fn col_major_a_layout_matches_naive() {
    let (m, n, k) = (37, 41, 29);
    let a_mk: Vec<f64> = (0..m * k).map(|i| (i % 11) as f64).collect();
    let mut a_km = vec![0.0; k * m];
    for i in 0..m {
        for p in 0..k {
            a_km[p * m + i] = a_mk[i * k + p];
        }
    }
    let b: Vec<f64> = (0..k * n).map(|i| (i % 7) as f64).collect();
    let expected = naive(&a_mk, &b, m, n, k);
    let mut c = vec![0.0; m * n];

    let config = GemmConfig::builder(16, 16, 16)
        .a_layout(ALayout::ColMajorKM)
        .build();
    run_gemm(&config, m, n, k, &a_km, &b, &mut c).unwrap();

    assert_matrices_equal(&expected, &c, "col_major_a");
}

#[test]
fn tiled_b_layout_matches_naive() {
    let config_probe = GemmConfig::builder(16, 16, 16).build();
    let vb = config_probe.kernel().min_vector_b();

    let (m, n, k) = (vb * 3, vb * 5 + 1, 24);
    let a: Vec<f64> = (0..m * k).map(|i| (i % 11) as f64).collect();
    let b_kn: Vec<f64> = (0..k * n).map(|i| (i % 7) as f64).collect();
    let expected = naive(&a, &b_kn, m, n, k);

    let n0 = n.div_ceil(vb);
    let mut b_tiled = vec![0.0; n0 * k * vb];
    for p in 0..k {
        for j in 0..n {
            let tile = j / vb;
            let lane = j % vb;
            b_tiled[(tile * k + p) * vb + lane] = b_kn[p * n + j];
        }
    }

    let mut c = vec![0.0; m * n];
    let config = GemmConfig::builder(16, vb, 16)
        .b_layout(BLayout::TiledN0KN1)
        .build();
    run_gemm(&config, m, n, k, &a, &b_tiled, &mut c).unwrap();

    assert_matrices_equal(&expected, &c, "tiled_b_layout");
}

// ============================================================
// Elementwise operand transforms
// ============================================================

#[test]
fn elementwise_ops_apply_during_pack_and_flush() {
    let (m, n, k) = (16, 16, 16);
    let a: Vec<f64> = (0..m * k).map(|i| (i % 5) as f64).collect();
    let b: Vec<f64> = (0..k * n).map(|i| (i % 5) as f64).collect();

    // a_op negates A, b_op doubles B, c_op halves the result: net effect
    // is -1x the plain product.
    let expected: Vec<f64> = naive(&a, &b, m, n, k).iter().map(|v| -v).collect();

    let mut c = vec![0.0; m * n];
    let config = GemmConfig::builder(8, 8, 8).build();
    blocked_gemm::run_gemm_with_ops(
        &config, m, n, k, &a, &b, &mut c,
        &|x| -x, &|x| x * 2.0, &|x| x * 0.5,
    )
    .unwrap();

    assert_matrices_equal(&expected, &c, "elementwise_ops");
}

// ============================================================
// Contract violations (shape mismatches)
// ============================================================

#[test]
fn contract_violation_on_undersized_buffer() {
    let config = GemmConfig::builder(8, 8, 8).build();
    let a = vec![0.0; 4]; // too small for 8x8
    let b = vec![0.0; 64];
    let mut c = vec![0.0; 64];

    let err = run_gemm(&config, 8, 8, 8, &a, &b, &mut c).unwrap_err();
    assert!(matches!(err, GemmError::ContractViolation { .. }));
}
