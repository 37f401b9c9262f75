//! Batched matmul properties on the host backend.
//!
//! Every value is a small integer so GEMM results are exact regardless of
//! summation order; comparisons still go through `approx` to keep the tests
//! meaningful if the fill changes.

use approx::assert_abs_diff_eq;
use bm_kernels::{
    matrix_multiply, matrix_multiply_transp_acc, matrix_transp_multiply_acc, CpuDevice, Dim,
    MatMulBackend, TensorView, TensorViewMut,
};
use proptest::prelude::*;

fn fill(d: Dim, seed: usize) -> Vec<f32> {
    (0..d.numel())
        .map(|i| ((i * 5 + seed * 13) % 9) as f32 - 4.0)
        .collect()
}

/// Element `(i, j)` of slice `b`, with the broadcast rule.
fn at(data: &[f32], d: Dim, b: usize, i: usize, j: usize) -> f32 {
    data[d.batch_offset(b) + j * d.rows + i]
}

fn slice(data: &[f32], d: Dim, b: usize) -> &[f32] {
    let off = d.batch_offset(b);
    &data[off..off + d.batch_size()]
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert_abs_diff_eq!(a, e, epsilon = 1e-3);
    }
}

#[test]
fn forward_scenario_broadcast_left() {
    let dev = CpuDevice::new();
    let l = vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
    let r = vec![1.0; 12];
    let mut y = vec![0.0; 8];
    matrix_multiply(
        &dev,
        TensorView::new(&l, Dim::matrix(2, 3)),
        TensorView::new(&r, Dim::new(3, 2, 2)),
        TensorViewMut::new(&mut y, Dim::new(2, 2, 2)),
        0.0,
    )
    .unwrap();
    assert_eq!(y, vec![1.0; 8]);
}

#[test]
fn multiply_transp_acc_scenario_sums_slices() {
    let dev = CpuDevice::new();
    let ld = Dim::new(2, 2, 3);
    let l = fill(ld, 1);
    let r: Vec<f32> = [1.0, 0.0, 0.0, 1.0].iter().copied().cycle().take(12).collect();
    let mut y = vec![0.0; 4];
    matrix_multiply_transp_acc(
        &dev,
        TensorView::new(&l, ld),
        TensorView::new(&r, Dim::new(2, 2, 3)),
        TensorViewMut::new(&mut y, Dim::matrix(2, 2)),
    )
    .unwrap();
    let expected: Vec<f32> = (0..4).map(|i| l[i] + l[4 + i] + l[8 + i]).collect();
    assert_close(&y, &expected);
}

#[test]
fn gradient_round_trip_of_forward_product() {
    // y = l * r with shared l; dl = dy * r^T summed over batch, dr = l^T * dy.
    let dev = CpuDevice::new();
    let (ld, rd, yd) = (Dim::matrix(2, 3), Dim::new(3, 2, 4), Dim::new(2, 2, 4));
    let l = fill(ld, 1);
    let r = fill(rd, 2);
    let dy = fill(yd, 3);

    let mut dl = vec![0.0; ld.numel()];
    matrix_multiply_transp_acc(
        &dev,
        TensorView::new(&dy, yd),
        TensorView::new(&r, rd),
        TensorViewMut::new(&mut dl, ld),
    )
    .unwrap();
    let mut expected_dl = vec![0.0; ld.numel()];
    for b in 0..4 {
        for j in 0..ld.cols {
            for i in 0..ld.rows {
                let mut s = 0.0;
                for p in 0..yd.cols {
                    s += at(&dy, yd, b, i, p) * at(&r, rd, b, j, p);
                }
                expected_dl[j * ld.rows + i] += s;
            }
        }
    }
    assert_close(&dl, &expected_dl);

    let mut dr = vec![0.0; rd.numel()];
    matrix_transp_multiply_acc(
        &dev,
        TensorView::new(&l, ld),
        TensorView::new(&dy, yd),
        TensorViewMut::new(&mut dr, rd),
    )
    .unwrap();
    for b in 0..4 {
        for j in 0..rd.cols {
            for i in 0..rd.rows {
                let mut s = 0.0;
                for p in 0..ld.rows {
                    s += at(&l, ld, 0, p, i) * at(&dy, yd, b, p, j);
                }
                assert_abs_diff_eq!(at(&dr, rd, b, i, j), s, epsilon = 1e-3);
            }
        }
    }
}

proptest! {
    #[test]
    fn fused_forward_equals_per_slice_calls(
        x in 1usize..5,
        k in 1usize..5,
        z in 1usize..5,
        batch in 1usize..5,
        seed in 0usize..50,
        scale in prop::sample::select(vec![0.0f32, 1.0, -1.0, 2.0]),
    ) {
        let dev = CpuDevice::new();
        let (ld, rd, yd) = (Dim::matrix(x, k), Dim::new(k, z, batch), Dim::new(x, z, batch));
        let l = fill(ld, seed);
        let r = fill(rd, seed + 1);
        let init = fill(yd, seed + 2);

        let mut fused = init.clone();
        dev.matrix_multiply(
            TensorView::new(&l, ld),
            TensorView::new(&r, rd),
            TensorViewMut::new(&mut fused, yd),
            scale,
        ).unwrap();

        let mut looped = init.clone();
        for b in 0..batch {
            let off = yd.batch_offset(b);
            dev.matrix_multiply(
                TensorView::new(&l, ld),
                TensorView::new(slice(&r, rd, b), Dim::matrix(k, z)),
                TensorViewMut::new(&mut looped[off..off + yd.batch_size()], Dim::matrix(x, z)),
                scale,
            ).unwrap();
        }
        assert_close(&fused, &looped);
    }

    #[test]
    fn forward_scale_one_adds_product(
        x in 1usize..4,
        k in 1usize..4,
        z in 1usize..4,
        lb in prop::sample::select(vec![1usize, 3]),
        rb in prop::sample::select(vec![1usize, 3]),
        seed in 0usize..50,
    ) {
        let dev = CpuDevice::new();
        let yb = lb.max(rb);
        let (ld, rd, yd) = (Dim::new(x, k, lb), Dim::new(k, z, rb), Dim::new(x, z, yb));
        let l = fill(ld, seed);
        let r = fill(rd, seed + 1);
        let before = fill(yd, seed + 2);
        let mut y = before.clone();
        dev.matrix_multiply(
            TensorView::new(&l, ld),
            TensorView::new(&r, rd),
            TensorViewMut::new(&mut y, yd),
            dev.scalar_one(),
        ).unwrap();

        for b in 0..yb {
            for j in 0..z {
                for i in 0..x {
                    let mut s = 0.0;
                    for p in 0..k {
                        s += at(&l, ld, b, i, p) * at(&r, rd, b, p, j);
                    }
                    let delta = at(&y, yd, b, i, j) - at(&before, yd, b, i, j);
                    prop_assert!(
                        (delta - s).abs() < 1e-3,
                        "slice {} ({}, {}): {} vs {}",
                        b,
                        i,
                        j,
                        delta,
                        s
                    );
                }
            }
        }
    }

    #[test]
    fn transp_multiply_acc_adds_per_slice(
        x in 1usize..4,
        k in 1usize..4,
        z in 1usize..4,
        lb in prop::sample::select(vec![1usize, 2]),
        seed in 0usize..50,
    ) {
        let dev = CpuDevice::new();
        let (ld, rd, yd) = (Dim::new(k, x, lb), Dim::new(k, z, 2), Dim::new(x, z, 2));
        let l = fill(ld, seed);
        let r = fill(rd, seed + 1);
        let before = fill(yd, seed + 2);
        let mut y = before.clone();
        dev.matrix_transp_multiply_acc(
            TensorView::new(&l, ld),
            TensorView::new(&r, rd),
            TensorViewMut::new(&mut y, yd),
        ).unwrap();

        for b in 0..2 {
            for j in 0..z {
                for i in 0..x {
                    let mut s = 0.0;
                    for p in 0..k {
                        s += at(&l, ld, b, p, i) * at(&r, rd, b, p, j);
                    }
                    let delta = at(&y, yd, b, i, j) - at(&before, yd, b, i, j);
                    prop_assert!((delta - s).abs() < 1e-3);
                }
            }
        }
    }

    #[test]
    fn multiply_transp_acc_adds_per_slice(
        x in 1usize..4,
        k in 1usize..4,
        z in 1usize..4,
        batch in 2usize..4,
        unbatched_out in any::<bool>(),
        seed in 0usize..50,
    ) {
        let dev = CpuDevice::new();
        let yb = if unbatched_out { 1 } else { batch };
        let (ld, rd, yd) = (Dim::new(x, k, batch), Dim::new(z, k, batch), Dim::new(x, z, yb));
        let l = fill(ld, seed);
        let r = fill(rd, seed + 1);
        let before = fill(yd, seed + 2);
        let mut y = before.clone();
        dev.matrix_multiply_transp_acc(
            TensorView::new(&l, ld),
            TensorView::new(&r, rd),
            TensorViewMut::new(&mut y, yd),
        ).unwrap();

        let mut expected = before.clone();
        for b in 0..batch {
            for j in 0..z {
                for i in 0..x {
                    let mut s = 0.0;
                    for p in 0..k {
                        s += at(&l, ld, b, i, p) * at(&r, rd, b, j, p);
                    }
                    expected[yd.batch_offset(b) + j * x + i] += s;
                }
            }
        }
        assert_close(&y, &expected);
    }
}
