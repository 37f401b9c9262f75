// Naive per-slice products used as the oracle in unit tests.

use crate::dim::Dim;

pub(crate) fn at(data: &[f32], d: Dim, b: usize, i: usize, j: usize) -> f32 {
    data[d.batch_offset(b) + j * d.rows + i]
}

/// Deterministic small-integer fill; products stay exact in f32.
pub(crate) fn fill(d: Dim, seed: usize) -> Vec<f32> {
    (0..d.numel())
        .map(|i| ((i * 7 + seed * 3) % 11) as f32 - 5.0)
        .collect()
}

/// `op(l_b) * op(r_b)` as a column-major slice, where `op` transposes when
/// the matching flag is set.
pub(crate) fn slice_product(
    l: &[f32],
    ld: Dim,
    l_t: bool,
    r: &[f32],
    rd: Dim,
    r_t: bool,
    b: usize,
) -> Vec<f32> {
    let (m, k) = if l_t { (ld.cols, ld.rows) } else { (ld.rows, ld.cols) };
    let n = if r_t { rd.rows } else { rd.cols };
    let mut out = vec![0.0f32; m * n];
    for j in 0..n {
        for i in 0..m {
            let mut sum = 0.0f32;
            for p in 0..k {
                let lv = if l_t { at(l, ld, b, p, i) } else { at(l, ld, b, i, p) };
                let rv = if r_t { at(r, rd, b, j, p) } else { at(r, rd, b, p, j) };
                sum += lv * rv;
            }
            out[j * m + i] = sum;
        }
    }
    out
}

/// Expected destination after accumulating `op(l) * op(r)` into `y` over
/// `batches` slices with the broadcast rule applied to all three tensors.
#[allow(clippy::too_many_arguments)]
pub(crate) fn accumulate(
    l: &[f32],
    ld: Dim,
    l_t: bool,
    r: &[f32],
    rd: Dim,
    r_t: bool,
    y: &[f32],
    yd: Dim,
    batches: usize,
) -> Vec<f32> {
    let mut out = y.to_vec();
    for b in 0..batches {
        let p = slice_product(l, ld, l_t, r, rd, r_t, b);
        let off = yd.batch_offset(b);
        for (o, v) in out[off..off + yd.batch_size()].iter_mut().zip(p) {
            *o += v;
        }
    }
    out
}
