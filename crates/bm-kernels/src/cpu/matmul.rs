// Planned host kernels.
//
// Each function executes a `BatchPlan` already chosen by the caller, so the
// fused and looped paths can be compared directly in tests.

use faer::linalg::matmul::matmul;
use faer::{Accum, Par};

use crate::dispatch::BatchPlan;
use crate::view::{TensorView, TensorViewMut};

/// Scale the whole destination buffer in one pass.
///
/// Zero fills instead of multiplying so that prior contents (including
/// NaN/inf) never reach the result.
pub(crate) fn scale_in_place(y: &mut [f32], scale: f32) {
    if scale == 0.0 {
        y.fill(0.0);
    } else if scale != 1.0 {
        for v in y.iter_mut() {
            *v *= scale;
        }
    }
}

/// `y += l * r`
pub(crate) fn multiply_acc(
    plan: BatchPlan,
    l: TensorView<'_>,
    r: TensorView<'_>,
    mut y: TensorViewMut<'_>,
    par: Par,
) {
    match plan {
        // [x, z*b] += [x, k] * [k, z*b]
        BatchPlan::Fused => matmul(
            &mut y.colbatch_matrix_mut(),
            Accum::Add,
            l.matrix(),
            r.colbatch_matrix(),
            1.0f32,
            par,
        ),
        BatchPlan::Looped { batches } => {
            for b in 0..batches {
                matmul(
                    &mut y.batch_matrix_mut(b),
                    Accum::Add,
                    l.batch_matrix(b),
                    r.batch_matrix(b),
                    1.0f32,
                    par,
                );
            }
        }
    }
}

/// `y += l^T * r`
pub(crate) fn transp_multiply_acc(
    plan: BatchPlan,
    l: TensorView<'_>,
    r: TensorView<'_>,
    mut y: TensorViewMut<'_>,
    par: Par,
) {
    match plan {
        // [x, z*b] += [k, x]^T * [k, z*b]
        BatchPlan::Fused => matmul(
            &mut y.colbatch_matrix_mut(),
            Accum::Add,
            l.matrix().transpose(),
            r.colbatch_matrix(),
            1.0f32,
            par,
        ),
        BatchPlan::Looped { batches } => {
            for b in 0..batches {
                matmul(
                    &mut y.batch_matrix_mut(b),
                    Accum::Add,
                    l.batch_matrix(b).transpose(),
                    r.batch_matrix(b),
                    1.0f32,
                    par,
                );
            }
        }
    }
}

/// `y += l * r^T`
pub(crate) fn multiply_transp_acc(
    plan: BatchPlan,
    l: TensorView<'_>,
    r: TensorView<'_>,
    mut y: TensorViewMut<'_>,
    par: Par,
) {
    match plan {
        // [x, z] += [x, k*b] * [z, k*b]^T
        BatchPlan::Fused => matmul(
            &mut y.matrix_mut(),
            Accum::Add,
            l.colbatch_matrix(),
            r.colbatch_matrix().transpose(),
            1.0f32,
            par,
        ),
        BatchPlan::Looped { batches } => {
            for b in 0..batches {
                matmul(
                    &mut y.batch_matrix_mut(b),
                    Accum::Add,
                    l.batch_matrix(b),
                    r.batch_matrix(b).transpose(),
                    1.0f32,
                    par,
                );
            }
        }
    }
}
