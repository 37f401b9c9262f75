pub(crate) mod matmul;

use faer::Par;
use log::trace;

use crate::backend::MatMulBackend;
use crate::dispatch;
use crate::error::Result;
use crate::view::{TensorView, TensorViewMut};

/// Host compute backend.
///
/// Runs every product synchronously through `faer`'s dense GEMM on
/// column-major views of the caller's buffers. Returns only once `y` is
/// fully written. Any threading happens inside `faer`.
#[derive(Debug, Clone, Copy)]
pub struct CpuDevice {
    par: Par,
}

impl CpuDevice {
    /// Host device using `faer`'s global parallelism setting.
    pub fn new() -> Self {
        let par = faer::get_global_parallelism();
        let par = if par.degree() == 1 { Par::Seq } else { par };
        CpuDevice { par }
    }

    /// Host device that never spawns work on other threads.
    pub fn sequential() -> Self {
        CpuDevice { par: Par::Seq }
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MatMulBackend for CpuDevice {
    type Operand<'a> = TensorView<'a>;
    type Dest<'a> = TensorViewMut<'a>;
    type Scalar<'a> = f32;

    fn name(&self) -> &str {
        "cpu"
    }

    fn scalar_one(&self) -> f32 {
        1.0
    }

    fn scalar_zero(&self) -> f32 {
        0.0
    }

    fn scalar_minus_one(&self) -> f32 {
        -1.0
    }

    fn matrix_multiply(
        &self,
        l: TensorView<'_>,
        r: TensorView<'_>,
        mut y: TensorViewMut<'_>,
        scale: f32,
    ) -> Result<()> {
        dispatch::debug_check_multiply(l.dim(), r.dim(), y.dim());
        let plan = dispatch::plan_multiply(l.dim(), r.dim(), y.dim());
        trace!(
            "cpu matrix_multiply {plan}: {} * {} -> {} (scale {scale})",
            l.dim(),
            r.dim(),
            y.dim()
        );

        matmul::scale_in_place(y.data_mut(), scale);
        matmul::multiply_acc(plan, l, r, y, self.par);
        Ok(())
    }

    fn matrix_transp_multiply_acc(
        &self,
        l: TensorView<'_>,
        r: TensorView<'_>,
        y: TensorViewMut<'_>,
    ) -> Result<()> {
        dispatch::debug_check_transp_multiply_acc(l.dim(), r.dim(), y.dim());
        let plan = dispatch::plan_transp_multiply_acc(l.dim(), r.dim(), y.dim());
        trace!(
            "cpu matrix_transp_multiply_acc {plan}: {}^T * {} -> {}",
            l.dim(),
            r.dim(),
            y.dim()
        );

        matmul::transp_multiply_acc(plan, l, r, y, self.par);
        Ok(())
    }

    fn matrix_multiply_transp_acc(
        &self,
        l: TensorView<'_>,
        r: TensorView<'_>,
        y: TensorViewMut<'_>,
    ) -> Result<()> {
        dispatch::debug_check_multiply_transp_acc(l.dim(), r.dim(), y.dim());
        let plan = dispatch::plan_multiply_transp_acc(l.dim(), r.dim(), y.dim());
        trace!(
            "cpu matrix_multiply_transp_acc {plan}: {} * {}^T -> {}",
            l.dim(),
            r.dim(),
            y.dim()
        );

        matmul::multiply_transp_acc(plan, l, r, y, self.par);
        Ok(())
    }
}

// Forced plans are only reachable from tests; the entry points always pick
// their own.
#[cfg(test)]
impl CpuDevice {
    fn multiply_with_plan(
        &self,
        plan: dispatch::BatchPlan,
        l: TensorView<'_>,
        r: TensorView<'_>,
        mut y: TensorViewMut<'_>,
        scale: f32,
    ) {
        matmul::scale_in_place(y.data_mut(), scale);
        matmul::multiply_acc(plan, l, r, y, self.par);
    }
}
