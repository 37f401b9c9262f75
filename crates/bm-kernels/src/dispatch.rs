//! Batch-dispatch policy.
//!
//! Each entry point either issues one multiply with a batch axis folded into
//! an adjacent matrix axis, or loops over batch slices applying the broadcast
//! rule (a tensor with one slice supplies it for every batch index). The
//! choice depends only on the three batch counts.

use std::fmt;

use crate::dim::Dim;
use crate::error::ShapeError;

/// How an entry point issues its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPlan {
    /// One multiply over a folded batch axis.
    Fused,
    /// One multiply per batch slice, `0..batches`.
    Looped { batches: usize },
}

impl BatchPlan {
    /// Number of multiply calls this plan issues.
    pub fn calls(&self) -> usize {
        match self {
            BatchPlan::Fused => 1,
            BatchPlan::Looped { batches } => *batches,
        }
    }

    pub fn is_fused(&self) -> bool {
        matches!(self, BatchPlan::Fused)
    }
}

impl fmt::Display for BatchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchPlan::Fused => write!(f, "fused"),
            BatchPlan::Looped { batches } => write!(f, "looped({batches})"),
        }
    }
}

/// Plan for `y = scale * y + l * r`.
///
/// `[x, k] * [k, z, b] -> [x, z, b]` is issued as `[x, k] * [k, z*b]` when the
/// left factor is shared and the right one carries the destination's batch.
/// Otherwise loops over the destination's slices.
pub fn plan_multiply(l: Dim, r: Dim, y: Dim) -> BatchPlan {
    if l.batch == 1 && r.batch == y.batch {
        BatchPlan::Fused
    } else {
        BatchPlan::Looped { batches: y.batch }
    }
}

/// Plan for `y += l^T * r`. Folds the columns of `r` and `y` exactly as
/// [`plan_multiply`] does.
pub fn plan_transp_multiply_acc(l: Dim, r: Dim, y: Dim) -> BatchPlan {
    if l.batch == 1 && y.batch == r.batch {
        BatchPlan::Fused
    } else {
        BatchPlan::Looped {
            batches: l.batch.max(r.batch),
        }
    }
}

/// Plan for `y += l * r^T`.
///
/// Here the shared axis is the inner one: with an unbatched destination and
/// operands of equal batch, `[x, k*b] * [z, k*b]^T` sums every slice's
/// product in a single call.
pub fn plan_multiply_transp_acc(l: Dim, r: Dim, y: Dim) -> BatchPlan {
    if y.batch == 1 && l.batch == r.batch {
        BatchPlan::Fused
    } else {
        BatchPlan::Looped {
            batches: l.batch.max(r.batch),
        }
    }
}

fn ensure(ok: bool, msg: impl FnOnce() -> String) -> Result<(), ShapeError> {
    if ok {
        Ok(())
    } else {
        Err(ShapeError(msg()))
    }
}

/// Shape contract of [`plan_multiply`]: `l` is `[x, k]`, `r` is `[k, z]`, `y`
/// is `[x, z]`, and `y` carries `max(Lb, Rb)` slices.
pub fn check_multiply(l: Dim, r: Dim, y: Dim) -> Result<(), ShapeError> {
    ensure(l.cols == r.rows, || format!("inner dimension mismatch: {l} * {r}"))?;
    ensure((y.rows, y.cols) == (l.rows, r.cols), || {
        format!("destination {y} does not match {l} * {r}")
    })?;
    check_operand_batches(l, r)?;
    ensure(y.batch == l.batch.max(r.batch), || {
        format!("destination {y} must carry max batch of {l} * {r}")
    })
}

/// `l` is `[k, x]`, `r` is `[k, z]`, `y` is `[x, z]`.
pub fn check_transp_multiply_acc(l: Dim, r: Dim, y: Dim) -> Result<(), ShapeError> {
    ensure(l.rows == r.rows, || format!("inner dimension mismatch: {l}^T * {r}"))?;
    ensure((y.rows, y.cols) == (l.cols, r.cols), || {
        format!("destination {y} does not match {l}^T * {r}")
    })?;
    check_operand_batches(l, r)?;
    check_acc_destination(l, r, y)
}

/// `l` is `[x, k]`, `r` is `[z, k]`, `y` is `[x, z]`.
pub fn check_multiply_transp_acc(l: Dim, r: Dim, y: Dim) -> Result<(), ShapeError> {
    ensure(l.cols == r.cols, || format!("inner dimension mismatch: {l} * {r}^T"))?;
    ensure((y.rows, y.cols) == (l.rows, r.rows), || {
        format!("destination {y} does not match {l} * {r}^T")
    })?;
    check_operand_batches(l, r)?;
    check_acc_destination(l, r, y)
}

fn check_operand_batches(l: Dim, r: Dim) -> Result<(), ShapeError> {
    ensure(l.batch == 1 || r.batch == 1 || l.batch == r.batch, || {
        format!("incompatible batch counts: {l} and {r}")
    })
}

// An accumulating destination either matches the loop extent or is a single
// slice that receives the sum over all slices.
fn check_acc_destination(l: Dim, r: Dim, y: Dim) -> Result<(), ShapeError> {
    ensure(y.batch == 1 || y.batch == l.batch.max(r.batch), || {
        format!("destination {y} must be unbatched or carry max batch of {l} and {r}")
    })
}

fn debug_check(checked: Result<(), ShapeError>) {
    if let Err(err) = checked {
        panic!("{err}");
    }
}

pub(crate) fn debug_check_multiply(l: Dim, r: Dim, y: Dim) {
    if cfg!(debug_assertions) {
        debug_check(check_multiply(l, r, y));
    }
}

pub(crate) fn debug_check_transp_multiply_acc(l: Dim, r: Dim, y: Dim) {
    if cfg!(debug_assertions) {
        debug_check(check_transp_multiply_acc(l, r, y));
    }
}

pub(crate) fn debug_check_multiply_transp_acc(l: Dim, r: Dim, y: Dim) {
    if cfg!(debug_assertions) {
        debug_check(check_multiply_transp_acc(l, r, y));
    }
}
