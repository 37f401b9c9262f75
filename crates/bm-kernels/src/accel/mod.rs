//! Accelerator compute backend.
//!
//! Work is enqueued on a BLAS stream bound to one device. Calls return once
//! the enqueue succeeds; completion, and any asynchronous execution error, is
//! observed at a synchronization point owned by the caller's device layer.
//! Batch slices are addressed by pointer offset, never copied.

#[cfg(feature = "cuda")]
pub mod cublas;
#[cfg(test)]
mod host_blas;

use std::fmt::Debug;
use std::mem::size_of;

use log::trace;

use crate::backend::MatMulBackend;
use crate::dim::Dim;
use crate::dispatch::{self, BatchPlan};
use crate::error::Result;

/// Address in accelerator memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr(u64);

impl DevicePtr {
    pub fn new(addr: u64) -> Self {
        DevicePtr(addr)
    }

    pub fn addr(&self) -> u64 {
        self.0
    }

    /// Pointer `elems` f32 elements further on.
    pub fn offset_f32(self, elems: usize) -> Self {
        DevicePtr(self.0 + (elems * size_of::<f32>()) as u64)
    }
}

/// Batched column-major f32 matrix resident on the accelerator.
#[derive(Debug, Clone, Copy)]
pub struct DeviceTensor {
    ptr: DevicePtr,
    dim: Dim,
}

impl DeviceTensor {
    /// Describe device memory as a batched matrix.
    ///
    /// # Safety
    /// `ptr` must address at least `dim.numel()` f32 values on the device the
    /// tensor is used with, and stay allocated until all work issued against
    /// it has completed.
    pub unsafe fn from_raw(ptr: DevicePtr, dim: Dim) -> Self {
        DeviceTensor { ptr, dim }
    }

    /// Start of batch slice `b`. A broadcast tensor returns its base pointer
    /// for every `b`.
    pub fn batch_ptr(&self, b: usize) -> DevicePtr {
        self.ptr.offset_f32(self.dim.batch_offset(b))
    }
}

/// f32 resident in device memory, handed to BLAS by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceScalar(DevicePtr);

impl DeviceScalar {
    /// # Safety
    /// `ptr` must address one initialized f32 on the device, alive for as
    /// long as the scalar is used.
    pub unsafe fn from_raw(ptr: DevicePtr) -> Self {
        DeviceScalar(ptr)
    }

    pub fn ptr(&self) -> DevicePtr {
        self.0
    }
}

/// Constants kept resident on the device for use as GEMM coefficients.
#[derive(Debug, Clone, Copy)]
pub struct ScalarPool {
    pub one: DeviceScalar,
    pub zero: DeviceScalar,
    pub minus_one: DeviceScalar,
}

/// Operation applied to a GEMM operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    No,
    Yes,
}

/// One column-major `C = alpha * op(A) * op(B) + beta * C` call.
///
/// `op(A)` is `m x k`, `op(B)` is `k x n`, `C` is `m x n`. When `beta`
/// points at zero, `C` is written without being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmCall {
    pub trans_a: Transpose,
    pub trans_b: Transpose,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub alpha: DeviceScalar,
    pub a: DevicePtr,
    pub lda: usize,
    pub b: DevicePtr,
    pub ldb: usize,
    pub beta: DeviceScalar,
    pub c: DevicePtr,
    pub ldc: usize,
}

/// Execution stream of an accelerator BLAS library.
///
/// Calls issued on one stream run in issue order. Implementations check the
/// enqueue status of every call and report failures immediately.
pub trait BlasStream: Send + Sync + Debug {
    /// Make `ordinal` the current device for work issued from this thread.
    fn bind_device(&self, ordinal: i32) -> Result<()>;

    /// Enqueue one single-precision GEMM.
    ///
    /// # Safety
    /// Every pointer in `call` must be a live device address on the bound
    /// device, large enough for the described shapes and leading dimensions.
    unsafe fn sgemm(&self, call: &GemmCall) -> Result<()>;
}

/// Handle to one accelerator: device ordinal, the BLAS stream work is issued
/// on, and the resident constant pool.
///
/// Entry points only read these; the stream and constants may be shared by
/// concurrent callers when the underlying library allows it.
#[derive(Debug)]
pub struct AccelDevice<S> {
    ordinal: i32,
    stream: S,
    scalars: ScalarPool,
}

impl<S: BlasStream> AccelDevice<S> {
    pub fn new(ordinal: i32, stream: S, scalars: ScalarPool) -> Self {
        AccelDevice {
            ordinal,
            stream,
            scalars,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    fn sgemm(&self, call: GemmCall) -> Result<()> {
        // SAFETY: every `DeviceTensor` and `DeviceScalar` was created through
        // an unsafe constructor that guarantees live device memory of the
        // described size, and batch pointers stay inside it.
        unsafe { self.stream.sgemm(&call) }
    }
}

// BLAS rejects a leading dimension below 1, even for an empty matrix.
fn leading_dim(rows: usize) -> usize {
    rows.max(1)
}

impl<S: BlasStream> MatMulBackend for AccelDevice<S> {
    type Operand<'a> = DeviceTensor;
    type Dest<'a> = DeviceTensor;
    type Scalar<'a> = DeviceScalar;

    fn name(&self) -> &str {
        "cuda"
    }

    fn scalar_one(&self) -> DeviceScalar {
        self.scalars.one
    }

    fn scalar_zero(&self) -> DeviceScalar {
        self.scalars.zero
    }

    fn scalar_minus_one(&self) -> DeviceScalar {
        self.scalars.minus_one
    }

    // The scale rides on `beta`: the fused call covers the whole destination
    // once, and looped calls cover disjoint slices once each.
    fn matrix_multiply(
        &self,
        l: DeviceTensor,
        r: DeviceTensor,
        y: DeviceTensor,
        scale: DeviceScalar,
    ) -> Result<()> {
        dispatch::debug_check_multiply(l.dim, r.dim, y.dim);
        let plan = dispatch::plan_multiply(l.dim, r.dim, y.dim);
        trace!(
            "cuda:{} matrix_multiply {plan}: {} * {} -> {}",
            self.ordinal,
            l.dim,
            r.dim,
            y.dim
        );

        self.stream.bind_device(self.ordinal)?;
        match plan {
            // [x, z*b] = [x, k] * [k, z*b]
            BatchPlan::Fused => self.sgemm(GemmCall {
                trans_a: Transpose::No,
                trans_b: Transpose::No,
                m: y.dim.rows,
                n: y.dim.colbatch_cols(),
                k: l.dim.cols,
                alpha: self.scalars.one,
                a: l.ptr,
                lda: leading_dim(l.dim.rows),
                b: r.ptr,
                ldb: leading_dim(r.dim.rows),
                beta: scale,
                c: y.ptr,
                ldc: leading_dim(y.dim.rows),
            }),
            BatchPlan::Looped { batches } => {
                for b in 0..batches {
                    self.sgemm(GemmCall {
                        trans_a: Transpose::No,
                        trans_b: Transpose::No,
                        m: y.dim.rows,
                        n: y.dim.cols,
                        k: l.dim.cols,
                        alpha: self.scalars.one,
                        a: l.batch_ptr(b),
                        lda: leading_dim(l.dim.rows),
                        b: r.batch_ptr(b),
                        ldb: leading_dim(r.dim.rows),
                        beta: scale,
                        c: y.batch_ptr(b),
                        ldc: leading_dim(y.dim.rows),
                    })?;
                }
                Ok(())
            }
        }
    }

    fn matrix_transp_multiply_acc(
        &self,
        l: DeviceTensor,
        r: DeviceTensor,
        y: DeviceTensor,
    ) -> Result<()> {
        dispatch::debug_check_transp_multiply_acc(l.dim, r.dim, y.dim);
        let plan = dispatch::plan_transp_multiply_acc(l.dim, r.dim, y.dim);
        trace!(
            "cuda:{} matrix_transp_multiply_acc {plan}: {}^T * {} -> {}",
            self.ordinal,
            l.dim,
            r.dim,
            y.dim
        );

        self.stream.bind_device(self.ordinal)?;
        let one = self.scalars.one;
        match plan {
            // [x, z*b] += [k, x]^T * [k, z*b]
            BatchPlan::Fused => self.sgemm(GemmCall {
                trans_a: Transpose::Yes,
                trans_b: Transpose::No,
                m: y.dim.rows,
                n: y.dim.colbatch_cols(),
                k: l.dim.rows,
                alpha: one,
                a: l.ptr,
                lda: leading_dim(l.dim.rows),
                b: r.ptr,
                ldb: leading_dim(r.dim.rows),
                beta: one,
                c: y.ptr,
                ldc: leading_dim(y.dim.rows),
            }),
            BatchPlan::Looped { batches } => {
                for b in 0..batches {
                    self.sgemm(GemmCall {
                        trans_a: Transpose::Yes,
                        trans_b: Transpose::No,
                        m: y.dim.rows,
                        n: y.dim.cols,
                        k: l.dim.rows,
                        alpha: one,
                        a: l.batch_ptr(b),
                        lda: leading_dim(l.dim.rows),
                        b: r.batch_ptr(b),
                        ldb: leading_dim(r.dim.rows),
                        beta: one,
                        c: y.batch_ptr(b),
                        ldc: leading_dim(y.dim.rows),
                    })?;
                }
                Ok(())
            }
        }
    }

    fn matrix_multiply_transp_acc(
        &self,
        l: DeviceTensor,
        r: DeviceTensor,
        y: DeviceTensor,
    ) -> Result<()> {
        dispatch::debug_check_multiply_transp_acc(l.dim, r.dim, y.dim);
        let plan = dispatch::plan_multiply_transp_acc(l.dim, r.dim, y.dim);
        trace!(
            "cuda:{} matrix_multiply_transp_acc {plan}: {} * {}^T -> {}",
            self.ordinal,
            l.dim,
            r.dim,
            y.dim
        );

        self.stream.bind_device(self.ordinal)?;
        let one = self.scalars.one;
        match plan {
            // [x, z] += [x, k*b] * [z, k*b]^T
            BatchPlan::Fused => self.sgemm(GemmCall {
                trans_a: Transpose::No,
                trans_b: Transpose::Yes,
                m: y.dim.rows,
                n: y.dim.cols,
                k: l.dim.colbatch_cols(),
                alpha: one,
                a: l.ptr,
                lda: leading_dim(l.dim.rows),
                b: r.ptr,
                ldb: leading_dim(r.dim.rows),
                beta: one,
                c: y.ptr,
                ldc: leading_dim(y.dim.rows),
            }),
            BatchPlan::Looped { batches } => {
                for b in 0..batches {
                    self.sgemm(GemmCall {
                        trans_a: Transpose::No,
                        trans_b: Transpose::Yes,
                        m: y.dim.rows,
                        n: y.dim.cols,
                        k: l.dim.cols,
                        alpha: one,
                        a: l.batch_ptr(b),
                        lda: leading_dim(l.dim.rows),
                        b: r.batch_ptr(b),
                        ldb: leading_dim(r.dim.rows),
                        beta: one,
                        c: y.batch_ptr(b),
                        ldc: leading_dim(y.dim.rows),
                    })?;
                }
                Ok(())
            }
        }
    }
}
