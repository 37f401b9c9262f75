//! `bm-kernels` - Batched dense matrix-multiply kernels for a tensor engine.
//!
//! This crate provides:
//! - The forward product `y = s*y + l*r` and the two gradient accumulations
//!   `y += l^T*r` and `y += l*r^T` over batched, column-major matrices
//! - A batch-dispatch policy that fuses a broadcast operand's batch axis into
//!   one large multiply, or loops over slices otherwise
//! - A `MatMulBackend` trait with a host `CpuDevice` (faer) and an
//!   accelerator `AccelDevice` that issues work on a BLAS stream
//! - Borrowed tensor views; nothing here allocates or owns tensor memory
//!
//! The backend used by an engine is fixed at build time through
//! [`DefaultDevice`]: the host device by default, the cuBLAS device with the
//! `cuda` feature.

pub mod accel;
pub mod backend;
pub mod cpu;
pub mod dim;
pub mod dispatch;
pub mod error;
#[cfg(test)]
mod reference;
pub mod view;

// Re-export primary types at the crate root for convenience.
pub use accel::{AccelDevice, BlasStream, DevicePtr, DeviceScalar, DeviceTensor, ScalarPool};
pub use backend::MatMulBackend;
pub use cpu::CpuDevice;
pub use dim::Dim;
pub use dispatch::{
    check_multiply, check_multiply_transp_acc, check_transp_multiply_acc, BatchPlan,
};
pub use error::{KernelError, Result, ShapeError};
pub use view::{TensorView, TensorViewMut};

#[cfg(not(feature = "cuda"))]
pub type DefaultDevice = CpuDevice;
#[cfg(feature = "cuda")]
pub type DefaultDevice = AccelDevice<accel::cublas::Cublas>;

/// `y = scale * y + l * r` on `dev`. See [`MatMulBackend::matrix_multiply`].
pub fn matrix_multiply<B: MatMulBackend>(
    dev: &B,
    l: B::Operand<'_>,
    r: B::Operand<'_>,
    y: B::Dest<'_>,
    scale: B::Scalar<'_>,
) -> Result<()> {
    dev.matrix_multiply(l, r, y, scale)
}

/// `y += l^T * r` on `dev`.
pub fn matrix_transp_multiply_acc<B: MatMulBackend>(
    dev: &B,
    l: B::Operand<'_>,
    r: B::Operand<'_>,
    y: B::Dest<'_>,
) -> Result<()> {
    dev.matrix_transp_multiply_acc(l, r, y)
}

/// `y += l * r^T` on `dev`.
pub fn matrix_multiply_transp_acc<B: MatMulBackend>(
    dev: &B,
    l: B::Operand<'_>,
    r: B::Operand<'_>,
    y: B::Dest<'_>,
) -> Result<()> {
    dev.matrix_multiply_transp_acc(l, r, y)
}
