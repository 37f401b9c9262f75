use bm_kernels::Dim;

/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BMStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorKernel = 2,
    ErrorInternal = 3,
}

/// Shape of a batched column-major matrix.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BMDim {
    pub rows: usize,
    pub cols: usize,
    pub batch: usize,
}

impl BMDim {
    /// Converts to a kernel shape, rejecting an empty batch.
    pub fn to_dim(self) -> Option<Dim> {
        (self.batch >= 1).then(|| Dim::new(self.rows, self.cols, self.batch))
    }
}
