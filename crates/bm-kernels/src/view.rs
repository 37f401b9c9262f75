use faer::mat::{MatMut, MatRef};

use crate::dim::Dim;

/// Borrowed, read-only batched matrix in host memory.
///
/// Holds contiguous column-major f32 data for `dim.batch` slices. The buffer
/// may be longer than `dim.numel()`; only the leading elements are read.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    data: &'a [f32],
    dim: Dim,
}

impl<'a> TensorView<'a> {
    /// Wrap a buffer with a batched shape.
    ///
    /// # Panics
    /// Panics if `data.len() < dim.numel()`.
    pub fn new(data: &'a [f32], dim: Dim) -> Self {
        assert!(
            data.len() >= dim.numel(),
            "buffer of length {} is too short for {} (numel={})",
            data.len(),
            dim,
            dim.numel()
        );
        TensorView {
            data: &data[..dim.numel()],
            dim,
        }
    }

    pub fn dim(&self) -> Dim {
        self.dim
    }

    /// The first (or only) slice as a `rows x cols` matrix.
    pub fn matrix(&self) -> MatRef<'a, f32> {
        self.batch_matrix(0)
    }

    /// All slices side by side as one `rows x (cols * batch)` matrix.
    pub fn colbatch_matrix(&self) -> MatRef<'a, f32> {
        MatRef::from_column_major_slice(self.data, self.dim.rows, self.dim.colbatch_cols())
    }

    /// Slice `b` as a `rows x cols` matrix. A broadcast view returns its only
    /// slice for every `b`.
    pub fn batch_matrix(&self, b: usize) -> MatRef<'a, f32> {
        let start = self.dim.batch_offset(b);
        let end = start + self.dim.batch_size();
        MatRef::from_column_major_slice(&self.data[start..end], self.dim.rows, self.dim.cols)
    }
}

/// Borrowed, writable batched matrix in host memory.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    data: &'a mut [f32],
    dim: Dim,
}

impl<'a> TensorViewMut<'a> {
    /// Wrap a mutable buffer with a batched shape.
    ///
    /// # Panics
    /// Panics if `data.len() < dim.numel()`.
    pub fn new(data: &'a mut [f32], dim: Dim) -> Self {
        assert!(
            data.len() >= dim.numel(),
            "buffer of length {} is too short for {} (numel={})",
            data.len(),
            dim,
            dim.numel()
        );
        TensorViewMut {
            data: &mut data[..dim.numel()],
            dim,
        }
    }

    pub fn dim(&self) -> Dim {
        self.dim
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut *self.data
    }

    pub fn matrix_mut(&mut self) -> MatMut<'_, f32> {
        self.batch_matrix_mut(0)
    }

    pub fn colbatch_matrix_mut(&mut self) -> MatMut<'_, f32> {
        let cols = self.dim.colbatch_cols();
        MatMut::from_column_major_slice_mut(&mut *self.data, self.dim.rows, cols)
    }

    pub fn batch_matrix_mut(&mut self, b: usize) -> MatMut<'_, f32> {
        let start = self.dim.batch_offset(b);
        let end = start + self.dim.batch_size();
        let (rows, cols) = (self.dim.rows, self.dim.cols);
        MatMut::from_column_major_slice_mut(&mut self.data[start..end], rows, cols)
    }
}
