use std::fmt;

/// Shape of a batched matrix: `batch` column-major `rows x cols` slices laid
/// out back to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim {
    pub rows: usize,
    pub cols: usize,
    pub batch: usize,
}

impl Dim {
    /// Create a batched shape.
    ///
    /// # Panics
    /// Panics if `batch == 0`.
    pub fn new(rows: usize, cols: usize, batch: usize) -> Self {
        assert!(batch >= 1, "batch count must be at least 1, got {batch}");
        Dim { rows, cols, batch }
    }

    /// Shape of a single, unbatched matrix.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Dim::new(rows, cols, 1)
    }

    /// Number of elements in one batch slice.
    pub fn batch_size(&self) -> usize {
        self.rows * self.cols
    }

    /// Total number of elements across all slices.
    pub fn numel(&self) -> usize {
        self.batch_size() * self.batch
    }

    /// [`numel`](Self::numel), or `None` when the product overflows `usize`.
    pub fn checked_numel(&self) -> Option<usize> {
        self.rows.checked_mul(self.cols)?.checked_mul(self.batch)
    }

    /// True when the tensor has a single slice that every batch index of a
    /// co-operand reads.
    pub fn is_broadcast(&self) -> bool {
        self.batch == 1
    }

    /// Column count of the view that folds the batch axis into the columns:
    /// `[rows, cols, batch]` seen as `[rows, cols * batch]`.
    pub fn colbatch_cols(&self) -> usize {
        self.cols * self.batch
    }

    /// Element offset of batch slice `b`.
    ///
    /// A broadcast tensor answers slice 0 for every `b`.
    pub fn batch_offset(&self, b: usize) -> usize {
        if self.is_broadcast() {
            0
        } else {
            debug_assert!(b < self.batch, "batch index {b} out of range for {self}");
            b * self.batch_size()
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.rows, self.cols)?;
        if self.batch > 1 {
            write!(f, " x{}", self.batch)?;
        }
        Ok(())
    }
}
