use std::fmt::Debug;

use crate::error::Result;

/// Trait for interchangeable matrix-multiply backends (host, accelerator).
///
/// Every method reads its operands, mutates only `y`, and chooses between a
/// fused and a per-slice execution from the batch counts alone (see
/// [`crate::dispatch`]). Shape-contract violations are programming errors
/// and panic; `Err` is reserved for runtime failures of the underlying
/// library.
pub trait MatMulBackend: Debug {
    /// Read-only operand view.
    type Operand<'a>: Copy;
    /// Destination view.
    type Dest<'a>;
    /// How the forward scale factor is passed.
    type Scalar<'a>: Copy;

    /// Returns the name of this backend (e.g., "cpu", "cuda").
    fn name(&self) -> &str;

    /// Scale factor that keeps the destination and adds the product.
    fn scalar_one(&self) -> Self::Scalar<'_>;

    /// Scale factor that overwrites the destination.
    fn scalar_zero(&self) -> Self::Scalar<'_>;

    /// Scale factor that negates the destination before adding.
    fn scalar_minus_one(&self) -> Self::Scalar<'_>;

    /// `y = scale * y + l * r`.
    ///
    /// - `l`: `[x, k]`, batch `Lb`
    /// - `r`: `[k, z]`, batch `Rb`
    /// - `y`: `[x, z]`, batch `max(Lb, Rb)`
    ///
    /// `y` is scaled exactly once over its whole buffer, then the product is
    /// added. A scale of zero overwrites `y` without reading it.
    fn matrix_multiply(
        &self,
        l: Self::Operand<'_>,
        r: Self::Operand<'_>,
        y: Self::Dest<'_>,
        scale: Self::Scalar<'_>,
    ) -> Result<()>;

    /// `y += l^T * r`.
    ///
    /// - `l`: `[k, x]`, `r`: `[k, z]`, `y`: `[x, z]`
    ///
    /// An unbatched `y` under batched operands receives the sum over slices.
    fn matrix_transp_multiply_acc(
        &self,
        l: Self::Operand<'_>,
        r: Self::Operand<'_>,
        y: Self::Dest<'_>,
    ) -> Result<()>;

    /// `y += l * r^T`.
    ///
    /// - `l`: `[x, k]`, `r`: `[z, k]`, `y`: `[x, z]`
    ///
    /// An unbatched `y` under batched operands receives the sum over slices.
    fn matrix_multiply_transp_acc(
        &self,
        l: Self::Operand<'_>,
        r: Self::Operand<'_>,
        y: Self::Dest<'_>,
    ) -> Result<()>;
}
