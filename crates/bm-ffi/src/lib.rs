mod error;
mod types;

use error::fail;
pub use types::*;

use std::ffi::CString;
use std::os::raw::c_char;

use bm_kernels::{
    check_multiply, check_multiply_transp_acc, check_transp_multiply_acc, CpuDevice, Dim,
    MatMulBackend, ShapeError, TensorView, TensorViewMut,
};

/// Execute a closure that returns a `BMStatus`, catching any panics
/// and converting them into `BMStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> BMStatus + std::panic::UnwindSafe>(f: F) -> BMStatus {
    match std::panic::catch_unwind(f) {
        Ok(status) => status,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| payload.downcast_ref::<&str>().copied())
                .unwrap_or("internal panic");
            fail(BMStatus::ErrorInternal, format!("internal panic: {msg}"))
        }
    }
}

/// Validated raw arguments of one kernel call.
struct RawArgs {
    l: *const f32,
    l_dim: Dim,
    r: *const f32,
    r_dim: Dim,
    y: *mut f32,
    y_dim: Dim,
}

/// Shape contract of one entry point.
type ShapeCheck = fn(Dim, Dim, Dim) -> Result<(), ShapeError>;

fn overlaps(a: *const f32, a_len: usize, b: *const f32, b_len: usize) -> bool {
    let (a0, b0) = (a as usize, b as usize);
    let (a1, b1) = (
        a0 + a_len * std::mem::size_of::<f32>(),
        b0 + b_len * std::mem::size_of::<f32>(),
    );
    a_len > 0 && b_len > 0 && a0 < b1 && b0 < a1
}

// A slice may span at most `isize::MAX` bytes.
fn fits_in_slice(d: Dim) -> bool {
    d.checked_numel()
        .is_some_and(|n| n <= isize::MAX as usize / std::mem::size_of::<f32>())
}

fn validate(
    l: *const f32,
    l_dim: BMDim,
    r: *const f32,
    r_dim: BMDim,
    y: *mut f32,
    y_dim: BMDim,
    check: ShapeCheck,
) -> Result<RawArgs, BMStatus> {
    let invalid = |msg: String| fail(BMStatus::ErrorInvalidArgument, msg);
    if l.is_null() || r.is_null() || y.is_null() {
        return Err(invalid("null buffer".into()));
    }
    let (Some(l_dim), Some(r_dim), Some(y_dim)) =
        (l_dim.to_dim(), r_dim.to_dim(), y_dim.to_dim())
    else {
        return Err(invalid("batch count must be at least 1".into()));
    };
    if let Some(d) = [l_dim, r_dim, y_dim].into_iter().find(|d| !fits_in_slice(*d)) {
        return Err(invalid(format!("buffer size of {d} overflows")));
    }
    check(l_dim, r_dim, y_dim).map_err(|err| invalid(err.to_string()))?;
    let y_len = y_dim.numel();
    if overlaps(y, y_len, l, l_dim.numel()) || overlaps(y, y_len, r, r_dim.numel()) {
        return Err(invalid("destination overlaps an operand".into()));
    }
    Ok(RawArgs {
        l,
        l_dim,
        r,
        r_dim,
        y,
        y_dim,
    })
}

/// Run `op` on host views of validated arguments.
///
/// # Safety
/// Each pointer must address at least `numel` f32 values of its shape.
unsafe fn with_views<F>(args: RawArgs, op: F) -> BMStatus
where
    F: FnOnce(
        &CpuDevice,
        TensorView<'_>,
        TensorView<'_>,
        TensorViewMut<'_>,
    ) -> bm_kernels::Result<()>,
{
    let l = std::slice::from_raw_parts(args.l, args.l_dim.numel());
    let r = std::slice::from_raw_parts(args.r, args.r_dim.numel());
    let y = std::slice::from_raw_parts_mut(args.y, args.y_dim.numel());
    let dev = CpuDevice::new();
    match op(
        &dev,
        TensorView::new(l, args.l_dim),
        TensorView::new(r, args.r_dim),
        TensorViewMut::new(y, args.y_dim),
    ) {
        Ok(()) => BMStatus::Ok,
        Err(e) => fail(BMStatus::ErrorKernel, e.to_string()),
    }
}

/// `y = scale * y + l * r` over batched column-major matrices.
///
/// `l` is `[x, k]`, `r` is `[k, z]`, `y` is `[x, z]` with batch
/// `max(l.batch, r.batch)`. A scale of 0 overwrites `y`.
///
/// Invalid shapes and null or overlapping buffers return
/// `ErrorInvalidArgument` without touching `y`.
///
/// # Safety
/// Each buffer must hold at least `rows * cols * batch` f32 values, and `y`
/// must not overlap `l` or `r`.
#[no_mangle]
pub unsafe extern "C" fn bm_matrix_multiply(
    l: *const f32,
    l_dim: BMDim,
    r: *const f32,
    r_dim: BMDim,
    y: *mut f32,
    y_dim: BMDim,
    scale: f32,
) -> BMStatus {
    catch_panic(|| {
        let args = match validate(l, l_dim, r, r_dim, y, y_dim, check_multiply) {
            Ok(args) => args,
            Err(status) => return status,
        };
        unsafe { with_views(args, |dev, l, r, y| dev.matrix_multiply(l, r, y, scale)) }
    })
}

/// `y += l^T * r` over batched column-major matrices.
///
/// # Safety
/// Same buffer requirements as `bm_matrix_multiply`.
#[no_mangle]
pub unsafe extern "C" fn bm_matrix_transp_multiply_acc(
    l: *const f32,
    l_dim: BMDim,
    r: *const f32,
    r_dim: BMDim,
    y: *mut f32,
    y_dim: BMDim,
) -> BMStatus {
    catch_panic(|| {
        let args = match validate(l, l_dim, r, r_dim, y, y_dim, check_transp_multiply_acc) {
            Ok(args) => args,
            Err(status) => return status,
        };
        unsafe { with_views(args, |dev, l, r, y| dev.matrix_transp_multiply_acc(l, r, y)) }
    })
}

/// `y += l * r^T` over batched column-major matrices.
///
/// # Safety
/// Same buffer requirements as `bm_matrix_multiply`.
#[no_mangle]
pub unsafe extern "C" fn bm_matrix_multiply_transp_acc(
    l: *const f32,
    l_dim: BMDim,
    r: *const f32,
    r_dim: BMDim,
    y: *mut f32,
    y_dim: BMDim,
) -> BMStatus {
    catch_panic(|| {
        let args = match validate(l, l_dim, r, r_dim, y, y_dim, check_multiply_transp_acc) {
            Ok(args) => args,
            Err(status) => return status,
        };
        unsafe { with_views(args, |dev, l, r, y| dev.matrix_multiply_transp_acc(l, r, y)) }
    })
}

/// Retrieve the last error message.
///
/// Returns a pointer to a C string describing the most recent error, or
/// null if no error has occurred. The caller must free the returned string
/// with `bm_free_string`.
#[no_mangle]
pub extern "C" fn bm_last_error() -> *const c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `bm_last_error`.
#[no_mangle]
pub unsafe extern "C" fn bm_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
