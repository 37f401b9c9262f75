use std::ffi::c_void;

use libloading::Library;
use log::debug;

use super::{BlasStream, GemmCall, Transpose};
use crate::error::{KernelError, Result};

type CublasStatus = i32;
type CudaError = i32;
type CublasHandle = *mut c_void;

const CUBLAS_STATUS_SUCCESS: CublasStatus = 0;
const CUDA_SUCCESS: CudaError = 0;
const CUBLAS_OP_N: i32 = 0;
const CUBLAS_OP_T: i32 = 1;
const CUBLAS_POINTER_MODE_HOST: i32 = 0;
const CUBLAS_POINTER_MODE_DEVICE: i32 = 1;

type CudaSetDeviceFn = unsafe extern "C" fn(device: i32) -> CudaError;
type CublasGetPointerModeFn =
    unsafe extern "C" fn(handle: CublasHandle, mode: *mut i32) -> CublasStatus;
type CublasSgemmFn = unsafe extern "C" fn(
    handle: CublasHandle,
    transa: i32,
    transb: i32,
    m: i32,
    n: i32,
    k: i32,
    alpha: *const f32,
    a: *const f32,
    lda: i32,
    b: *const f32,
    ldb: i32,
    beta: *const f32,
    c: *mut f32,
    ldc: i32,
) -> CublasStatus;

struct CublasFns {
    set_device: CudaSetDeviceFn,
    get_pointer_mode: CublasGetPointerModeFn,
    sgemm: CublasSgemmFn,
}

/// cuBLAS handle, borrowed from the device layer, used as a [`BlasStream`].
///
/// The handle's stream decides where work is queued. Creating and destroying
/// the handle and its stream stays with the device layer.
pub struct Cublas {
    _cudart: Library,
    _cublas: Library,
    fns: CublasFns,
    handle: usize,
}

impl std::fmt::Debug for Cublas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cublas")
            .field("handle", &format_args!("{:#x}", self.handle))
            .finish()
    }
}

impl Cublas {
    /// Wrap an existing cuBLAS handle.
    ///
    /// GEMM coefficients are passed as device addresses, so the handle must
    /// already be in device pointer mode. The handle's state is only read,
    /// never changed.
    ///
    /// # Errors
    /// `KernelError::Other` when the handle is in host pointer mode.
    ///
    /// # Safety
    /// `handle` must be a live `cublasHandle_t` that outlives the returned
    /// value, and must stay in device pointer mode for that lifetime.
    pub unsafe fn from_handle(handle: *mut c_void) -> Result<Self> {
        let cudart = load_library(&[
            "libcudart.so.12",
            "libcudart.so.11.0",
            "libcudart.so",
            "cudart64_12.dll",
            "cudart64_110.dll",
        ])?;
        let cublas = load_library(&[
            "libcublas.so.12",
            "libcublas.so.11",
            "libcublas.so",
            "cublas64_12.dll",
            "cublas64_11.dll",
        ])?;
        let fns = CublasFns {
            set_device: load_symbol(&cudart, b"cudaSetDevice\0")?,
            get_pointer_mode: load_symbol(&cublas, b"cublasGetPointerMode_v2\0")?,
            sgemm: load_symbol(&cublas, b"cublasSgemm_v2\0")?,
        };

        let mut mode = CUBLAS_POINTER_MODE_HOST;
        check_cublas((fns.get_pointer_mode)(handle, &mut mode), "cublasGetPointerMode_v2")?;
        require_device_pointer_mode(mode)?;

        Ok(Cublas {
            _cudart: cudart,
            _cublas: cublas,
            fns,
            handle: handle as usize,
        })
    }
}

impl BlasStream for Cublas {
    fn bind_device(&self, ordinal: i32) -> Result<()> {
        // SAFETY: cudaSetDevice only changes the calling thread's current device.
        let status = unsafe { (self.fns.set_device)(ordinal) };
        if status == CUDA_SUCCESS {
            Ok(())
        } else {
            Err(KernelError::DeviceBind {
                ordinal,
                call: "cudaSetDevice",
                status,
            })
        }
    }

    unsafe fn sgemm(&self, call: &GemmCall) -> Result<()> {
        let m = blas_int("m", call.m)?;
        let n = blas_int("n", call.n)?;
        let k = blas_int("k", call.k)?;
        let lda = blas_int("lda", call.lda)?;
        let ldb = blas_int("ldb", call.ldb)?;
        let ldc = blas_int("ldc", call.ldc)?;

        check_cublas(
            (self.fns.sgemm)(
                self.handle as CublasHandle,
                op(call.trans_a),
                op(call.trans_b),
                m,
                n,
                k,
                call.alpha.ptr().addr() as usize as *const f32,
                call.a.addr() as usize as *const f32,
                lda,
                call.b.addr() as usize as *const f32,
                ldb,
                call.beta.ptr().addr() as usize as *const f32,
                call.c.addr() as usize as *mut f32,
                ldc,
            ),
            "cublasSgemm_v2",
        )
    }
}

fn op(trans: Transpose) -> i32 {
    match trans {
        Transpose::No => CUBLAS_OP_N,
        Transpose::Yes => CUBLAS_OP_T,
    }
}

fn blas_int(what: &'static str, value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| KernelError::DimensionOverflow { what, value })
}

fn load_library(candidates: &[&str]) -> Result<Library> {
    for candidate in candidates {
        // SAFETY: dynamic library probing only.
        if let Ok(lib) = unsafe { Library::new(candidate) } {
            debug!("loaded {candidate}");
            return Ok(lib);
        }
    }
    Err(KernelError::LibraryLoad(format!(
        "CUDA library (tried {})",
        candidates.join(", ")
    )))
}

fn load_symbol<T: Copy>(lib: &Library, name: &'static [u8]) -> Result<T> {
    // SAFETY: symbol type is expected to match the CUDA runtime / cuBLAS API.
    let symbol = unsafe { lib.get::<T>(name) }.map_err(|err| {
        KernelError::LibraryLoad(format!(
            "symbol {}: {err}",
            String::from_utf8_lossy(name)
        ))
    })?;
    Ok(*symbol)
}

fn require_device_pointer_mode(mode: i32) -> Result<()> {
    if mode == CUBLAS_POINTER_MODE_DEVICE {
        Ok(())
    } else {
        Err(KernelError::Other(format!(
            "cuBLAS handle is in pointer mode {mode}, device pointer mode is required"
        )))
    }
}

fn check_cublas(status: CublasStatus, call: &'static str) -> Result<()> {
    if status == CUBLAS_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(KernelError::Blas { call, status })
    }
}
