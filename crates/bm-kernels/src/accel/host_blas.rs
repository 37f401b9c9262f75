// Host-memory stand-in for an accelerator BLAS stream.
//
// Interprets device pointers as host addresses and follows the column-major
// sgemm contract (operation flags, leading dimensions, coefficients read by
// address, beta == 0 never reads C), recording every issued call.

use std::sync::Mutex;

use super::{BlasStream, DevicePtr, DeviceScalar, GemmCall, ScalarPool, Transpose};
use crate::error::{KernelError, Result};

const CUBLAS_STATUS_INVALID_VALUE: i32 = 7;

#[derive(Debug, Default)]
pub(crate) struct HostBlas {
    calls: Mutex<Vec<GemmCall>>,
    attempts: Mutex<usize>,
    bound: Mutex<Option<i32>>,
    fail_at: Option<usize>,
}

impl HostBlas {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stream whose `n`-th sgemm (0-based) reports a failed enqueue.
    pub(crate) fn failing_at(n: usize) -> Self {
        HostBlas {
            fail_at: Some(n),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<GemmCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub(crate) fn bound_device(&self) -> Option<i32> {
        *self.bound.lock().unwrap()
    }
}

unsafe fn read(ptr: DevicePtr, idx: usize) -> f32 {
    *(ptr.addr() as usize as *const f32).add(idx)
}

unsafe fn element(ptr: DevicePtr, ld: usize, trans: Transpose, i: usize, j: usize) -> f32 {
    match trans {
        Transpose::No => read(ptr, i + j * ld),
        Transpose::Yes => read(ptr, j + i * ld),
    }
}

impl BlasStream for HostBlas {
    fn bind_device(&self, ordinal: i32) -> Result<()> {
        *self.bound.lock().unwrap() = Some(ordinal);
        Ok(())
    }

    unsafe fn sgemm(&self, call: &GemmCall) -> Result<()> {
        assert!(self.bound_device().is_some(), "sgemm issued before binding a device");
        {
            let mut attempts = self.attempts.lock().unwrap();
            let n = *attempts;
            *attempts += 1;
            if self.fail_at == Some(n) {
                return Err(KernelError::Blas {
                    call: "cublasSgemm_v2",
                    status: 13,
                });
            }
        }

        // column-major storage needs ld >= max(1, stored rows)
        let stored_rows = |trans: Transpose, rows: usize, cols: usize| match trans {
            Transpose::No => rows,
            Transpose::Yes => cols,
        };
        let lds_valid = call.lda >= stored_rows(call.trans_a, call.m, call.k).max(1)
            && call.ldb >= stored_rows(call.trans_b, call.k, call.n).max(1)
            && call.ldc >= call.m.max(1);
        if !lds_valid {
            return Err(KernelError::Blas {
                call: "cublasSgemm_v2",
                status: CUBLAS_STATUS_INVALID_VALUE,
            });
        }

        let alpha = read(call.alpha.ptr(), 0);
        let beta = read(call.beta.ptr(), 0);
        let c = call.c.addr() as usize as *mut f32;
        for j in 0..call.n {
            for i in 0..call.m {
                let mut sum = 0.0f32;
                for p in 0..call.k {
                    sum += element(call.a, call.lda, call.trans_a, i, p)
                        * element(call.b, call.ldb, call.trans_b, p, j);
                }
                let out = c.add(i + j * call.ldc);
                *out = if beta == 0.0 {
                    alpha * sum
                } else {
                    alpha * sum + beta * *out
                };
            }
        }
        self.calls.lock().unwrap().push(*call);
        Ok(())
    }
}

/// Host-resident `1`, `0`, `-1` standing in for device constants.
pub(crate) struct HostScalars {
    values: Box<[f32; 3]>,
}

impl HostScalars {
    pub(crate) fn new() -> Self {
        HostScalars {
            values: Box::new([1.0, 0.0, -1.0]),
        }
    }

    pub(crate) fn pool(&self) -> ScalarPool {
        let at = |i: usize| unsafe {
            DeviceScalar::from_raw(DevicePtr::new(&self.values[i] as *const f32 as u64))
        };
        ScalarPool {
            one: at(0),
            zero: at(1),
            minus_one: at(2),
        }
    }
}
