use std::cell::RefCell;
use std::ffi::CString;

use crate::types::BMStatus;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Record `msg` as this thread's last error and hand back `status`, so a
/// failing call can `return fail(status, msg)`.
pub fn fail(status: BMStatus, msg: impl Into<String>) -> BMStatus {
    // interior NULs would truncate the message on the C side
    let msg = msg.into().replace('\0', " ");
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
    status
}

/// Take the last error message, leaving `None` in its place.
pub fn take_last_error() -> Option<CString> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}
