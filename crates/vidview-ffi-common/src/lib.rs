//! Helpers for the vidview C ABI.
//!
//! Pointer validation, string ownership transfer and panic containment shared by
//! every exported function in `vidview-bridge`.
//!
//! # Memory Ownership
//!
//! - Functions returning `*mut c_char` transfer ownership to the caller, who
//!   releases it with the matching `*_string_free` export
//! - Caller-provided buffers are only written within the length the caller gives
//! - NULL pointers are handled safely (no-op for free functions)

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, UnwindSafe};
use std::slice;

/// Convert a Rust string to an owned C string, with a fallback on interior NULs.
///
/// The returned pointer must be freed with [`free_cstring`].
#[inline]
pub fn cstring_new_or_fallback(s: &str, fallback: &'static str) -> *mut c_char {
    CString::new(s)
        .or_else(|_| CString::new(fallback))
        .unwrap_or_default()
        .into_raw()
}

/// Free a C string produced by [`cstring_new_or_fallback`]. Null is a no-op.
///
/// # Safety
/// The pointer must have been allocated by `CString::into_raw()` or be null.
#[inline]
pub unsafe fn free_cstring(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

/// Borrow a caller-owned C string as `&str`.
///
/// # Safety
/// The pointer must be valid and null-terminated, or null.
pub unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Result<&'a str, &'static str> {
    if ptr.is_null() {
        return Err("null pointer");
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| "invalid UTF-8")
}

/// Borrow `len` elements from a caller-owned array.
///
/// A null pointer is accepted only together with `len == 0`.
///
/// # Safety
/// A non-null `ptr` must point to at least `len` initialized values that stay
/// alive and unmodified for `'a`.
pub unsafe fn slice_from_raw<'a, T>(ptr: *const T, len: usize) -> Option<&'a [T]> {
    match (ptr.is_null(), len) {
        (_, 0) => Some(&[]),
        (true, _) => None,
        (false, _) => Some(unsafe { slice::from_raw_parts(ptr, len) }),
    }
}

/// Copy `s` into a caller buffer as a NUL-terminated string, truncating on a
/// UTF-8 boundary if it does not fit. Returns `false` for a null or empty buffer.
///
/// # Safety
/// `buf` must be valid for writes of `len` bytes, or null.
pub unsafe fn copy_str_to_buffer(s: &str, buf: *mut c_char, len: usize) -> bool {
    if buf.is_null() || len == 0 {
        return false;
    }
    let mut end = s.len().min(len - 1);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let out = unsafe { slice::from_raw_parts_mut(buf as *mut u8, len) };
    out[..end].copy_from_slice(&s.as_bytes()[..end]);
    out[end] = 0;
    true
}

/// Run `f`, turning a panic into `fallback` so it never unwinds across the C ABI.
#[inline]
pub fn guard<T>(fallback: T, f: impl FnOnce() -> T + UnwindSafe) -> T {
    panic::catch_unwind(f).unwrap_or(fallback)
}

/// Generate a version function that returns a static C string.
///
/// # Example
/// ```ignore
/// vidview_ffi_common::define_version_fn!(vv_bridge_version);
/// ```
#[macro_export]
macro_rules! define_version_fn {
    ($fn_name:ident) => {
        #[no_mangle]
        pub extern "C" fn $fn_name() -> *const std::os::raw::c_char {
            concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const std::os::raw::c_char
        }
    };
}

/// Generate a string free function for strings handed out by the library.
///
/// # Example
/// ```ignore
/// vidview_ffi_common::define_string_free!(vv_string_free);
/// ```
#[macro_export]
macro_rules! define_string_free {
    ($fn_name:ident) => {
        #[no_mangle]
        #[allow(clippy::not_unsafe_ptr_arg_deref)]
        pub extern "C" fn $fn_name(s: *mut std::os::raw::c_char) {
            unsafe { $crate::free_cstring(s) };
        }
    };
}
