//! Thin translations of the OpenCL 1.2 host entry points.
//!
//! Each function unwraps its [`Handle`] arguments, invokes the native call,
//! checks the status code and wraps any returned resource. No call is
//! reordered, buffered or retried; the driver's semantics pass through
//! unchanged. The modules are grouped by resource kind.

pub mod context;
pub mod device;
pub mod event;
pub mod kernel;
pub mod mem;
pub mod platform;
pub mod program;
pub mod queue;
pub mod sampler;

use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::ptr;

use crate::error::{check, BridgeResult};
use crate::handle::Handle;
use crate::sys;

/// A typed value returned by the `get_*_info` queries.
///
/// The native info calls return raw bytes whose interpretation depends on
/// the parameter; this enum carries the decoded form, with resource-valued
/// parameters already wrapped into handles.
#[derive(Debug)]
pub enum InfoValue {
    /// An unsigned 32-bit quantity.
    Uint(sys::cl_uint),
    /// An unsigned 64-bit quantity or bitfield.
    Ulong(sys::cl_ulong),
    /// A signed status-like quantity.
    Int(sys::cl_int),
    /// A pointer-width size.
    Size(usize),
    /// An array of pointer-width sizes.
    Sizes(Vec<usize>),
    /// A boolean flag.
    Bool(bool),
    /// A string parameter.
    Str(String),
    /// Raw bytes with no further structure.
    Bytes(Vec<u8>),
    /// A single wrapped resource.
    Handle(Handle),
    /// An array of wrapped resources.
    Handles(Vec<Handle>),
    /// One compiled binary per device.
    Binaries(Vec<Vec<u8>>),
}

// Two-phase info fetch: size query, then the value itself.
pub(crate) fn info_bytes<F>(query: F) -> BridgeResult<Vec<u8>>
where
    F: Fn(usize, *mut c_void, *mut usize) -> sys::cl_int,
{
    let mut size = 0usize;
    check(query(0, ptr::null_mut(), &mut size))?;
    let mut buffer = vec![0u8; size];
    if size > 0 {
        check(query(size, buffer.as_mut_ptr() as *mut c_void, ptr::null_mut()))?;
    }
    Ok(buffer)
}

pub(crate) fn info_string<F>(query: F) -> BridgeResult<String>
where
    F: Fn(usize, *mut c_void, *mut usize) -> sys::cl_int,
{
    let mut bytes = info_bytes(query)?;
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub(crate) fn info_scalar<T, F>(query: F) -> BridgeResult<T>
where
    T: Copy,
    F: Fn(usize, *mut c_void, *mut usize) -> sys::cl_int,
{
    let mut value = MaybeUninit::<T>::zeroed();
    check(query(
        std::mem::size_of::<T>(),
        value.as_mut_ptr() as *mut c_void,
        ptr::null_mut(),
    ))?;
    // The driver filled exactly size_of::<T>() bytes of plain data.
    Ok(unsafe { value.assume_init() })
}

pub(crate) fn info_vec<T, F>(query: F) -> BridgeResult<Vec<T>>
where
    T: Copy,
    F: Fn(usize, *mut c_void, *mut usize) -> sys::cl_int,
{
    let mut size = 0usize;
    check(query(0, ptr::null_mut(), &mut size))?;
    let count = size / std::mem::size_of::<T>();
    let mut out: Vec<T> = Vec::with_capacity(count);
    if size > 0 {
        check(query(size, out.as_mut_ptr() as *mut c_void, ptr::null_mut()))?;
    }
    // The driver filled `count` elements of plain data.
    unsafe { out.set_len(count) };
    Ok(out)
}

// Wait lists travel as borrowed raw pointers; an empty list becomes the
// (0, NULL) pair the ABI expects.
pub(crate) fn event_wait_list(events: &[&Handle]) -> Vec<sys::cl_event> {
    events.iter().map(|event| event.raw()).collect()
}

pub(crate) fn wait_list_parts(list: &[sys::cl_event]) -> (sys::cl_uint, *const sys::cl_event) {
    if list.is_empty() {
        (0, ptr::null())
    } else {
        (list.len() as sys::cl_uint, list.as_ptr())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_wait_list_becomes_null() {
        let (count, ptr) = wait_list_parts(&[]);
        assert_eq!(count, 0);
        assert!(ptr.is_null());
    }

    #[test]
    fn test_wait_list_keeps_raw_pointers() {
        let a = Handle::wrap_borrowed(0x10_usize as *mut _, crate::HandleKind::Event);
        let b = Handle::wrap_borrowed(0x20_usize as *mut _, crate::HandleKind::Event);
        let raw = event_wait_list(&[&a, &b]);
        assert_eq!(raw, vec![0x10_usize as *mut _, 0x20_usize as *mut _]);
        let (count, head) = wait_list_parts(&raw);
        assert_eq!(count, 2);
        assert_eq!(head, raw.as_ptr());
    }
}
