//! Buffer creation and memory object queries.

use std::ffi::c_void;
use std::ptr;

use opencl3::error_codes::ClError;

use super::{info_scalar, InfoValue};
use crate::error::{check, BridgeError, BridgeResult};
use crate::handle::{Handle, HandleKind};
use crate::sys;

/// Creates a buffer of `size` bytes.
///
/// When `host_data` is given, its bytes initialize the buffer and
/// `CL_MEM_COPY_HOST_PTR` is implied: the driver copies during the call, so
/// the slice only has to live that long. `CL_MEM_USE_HOST_PTR` is not
/// offered through this path since the driver would keep the borrowed
/// region past the call.
pub fn create_buffer(
    context: &Handle,
    flags: sys::cl_mem_flags,
    size: usize,
    host_data: Option<&[u8]>,
) -> BridgeResult<Handle> {
    let (flags, host_ptr) = match host_data {
        Some(data) => {
            if data.len() < size {
                return Err(BridgeError::InvalidArgument(format!(
                    "initializer holds {} bytes, the buffer needs {}",
                    data.len(),
                    size
                )));
            }
            (
                flags | sys::CL_MEM_COPY_HOST_PTR,
                data.as_ptr() as *mut c_void,
            )
        }
        None => (flags, ptr::null_mut()),
    };
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe { sys::clCreateBuffer(context.raw(), flags, size, host_ptr, &mut status) };
    check(status)?;
    Ok(Handle::wrap(raw, HandleKind::Mem))
}

/// Creates a sub-buffer over `[origin, origin + size)` of `buffer`.
pub fn create_sub_buffer(
    buffer: &Handle,
    flags: sys::cl_mem_flags,
    origin: usize,
    size: usize,
) -> BridgeResult<Handle> {
    let region = sys::cl_buffer_region { origin, size };
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe {
        sys::clCreateSubBuffer(
            buffer.raw(),
            flags,
            sys::CL_BUFFER_CREATE_TYPE_REGION,
            &region as *const sys::cl_buffer_region as *const c_void,
            &mut status,
        )
    };
    check(status)?;
    Ok(Handle::wrap(raw, HandleKind::Mem))
}

/// Increments the memory object's reference count.
pub fn retain_mem_object(mem: &Handle) -> BridgeResult<()> {
    mem.retain()
}

/// Releases the handle's owned reference; later calls are no-ops.
pub fn release_mem_object(mem: &Handle) -> BridgeResult<()> {
    mem.release()
}

/// Queries one memory object parameter.
pub fn get_mem_object_info(mem: &Handle, param: sys::cl_mem_info) -> BridgeResult<InfoValue> {
    let raw: sys::cl_mem = mem.raw();
    let query = |size, value, ret| unsafe { sys::clGetMemObjectInfo(raw, param, size, value, ret) };
    match param {
        sys::CL_MEM_TYPE | sys::CL_MEM_MAP_COUNT | sys::CL_MEM_REFERENCE_COUNT => {
            Ok(InfoValue::Uint(info_scalar::<sys::cl_uint, _>(query)?))
        }
        sys::CL_MEM_FLAGS => Ok(InfoValue::Ulong(info_scalar::<sys::cl_ulong, _>(query)?)),
        sys::CL_MEM_SIZE | sys::CL_MEM_OFFSET => {
            Ok(InfoValue::Size(info_scalar::<usize, _>(query)?))
        }
        sys::CL_MEM_CONTEXT => {
            let context: sys::cl_context = info_scalar(query)?;
            Ok(InfoValue::Handle(Handle::wrap_retained(
                context,
                HandleKind::Context,
            )?))
        }
        sys::CL_MEM_ASSOCIATED_MEMOBJECT => {
            let parent: sys::cl_mem = info_scalar(query)?;
            if parent.is_null() {
                // Only sub-buffers have a parent.
                Ok(InfoValue::Handle(Handle::invalid()))
            } else {
                Ok(InfoValue::Handle(Handle::wrap_retained(
                    parent,
                    HandleKind::Mem,
                )?))
            }
        }
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}
