//! Context creation and queries.

use std::ptr;

use opencl3::error_codes::ClError;

use super::{info_bytes, info_scalar, info_vec, InfoValue};
use crate::error::{check, BridgeError, BridgeResult};
use crate::handle::{Handle, HandleKind};
use crate::sys;

fn platform_properties(platform: Option<&Handle>) -> Vec<sys::cl_context_properties> {
    match platform {
        Some(platform) => vec![
            sys::CL_CONTEXT_PLATFORM,
            platform.raw() as sys::cl_context_properties,
            0,
        ],
        None => Vec::new(),
    }
}

/// Creates a context over the given devices.
pub fn create_context(platform: Option<&Handle>, devices: &[&Handle]) -> BridgeResult<Handle> {
    if devices.is_empty() {
        return Err(BridgeError::InvalidArgument(
            "a context needs at least one device".to_string(),
        ));
    }
    let properties = platform_properties(platform);
    let device_ids: Vec<sys::cl_device_id> = devices.iter().map(|d| d.raw()).collect();
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe {
        sys::clCreateContext(
            if properties.is_empty() {
                ptr::null()
            } else {
                properties.as_ptr()
            },
            device_ids.len() as sys::cl_uint,
            device_ids.as_ptr(),
            None,
            ptr::null_mut(),
            &mut status,
        )
    };
    check(status)?;
    Ok(Handle::wrap(raw, HandleKind::Context))
}

/// Creates a context over every device of `device_type`.
pub fn create_context_from_type(
    platform: Option<&Handle>,
    device_type: sys::cl_device_type,
) -> BridgeResult<Handle> {
    let properties = platform_properties(platform);
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe {
        sys::clCreateContextFromType(
            if properties.is_empty() {
                ptr::null()
            } else {
                properties.as_ptr()
            },
            device_type,
            None,
            ptr::null_mut(),
            &mut status,
        )
    };
    check(status)?;
    Ok(Handle::wrap(raw, HandleKind::Context))
}

/// Increments the context's reference count.
pub fn retain_context(context: &Handle) -> BridgeResult<()> {
    context.retain()
}

/// Releases the handle's owned reference; later calls are no-ops.
pub fn release_context(context: &Handle) -> BridgeResult<()> {
    context.release()
}

/// Queries one context parameter.
pub fn get_context_info(context: &Handle, param: sys::cl_context_info) -> BridgeResult<InfoValue> {
    let raw: sys::cl_context = context.raw();
    let query = |size, value, ret| unsafe { sys::clGetContextInfo(raw, param, size, value, ret) };
    match param {
        sys::CL_CONTEXT_REFERENCE_COUNT | sys::CL_CONTEXT_NUM_DEVICES => {
            Ok(InfoValue::Uint(info_scalar::<sys::cl_uint, _>(query)?))
        }
        sys::CL_CONTEXT_DEVICES => {
            let ids: Vec<sys::cl_device_id> = info_vec(query)?;
            Ok(InfoValue::Handles(
                ids.into_iter()
                    .map(|id| Handle::wrap(id, HandleKind::DeviceId))
                    .collect(),
            ))
        }
        sys::CL_CONTEXT_PROPERTIES => Ok(InfoValue::Bytes(info_bytes(query)?)),
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}
