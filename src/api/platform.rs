//! Platform queries.

use std::ptr;

use opencl3::error_codes::ClError;

use super::{info_string, InfoValue};
use crate::error::{check, BridgeError, BridgeResult};
use crate::handle::{Handle, HandleKind};
use crate::sys;

/// Returns a handle for every installed platform.
pub fn get_platform_ids() -> BridgeResult<Vec<Handle>> {
    let mut count: sys::cl_uint = 0;
    check(unsafe { sys::clGetPlatformIDs(0, ptr::null_mut(), &mut count) })?;
    let mut ids: Vec<sys::cl_platform_id> = vec![ptr::null_mut(); count as usize];
    if count > 0 {
        check(unsafe { sys::clGetPlatformIDs(count, ids.as_mut_ptr(), ptr::null_mut()) })?;
    }
    Ok(ids
        .into_iter()
        .map(|id| Handle::wrap(id, HandleKind::PlatformId))
        .collect())
}

/// Queries one platform parameter. All platform parameters are strings.
pub fn get_platform_info(
    platform: &Handle,
    param: sys::cl_platform_info,
) -> BridgeResult<InfoValue> {
    let raw: sys::cl_platform_id = platform.raw();
    match param {
        sys::CL_PLATFORM_PROFILE
        | sys::CL_PLATFORM_VERSION
        | sys::CL_PLATFORM_NAME
        | sys::CL_PLATFORM_VENDOR
        | sys::CL_PLATFORM_EXTENSIONS => Ok(InfoValue::Str(info_string(|size, value, ret| unsafe {
            sys::clGetPlatformInfo(raw, param, size, value, ret)
        })?)),
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}
