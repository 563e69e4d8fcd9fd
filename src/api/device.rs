//! Device queries and sub-device management.

use std::ptr;

use opencl3::error_codes::ClError;

use super::{info_scalar, info_string, info_vec, InfoValue};
use crate::error::{check, BridgeError, BridgeResult};
use crate::handle::{Handle, HandleKind};
use crate::sys;

/// Returns the devices of `platform` matching `device_type`.
pub fn get_device_ids(
    platform: &Handle,
    device_type: sys::cl_device_type,
) -> BridgeResult<Vec<Handle>> {
    let raw: sys::cl_platform_id = platform.raw();
    let mut count: sys::cl_uint = 0;
    check(unsafe { sys::clGetDeviceIDs(raw, device_type, 0, ptr::null_mut(), &mut count) })?;
    let mut ids: Vec<sys::cl_device_id> = vec![ptr::null_mut(); count as usize];
    if count > 0 {
        check(unsafe {
            sys::clGetDeviceIDs(raw, device_type, count, ids.as_mut_ptr(), ptr::null_mut())
        })?;
    }
    Ok(ids
        .into_iter()
        .map(|id| Handle::wrap(id, HandleKind::DeviceId))
        .collect())
}

/// Queries one device parameter, decoded by its documented shape.
pub fn get_device_info(device: &Handle, param: sys::cl_device_info) -> BridgeResult<InfoValue> {
    let raw: sys::cl_device_id = device.raw();
    let query = |size, value, ret| unsafe { sys::clGetDeviceInfo(raw, param, size, value, ret) };
    match param {
        sys::CL_DEVICE_NAME
        | sys::CL_DEVICE_VENDOR
        | sys::CL_DRIVER_VERSION
        | sys::CL_DEVICE_PROFILE
        | sys::CL_DEVICE_VERSION
        | sys::CL_DEVICE_EXTENSIONS
        | sys::CL_DEVICE_BUILT_IN_KERNELS => Ok(InfoValue::Str(info_string(query)?)),
        sys::CL_DEVICE_TYPE
        | sys::CL_DEVICE_GLOBAL_MEM_SIZE
        | sys::CL_DEVICE_LOCAL_MEM_SIZE
        | sys::CL_DEVICE_MAX_MEM_ALLOC_SIZE => {
            Ok(InfoValue::Ulong(info_scalar::<sys::cl_ulong, _>(query)?))
        }
        sys::CL_DEVICE_VENDOR_ID
        | sys::CL_DEVICE_MAX_COMPUTE_UNITS
        | sys::CL_DEVICE_MAX_WORK_ITEM_DIMENSIONS
        | sys::CL_DEVICE_PARTITION_MAX_SUB_DEVICES
        | sys::CL_DEVICE_REFERENCE_COUNT => {
            Ok(InfoValue::Uint(info_scalar::<sys::cl_uint, _>(query)?))
        }
        sys::CL_DEVICE_AVAILABLE => {
            Ok(InfoValue::Bool(info_scalar::<sys::cl_bool, _>(query)? != 0))
        }
        sys::CL_DEVICE_MAX_WORK_GROUP_SIZE => {
            Ok(InfoValue::Size(info_scalar::<usize, _>(query)?))
        }
        sys::CL_DEVICE_MAX_WORK_ITEM_SIZES => Ok(InfoValue::Sizes(info_vec::<usize, _>(query)?)),
        sys::CL_DEVICE_PLATFORM => {
            let id: sys::cl_platform_id = info_scalar(query)?;
            Ok(InfoValue::Handle(Handle::wrap(id, HandleKind::PlatformId)))
        }
        sys::CL_DEVICE_PARENT_DEVICE => {
            // Null for root devices; device ids are not counted, so the
            // wrapped null stays representable.
            let id: sys::cl_device_id = info_scalar(query)?;
            Ok(InfoValue::Handle(Handle::wrap(id, HandleKind::DeviceId)))
        }
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}

/// Partitions a device. `properties` is the zero-terminated partition
/// descriptor the driver expects.
pub fn create_sub_devices(
    device: &Handle,
    properties: &[sys::cl_device_partition_property],
) -> BridgeResult<Vec<Handle>> {
    let raw: sys::cl_device_id = device.raw();
    let mut count: sys::cl_uint = 0;
    check(unsafe {
        sys::clCreateSubDevices(raw, properties.as_ptr(), 0, ptr::null_mut(), &mut count)
    })?;
    let mut ids: Vec<sys::cl_device_id> = vec![ptr::null_mut(); count as usize];
    if count > 0 {
        check(unsafe {
            sys::clCreateSubDevices(
                raw,
                properties.as_ptr(),
                count,
                ids.as_mut_ptr(),
                ptr::null_mut(),
            )
        })?;
    }
    Ok(ids
        .into_iter()
        .map(|id| Handle::wrap(id, HandleKind::DeviceId))
        .collect())
}

/// Increments the reference count of a sub-device.
///
/// Root device ids are not counted (the kind table treats them as no-ops);
/// the sub-device entry points forward to the driver directly.
pub fn retain_device(device: &Handle) -> BridgeResult<()> {
    check(unsafe { sys::clRetainDevice(device.raw()) })
}

/// Decrements the reference count of a sub-device.
pub fn release_device(device: &Handle) -> BridgeResult<()> {
    check(unsafe { sys::clReleaseDevice(device.raw()) })
}
