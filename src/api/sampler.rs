//! Sampler creation and queries.

use opencl3::error_codes::ClError;

use super::{info_scalar, InfoValue};
use crate::error::{check, BridgeError, BridgeResult};
use crate::handle::{Handle, HandleKind};
use crate::sys;

/// Creates a sampler with the given coordinate, addressing and filter modes.
pub fn create_sampler(
    context: &Handle,
    normalized_coords: bool,
    addressing_mode: sys::cl_addressing_mode,
    filter_mode: sys::cl_filter_mode,
) -> BridgeResult<Handle> {
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe {
        sys::clCreateSampler(
            context.raw(),
            if normalized_coords {
                sys::CL_TRUE
            } else {
                sys::CL_FALSE
            },
            addressing_mode,
            filter_mode,
            &mut status,
        )
    };
    check(status)?;
    Ok(Handle::wrap(raw, HandleKind::Sampler))
}

/// Increments the sampler's reference count.
pub fn retain_sampler(sampler: &Handle) -> BridgeResult<()> {
    sampler.retain()
}

/// Releases the handle's owned reference; later calls are no-ops.
pub fn release_sampler(sampler: &Handle) -> BridgeResult<()> {
    sampler.release()
}

/// Queries one sampler parameter.
pub fn get_sampler_info(sampler: &Handle, param: sys::cl_sampler_info) -> BridgeResult<InfoValue> {
    let raw: sys::cl_sampler = sampler.raw();
    let query = |size, value, ret| unsafe { sys::clGetSamplerInfo(raw, param, size, value, ret) };
    match param {
        sys::CL_SAMPLER_REFERENCE_COUNT
        | sys::CL_SAMPLER_ADDRESSING_MODE
        | sys::CL_SAMPLER_FILTER_MODE => {
            Ok(InfoValue::Uint(info_scalar::<sys::cl_uint, _>(query)?))
        }
        sys::CL_SAMPLER_NORMALIZED_COORDS => {
            Ok(InfoValue::Bool(info_scalar::<sys::cl_bool, _>(query)? != 0))
        }
        sys::CL_SAMPLER_CONTEXT => {
            let context: sys::cl_context = info_scalar(query)?;
            Ok(InfoValue::Handle(Handle::wrap_retained(
                context,
                HandleKind::Context,
            )?))
        }
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}
