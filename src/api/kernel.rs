//! Kernel creation, argument binding and queries.

use std::ffi::{c_void, CString};
use std::ptr;

use opencl3::error_codes::ClError;

use super::{info_scalar, info_string, InfoValue};
use crate::error::{check, BridgeError, BridgeResult};
use crate::handle::{Handle, HandleKind};
use crate::sys;

/// One kernel argument as the embedder hands it across the boundary.
pub enum KernelArg<'a> {
    /// The flat bytes of a plain value (scalars, vectors, structs).
    Bytes(&'a [u8]),
    /// A memory object.
    Mem(&'a Handle),
    /// A sampler.
    Sampler(&'a Handle),
    /// A local-memory allocation of the given size; carries no data.
    Local(usize),
}

/// Creates the named kernel from a built program.
pub fn create_kernel(program: &Handle, name: &str) -> BridgeResult<Handle> {
    let name = CString::new(name).map_err(|_| {
        BridgeError::InvalidArgument("kernel name contains an interior NUL".to_string())
    })?;
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe { sys::clCreateKernel(program.raw(), name.as_ptr(), &mut status) };
    check(status)?;
    Ok(Handle::wrap(raw, HandleKind::Kernel))
}

/// Creates one kernel per function in a built program.
pub fn create_kernels_in_program(program: &Handle) -> BridgeResult<Vec<Handle>> {
    let raw: sys::cl_program = program.raw();
    let mut count: sys::cl_uint = 0;
    check(unsafe { sys::clCreateKernelsInProgram(raw, 0, ptr::null_mut(), &mut count) })?;
    let mut kernels: Vec<sys::cl_kernel> = vec![ptr::null_mut(); count as usize];
    if count > 0 {
        check(unsafe {
            sys::clCreateKernelsInProgram(raw, count, kernels.as_mut_ptr(), ptr::null_mut())
        })?;
    }
    Ok(kernels
        .into_iter()
        .map(|kernel| Handle::wrap(kernel, HandleKind::Kernel))
        .collect())
}

/// Increments the kernel's reference count.
pub fn retain_kernel(kernel: &Handle) -> BridgeResult<()> {
    kernel.retain()
}

/// Releases the handle's owned reference; later calls are no-ops.
pub fn release_kernel(kernel: &Handle) -> BridgeResult<()> {
    kernel.release()
}

/// Binds one argument of the kernel.
pub fn set_kernel_arg(kernel: &Handle, index: u32, arg: KernelArg<'_>) -> BridgeResult<()> {
    let raw: sys::cl_kernel = kernel.raw();
    let status = match arg {
        KernelArg::Bytes(bytes) => unsafe {
            sys::clSetKernelArg(raw, index, bytes.len(), bytes.as_ptr() as *const c_void)
        },
        KernelArg::Mem(mem) => {
            let value: sys::cl_mem = mem.raw();
            unsafe {
                sys::clSetKernelArg(
                    raw,
                    index,
                    std::mem::size_of::<sys::cl_mem>(),
                    &value as *const sys::cl_mem as *const c_void,
                )
            }
        }
        KernelArg::Sampler(sampler) => {
            let value: sys::cl_sampler = sampler.raw();
            unsafe {
                sys::clSetKernelArg(
                    raw,
                    index,
                    std::mem::size_of::<sys::cl_sampler>(),
                    &value as *const sys::cl_sampler as *const c_void,
                )
            }
        }
        KernelArg::Local(size) => unsafe { sys::clSetKernelArg(raw, index, size, ptr::null()) },
    };
    check(status)
}

/// Queries one kernel parameter.
pub fn get_kernel_info(kernel: &Handle, param: sys::cl_kernel_info) -> BridgeResult<InfoValue> {
    let raw: sys::cl_kernel = kernel.raw();
    let query = |size, value, ret| unsafe { sys::clGetKernelInfo(raw, param, size, value, ret) };
    match param {
        sys::CL_KERNEL_FUNCTION_NAME | sys::CL_KERNEL_ATTRIBUTES => {
            Ok(InfoValue::Str(info_string(query)?))
        }
        sys::CL_KERNEL_NUM_ARGS | sys::CL_KERNEL_REFERENCE_COUNT => {
            Ok(InfoValue::Uint(info_scalar::<sys::cl_uint, _>(query)?))
        }
        sys::CL_KERNEL_CONTEXT => {
            let context: sys::cl_context = info_scalar(query)?;
            Ok(InfoValue::Handle(Handle::wrap_retained(
                context,
                HandleKind::Context,
            )?))
        }
        sys::CL_KERNEL_PROGRAM => {
            let program: sys::cl_program = info_scalar(query)?;
            Ok(InfoValue::Handle(Handle::wrap_retained(
                program,
                HandleKind::Program,
            )?))
        }
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}

/// Queries one per-device work-group parameter of the kernel.
pub fn get_kernel_work_group_info(
    kernel: &Handle,
    device: &Handle,
    param: sys::cl_kernel_work_group_info,
) -> BridgeResult<InfoValue> {
    let raw: sys::cl_kernel = kernel.raw();
    let device_id: sys::cl_device_id = device.raw();
    let query = |size, value, ret| unsafe {
        sys::clGetKernelWorkGroupInfo(raw, device_id, param, size, value, ret)
    };
    match param {
        sys::CL_KERNEL_WORK_GROUP_SIZE | sys::CL_KERNEL_PREFERRED_WORK_GROUP_SIZE_MULTIPLE => {
            Ok(InfoValue::Size(info_scalar::<usize, _>(query)?))
        }
        sys::CL_KERNEL_COMPILE_WORK_GROUP_SIZE => {
            Ok(InfoValue::Sizes(info_scalar::<[usize; 3], _>(query)?.to_vec()))
        }
        sys::CL_KERNEL_LOCAL_MEM_SIZE | sys::CL_KERNEL_PRIVATE_MEM_SIZE => {
            Ok(InfoValue::Ulong(info_scalar::<sys::cl_ulong, _>(query)?))
        }
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}
