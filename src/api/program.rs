//! Program creation, building and queries.

use std::ffi::{c_char, c_void, CString};
use std::ptr;

use log::debug;
use opencl3::error_codes::ClError;

use super::{info_scalar, info_string, info_vec, InfoValue};
use crate::error::{check, BridgeError, BridgeResult};
use crate::handle::{Handle, HandleKind};
use crate::notify::{CallbackSender, Notification, Notifier};
use crate::sys;

fn build_options(options: Option<&str>) -> BridgeResult<Option<CString>> {
    options
        .map(|options| {
            CString::new(options).map_err(|_| {
                BridgeError::InvalidArgument("options contain an interior NUL".to_string())
            })
        })
        .transpose()
}

fn options_ptr(options: &Option<CString>) -> *const c_char {
    options.as_ref().map_or(ptr::null(), |o| o.as_ptr())
}

fn device_list(devices: &[&Handle]) -> (Vec<sys::cl_device_id>, sys::cl_uint) {
    let ids: Vec<sys::cl_device_id> = devices.iter().map(|d| d.raw()).collect();
    let count = ids.len() as sys::cl_uint;
    (ids, count)
}

fn list_ptr(ids: &[sys::cl_device_id]) -> *const sys::cl_device_id {
    if ids.is_empty() {
        ptr::null()
    } else {
        ids.as_ptr()
    }
}

/// Creates a program from OpenCL C source.
pub fn create_program_with_source(context: &Handle, source: &str) -> BridgeResult<Handle> {
    let mut status = sys::CL_SUCCESS;
    let source_ptr = source.as_ptr() as *const c_char;
    let source_len = source.len();
    let raw = unsafe {
        sys::clCreateProgramWithSource(context.raw(), 1, &source_ptr, &source_len, &mut status)
    };
    check(status)?;
    Ok(Handle::wrap(raw, HandleKind::Program))
}

/// Creates a program from one pre-compiled binary per device.
pub fn create_program_with_binary(
    context: &Handle,
    devices: &[&Handle],
    binaries: &[&[u8]],
) -> BridgeResult<Handle> {
    if devices.len() != binaries.len() {
        return Err(BridgeError::InvalidArgument(format!(
            "{} devices but {} binaries",
            devices.len(),
            binaries.len()
        )));
    }
    let (ids, count) = device_list(devices);
    let lengths: Vec<usize> = binaries.iter().map(|b| b.len()).collect();
    let pointers: Vec<*const u8> = binaries.iter().map(|b| b.as_ptr()).collect();
    let mut binary_status: Vec<sys::cl_int> = vec![sys::CL_SUCCESS; binaries.len()];
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe {
        sys::clCreateProgramWithBinary(
            context.raw(),
            count,
            ids.as_ptr(),
            lengths.as_ptr(),
            pointers.as_ptr(),
            binary_status.as_mut_ptr(),
            &mut status,
        )
    };
    check(status)?;
    for status in binary_status {
        check(status)?;
    }
    Ok(Handle::wrap(raw, HandleKind::Program))
}

/// Creates a program from the device's built-in kernels, named as a
/// semicolon-separated list.
pub fn create_program_with_built_in_kernels(
    context: &Handle,
    devices: &[&Handle],
    kernel_names: &str,
) -> BridgeResult<Handle> {
    let names = CString::new(kernel_names).map_err(|_| {
        BridgeError::InvalidArgument("kernel names contain an interior NUL".to_string())
    })?;
    let (ids, count) = device_list(devices);
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe {
        sys::clCreateProgramWithBuiltInKernels(
            context.raw(),
            count,
            ids.as_ptr(),
            names.as_ptr(),
            &mut status,
        )
    };
    check(status)?;
    Ok(Handle::wrap(raw, HandleKind::Program))
}

/// Increments the program's reference count.
pub fn retain_program(program: &Handle) -> BridgeResult<()> {
    program.retain()
}

/// Releases the handle's owned reference; later calls are no-ops.
pub fn release_program(program: &Handle) -> BridgeResult<()> {
    program.release()
}

/// Builds the program for the given devices, blocking until the build is
/// done. On a build failure the driver's log is attached to the error.
pub fn build_program(
    program: &Handle,
    devices: &[&Handle],
    options: Option<&str>,
) -> BridgeResult<()> {
    debug!("building program {}", program);
    let options = build_options(options)?;
    let (ids, count) = device_list(devices);
    let status = unsafe {
        sys::clBuildProgram(
            program.raw(),
            count,
            list_ptr(&ids),
            options_ptr(&options),
            None,
            ptr::null_mut(),
        )
    };
    if status != sys::CL_SUCCESS {
        let log = devices
            .first()
            .and_then(|device| build_log(program, device).ok());
        return Err(BridgeError::Driver(ClError(status), log));
    }
    Ok(())
}

/// Builds the program without blocking; `callback` runs on the thread that
/// pumps the queue behind `sender` once the driver finishes.
///
/// If the driver rejects the call synchronously the callback never ran and
/// never will; its resources are reclaimed before the error returns.
pub fn build_program_with_notify<D, F>(
    program: &Handle,
    devices: &[&Handle],
    options: Option<&str>,
    sender: &CallbackSender,
    callback: F,
    user_data: D,
) -> BridgeResult<()>
where
    D: Send + 'static,
    F: FnOnce(Notification, D) + Send + 'static,
{
    debug!("building program {} with completion callback", program);
    let options = build_options(options)?;
    let (ids, count) = device_list(devices);
    let ctx = Notifier::arm(sender, HandleKind::Program, callback, user_data);
    let status = unsafe {
        sys::clBuildProgram(
            program.raw(),
            count,
            list_ptr(&ids),
            options_ptr(&options),
            Some(Notifier::trampoline),
            ctx,
        )
    };
    if status != sys::CL_SUCCESS {
        // The driver never accepted the registration.
        unsafe { Notifier::cancel(ctx) };
        return Err(BridgeError::Driver(ClError(status), None));
    }
    Ok(())
}

/// Compiles the program with the given embedded headers, blocking until the
/// compilation is done.
pub fn compile_program(
    program: &Handle,
    devices: &[&Handle],
    options: Option<&str>,
    headers: &[(&Handle, &str)],
) -> BridgeResult<()> {
    let options = build_options(options)?;
    let (ids, count) = device_list(devices);
    let (header_programs, header_names) = header_lists(headers)?;
    let name_ptrs: Vec<*const c_char> = header_names.iter().map(|n| n.as_ptr()).collect();
    let status = unsafe {
        sys::clCompileProgram(
            program.raw(),
            count,
            list_ptr(&ids),
            options_ptr(&options),
            header_programs.len() as sys::cl_uint,
            if header_programs.is_empty() {
                ptr::null()
            } else {
                header_programs.as_ptr()
            },
            if name_ptrs.is_empty() {
                ptr::null()
            } else {
                name_ptrs.as_ptr()
            },
            None,
            ptr::null_mut(),
        )
    };
    if status != sys::CL_SUCCESS {
        let log = devices
            .first()
            .and_then(|device| build_log(program, device).ok());
        return Err(BridgeError::Driver(ClError(status), log));
    }
    Ok(())
}

/// Compiles the program without blocking; `callback` runs once the driver
/// finishes, on the thread that pumps the queue behind `sender`.
pub fn compile_program_with_notify<D, F>(
    program: &Handle,
    devices: &[&Handle],
    options: Option<&str>,
    headers: &[(&Handle, &str)],
    sender: &CallbackSender,
    callback: F,
    user_data: D,
) -> BridgeResult<()>
where
    D: Send + 'static,
    F: FnOnce(Notification, D) + Send + 'static,
{
    let options = build_options(options)?;
    let (ids, count) = device_list(devices);
    let (header_programs, header_names) = header_lists(headers)?;
    let name_ptrs: Vec<*const c_char> = header_names.iter().map(|n| n.as_ptr()).collect();
    let ctx = Notifier::arm(sender, HandleKind::Program, callback, user_data);
    let status = unsafe {
        sys::clCompileProgram(
            program.raw(),
            count,
            list_ptr(&ids),
            options_ptr(&options),
            header_programs.len() as sys::cl_uint,
            if header_programs.is_empty() {
                ptr::null()
            } else {
                header_programs.as_ptr()
            },
            if name_ptrs.is_empty() {
                ptr::null()
            } else {
                name_ptrs.as_ptr()
            },
            Some(Notifier::trampoline),
            ctx,
        )
    };
    if status != sys::CL_SUCCESS {
        unsafe { Notifier::cancel(ctx) };
        return Err(BridgeError::Driver(ClError(status), None));
    }
    Ok(())
}

fn header_lists(
    headers: &[(&Handle, &str)],
) -> BridgeResult<(Vec<sys::cl_program>, Vec<CString>)> {
    let programs: Vec<sys::cl_program> = headers.iter().map(|(h, _)| h.raw()).collect();
    let names = headers
        .iter()
        .map(|(_, name)| {
            CString::new(*name).map_err(|_| {
                BridgeError::InvalidArgument("header name contains an interior NUL".to_string())
            })
        })
        .collect::<BridgeResult<Vec<CString>>>()?;
    Ok((programs, names))
}

/// Links compiled programs into an executable, blocking until the link is
/// done. Returns the linked program.
pub fn link_program(
    context: &Handle,
    devices: &[&Handle],
    options: Option<&str>,
    programs: &[&Handle],
) -> BridgeResult<Handle> {
    let options = build_options(options)?;
    let (ids, count) = device_list(devices);
    let inputs: Vec<sys::cl_program> = programs.iter().map(|p| p.raw()).collect();
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe {
        sys::clLinkProgram(
            context.raw(),
            count,
            list_ptr(&ids),
            options_ptr(&options),
            inputs.len() as sys::cl_uint,
            inputs.as_ptr(),
            None,
            ptr::null_mut(),
            &mut status,
        )
    };
    check(status)?;
    Ok(Handle::wrap(raw, HandleKind::Program))
}

/// Links compiled programs without blocking. The returned handle owns the
/// program object; `callback` observes the same program once the driver
/// finishes linking it.
pub fn link_program_with_notify<D, F>(
    context: &Handle,
    devices: &[&Handle],
    options: Option<&str>,
    programs: &[&Handle],
    sender: &CallbackSender,
    callback: F,
    user_data: D,
) -> BridgeResult<Handle>
where
    D: Send + 'static,
    F: FnOnce(Notification, D) + Send + 'static,
{
    let options = build_options(options)?;
    let (ids, count) = device_list(devices);
    let inputs: Vec<sys::cl_program> = programs.iter().map(|p| p.raw()).collect();
    let ctx = Notifier::arm(sender, HandleKind::Program, callback, user_data);
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe {
        sys::clLinkProgram(
            context.raw(),
            count,
            list_ptr(&ids),
            options_ptr(&options),
            inputs.len() as sys::cl_uint,
            inputs.as_ptr(),
            Some(Notifier::trampoline),
            ctx,
            &mut status,
        )
    };
    if status != sys::CL_SUCCESS {
        unsafe { Notifier::cancel(ctx) };
        return Err(BridgeError::Driver(ClError(status), None));
    }
    Ok(Handle::wrap(raw, HandleKind::Program))
}

/// Asks the platform to release its compiler resources.
pub fn unload_platform_compiler(platform: &Handle) -> BridgeResult<()> {
    check(unsafe { sys::clUnloadPlatformCompiler(platform.raw()) })
}

/// Queries one program parameter.
pub fn get_program_info(program: &Handle, param: sys::cl_program_info) -> BridgeResult<InfoValue> {
    let raw: sys::cl_program = program.raw();
    let query = |size, value, ret| unsafe { sys::clGetProgramInfo(raw, param, size, value, ret) };
    match param {
        sys::CL_PROGRAM_REFERENCE_COUNT | sys::CL_PROGRAM_NUM_DEVICES
        | sys::CL_PROGRAM_NUM_KERNELS => {
            Ok(InfoValue::Uint(info_scalar::<sys::cl_uint, _>(query)?))
        }
        sys::CL_PROGRAM_CONTEXT => {
            let context: sys::cl_context = info_scalar(query)?;
            Ok(InfoValue::Handle(Handle::wrap_retained(
                context,
                HandleKind::Context,
            )?))
        }
        sys::CL_PROGRAM_DEVICES => {
            let ids: Vec<sys::cl_device_id> = info_vec(query)?;
            Ok(InfoValue::Handles(
                ids.into_iter()
                    .map(|id| Handle::wrap(id, HandleKind::DeviceId))
                    .collect(),
            ))
        }
        sys::CL_PROGRAM_SOURCE | sys::CL_PROGRAM_KERNEL_NAMES => {
            Ok(InfoValue::Str(info_string(query)?))
        }
        sys::CL_PROGRAM_BINARY_SIZES => Ok(InfoValue::Sizes(info_vec::<usize, _>(query)?)),
        sys::CL_PROGRAM_BINARIES => Ok(InfoValue::Binaries(program_binaries(raw)?)),
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}

// CL_PROGRAM_BINARIES fills caller-allocated buffers through an array of
// pointers, one per device.
fn program_binaries(program: sys::cl_program) -> BridgeResult<Vec<Vec<u8>>> {
    let sizes: Vec<usize> = info_vec(|size, value, ret| unsafe {
        sys::clGetProgramInfo(program, sys::CL_PROGRAM_BINARY_SIZES, size, value, ret)
    })?;
    let mut binaries: Vec<Vec<u8>> = sizes.iter().map(|&size| vec![0u8; size]).collect();
    let mut pointers: Vec<*mut u8> = binaries.iter_mut().map(|b| b.as_mut_ptr()).collect();
    check(unsafe {
        sys::clGetProgramInfo(
            program,
            sys::CL_PROGRAM_BINARIES,
            pointers.len() * std::mem::size_of::<*mut u8>(),
            pointers.as_mut_ptr() as *mut c_void,
            ptr::null_mut(),
        )
    })?;
    Ok(binaries)
}

/// Queries one per-device build parameter.
pub fn get_program_build_info(
    program: &Handle,
    device: &Handle,
    param: sys::cl_program_build_info,
) -> BridgeResult<InfoValue> {
    let raw: sys::cl_program = program.raw();
    let device_id: sys::cl_device_id = device.raw();
    let query = |size, value, ret| unsafe {
        sys::clGetProgramBuildInfo(raw, device_id, param, size, value, ret)
    };
    match param {
        sys::CL_PROGRAM_BUILD_STATUS => Ok(InfoValue::Int(info_scalar::<sys::cl_int, _>(query)?)),
        sys::CL_PROGRAM_BUILD_OPTIONS | sys::CL_PROGRAM_BUILD_LOG => {
            Ok(InfoValue::Str(info_string(query)?))
        }
        sys::CL_PROGRAM_BINARY_TYPE => Ok(InfoValue::Uint(info_scalar::<sys::cl_uint, _>(query)?)),
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}

fn build_log(program: &Handle, device: &Handle) -> BridgeResult<String> {
    match get_program_build_info(program, device, sys::CL_PROGRAM_BUILD_LOG)? {
        InfoValue::Str(log) => Ok(log),
        _ => unreachable!(),
    }
}
