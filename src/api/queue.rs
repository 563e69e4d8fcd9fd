//! Command queue management and the enqueue family.
//!
//! Slice-based read, write and map translations always take the driver's
//! blocking form: a non-blocking transfer over borrowed host memory would
//! leave the driver reading from or writing into a region whose lifetime
//! this layer cannot extend. Ordering between commands is still available
//! through the returned event handles and wait lists.

use std::ffi::c_void;
use std::ptr;

use opencl3::error_codes::ClError;

use super::{event_wait_list, info_scalar, wait_list_parts, InfoValue};
use crate::error::{check, BridgeError, BridgeResult};
use crate::handle::{Handle, HandleKind};
use crate::sys;

/// Creates an in-order command queue for `device`, with `properties` as the
/// raw property bitfield.
pub fn create_command_queue(
    context: &Handle,
    device: &Handle,
    properties: sys::cl_command_queue_properties,
) -> BridgeResult<Handle> {
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe {
        sys::clCreateCommandQueue(context.raw(), device.raw(), properties, &mut status)
    };
    check(status)?;
    Ok(Handle::wrap(raw, HandleKind::CommandQueue))
}

/// Increments the queue's reference count.
pub fn retain_command_queue(queue: &Handle) -> BridgeResult<()> {
    queue.retain()
}

/// Releases the handle's owned reference; later calls are no-ops.
pub fn release_command_queue(queue: &Handle) -> BridgeResult<()> {
    queue.release()
}

/// Queries one command queue parameter.
pub fn get_command_queue_info(
    queue: &Handle,
    param: sys::cl_command_queue_info,
) -> BridgeResult<InfoValue> {
    let raw: sys::cl_command_queue = queue.raw();
    let query =
        |size, value, ret| unsafe { sys::clGetCommandQueueInfo(raw, param, size, value, ret) };
    match param {
        sys::CL_QUEUE_CONTEXT => {
            let context: sys::cl_context = info_scalar(query)?;
            Ok(InfoValue::Handle(Handle::wrap_retained(
                context,
                HandleKind::Context,
            )?))
        }
        sys::CL_QUEUE_DEVICE => {
            let device: sys::cl_device_id = info_scalar(query)?;
            Ok(InfoValue::Handle(Handle::wrap(device, HandleKind::DeviceId)))
        }
        sys::CL_QUEUE_REFERENCE_COUNT => {
            Ok(InfoValue::Uint(info_scalar::<sys::cl_uint, _>(query)?))
        }
        sys::CL_QUEUE_PROPERTIES => Ok(InfoValue::Ulong(info_scalar::<sys::cl_ulong, _>(query)?)),
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}

/// Submits all queued commands to the device.
pub fn flush(queue: &Handle) -> BridgeResult<()> {
    check(unsafe { sys::clFlush(queue.raw()) })
}

/// Blocks until all queued commands have completed.
pub fn finish(queue: &Handle) -> BridgeResult<()> {
    check(unsafe { sys::clFinish(queue.raw()) })
}

/// Reads `data.len()` bytes from `buffer` at `offset`, blocking until the
/// transfer is done. Returns the completion event.
pub fn enqueue_read_buffer(
    queue: &Handle,
    buffer: &Handle,
    offset: usize,
    data: &mut [u8],
    wait: &[&Handle],
) -> BridgeResult<Handle> {
    let wait_events = event_wait_list(wait);
    let (wait_count, wait_ptr) = wait_list_parts(&wait_events);
    let mut event: sys::cl_event = ptr::null_mut();
    check(unsafe {
        sys::clEnqueueReadBuffer(
            queue.raw(),
            buffer.raw(),
            sys::CL_TRUE,
            offset,
            data.len(),
            data.as_mut_ptr() as *mut c_void,
            wait_count,
            wait_ptr,
            &mut event,
        )
    })?;
    Ok(Handle::wrap(event, HandleKind::Event))
}

/// Writes `data` into `buffer` at `offset`, blocking until the transfer is
/// done. Returns the completion event.
pub fn enqueue_write_buffer(
    queue: &Handle,
    buffer: &Handle,
    offset: usize,
    data: &[u8],
    wait: &[&Handle],
) -> BridgeResult<Handle> {
    let wait_events = event_wait_list(wait);
    let (wait_count, wait_ptr) = wait_list_parts(&wait_events);
    let mut event: sys::cl_event = ptr::null_mut();
    check(unsafe {
        sys::clEnqueueWriteBuffer(
            queue.raw(),
            buffer.raw(),
            sys::CL_TRUE,
            offset,
            data.len(),
            data.as_ptr() as *const c_void,
            wait_count,
            wait_ptr,
            &mut event,
        )
    })?;
    Ok(Handle::wrap(event, HandleKind::Event))
}

/// Copies `size` bytes between two buffers on the device.
pub fn enqueue_copy_buffer(
    queue: &Handle,
    src: &Handle,
    dst: &Handle,
    src_offset: usize,
    dst_offset: usize,
    size: usize,
    wait: &[&Handle],
) -> BridgeResult<Handle> {
    let wait_events = event_wait_list(wait);
    let (wait_count, wait_ptr) = wait_list_parts(&wait_events);
    let mut event: sys::cl_event = ptr::null_mut();
    check(unsafe {
        sys::clEnqueueCopyBuffer(
            queue.raw(),
            src.raw(),
            dst.raw(),
            src_offset,
            dst_offset,
            size,
            wait_count,
            wait_ptr,
            &mut event,
        )
    })?;
    Ok(Handle::wrap(event, HandleKind::Event))
}

/// Fills `size` bytes of `buffer` at `offset` with a repeating `pattern`.
pub fn enqueue_fill_buffer(
    queue: &Handle,
    buffer: &Handle,
    pattern: &[u8],
    offset: usize,
    size: usize,
    wait: &[&Handle],
) -> BridgeResult<Handle> {
    if pattern.is_empty() {
        return Err(BridgeError::InvalidArgument(
            "fill pattern must not be empty".to_string(),
        ));
    }
    let wait_events = event_wait_list(wait);
    let (wait_count, wait_ptr) = wait_list_parts(&wait_events);
    let mut event: sys::cl_event = ptr::null_mut();
    check(unsafe {
        sys::clEnqueueFillBuffer(
            queue.raw(),
            buffer.raw(),
            pattern.as_ptr() as *const c_void,
            pattern.len(),
            offset,
            size,
            wait_count,
            wait_ptr,
            &mut event,
        )
    })?;
    Ok(Handle::wrap(event, HandleKind::Event))
}

/// Maps `size` bytes of `buffer` at `offset` into host memory, blocking
/// until the region is ready. Returns the mapped-pointer handle and the
/// completion event; the region stays valid until
/// [`enqueue_unmap_mem_object`] consumes the handle.
pub fn enqueue_map_buffer(
    queue: &Handle,
    buffer: &Handle,
    map_flags: sys::cl_map_flags,
    offset: usize,
    size: usize,
    wait: &[&Handle],
) -> BridgeResult<(Handle, Handle)> {
    let wait_events = event_wait_list(wait);
    let (wait_count, wait_ptr) = wait_list_parts(&wait_events);
    let mut event: sys::cl_event = ptr::null_mut();
    let mut status = sys::CL_SUCCESS;
    let mapped = unsafe {
        sys::clEnqueueMapBuffer(
            queue.raw(),
            buffer.raw(),
            sys::CL_TRUE,
            map_flags,
            offset,
            size,
            wait_count,
            wait_ptr,
            &mut event,
            &mut status,
        )
    };
    check(status)?;
    Ok((
        Handle::wrap(mapped, HandleKind::MappedPtr),
        Handle::wrap(event, HandleKind::Event),
    ))
}

/// Unmaps a region previously returned by [`enqueue_map_buffer`].
pub fn enqueue_unmap_mem_object(
    queue: &Handle,
    buffer: &Handle,
    mapped: &Handle,
    wait: &[&Handle],
) -> BridgeResult<Handle> {
    let wait_events = event_wait_list(wait);
    let (wait_count, wait_ptr) = wait_list_parts(&wait_events);
    let mut event: sys::cl_event = ptr::null_mut();
    check(unsafe {
        sys::clEnqueueUnmapMemObject(
            queue.raw(),
            buffer.raw(),
            mapped.raw(),
            wait_count,
            wait_ptr,
            &mut event,
        )
    })?;
    Ok(Handle::wrap(event, HandleKind::Event))
}

/// Migrates memory objects towards the device that owns `queue`.
pub fn enqueue_migrate_mem_objects(
    queue: &Handle,
    mem_objects: &[&Handle],
    flags: sys::cl_mem_migration_flags,
    wait: &[&Handle],
) -> BridgeResult<Handle> {
    let raw_mems: Vec<sys::cl_mem> = mem_objects.iter().map(|m| m.raw()).collect();
    let wait_events = event_wait_list(wait);
    let (wait_count, wait_ptr) = wait_list_parts(&wait_events);
    let mut event: sys::cl_event = ptr::null_mut();
    check(unsafe {
        sys::clEnqueueMigrateMemObjects(
            queue.raw(),
            raw_mems.len() as sys::cl_uint,
            raw_mems.as_ptr(),
            flags,
            wait_count,
            wait_ptr,
            &mut event,
        )
    })?;
    Ok(Handle::wrap(event, HandleKind::Event))
}

/// Launches a kernel over an up to three-dimensional work grid.
pub fn enqueue_nd_range_kernel(
    queue: &Handle,
    kernel: &Handle,
    global_work_offset: Option<&[usize]>,
    global_work_size: &[usize],
    local_work_size: Option<&[usize]>,
    wait: &[&Handle],
) -> BridgeResult<Handle> {
    let work_dim = global_work_size.len();
    if !(1..=3).contains(&work_dim) {
        return Err(BridgeError::InvalidArgument(format!(
            "work grids have 1 to 3 dimensions, got {}",
            work_dim
        )));
    }
    for (name, dims) in [
        ("global work offset", global_work_offset),
        ("local work size", local_work_size),
    ] {
        if let Some(dims) = dims {
            if dims.len() != work_dim {
                return Err(BridgeError::InvalidArgument(format!(
                    "{} has {} dimensions, the grid has {}",
                    name,
                    dims.len(),
                    work_dim
                )));
            }
        }
    }
    let wait_events = event_wait_list(wait);
    let (wait_count, wait_ptr) = wait_list_parts(&wait_events);
    let mut event: sys::cl_event = ptr::null_mut();
    check(unsafe {
        sys::clEnqueueNDRangeKernel(
            queue.raw(),
            kernel.raw(),
            work_dim as sys::cl_uint,
            global_work_offset.map_or(ptr::null(), |d| d.as_ptr()),
            global_work_size.as_ptr(),
            local_work_size.map_or(ptr::null(), |d| d.as_ptr()),
            wait_count,
            wait_ptr,
            &mut event,
        )
    })?;
    Ok(Handle::wrap(event, HandleKind::Event))
}

/// Launches a kernel as a single work item.
pub fn enqueue_task(queue: &Handle, kernel: &Handle, wait: &[&Handle]) -> BridgeResult<Handle> {
    let wait_events = event_wait_list(wait);
    let (wait_count, wait_ptr) = wait_list_parts(&wait_events);
    let mut event: sys::cl_event = ptr::null_mut();
    check(unsafe {
        sys::clEnqueueTask(queue.raw(), kernel.raw(), wait_count, wait_ptr, &mut event)
    })?;
    Ok(Handle::wrap(event, HandleKind::Event))
}

/// Enqueues a marker that completes when the wait list does.
pub fn enqueue_marker_with_wait_list(queue: &Handle, wait: &[&Handle]) -> BridgeResult<Handle> {
    let wait_events = event_wait_list(wait);
    let (wait_count, wait_ptr) = wait_list_parts(&wait_events);
    let mut event: sys::cl_event = ptr::null_mut();
    check(unsafe {
        sys::clEnqueueMarkerWithWaitList(queue.raw(), wait_count, wait_ptr, &mut event)
    })?;
    Ok(Handle::wrap(event, HandleKind::Event))
}

/// Enqueues a barrier that blocks later commands on the wait list.
pub fn enqueue_barrier_with_wait_list(queue: &Handle, wait: &[&Handle]) -> BridgeResult<Handle> {
    let wait_events = event_wait_list(wait);
    let (wait_count, wait_ptr) = wait_list_parts(&wait_events);
    let mut event: sys::cl_event = ptr::null_mut();
    check(unsafe {
        sys::clEnqueueBarrierWithWaitList(queue.raw(), wait_count, wait_ptr, &mut event)
    })?;
    Ok(Handle::wrap(event, HandleKind::Event))
}
