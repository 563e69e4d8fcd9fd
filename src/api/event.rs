//! Event management, waiting and status callbacks.

use opencl3::error_codes::ClError;

use super::{event_wait_list, info_scalar, wait_list_parts, InfoValue};
use crate::error::{check, BridgeError, BridgeResult};
use crate::handle::{Handle, HandleKind};
use crate::notify::{CallbackSender, Notification, Notifier};
use crate::sys;

/// Blocks until every listed event has completed.
pub fn wait_for_events(events: &[&Handle]) -> BridgeResult<()> {
    if events.is_empty() {
        return Err(BridgeError::InvalidArgument(
            "the wait list must not be empty".to_string(),
        ));
    }
    let raw = event_wait_list(events);
    let (count, head) = wait_list_parts(&raw);
    check(unsafe { sys::clWaitForEvents(count, head) })
}

/// Queries one event parameter.
pub fn get_event_info(event: &Handle, param: sys::cl_event_info) -> BridgeResult<InfoValue> {
    let raw: sys::cl_event = event.raw();
    let query = |size, value, ret| unsafe { sys::clGetEventInfo(raw, param, size, value, ret) };
    match param {
        sys::CL_EVENT_COMMAND_QUEUE => {
            let queue: sys::cl_command_queue = info_scalar(query)?;
            Ok(InfoValue::Handle(Handle::wrap_retained(
                queue,
                HandleKind::CommandQueue,
            )?))
        }
        sys::CL_EVENT_CONTEXT => {
            let context: sys::cl_context = info_scalar(query)?;
            Ok(InfoValue::Handle(Handle::wrap_retained(
                context,
                HandleKind::Context,
            )?))
        }
        sys::CL_EVENT_COMMAND_TYPE | sys::CL_EVENT_REFERENCE_COUNT => {
            Ok(InfoValue::Uint(info_scalar::<sys::cl_uint, _>(query)?))
        }
        sys::CL_EVENT_COMMAND_EXECUTION_STATUS => {
            Ok(InfoValue::Int(info_scalar::<sys::cl_int, _>(query)?))
        }
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}

/// Creates a user event in the context; its status starts as submitted.
pub fn create_user_event(context: &Handle) -> BridgeResult<Handle> {
    let mut status = sys::CL_SUCCESS;
    let raw = unsafe { sys::clCreateUserEvent(context.raw(), &mut status) };
    check(status)?;
    Ok(Handle::wrap(raw, HandleKind::Event))
}

/// Increments the event's reference count.
pub fn retain_event(event: &Handle) -> BridgeResult<()> {
    event.retain()
}

/// Releases the handle's owned reference; later calls are no-ops.
pub fn release_event(event: &Handle) -> BridgeResult<()> {
    event.release()
}

/// Completes a user event with the given execution status.
pub fn set_user_event_status(event: &Handle, execution_status: sys::cl_int) -> BridgeResult<()> {
    check(unsafe { sys::clSetUserEventStatus(event.raw(), execution_status) })
}

/// Registers `callback` to run when the event reaches `trigger_status`
/// (usually [`sys::CL_COMPLETE`]).
///
/// The driver invokes its side of the registration on an arbitrary internal
/// thread; `callback` itself runs on whichever thread pumps the queue behind
/// `sender`, with the event and the observed status. If the driver rejects
/// the registration synchronously, the callback's resources are reclaimed
/// before the error returns.
pub fn set_event_callback<D, F>(
    event: &Handle,
    trigger_status: sys::cl_int,
    sender: &CallbackSender,
    callback: F,
    user_data: D,
) -> BridgeResult<()>
where
    D: Send + 'static,
    F: FnOnce(Notification, D) + Send + 'static,
{
    let ctx = Notifier::arm(sender, HandleKind::Event, callback, user_data);
    let status = unsafe {
        sys::clSetEventCallback(
            event.raw(),
            trigger_status,
            Some(Notifier::trampoline_status),
            ctx,
        )
    };
    if status != sys::CL_SUCCESS {
        unsafe { Notifier::cancel(ctx) };
        return Err(BridgeError::Driver(ClError(status), None));
    }
    Ok(())
}

/// Queries one profiling counter of the event, in device-clock nanoseconds.
pub fn get_event_profiling_info(
    event: &Handle,
    param: sys::cl_profiling_info,
) -> BridgeResult<sys::cl_ulong> {
    let raw: sys::cl_event = event.raw();
    match param {
        sys::CL_PROFILING_COMMAND_QUEUED
        | sys::CL_PROFILING_COMMAND_SUBMIT
        | sys::CL_PROFILING_COMMAND_START
        | sys::CL_PROFILING_COMMAND_END => info_scalar(|size, value, ret| unsafe {
            sys::clGetEventProfilingInfo(raw, param, size, value, ret)
        }),
        _ => Err(BridgeError::Driver(ClError(sys::CL_INVALID_VALUE), None)),
    }
}
